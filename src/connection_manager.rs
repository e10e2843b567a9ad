//! The connection manager: a single-threaded I/O multiplexer that owns all
//! sensor sockets, admits new ones, detects per-connection idleness,
//! demarshals the wire record, and publishes readings into the shared
//! buffer.
//!
//! Built on `mio::Poll` as the direct analogue of the original's `poll(2)`
//! loop: readiness is recomputed from scratch every tick (a fresh `Poll` is
//! created and every live entry re-registered) rather than incrementally
//! maintained, mirroring the original's `fds = realloc(...)` rebuild each
//! iteration. For a handful of sensor connections this is cheap and it
//! sidesteps token-reuse bugs that come from mutating a live registry while
//! entries are being evicted mid-tick.

use std::io::{self, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use crate::buffer::SharedBuffer;
use crate::config::T_IDLE;
use crate::error::ConnError;
use crate::reading::{read_record, SensorReading, WIRE_RECORD_LEN};

enum SocketKind {
    Listener(TcpListener),
    Client(TcpStream, Vec<u8>),
}

/// Per-connection bookkeeping. Entry 0 is always the listening socket and
/// has no sensor identity; entries >= 1 are client sockets.
struct SocketEntry {
    kind: SocketKind,
    last_seen: i64,
    last_sensor_id: u16,
    announced: bool,
}

impl SocketEntry {
    fn listener(listener: TcpListener, now: i64) -> Self {
        Self {
            kind: SocketKind::Listener(listener),
            last_seen: now,
            last_sensor_id: 0,
            announced: false,
        }
    }

    fn client(stream: TcpStream, now: i64) -> Self {
        Self {
            kind: SocketKind::Client(stream, Vec::with_capacity(WIRE_RECORD_LEN)),
            last_seen: now,
            last_sensor_id: 0,
            announced: false,
        }
    }
}

/// Outcome of attempting to read from a readable client socket.
enum ReadOutcome {
    /// A full record was decoded; leftover bytes (if any) remain buffered.
    Reading(SensorReading),
    /// The peer closed the connection cleanly.
    Closed,
    /// Readiness fired but no full record is available yet (spurious
    /// wakeup, or only a partial record has arrived so far).
    NotYet,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as i64
}

/// Try to read one fixed-size record from `stream`, buffering partial
/// reads in `buf` across calls (and therefore across poll ticks).
fn try_read_one_record(stream: &mut TcpStream, buf: &mut Vec<u8>) -> io::Result<ReadOutcome> {
    loop {
        if buf.len() >= WIRE_RECORD_LEN {
            let mut cursor = io::Cursor::new(&buf[..WIRE_RECORD_LEN]);
            let reading = read_record(&mut cursor)?
                .expect("a full WIRE_RECORD_LEN slice always yields a record");
            buf.drain(0..WIRE_RECORD_LEN);
            return Ok(ReadOutcome::Reading(reading));
        }

        let mut chunk = [0u8; 256];
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(ReadOutcome::Closed),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadOutcome::NotYet),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// The connection manager. Owns the socket set; runs on the calling
/// thread.
pub struct ConnectionManager {
    entries: Vec<SocketEntry>,
}

impl ConnectionManager {
    /// Open the listening socket. Failure here is fatal: the caller should
    /// terminate the process.
    pub fn bind(port: u16) -> Result<Self, ConnError> {
        let addr = format!("0.0.0.0:{port}")
            .parse()
            .expect("0.0.0.0:<u16> always parses as a socket address");
        let listener = TcpListener::bind(addr).map_err(|source| ConnError::ListenFailed {
            port,
            source,
        })?;
        info!(port, "accepting inbound sensor connections");
        Ok(Self {
            entries: vec![SocketEntry::listener(listener, now_secs())],
        })
    }

    /// Run the main loop until the global idle timeout fires or the
    /// shared buffer is closed out from under the producer.
    pub fn run(mut self, buffer: &SharedBuffer) -> Result<(), ConnError> {
        loop {
            let ready = match self.poll_once()? {
                Some(ready) => ready,
                None => {
                    info!(
                        timeout_secs = T_IDLE.as_secs(),
                        "no data received in T_idle, shutting down connection manager"
                    );
                    return Ok(());
                }
            };

            if self.service_ready_entries(&ready, buffer)? {
                return Ok(());
            }
        }
    }

    /// Build a fresh registry covering every live entry, and wait up to
    /// `T_IDLE` for readiness. Returns `None` on a global idle timeout.
    fn poll_once(&mut self) -> Result<Option<Vec<bool>>, ConnError> {
        let mut poll = Poll::new()?;
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            let token = Token(idx);
            match &mut entry.kind {
                SocketKind::Listener(l) => {
                    poll.registry().register(l, token, Interest::READABLE)?
                }
                SocketKind::Client(s, _) => {
                    poll.registry().register(s, token, Interest::READABLE)?
                }
            }
        }

        let mut events = Events::with_capacity(self.entries.len().max(1));
        poll.poll(&mut events, Some(T_IDLE))?;

        if events.is_empty() {
            return Ok(None);
        }

        let mut ready = vec![false; self.entries.len()];
        for event in events.iter() {
            ready[event.token().0] = true;
        }
        Ok(Some(ready))
    }

    /// Walk every entry that existed at the start of this tick in order,
    /// evicting idle clients, servicing readable ones, and appending newly
    /// accepted connections at the end (so they are not visited again
    /// until the next tick). Returns `Ok(true)` if the producer should
    /// stop (the buffer was closed out from under it).
    fn service_ready_entries(
        &mut self,
        ready: &[bool],
        buffer: &SharedBuffer,
    ) -> Result<bool, ConnError> {
        let now = now_secs();
        let old_entries = std::mem::take(&mut self.entries);
        let mut next_entries = Vec::with_capacity(old_entries.len());
        let mut newly_accepted = Vec::new();
        let mut should_stop = false;

        for (idx, mut entry) in old_entries.into_iter().enumerate() {
            let is_client = idx != 0;
            let is_ready = ready.get(idx).copied().unwrap_or(false);

            if is_ready {
                // Readability wins over idleness even if both apply this tick.
                entry.last_seen = now;
                match &mut entry.kind {
                    SocketKind::Listener(listener) => {
                        match listener.accept() {
                            Ok((stream, _addr)) => {
                                debug!("accepted inbound connection");
                                newly_accepted.push(SocketEntry::client(stream, now));
                            }
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                            Err(e) => warn!(error = %e, "accept failed"),
                        }
                        next_entries.push(entry);
                    }
                    SocketKind::Client(stream, buf) => {
                        // Drain every complete record the OS buffer handed
                        // us this tick, not just the first: a fresh `Poll`
                        // is built every tick, so any record left unread
                        // here would go unnoticed once the socket runs dry
                        // and stops being reported readable.
                        let mut keep_entry = true;
                        loop {
                            match try_read_one_record(stream, buf) {
                                Ok(ReadOutcome::Reading(reading)) => {
                                    if !entry.announced {
                                        info!(
                                            sensor_id = reading.id,
                                            "a new sensor has opened a new connection"
                                        );
                                        entry.announced = true;
                                    }
                                    entry.last_sensor_id = reading.id;
                                    match buffer.insert_front(reading) {
                                        Ok(()) => continue,
                                        Err(_closed) => {
                                            should_stop = true;
                                            break;
                                        }
                                    }
                                }
                                Ok(ReadOutcome::Closed) => {
                                    info!(
                                        sensor_id = entry.last_sensor_id,
                                        "sensor disconnected"
                                    );
                                    keep_entry = false;
                                    break;
                                }
                                Ok(ReadOutcome::NotYet) => break,
                                Err(e) => {
                                    warn!(error = %e, "transient read error, discarding reading");
                                    break;
                                }
                            }
                        }
                        if keep_entry {
                            next_entries.push(entry);
                        }
                    }
                }
            } else if is_client && now - entry.last_seen > T_IDLE.as_secs() as i64 {
                info!(sensor_id = entry.last_sensor_id, "sensor idle, evicting");
                // entry is dropped, closing the socket
            } else {
                next_entries.push(entry);
            }

            if should_stop {
                // The buffer closed out from under us; the component is
                // terminating, so any remaining entries in `old_entries`
                // are simply dropped along with their sockets.
                break;
            }
        }

        next_entries.extend(newly_accepted);
        self.entries = next_entries;
        Ok(should_stop)
    }
}
