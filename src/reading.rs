//! The sensor reading type and its fixed-size wire representation.

use std::io::{self, Read};

/// A single `(sensor_id, value, timestamp)` triple produced by a sensor.
///
/// Immutable once constructed, except for the `processed` flag, which is
/// owned and mutated exclusively by [`crate::buffer::SharedBuffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub id: u16,
    pub value: f64,
    pub ts: i64,
    pub processed: bool,
}

impl SensorReading {
    /// Construct a fresh, unprocessed reading as received off the wire.
    pub fn new(id: u16, value: f64, ts: i64) -> Self {
        Self {
            id,
            value,
            ts,
            processed: false,
        }
    }
}

/// Byte length of one wire record: `u16` + `f64` + `i64`.
pub const WIRE_RECORD_LEN: usize = 2 + 8 + 8;

/// Decode one fixed-size sensor record from `reader`.
///
/// Fields are read in order (`id`, `value`, `ts`) in the host's native byte
/// order, per the wire format documented in SPEC_FULL.md §6: the original
/// source left the sender/receiver integer width and endianness an
/// implicit agreement between sensor and gateway, so this implementation
/// fixes the contract to native-endian, 64-bit-wide `ts` and documents it
/// here rather than guessing at portability the spec never required.
///
/// Returns `Ok(None)` if the peer closed the connection before any bytes of
/// a new record were read (a clean end-of-session). Returns `Err` if the
/// peer closed mid-record, or on any other I/O failure.
pub fn read_record<R: Read>(reader: &mut R) -> io::Result<Option<SensorReading>> {
    let mut id_buf = [0u8; 2];
    match read_exact_or_eof(reader, &mut id_buf)? {
        false => return Ok(None),
        true => {}
    }
    let id = u16::from_ne_bytes(id_buf);

    let mut value_buf = [0u8; 8];
    reader.read_exact(&mut value_buf)?;
    let value = f64::from_ne_bytes(value_buf);

    let mut ts_buf = [0u8; 8];
    reader.read_exact(&mut ts_buf)?;
    let ts = i64::from_ne_bytes(ts_buf);

    Ok(Some(SensorReading::new(id, value, ts)))
}

/// Like `read_exact`, but distinguishes "zero bytes read, peer closed
/// cleanly" (returns `Ok(false)`) from "some but not all of `buf` was
/// filled before the peer closed" (returns an `UnexpectedEof` error).
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid record",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Encode a reading as a wire record. Exposed for tests and for simulated
/// sensor clients.
pub fn encode_record(id: u16, value: f64, ts: i64) -> [u8; WIRE_RECORD_LEN] {
    let mut buf = [0u8; WIRE_RECORD_LEN];
    buf[0..2].copy_from_slice(&id.to_ne_bytes());
    buf[2..10].copy_from_slice(&value.to_ne_bytes());
    buf[10..18].copy_from_slice(&ts.to_ne_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_record() {
        let bytes = encode_record(17, 18.5, 1001);
        let mut cursor = Cursor::new(bytes);
        let reading = read_record(&mut cursor).unwrap().unwrap();
        assert_eq!(reading.id, 17);
        assert_eq!(reading.value, 18.5);
        assert_eq!(reading.ts, 1001);
        assert!(!reading.processed);
    }

    #[test]
    fn clean_eof_before_any_bytes_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_record(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn eof_mid_record_is_an_error() {
        let bytes = encode_record(1, 1.0, 1);
        let mut cursor = Cursor::new(&bytes[..5]);
        let err = read_record(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
