//! Wires the three components together: spawns the data manager and
//! storage manager as independent OS threads sharing one [`SharedBuffer`],
//! then runs the connection manager on the calling thread as the sole
//! producer.
//!
//! This mirrors the original's `main()`: `pthread_create` for the two
//! background workers, the connection manager loop run inline, then a
//! drain-and-join shutdown sequence once the connection manager returns.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::info;

use crate::buffer::SharedBuffer;
use crate::connection_manager::ConnectionManager;
use crate::error::Fatal;
use crate::{data_manager, storage_manager};

/// How often the drain loop re-checks the buffer after the connection
/// manager stops producing.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bind the listening socket, start the pipeline, and run it to
/// completion. Returns once the connection manager has shut down (global
/// idle timeout, or the buffer being closed out from under it) and both
/// background workers have drained and exited.
pub fn run(port: u16) -> Result<(), Fatal> {
    let buffer = Arc::new(SharedBuffer::new());
    let connection_manager = ConnectionManager::bind(port)?;

    let data_buffer = Arc::clone(&buffer);
    let data_thread = thread::Builder::new()
        .name("data-manager".into())
        .spawn(move || data_manager::run(&data_buffer))
        .expect("failed to spawn data manager thread");

    let storage_buffer = Arc::clone(&buffer);
    let storage_thread = thread::Builder::new()
        .name("storage-manager".into())
        .spawn(move || storage_manager::run(&storage_buffer))
        .expect("failed to spawn storage manager thread");

    connection_manager.run(&buffer)?;

    info!("connection manager stopped, draining in-flight readings");
    while !buffer.is_empty() {
        thread::sleep(DRAIN_POLL_INTERVAL);
    }
    buffer.close();

    data_thread.join().expect("data manager thread panicked");
    storage_thread
        .join()
        .expect("storage manager thread panicked");

    info!("shutdown complete");
    Ok(())
}
