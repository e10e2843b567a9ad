//! The storage manager: durably persists every reading the data manager
//! has finished analysing.
//!
//! Runs on its own OS thread with a private `rusqlite::Connection` — the
//! opaque "SQL engine with an insert operation" the spec treats as an
//! external collaborator. Waits on the shared buffer's condition variable
//! rather than polling, since its wake condition ("a processed tail
//! exists, or the buffer is drained") is exactly what `close()` and the
//! data manager's `peek_tail_and_mark_processed` signal for.

use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::buffer::{SharedBuffer, StorageWait};
use crate::config::{CLEAR_UP_ON_START, DB_MAX_RETRIES, DB_PATH, TABLE_NAME};
use crate::error::StorageError;
use crate::reading::SensorReading;

/// Column list shared by every `CREATE TABLE` statement the storage manager
/// issues.
const SCHEMA: &str =
    "(id INTEGER PRIMARY KEY AUTOINCREMENT, sensor_id INT, sensor_value DECIMAL(4,2), timestamp TIMESTAMP)";

/// Open the database connection and ensure the readings table exists.
///
/// If `clear_up` is true, any existing table is dropped first, discarding
/// prior data — this mirrors the original's hard-wired `clear_up_flag`.
pub fn init_connection(clear_up: bool) -> Result<Connection, StorageError> {
    let conn = Connection::open(DB_PATH).map_err(StorageError::Connect)?;
    info!(path = DB_PATH, "connection to SQL server established");

    if clear_up {
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {TABLE_NAME}; CREATE TABLE {TABLE_NAME} {SCHEMA};"
        ))
        .map_err(StorageError::Schema)?;
    } else {
        conn.execute(
            &format!("CREATE TABLE IF NOT EXISTS {TABLE_NAME} {SCHEMA}"),
            [],
        )
        .map_err(StorageError::Schema)?;
    }

    info!(table = TABLE_NAME, "table ready");
    Ok(conn)
}

/// Insert one reading, retrying up to `DB_MAX_RETRIES` times on failure.
fn insert_with_retry(
    conn: &Connection,
    reading: &SensorReading,
) -> Result<(), StorageError> {
    let mut last_err = None;
    for attempt in 1..=DB_MAX_RETRIES {
        let result = conn.execute(
            &format!(
                "INSERT INTO {TABLE_NAME} (sensor_id, sensor_value, timestamp) VALUES (?1, ?2, ?3)"
            ),
            rusqlite::params![reading.id, reading.value, reading.ts],
        );
        match result {
            Ok(_) => return Ok(()),
            Err(e) => {
                warn!(
                    sensor_id = reading.id,
                    attempt, "insert failed, retrying"
                );
                last_err = Some(e);
            }
        }
    }
    Err(StorageError::ConnectionLost {
        retries: DB_MAX_RETRIES,
        source: last_err.expect("loop runs at least once"),
    })
}

/// Run the storage manager loop until the buffer is drained and closed, or
/// the database connection is lost.
pub fn run(buffer: &SharedBuffer) {
    let conn = match init_connection(CLEAR_UP_ON_START) {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = %e, "storage manager failed to start");
            return;
        }
    };

    loop {
        match buffer.wait_for_storage_work() {
            StorageWait::Drained => break,
            StorageWait::ReadyToStore => {
                let reading = buffer.remove_tail();
                match insert_with_retry(&conn, &reading) {
                    Ok(()) => {
                        info!(sensor_id = reading.id, value = reading.value, "STORED");
                    }
                    Err(e) => {
                        error!(error = %e, "connection to SQL server lost");
                        return;
                    }
                }
            }
        }
    }

    info!("storage manager shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!("CREATE TABLE {TABLE_NAME} {SCHEMA};"))
            .unwrap();
        conn
    }

    #[test]
    fn inserts_a_reading_and_is_queryable() {
        let conn = in_memory_connection();
        let reading = SensorReading::new(7, 21.5, 1234);
        insert_with_retry(&conn, &reading).unwrap();

        let stored: (u16, f64, i64) = conn
            .query_row(
                &format!("SELECT sensor_id, sensor_value, timestamp FROM {TABLE_NAME}"),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(stored, (7, 21.5, 1234));
    }

    #[test]
    fn storage_loop_drains_and_exits_on_close() {
        let buffer = SharedBuffer::new();
        buffer.insert_front(SensorReading::new(1, 1.0, 1)).unwrap();
        buffer.peek_tail_and_mark_processed();
        buffer.close();

        // storage manager should remove the processed reading, then see
        // the buffer drained and exit cleanly (no DB needed for this
        // assertion, we only check buffer state transitions).
        assert_eq!(buffer.wait_for_storage_work(), StorageWait::ReadyToStore);
        buffer.remove_tail();
        assert_eq!(buffer.wait_for_storage_work(), StorageWait::Drained);
    }
}
