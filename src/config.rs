//! Compile-time constants for the gateway.
//!
//! These mirror the `#define`s in the original implementation's
//! `config.h` / `datamgr.c` / `sensor_db.h`. None of these are meant to be
//! runtime-configurable: the only external interface is the port the
//! server listens on (see `src/bin/server.rs`).

use std::time::Duration;

/// Global idle timeout. If no socket produces traffic for this long, the
/// connection manager shuts itself down. Also the per-entry idle-eviction
/// threshold.
pub const T_IDLE: Duration = Duration::from_secs(10);

/// Length of the per-sensor running-average window (`RUN_AVG_LENGTH` in the
/// original).
pub const RUN_AVG_LEN: usize = 5;

/// Lower threshold for a `LOW` alert.
pub const TEMP_MIN: f64 = 20.0;

/// Upper threshold for a `HIGH` alert.
pub const TEMP_MAX: f64 = 25.0;

/// Path to the sqlite database file.
pub const DB_PATH: &str = "sensor_gateway.db";

/// Name of the readings table.
pub const TABLE_NAME: &str = "SensorData";

/// If true, the storage manager drops and recreates `TABLE_NAME` at
/// startup, discarding all prior data. The original hard-wires this to
/// `true`; preserved here as the default, but called out explicitly since
/// it is destructive.
pub const CLEAR_UP_ON_START: bool = true;

/// Number of times a failed DB operation is retried before the storage
/// manager gives up and exits.
pub const DB_MAX_RETRIES: u32 = 3;

/// How long the data manager sleeps between polls of the buffer's tail
/// when there is nothing unprocessed to observe.
pub const DATA_MANAGER_POLL_INTERVAL: Duration = Duration::from_millis(50);
