//! A multi-sensor telemetry gateway: ingests fixed-format readings over
//! TCP, runs a per-sensor sliding-window analysis with threshold alerting,
//! and durably persists every reading to SQLite.
//!
//! The pipeline is three components tied together by one shared buffer:
//! the connection manager (producer), the data manager (first consumer,
//! analysis), and the storage manager (second consumer, persistence). See
//! [`orchestrator::run`] for how they are wired together.

pub mod buffer;
pub mod config;
pub mod connection_manager;
pub mod data_manager;
pub mod error;
pub mod orchestrator;
pub mod reading;
pub mod storage_manager;

pub use buffer::SharedBuffer;
pub use error::Fatal;
pub use reading::SensorReading;
