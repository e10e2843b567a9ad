//! The data manager: a per-sensor sliding-window running average with
//! threshold alerting.
//!
//! Runs on its own OS thread, polling the shared buffer's tail rather than
//! blocking on the condition variable directly (see SPEC_FULL.md §4.3 /
//! §9): this keeps the data manager's wake-up condition — "is there an
//! unprocessed tail" — independent of the condvar signal that the storage
//! manager waits on for a different condition ("is there a processed
//! tail"), exactly mirroring the original's `nanosleep`-based poll loop.

use std::collections::HashMap;
use std::thread;

use tracing::{debug, info, warn};

use crate::buffer::SharedBuffer;
use crate::config::{DATA_MANAGER_POLL_INTERVAL, RUN_AVG_LEN, TEMP_MAX, TEMP_MIN};
use crate::reading::SensorReading;

/// Running-average state for a single sensor.
#[derive(Debug)]
struct SensorState {
    last_ts: i64,
    ring: [f64; RUN_AVG_LEN],
    count: u64,
}

impl SensorState {
    fn new() -> Self {
        Self {
            last_ts: 0,
            ring: [0.0; RUN_AVG_LEN],
            count: 0,
        }
    }

    /// Record one reading and return the window mean, if the window is
    /// full enough for the mean to be meaningful (`count >= N`).
    fn record(&mut self, value: f64, ts: i64) -> Option<f64> {
        self.last_ts = ts;
        let slot = (self.count % RUN_AVG_LEN as u64) as usize;
        self.ring[slot] = value;
        self.count += 1;

        if self.count >= RUN_AVG_LEN as u64 {
            Some(self.ring.iter().sum::<f64>() / RUN_AVG_LEN as f64)
        } else {
            None
        }
    }
}

/// The unordered collection of per-sensor state, keyed by sensor id.
#[derive(Debug, Default)]
struct SensorDirectory {
    sensors: HashMap<u16, SensorState>,
}

impl SensorDirectory {
    fn new() -> Self {
        Self::default()
    }

    fn process_reading(&mut self, reading: &SensorReading) {
        let is_new = !self.sensors.contains_key(&reading.id);
        let state = self.sensors.entry(reading.id).or_insert_with(|| {
            if is_new {
                info!(sensor_id = reading.id, "new sensor node id");
            }
            SensorState::new()
        });

        if let Some(mean) = state.record(reading.value, reading.ts) {
            if mean < TEMP_MIN {
                warn!(
                    sensor_id = reading.id,
                    value = reading.value,
                    mean,
                    "LOW temperature alert"
                );
            }
            if mean > TEMP_MAX {
                warn!(
                    sensor_id = reading.id,
                    value = reading.value,
                    mean,
                    "HIGH temperature alert"
                );
            }
        }
    }
}

/// Run the data manager loop until the buffer is both empty and closed.
pub fn run(buffer: &SharedBuffer) {
    let mut directory = SensorDirectory::new();

    loop {
        if !buffer.has_unprocessed_tail() {
            if buffer.is_empty() && buffer.is_closed() {
                break;
            }
            debug!("nothing to process, sleeping");
            thread::sleep(DATA_MANAGER_POLL_INTERVAL);
            continue;
        }

        if let Some(reading) = buffer.peek_tail_and_mark_processed() {
            directory.process_reading(&reading);
            info!(
                sensor_id = reading.id,
                value = reading.value,
                "PROCESSED"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::logs_contain;

    #[test]
    fn no_alert_before_window_is_full() {
        let mut state = SensorState::new();
        for _ in 0..RUN_AVG_LEN - 1 {
            assert!(state.record(15.0, 0).is_none());
        }
    }

    #[test]
    fn mean_uses_all_n_slots_at_exactly_n_readings() {
        let mut state = SensorState::new();
        let values = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(values.len(), RUN_AVG_LEN);
        let mut mean = None;
        for v in values {
            mean = state.record(v, 0);
        }
        assert_eq!(mean, Some(30.0));
    }

    #[test]
    fn mean_uses_most_recent_n_readings_once_window_overflows() {
        let mut state = SensorState::new();
        for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
            state.record(v, 0);
        }
        // one more reading evicts the oldest (10.0) from the window
        let mean = state.record(100.0, 0).unwrap();
        let expected = (20.0 + 30.0 + 40.0 + 50.0 + 100.0) / 5.0;
        assert_eq!(mean, expected);
    }

    #[test]
    #[tracing_test::traced_test]
    fn low_and_high_alerts_fire_at_the_right_thresholds() {
        let mut directory = SensorDirectory::new();
        for ts in 2000..2005 {
            directory.process_reading(&SensorReading::new(1, 15.0, ts));
        }
        let state = &directory.sensors[&1];
        let mean = state.ring.iter().sum::<f64>() / RUN_AVG_LEN as f64;
        assert!(mean < TEMP_MIN);

        for ts in 2000..2005 {
            directory.process_reading(&SensorReading::new(2, 30.0, ts));
        }
        let state = &directory.sensors[&2];
        let mean = state.ring.iter().sum::<f64>() / RUN_AVG_LEN as f64;
        assert!(mean > TEMP_MAX);

        assert!(logs_contain("LOW temperature alert"));
        assert!(logs_contain("HIGH temperature alert"));
    }
}
