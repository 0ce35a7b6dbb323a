//! Reading sinks: where decoded measurements go after the session.

use crate::domain::models::ReadingRecord;
use crate::error::SinkError;
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Receives one record per decoded measurement.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn record(&self, record: &ReadingRecord) -> Result<(), SinkError>;
}

/// Emits each record as a structured log event.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl ReadingSink for TracingSink {
    async fn record(&self, record: &ReadingRecord) -> Result<(), SinkError> {
        debug!(
            measurement = record.measurement.as_str(),
            device = %record.tags.device,
            time = %record.time,
            value = record.fields.value,
            "Reading recorded"
        );
        Ok(())
    }
}

/// Appends records as JSON lines to a file.
pub struct JsonLinesSink {
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Writing readings to {}", path.display());
        Ok(Self {
            file: Mutex::new(File::from_std(file)),
        })
    }
}

#[async_trait]
impl ReadingSink for JsonLinesSink {
    async fn record(&self, record: &ReadingRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)? + "\n";
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Measurement, ReadingKind};
    use time::macros::datetime;

    #[tokio::test]
    async fn test_json_lines_sink_appends() {
        let path = std::env::temp_dir().join(format!(
            "thingy_monitor_sink_{}.jsonl",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);

        let sink = JsonLinesSink::open(&path).unwrap();
        for (kind, value) in [(ReadingKind::Temperature, 22.35), (ReadingKind::Humidity, 44.0)] {
            let record = ReadingRecord::new(
                Measurement::new(kind, value),
                "AA:BB:CC:DD:EE:FF",
                datetime!(2024-05-01 12:30:00 UTC),
            );
            sink.record(&record).await.unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["measurement"], "Temperature");
        assert_eq!(lines[1]["measurement"], "Humidity");
        assert_eq!(lines[1]["fields"]["value"], 44.0);

        let _ = fs::remove_file(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_stay_line_delimited() {
        let path = std::env::temp_dir().join(format!(
            "thingy_monitor_sink_concurrent_{}.jsonl",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);

        let sink = std::sync::Arc::new(JsonLinesSink::open(&path).unwrap());
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    let record = ReadingRecord::new(
                        Measurement::new(ReadingKind::Co2, 400.0 + f64::from(i)),
                        "AA:BB:CC:DD:EE:FF",
                        datetime!(2024-05-01 12:30:00 UTC),
                    );
                    sink.record(&record).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        let mut values: Vec<f64> = contents
            .lines()
            .map(|l| {
                let json: serde_json::Value = serde_json::from_str(l).unwrap();
                json["fields"]["value"].as_f64().unwrap()
            })
            .collect();
        values.sort_by(f64::total_cmp);
        assert_eq!(values, (0..8).map(|i| 400.0 + f64::from(i)).collect::<Vec<_>>());

        let _ = fs::remove_file(&path);
    }
}
