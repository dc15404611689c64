//! Scan log channel: many producers (workers, director), one consumer (the
//! progress sink), records written to the scan's log file.
//!
//! Every record is also emitted as a `tracing` event so a subscriber on the
//! console sees the same stream.

use chrono::{DateTime, Local};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
}

impl fmt::Display for LogRecord {
    /// `<timestamp> <LEVEL> [<source>]: <message>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}]: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.source,
            self.message
        )
    }
}

/// Producer half. Cheap to clone; sends never block and never fail loudly
/// (a dropped receiver only means nobody is listening any more).
#[derive(Debug, Clone)]
pub struct LogSender {
    tx: Sender<LogRecord>,
}

impl LogSender {
    pub fn send(&self, level: LogLevel, source: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(source, "{message}"),
            LogLevel::Info => tracing::info!(source, "{message}"),
            LogLevel::Warn => tracing::warn!(source, "{message}"),
            LogLevel::Error => tracing::error!(source, "{message}"),
        }
        let _ = self.tx.send(LogRecord {
            timestamp: Local::now(),
            level,
            source: source.to_string(),
            message,
        });
    }

    pub fn debug(&self, source: &str, message: impl Into<String>) {
        self.send(LogLevel::Debug, source, message);
    }

    pub fn info(&self, source: &str, message: impl Into<String>) {
        self.send(LogLevel::Info, source, message);
    }

    pub fn warn(&self, source: &str, message: impl Into<String>) {
        self.send(LogLevel::Warn, source, message);
    }

    pub fn error(&self, source: &str, message: impl Into<String>) {
        self.send(LogLevel::Error, source, message);
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct LogReceiver {
    rx: Receiver<LogRecord>,
}

impl LogReceiver {
    /// Everything sent so far, without blocking.
    pub fn drain(&self) -> Vec<LogRecord> {
        self.rx.try_iter().collect()
    }
}

pub fn log_channel() -> (LogSender, LogReceiver) {
    let (tx, rx) = mpsc::channel();
    (LogSender { tx }, LogReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::thread;

    #[test]
    fn record_line_format() {
        let record = LogRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 8, 9, 30, 5).unwrap(),
            level: LogLevel::Warn,
            source: "director".into(),
            message: "rate set to 62/min".into(),
        };
        assert_eq!(
            record.to_string(),
            "2024-03-08 09:30:05.000 WARN [director]: rate set to 62/min"
        );
    }

    #[test]
    fn drain_collects_from_many_producers() {
        let (tx, rx) = log_channel();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for j in 0..10 {
                        tx.info(&format!("worker-{i}"), format!("line {j}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let records = rx.drain();
        assert_eq!(records.len(), 40);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn send_after_receiver_dropped_is_silent() {
        let (tx, rx) = log_channel();
        drop(rx);
        tx.error("worker-0", "nobody listening");
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Warn > LogLevel::Info);
        assert_eq!(LogLevel::Error.to_string(), "ERROR");
    }
}
