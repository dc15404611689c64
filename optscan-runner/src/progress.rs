//! Progress bar and scan log file, driven from the orchestrating thread.
//!
//! The sink polls the queue length on a fixed interval, moves the bar
//! forward (never back), and drains the log channel into the scan log,
//! flushing to disk after every drain so a crash loses at most one poll
//! interval of lines.

use crate::log_channel::LogReceiver;
use crate::queue::TaskQueue;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

struct LogFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

pub struct ProgressSink {
    total: u64,
    position: u64,
    poll_interval: Duration,
    bar: Option<ProgressBar>,
    log_file: Option<LogFile>,
    lines_written: u64,
}

/// What the sink wrote over a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSummary {
    pub log_path: Option<PathBuf>,
    pub lines_written: u64,
}

impl ProgressSink {
    pub fn new(total: usize, poll_interval: Duration) -> Self {
        Self {
            total: total as u64,
            position: 0,
            poll_interval,
            bar: None,
            log_file: None,
            lines_written: 0,
        }
    }

    pub fn with_bar(mut self, message: &str) -> Self {
        let bar = ProgressBar::new(self.total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(message.to_string());
        self.bar = Some(bar);
        self
    }

    /// Append scan log lines to `path`, creating parent directories.
    pub fn with_log_file(mut self, path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        self.log_file = Some(LogFile {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        });
        Ok(self)
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Poll until the queue is empty and every dequeued item is done.
    pub fn watch(&mut self, queue: &TaskQueue<String>, logs: &LogReceiver) {
        loop {
            self.drain(logs);
            self.advance(queue.len());
            if queue.is_empty() {
                break;
            }
            thread::sleep(self.poll_interval);
        }
        while !queue.join_timeout(self.poll_interval) {
            self.drain(logs);
        }
        self.drain(logs);
        self.advance(0);
    }

    /// Final drain once every producer is finished.
    pub fn finish(mut self, logs: &LogReceiver) -> SinkSummary {
        self.drain(logs);
        if let Some(bar) = &self.bar {
            bar.finish();
        }
        SinkSummary {
            log_path: self.log_file.map(|f| f.path),
            lines_written: self.lines_written,
        }
    }

    fn advance(&mut self, remaining: usize) {
        let done = self.total.saturating_sub(remaining as u64);
        if done > self.position {
            self.position = done;
            if let Some(bar) = &self.bar {
                bar.set_position(done);
            }
        }
    }

    fn drain(&mut self, logs: &LogReceiver) {
        let records = logs.drain();
        if records.is_empty() {
            return;
        }
        let Some(file) = &mut self.log_file else {
            return;
        };
        let written = records.len() as u64;
        let result = records
            .iter()
            .try_for_each(|r| writeln!(file.writer, "{r}"))
            .and_then(|_| file.writer.flush())
            .and_then(|_| file.writer.get_ref().sync_data());

        match result {
            Ok(()) => self.lines_written += written,
            Err(e) => {
                tracing::warn!(path = %file.path.display(), "scan log disabled after write error: {e}");
                self.log_file = None;
            }
        }
    }
}
