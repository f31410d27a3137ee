//! Execution journal — JSONL sink that persists the log while the run progresses.
//!
//! Line 1 holds the run header, each following line one log event, and a
//! closing `finished` line marks a complete run. Every line is flushed as it is
//! written, so an interrupted run leaves a readable prefix.

use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use regimelab_core::engine::{ExecutionLog, ExecutionSink, LogEvent, RunHeader};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum JournalRecord {
    Header(RunHeader),
    Event(LogEvent),
    Finished { events: usize },
}

/// [`ExecutionSink`] writing one JSON object per line.
pub struct JournalSink {
    path: PathBuf,
    writer: BufWriter<File>,
    events: usize,
}

impl JournalSink {
    /// Create (or truncate) the journal, creating parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            events: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, record: &JournalRecord) -> io::Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()
    }
}

impl ExecutionSink for JournalSink {
    fn begin(&mut self, header: &RunHeader) -> io::Result<()> {
        self.events = 0;
        self.write_line(&JournalRecord::Header(header.clone()))
    }

    fn record(&mut self, event: &LogEvent) -> io::Result<()> {
        self.events += 1;
        self.write_line(&JournalRecord::Event(event.clone()))
    }

    fn finish(&mut self) -> io::Result<()> {
        let events = self.events;
        self.write_line(&JournalRecord::Finished { events })
    }
}

/// A journal read back from disk.
#[derive(Debug, Clone)]
pub struct RecoveredJournal {
    /// `None` when the header line is missing or unreadable.
    pub log: Option<ExecutionLog>,
    /// The closing line was present and its count matched.
    pub complete: bool,
    /// Lines that failed to parse and were skipped.
    pub malformed: usize,
}

/// Read a journal, tolerating a torn final line.
pub fn read_journal(path: &Path) -> io::Result<RecoveredJournal> {
    let reader = io::BufReader::new(File::open(path)?);
    let mut log: Option<ExecutionLog> = None;
    let mut complete = false;
    let mut malformed = 0;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalRecord>(&line) {
            Ok(JournalRecord::Header(header)) => log = Some(ExecutionLog::new(header)),
            Ok(JournalRecord::Event(event)) => match log.as_mut() {
                Some(log) => log.events.push(event),
                None => malformed += 1,
            },
            Ok(JournalRecord::Finished { events }) => {
                complete = log.as_ref().is_some_and(|l| l.events.len() == events);
            }
            Err(_) => malformed += 1,
        }
    }

    if malformed > 0 {
        warn!(path = %path.display(), malformed, "skipped malformed journal lines");
    }
    Ok(RecoveredJournal {
        log,
        complete,
        malformed,
    })
}
