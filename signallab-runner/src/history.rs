//! Trial stream — NDJSON persistence of optimization trials as they finish.
//!
//! One JSON object per line, `{params, metrics, oos_metrics}`. Each line is
//! flushed as soon as it is written, so an interrupted run leaves a readable
//! prefix behind. Reading skips blank and malformed lines.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::store::TrialResult;

/// Append-only NDJSON writer shared by the optimizer's collector.
///
/// The file is truncated on creation and closed when the stream is dropped.
#[derive(Debug)]
pub struct TrialStream {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl TrialStream {
    /// Create (or truncate) the stream file, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        debug!(path = %path.display(), "opened trial stream");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one trial and flush it to disk.
    pub fn append(&self, trial: &TrialResult) -> io::Result<()> {
        let json = serde_json::to_string(trial)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{json}")?;
        writer.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every well-formed trial from an NDJSON file.
pub fn read_trials(path: &Path) -> io::Result<Vec<TrialResult>> {
    let reader = io::BufReader::new(File::open(path)?);
    let mut trials = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<TrialResult>(line) {
            Ok(trial) => trials.push(trial),
            Err(e) => warn!(line = lineno + 1, error = %e, "skipping malformed trial record"),
        }
    }

    Ok(trials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParamValue;

    fn trial(short: i64, sharpe: f64) -> TrialResult {
        TrialResult {
            params: [("ma_short".to_string(), ParamValue::Int(short))]
                .into_iter()
                .collect(),
            metrics: [("sharpe_ratio".to_string(), sharpe)].into_iter().collect(),
            oos_metrics: None,
        }
    }

    #[test]
    fn append_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/trials.jsonl");
        let stream = TrialStream::create(&path).unwrap();
        stream.append(&trial(5, 1.0)).unwrap();
        stream.append(&trial(10, f64::INFINITY)).unwrap();

        // Flushed per line: readable while the stream is still open.
        let read = read_trials(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0], trial(5, 1.0));
        assert!(read[1].metrics["sharpe_ratio"].is_infinite());
        drop(stream);
    }

    #[test]
    fn create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.jsonl");
        std::fs::write(&path, "old content\n").unwrap();
        let stream = TrialStream::create(&path).unwrap();
        assert_eq!(stream.path(), path.as_path());
        drop(stream);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn malformed_and_blank_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.jsonl");
        let good = serde_json::to_string(&trial(5, 1.0)).unwrap();
        std::fs::write(&path, format!("{good}\n\n{{not json\n   \n{good}\n")).unwrap();
        assert_eq!(read_trials(&path).unwrap().len(), 2);
    }

    #[test]
    fn missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_trials(&dir.path().join("absent.jsonl")).is_err());
    }
}
