//! JsonLinesSink - append-only JSON lines file
//!
//! Each record becomes exactly one line. A write that fails part-way is
//! truncated back so the file never holds a torn line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use contracts::{ContractError, RecordSink, StationRecord};
use tracing::{debug, error, info, instrument};

/// Sink appending one JSON object per line
pub struct JsonLinesSink {
    name: String,
    path: PathBuf,
    file: Option<File>,
    lines_written: u64,
}

impl JsonLinesSink {
    /// Open (or create) the target file in append mode
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, ContractError> {
        let name = name.into();
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!(sink = %name, path = %path.display(), "JsonLinesSink opened");

        Ok(Self {
            name,
            path,
            file: Some(file),
            lines_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn encode(&self, record: &StationRecord) -> Result<Vec<u8>, ContractError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| ContractError::sink_write(&self.name, format!("encode failed: {e}")))?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Write `line` at the end of `out`, restoring the previous length on failure
fn append_line<W, F>(out: &mut W, line: &[u8], truncate: F) -> io::Result<()>
where
    W: Write + Seek,
    F: FnOnce(&mut W, u64) -> io::Result<()>,
{
    let start = out.seek(SeekFrom::End(0))?;
    match out.write_all(line).and_then(|()| out.flush()) {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Err(rollback) = truncate(out, start) {
                error!(error = %rollback, "rollback of partial line failed");
            }
            Err(err)
        }
    }
}

impl RecordSink for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "json_lines_sink_store", skip(self, record), fields(sink = %self.name))]
    async fn store(&mut self, record: &StationRecord) -> Result<(), ContractError> {
        let line = self.encode(record)?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(&self.name, "sink is closed"))?;

        append_line(file, &line, |f, len| f.set_len(len))
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;

        self.lines_written += 1;
        debug!(sink = %self.name, lines = self.lines_written, "record appended");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(file) = self.file.as_mut() {
            file.sync_data()?;
        }
        Ok(())
    }

    #[instrument(name = "json_lines_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            info!(
                sink = %self.name,
                path = %self.path.display(),
                lines = self.lines_written,
                "JsonLinesSink closed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use contracts::{Scd40Fields, Sgp41Fields};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn record(co2: u16) -> StationRecord {
        StationRecord {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            scd40: Scd40Fields {
                co2: Some(co2),
                temperature: Some(22.5),
                humidity: Some(41.0),
            },
            dht22: Default::default(),
            sgp41: Sgp41Fields {
                voc_index: Some(100),
                ..Default::default()
            },
        }
    }

    /// Writer that accepts `budget` bytes then fails
    struct FlakyWriter {
        inner: Cursor<Vec<u8>>,
        budget: usize,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FlakyWriter {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[tokio::test]
    async fn test_appends_one_line_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("records.jsonl");

        let mut sink = JsonLinesSink::open("jsonl", &path).unwrap();
        sink.store(&record(800)).await.unwrap();
        sink.store(&record(810)).await.unwrap();
        sink.close().await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: StationRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed, record(810));
        assert!(lines[0].contains("\"co2\":800"));
        assert!(lines[0].contains("\"nox_index\":null"));
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let mut first = JsonLinesSink::open("jsonl", &path).unwrap();
        first.store(&record(800)).await.unwrap();
        first.close().await.unwrap();

        let mut second = JsonLinesSink::open("jsonl", &path).unwrap();
        second.store(&record(900)).await.unwrap();
        second.close().await.unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_store_after_close_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let mut sink = JsonLinesSink::open("jsonl", &path).unwrap();
        sink.close().await.unwrap();

        let err = sink.store(&record(800)).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert_eq!(sink.lines_written(), 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_partial_write_is_rolled_back() {
        let mut out = FlakyWriter {
            inner: Cursor::new(b"{\"a\":1}\n".to_vec()),
            budget: 4,
        };

        let err = append_line(&mut out, b"{\"b\":2}\n", |w, len| {
            w.inner.get_mut().truncate(len as usize);
            Ok(())
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "disk full");
        assert_eq!(out.inner.get_ref().as_slice(), b"{\"a\":1}\n");
    }

    #[test]
    fn test_complete_write_is_kept() {
        let mut out = Cursor::new(Vec::new());
        append_line(&mut out, b"{}\n", |_, _| Ok(())).unwrap();
        append_line(&mut out, b"[]\n", |_, _| Ok(())).unwrap();
        assert_eq!(out.get_ref().as_slice(), b"{}\n[]\n");
    }
}
