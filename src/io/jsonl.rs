//! JSON Lines (JSONL) connectors.
//!
//! - [`JsonLinesInput`] reads one [`Timestamped`] document per line:
//!   `{"ts": 1672531200000, "value": ...}`. Empty or whitespace-only lines are skipped.
//! - [`JsonLinesOutput`] writes one JSON value per line, optionally wrapped
//!   with its epoch in the same shape the input reads.

use crate::io::{Sink, Source};
use crate::window::{TimestampMs, Timestamped};
use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{File, create_dir_all};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

pub struct JsonLinesInput<T> {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    _t: PhantomData<fn() -> T>,
}

impl<T> JsonLinesInput<T> {
    /// # Errors
    /// If the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(f).lines(),
            line_no: 0,
            _t: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Source<T> for JsonLinesInput<T> {
    fn next(&mut self) -> Result<Option<Timestamped<T>>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line
                .with_context(|| format!("read line {} in {}", self.line_no, self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let v: Timestamped<T> = serde_json::from_str(&line).with_context(|| {
                format!(
                    "parse JSONL line {} in {}: {}",
                    self.line_no,
                    self.path.display(),
                    line
                )
            })?;
            return Ok(Some(v));
        }
        Ok(None)
    }
}

pub struct JsonLinesOutput<T> {
    path: PathBuf,
    writer: BufWriter<File>,
    with_epochs: bool,
    written: usize,
    _t: PhantomData<fn(T)>,
}

impl<T> JsonLinesOutput<T> {
    /// Create (or truncate) `path`, creating parent directories as needed.
    ///
    /// # Errors
    /// If the directories or the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(f),
            with_epochs: false,
            written: 0,
            _t: PhantomData,
        })
    }

    /// Write `{"ts": epoch, "value": ...}` instead of the bare value.
    #[must_use]
    pub fn with_epochs(mut self) -> Self {
        self.with_epochs = true;
        self
    }
}

impl<T: Serialize> Sink<T> for JsonLinesOutput<T> {
    fn write(&mut self, epoch: TimestampMs, value: T) -> Result<()> {
        let res = if self.with_epochs {
            serde_json::to_writer(&mut self.writer, &Timestamped::new(epoch, value))
        } else {
            serde_json::to_writer(&mut self.writer, &value)
        };
        res.with_context(|| {
            format!("serialize item #{} to {}", self.written, self.path.display())
        })?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn output_then_input_keeps_epochs() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested/events.jsonl");

        let mut out = JsonLinesOutput::<(String, u32)>::create(&path)?.with_epochs();
        out.write(10, ("a".into(), 1))?;
        out.write(25, ("b".into(), 2))?;
        out.close()?;

        let mut input = JsonLinesInput::<(String, u32)>::open(&path)?;
        let first = input.next()?.map(|t| (t.ts, t.value));
        assert_eq!(first, Some((10, ("a".to_string(), 1))));
        assert_eq!(input.next()?.map(|t| t.ts), Some(25));
        assert!(input.next()?.is_none());
        Ok(())
    }

    #[test]
    fn malformed_line_reports_position() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"ts\":1,\"value\":3}\n\nnot json\n")?;

        let mut input = JsonLinesInput::<u32>::open(&path)?;
        assert_eq!(input.next()?.map(|t| t.value), Some(3));
        let err = input.next().unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));
        Ok(())
    }
}
