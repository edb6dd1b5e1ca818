//! Progress and log output.
//!
//! A [`LogSink`] is created once per run and handed by reference to every
//! stage and component hook. Info lines go to stdout, warnings and errors to
//! stderr, and everything is appended to the log file when one is attached.
//! The iteration table collects one row of named cells per optimizer
//! iteration; components add their own columns (for example `ExactMetric0`).

use crate::trace::{trace_error, trace_event, trace_warn};
use crate::util::{MultiRegError, MultiRegResult};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Severity of a log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Ordered table of named columns filled once per iteration.
#[derive(Debug, Default)]
pub struct IterationTable {
    columns: Vec<String>,
    cells: BTreeMap<String, String>,
}

impl IterationTable {
    /// Appends a column if it is not present yet.
    pub fn add_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }

    /// Removes a column and any pending cell value for it.
    pub fn remove_column(&mut self, name: &str) {
        self.columns.retain(|c| c != name);
        self.cells.remove(name);
    }

    /// Returns true if the column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Returns the column names in display order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Sets the pending value of a cell. Unknown columns are ignored.
    pub fn set(&mut self, column: &str, value: impl Display) {
        if self.has_column(column) {
            self.cells.insert(column.to_string(), value.to_string());
        }
    }

    /// Returns the pending value of a cell.
    pub fn cell(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// Tab-separated header line.
    pub fn header(&self) -> String {
        self.columns.join("\t")
    }

    /// Formats the pending row and clears it.
    pub fn take_row(&mut self) -> String {
        let row = self
            .columns
            .iter()
            .map(|c| self.cells.get(c).map(String::as_str).unwrap_or("-"))
            .collect::<Vec<_>>()
            .join("\t");
        self.cells.clear();
        row
    }
}

/// Explicit log and progress sink shared by all stages of a run.
pub struct LogSink {
    file: Mutex<Option<File>>,
    path: Option<PathBuf>,
    echo: bool,
    captured: Option<Mutex<Vec<(LogLevel, String)>>>,
    iteration: Mutex<IterationTable>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LogSink {
    /// Opens (appending or creating) a log file and echoes to the console.
    pub fn open(path: &Path) -> MultiRegResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| MultiRegError::io(path, err))?;
        Ok(Self {
            file: Mutex::new(Some(file)),
            path: Some(path.to_path_buf()),
            echo: true,
            captured: None,
            iteration: Mutex::new(IterationTable::default()),
        })
    }

    /// A sink without a log file that only writes to the console.
    pub fn console() -> Self {
        Self {
            file: Mutex::new(None),
            path: None,
            echo: true,
            captured: None,
            iteration: Mutex::new(IterationTable::default()),
        }
    }

    /// A silent sink that keeps every line in memory.
    pub fn in_memory() -> Self {
        Self {
            file: Mutex::new(None),
            path: None,
            echo: false,
            captured: Some(Mutex::new(Vec::new())),
            iteration: Mutex::new(IterationTable::default()),
        }
    }

    /// Disables console echo; the log file (if any) still receives lines.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Keeps a copy of every line in memory in addition to other outputs.
    pub fn capturing(mut self) -> Self {
        self.captured = Some(Mutex::new(Vec::new()));
        self
    }

    /// Path of the attached log file.
    pub fn log_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Error, message.as_ref());
    }

    /// Locks the iteration table for column edits.
    pub fn iteration(&self) -> MutexGuard<'_, IterationTable> {
        lock(&self.iteration)
    }

    /// Writes the iteration table header.
    pub fn write_iteration_header(&self) {
        let header = self.iteration().header();
        self.info(header);
    }

    /// Writes and clears the pending iteration row.
    pub fn write_iteration_row(&self) {
        let row = self.iteration().take_row();
        self.info(row);
    }

    /// Returns captured lines of the given level.
    pub fn lines(&self, level: LogLevel) -> Vec<String> {
        match &self.captured {
            Some(captured) => lock(captured)
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, line)| line.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    fn write(&self, level: LogLevel, message: &str) {
        let line = match level {
            LogLevel::Info => message.to_string(),
            LogLevel::Warning => format!("WARNING: {message}"),
            LogLevel::Error => format!("ERROR: {message}"),
        };
        if self.echo {
            match level {
                LogLevel::Info => println!("{line}"),
                _ => eprintln!("{line}"),
            }
        }
        if let Some(file) = lock(&self.file).as_mut() {
            // A failing log write must not abort the registration.
            let _ = writeln!(file, "{line}");
        }
        if let Some(captured) = &self.captured {
            lock(captured).push((level, message.to_string()));
        }
        match level {
            LogLevel::Info => {
                trace_event!("log", line = message);
            }
            LogLevel::Warning => {
                trace_warn!("log", line = message);
            }
            LogLevel::Error => {
                trace_error!("log", line = message);
            }
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("path", &self.path)
            .field("echo", &self.echo)
            .finish()
    }
}
