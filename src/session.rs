//! Training session log
//!
//! Append-only record of what the trainee did and how the plant responded:
//! control actions and step moves, rising alarms, and a compact plant
//! snapshot every simulated second.

use std::fmt::Display;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::plant::ProcessVariables;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogEvent {
    Action { target: String, value: String },
    Snapshot { process: ProcessVariables, active_step: Option<String> },
    Alarm { alarm: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: f64,  // Simulation time [s]
    #[serde(flatten)]
    pub event: LogEvent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionLog {
    entries: Vec<LogEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, time: f64, event: LogEvent) {
        self.entries.push(LogEntry { time, event });
    }

    pub fn action(&mut self, time: f64, target: &str, value: impl Display) {
        self.record(
            time,
            LogEvent::Action {
                target: target.to_string(),
                value: value.to_string(),
            },
        );
    }

    pub fn alarm(&mut self, time: f64, alarm: &str) {
        self.record(time, LogEvent::Alarm { alarm: alarm.to_string() });
    }

    pub fn snapshot(&mut self, time: f64, process: ProcessVariables, active_step: Option<String>) {
        self.record(time, LogEvent::Snapshot { process, active_step });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }

    pub fn export(&self, path: &Path) -> Result<(), LoadError> {
        let json = self.to_json().map_err(|e| LoadError::json(path, e))?;
        fs::write(path, json).map_err(|e| LoadError::io(path, e))
    }
}
