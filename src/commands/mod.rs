pub mod auth_commands;
pub mod diagnostic_commands;
pub mod playback_commands;

use crate::diagnostics::{LogEntry, LogLevel};
use crate::error::AppError;
use crate::events::UiEvent;
use serde::Serialize;
use std::fmt::Display;

/// Renders command results as text lines or as one JSON object per line.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Plain text; suppressed in JSON mode.
    pub fn line(&self, text: impl Display) {
        if !self.json {
            println!("{}", text);
        }
    }

    pub fn value<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) {
        if self.json {
            match serde_json::to_string(value) {
                Ok(json) => println!("{}", json),
                Err(e) => log::error!("Failed to serialize output: {}", e),
            }
        } else {
            println!("{}", text());
        }
    }

    pub fn ui(&self, event: &UiEvent) {
        self.value(event, || event.to_string());
    }

    pub fn entry(&self, entry: &LogEntry) {
        self.value(entry, || {
            let mark = match entry.level {
                LogLevel::Info => " ",
                LogLevel::Success => "+",
                LogLevel::Warning => "!",
                LogLevel::Error => "x",
            };
            format!(
                "{} {} {}",
                entry.at.with_timezone(&chrono::Local).format("%H:%M:%S"),
                mark,
                entry.message
            )
        });
    }

    pub fn error(&self, err: &AppError) {
        if self.json {
            match serde_json::to_string(err) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", err),
            }
        } else {
            eprintln!("Error: {}", err);
        }
    }
}
