use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::generation::{FailureKind, Operation, Strategy};

/// Lifecycle of one generation request, as recorded in the event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    GenerationStarted {
        template_title: String,
        has_user_image: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_image_format: Option<String>,
        size: String,
    },
    StrategySelected {
        strategy: Strategy,
        resolved_template_title: String,
        template_source: String,
        has_template_image: bool,
    },
    GenerationFinished {
        strategy: Strategy,
        operation: Operation,
        provider_model: String,
        image_format: String,
        size_bytes: usize,
    },
    GenerationFailed {
        kind: FailureKind,
        error: String,
    },
}

#[derive(Serialize)]
struct EventLine<'a> {
    request_id: &'a str,
    ts: String,
    #[serde(flatten)]
    event: &'a GenerationEvent,
}

/// Append-only JSONL sink shared by every request of a process. Writes go
/// through a [`RequestEvents`] handle bound to one request id.
#[derive(Debug, Clone)]
pub struct EventLog {
    sink: Arc<EventSink>,
}

#[derive(Debug)]
struct EventSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            sink: Arc::new(EventSink {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.sink.path
    }

    pub fn for_request(&self, request_id: impl Into<String>) -> RequestEvents {
        RequestEvents {
            sink: Arc::clone(&self.sink),
            request_id: request_id.into(),
        }
    }
}

/// Event writer for a single request. Every line it writes carries the bound
/// `request_id` and a `ts` next to the event's own fields.
#[derive(Debug, Clone)]
pub struct RequestEvents {
    sink: Arc<EventSink>,
    request_id: String,
}

impl RequestEvents {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn path(&self) -> &Path {
        &self.sink.path
    }

    pub fn emit(&self, event: &GenerationEvent) -> anyhow::Result<Value> {
        let line = serde_json::to_value(EventLine {
            request_id: &self.request_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            event,
        })?;
        self.sink.write_line(&line)?;
        Ok(line)
    }
}

impl EventSink {
    fn write_line(&self, line: &Value) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        let mut encoded = serde_json::to_vec(line)?;
        encoded.push(b'\n');

        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&encoded))
            .with_context(|| format!("failed appending to {}", self.path.display()))
    }
}
