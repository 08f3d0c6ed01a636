//! Background readers for a plugin's standard output and standard error.
//!
//! The first line the plugin writes to standard output is its handshake and
//! is delivered over a channel; anything written afterwards is drained and
//! logged at debug level so the pipe never fills. Standard error is relayed
//! through `tracing`: lines that parse as `tracing-subscriber` JSON records
//! keep their level, everything else is logged at debug.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use serde::Deserialize;
use tracing::{debug, error, info, trace, warn};

/// Tracing target for output relayed from plugin processes.
const PLUGIN_LOG_TARGET: &str = "hive_plugins::plugin";

/// Outcome of reading the first line of a plugin's standard output.
pub(super) type FirstLine = io::Result<Option<String>>;

/// Reads the handshake line on a background thread and keeps draining.
pub(super) fn spawn_stdout_reader(
    name: &str,
    stdout: impl Read + Send + 'static,
) -> Receiver<FirstLine> {
    let (sender, receiver) = mpsc::channel();
    let plugin = name.to_owned();
    thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        let mut first = String::new();
        match reader.read_line(&mut first) {
            Ok(0) => {
                drop(sender.send(Ok(None)));
                return;
            }
            Ok(_) => drop(sender.send(Ok(Some(first)))),
            Err(error) => {
                drop(sender.send(Err(error)));
                return;
            }
        }
        for line in reader.lines() {
            match line {
                Ok(line) => debug!(target: PLUGIN_LOG_TARGET, plugin = %plugin, stdout = %line),
                Err(_) => break,
            }
        }
    });
    receiver
}

/// Relays a plugin's standard error through `tracing` until EOF.
pub(super) fn spawn_stderr_relay(name: &str, stderr: impl Read + Send + 'static) {
    let plugin = name.to_owned();
    thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            match line {
                Ok(line) => relay_line(&plugin, &line),
                Err(_) => break,
            }
        }
    });
}

#[derive(Debug, Deserialize)]
struct PluginLogRecord {
    level: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    fields: Option<PluginLogFields>,
}

#[derive(Debug, Deserialize)]
struct PluginLogFields {
    #[serde(default)]
    message: Option<String>,
}

impl PluginLogRecord {
    fn message(&self) -> &str {
        self.message
            .as_deref()
            .or_else(|| self.fields.as_ref().and_then(|fields| fields.message.as_deref()))
            .unwrap_or_default()
    }
}

/// Logs one line of plugin standard error at the level it was written with.
pub(super) fn relay_line(plugin: &str, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    let Ok(record) = serde_json::from_str::<PluginLogRecord>(trimmed) else {
        debug!(target: PLUGIN_LOG_TARGET, plugin, stderr = %trimmed);
        return;
    };
    let origin = record.target.as_deref().unwrap_or_default();
    let message = record.message();
    match record.level.to_ascii_lowercase().as_str() {
        "error" => error!(target: PLUGIN_LOG_TARGET, plugin, origin, "{message}"),
        "warn" => warn!(target: PLUGIN_LOG_TARGET, plugin, origin, "{message}"),
        "info" => info!(target: PLUGIN_LOG_TARGET, plugin, origin, "{message}"),
        "trace" => trace!(target: PLUGIN_LOG_TARGET, plugin, origin, "{message}"),
        _ => debug!(target: PLUGIN_LOG_TARGET, plugin, origin, "{message}"),
    }
}

/// Parses the level of a JSON log record, if the line is one.
#[cfg(test)]
pub(super) fn record_level(line: &str) -> Option<String> {
    serde_json::from_str::<PluginLogRecord>(line.trim())
        .ok()
        .map(|record| record.level.to_ascii_lowercase())
}

/// Parses the message of a JSON log record, if the line is one.
#[cfg(test)]
pub(super) fn record_message(line: &str) -> Option<String> {
    serde_json::from_str::<PluginLogRecord>(line.trim())
        .ok()
        .map(|record| record.message().to_owned())
}
