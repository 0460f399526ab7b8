//! Typed view of the graph JSON document (SPEC_FULL.md §6). Unknown fields
//! are ignored; `configure` stays an opaque `serde_json::Value` the core
//! never interprets, only forwards to `ElementImpl::init_internal`.

use serde::Deserialize;
use serde_json::Value;

use crate::connector::DEFAULT_CONNECTION_CAPACITY;
use crate::frame::{ControlOp, ObjectMetadata};

fn default_thread_number() -> usize {
    1
}

fn default_configure() -> Value {
    Value::Null
}

fn default_capacity() -> usize {
    DEFAULT_CONNECTION_CAPACITY
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub id: u32,
    pub name: String,
    #[serde(default = "default_side")]
    pub side: String,
    #[serde(default)]
    pub device_id: i32,
    #[serde(default = "default_thread_number")]
    pub thread_number: usize,
    #[serde(default)]
    pub milliseconds_timeout: u64,
    #[serde(default)]
    pub repeated_timeout: bool,
    #[serde(default)]
    pub is_sink: bool,
    #[serde(default = "default_configure")]
    pub configure: Value,
}

fn default_side() -> String {
    "cpu".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ConnectionConfig {
    pub src_id: u32,
    pub src_port: u32,
    pub dst_id: u32,
    pub dst_port: u32,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub graph_id: u32,
    pub workers: Vec<WorkerConfig>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl GraphConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// JSON command a caller sends to start or stop a source element (SPEC_FULL
/// §6). `url`/`source_type`/`timeout`/`resize_rate` describe a real capture
/// device; the core forwards them nowhere (decoding a live stream is out of
/// scope) — only `op` is consumed, via `ObjectMetadata::control_command`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceCommand {
    pub channel_id: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub resize_rate: f32,
    pub op: ControlOp,
}

impl From<SourceCommand> for ObjectMetadata {
    fn from(command: SourceCommand) -> Self {
        ObjectMetadata::control_command(command.op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_graph() {
        let json = r#"
        {
          "graph_id": 1,
          "workers": [
            { "id": 1, "name": "source" },
            { "id": 2, "name": "file_sink", "is_sink": true }
          ],
          "connections": [
            { "src_id": 1, "src_port": 0, "dst_id": 2, "dst_port": 0 }
          ]
        }"#;
        let config = GraphConfig::from_json_str(json).unwrap();
        assert_eq!(config.graph_id, 1);
        assert_eq!(config.workers.len(), 2);
        assert_eq!(config.workers[0].thread_number, 1);
        assert_eq!(config.workers[0].side, "cpu");
        assert!(!config.workers[0].is_sink);
        assert!(config.workers[1].is_sink);
        assert_eq!(config.connections[0].capacity, DEFAULT_CONNECTION_CAPACITY);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"
        {
          "graph_id": 1,
          "workers": [{ "id": 1, "name": "source", "codec": "h264" }],
          "connections": []
        }"#;
        assert!(GraphConfig::from_json_str(json).is_ok());
    }

    #[test]
    fn malformed_document_fails_to_parse() {
        let json = r#"{ "graph_id": 1, "workers": "oops" }"#;
        assert!(GraphConfig::from_json_str(json).is_err());
    }

    #[test]
    fn source_command_parses_op() {
        let json = r#"{ "channel_id": 3, "url": "rtsp://x", "op": "start" }"#;
        let cmd: SourceCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.op, ControlOp::Start);
        assert_eq!(cmd.channel_id, 3);
    }

    #[test]
    fn source_command_converts_to_control_item() {
        let json = r#"{ "channel_id": 3, "op": "stop" }"#;
        let cmd: SourceCommand = serde_json::from_str(json).unwrap();
        let item: ObjectMetadata = cmd.into();
        assert_eq!(item.control, Some(ControlOp::Stop));
    }
}
