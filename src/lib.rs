//! # streamforge
//!
//! A configurable dataflow runtime for video/image analytics pipelines: a
//! JSON-described directed graph of processing stages (decode, resize,
//! infer, post-process, sink), each running on its own thread pool,
//! connected by bounded queues.
//!
//! ## Quick start
//!
//! ```rust
//! use streamforge::engine::Engine;
//! use streamforge::frame::{ControlOp, ObjectMetadata};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = Engine::new();
//! let graph_id = engine
//!     .add_graph(
//!         r#"{
//!           "graph_id": 1,
//!           "workers": [
//!             { "id": 1, "name": "source", "configure": { "channel_id": 1, "frame_count": 2 } },
//!             { "id": 2, "name": "report" }
//!           ],
//!           "connections": [
//!             { "src_id": 1, "src_port": 0, "dst_id": 2, "dst_port": 0 }
//!           ]
//!         }"#,
//!     )
//!     .unwrap();
//!
//! engine.start(graph_id).unwrap();
//! engine
//!     .send_data(
//!         graph_id,
//!         1,
//!         0,
//!         Arc::new(ObjectMetadata::control_command(ControlOp::Start)),
//!         Duration::from_millis(200),
//!     )
//!     .unwrap();
//! std::thread::sleep(Duration::from_millis(200));
//! engine.stop(graph_id).unwrap();
//! ```

pub mod config;
pub mod connector;
pub mod datapipe;
pub mod element;
pub mod elements;
pub mod engine;
pub mod error;
pub mod frame;
