//! The per-frame work unit that flows through the graph.
//!
//! `ObjectMetadata` is created by a source element, shared (`Arc`) as it
//! traverses the graph, and dropped after the terminal sink returns. See
//! SPEC_FULL.md §3 for the invariants: frame_id is non-decreasing per
//! channel_id, and once `end_of_stream` is set nothing further is dispatched
//! for that channel.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ErrorCode;

/// Channel identifier — one physical/logical video stream.
pub type ChannelId = i64;

/// Control operation carried in-band on an item injected via
/// `Engine::send_data` (SPEC_FULL.md §6): `Start` tells a source to begin
/// producing frames for its configured channel, `Stop` tells it to go idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlOp {
    Start,
    Stop,
}

/// Opaque, core-never-interprets-it tensor handle attached by infer/preprocess
/// stages. Real deployments would wrap a device buffer or tensor-runtime
/// handle here; the core only moves it around.
#[derive(Debug, Clone, Default)]
pub struct TensorHandle {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

/// Pixel format, opaque beyond what preprocessing needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgr,
    Rgb,
    Nv12,
    Gray,
}

/// A decoded image attached to an `ObjectMetadata`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub channel_id: ChannelId,
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Opaque device handle (e.g. accelerator memory handle); core never
    /// dereferences this, only plumbs it through.
    pub device_handle: i64,
    /// Raw image bytes when processing on host ("side": "cpu"); empty when
    /// the data lives behind `device_handle` on an accelerator.
    pub image_ref: Vec<u8>,
    pub end_of_stream: bool,
}

/// An encoded byte buffer (e.g. for an encode/sink stage).
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub data: Vec<u8>,
    pub size: usize,
    pub end_of_stream: bool,
}

/// A bounding box in pixel coordinates of the frame it was detected on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn area(&self) -> f32 {
        (self.w.max(0.0)) * (self.h.max(0.0))
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &BBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.w).min(other.x + other.w);
        let bottom = (self.y + self.h).min(other.y + other.h);
        let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - overlap;
        if union <= 0.0 {
            0.0
        } else {
            overlap / union
        }
    }
}

/// A single detection result attached by a post-process stage.
#[derive(Debug, Clone, Default)]
pub struct DetectionInfo {
    pub bbox: BBox,
    pub score: f32,
    pub class_id: i32,
    pub label: String,
    pub label_name: String,
}

/// The per-frame work unit. Created by a source element, mutated in place
/// as it is pulled through each element's `do_work`, and handed to a sink.
///
/// `sub_objects` holds detections cropped out for a secondary stage (e.g. a
/// detector feeding an OCR stage); by design these do not themselves carry
/// further `sub_objects` (depth-1 only, SPEC_FULL §3).
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    pub frame: Option<Frame>,
    pub packet: Option<Packet>,
    pub input_tensors: HashMap<String, TensorHandle>,
    pub output_tensors: HashMap<String, TensorHandle>,
    pub sub_objects: Vec<ObjectMetadata>,
    pub detection_info: Option<DetectionInfo>,
    pub resize_vector: Vec<i64>,
    pub error_code: Option<ErrorCode>,
    /// Set on a command item injected via `Engine::send_data` rather than
    /// produced by a source; absent on ordinary frame-carrying items.
    pub control: Option<ControlOp>,
}

impl ObjectMetadata {
    /// Construct a plain frame-carrying item.
    pub fn from_frame(frame: Frame) -> Self {
        Self {
            frame: Some(frame),
            ..Default::default()
        }
    }

    /// Construct a bare control-command item, e.g. to start or stop a
    /// source element.
    pub fn control_command(op: ControlOp) -> Self {
        Self {
            control: Some(op),
            ..Default::default()
        }
    }

    /// Channel this item belongs to, if it carries a frame or packet.
    pub fn channel_id(&self) -> Option<ChannelId> {
        if let Some(f) = &self.frame {
            Some(f.channel_id)
        } else {
            None
        }
    }

    /// Whether any carrier on this item is flagged end-of-stream.
    pub fn is_end_of_stream(&self) -> bool {
        self.frame.as_ref().map(|f| f.end_of_stream).unwrap_or(false)
            || self.packet.as_ref().map(|p| p.end_of_stream).unwrap_or(false)
    }

    /// Attach a terminal error code to this item so a downstream sink can
    /// observe the failure instead of the item silently vanishing.
    pub fn mark_error(&mut self, code: ErrorCode) {
        self.error_code = Some(code);
    }
}
