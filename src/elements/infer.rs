//! Pluggable inference stage. No tensor runtime is linked in (out of
//! scope); callers supply a `Detector` and the element does the pipeline
//! plumbing (pop, infer, attach candidates, push).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::element::{ElementContext, ElementImpl};
use crate::error::ErrorCode;
use crate::frame::{DetectionInfo, ObjectMetadata};

const PUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Produces raw (pre-NMS, pre-sigmoid) candidate detections for a frame.
/// A real deployment would wrap a tensor-runtime session here.
pub trait Detector: Send {
    fn infer(&self, item: &ObjectMetadata) -> Vec<DetectionInfo>;
}

/// Deterministic stand-in used when no real detector is wired up: derives
/// a single candidate box from the frame's own dimensions, scaled by
/// `frame_id` so successive frames differ without any randomness.
pub struct StubDetector;

impl Detector for StubDetector {
    fn infer(&self, item: &ObjectMetadata) -> Vec<DetectionInfo> {
        let Some(frame) = &item.frame else {
            return Vec::new();
        };
        let jitter = (frame.frame_id % 4) as f32 * 10.0;
        vec![DetectionInfo {
            bbox: crate::frame::BBox {
                x: jitter,
                y: jitter,
                w: (frame.width as f32 * 0.5).max(1.0),
                h: (frame.height as f32 * 0.5).max(1.0),
            },
            score: 2.0, // pre-sigmoid logit, postprocess squashes it
            class_id: 0,
            label: String::new(),
            label_name: String::new(),
        }]
    }
}

pub struct InferElement {
    detector: Box<dyn Detector>,
}

impl InferElement {
    pub fn new() -> Self {
        Self {
            detector: Box::new(StubDetector),
        }
    }

    pub fn with_detector(detector: Box<dyn Detector>) -> Self {
        Self { detector }
    }
}

impl Default for InferElement {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementImpl for InferElement {
    fn init_internal(&mut self, _configure: &Value) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn do_work(&mut self, ctx: &mut ElementContext) -> Result<(), ErrorCode> {
        let item = match ctx.pop_input(0) {
            Some(item) => item,
            None => return Ok(()),
        };

        if item.is_end_of_stream() {
            ctx.push_output(0, item, PUSH_TIMEOUT)?;
            return Ok(());
        }

        let candidates = self.detector.infer(&item);
        let mut item = (*item).clone();
        item.sub_objects = candidates
            .into_iter()
            .map(|detection| ObjectMetadata {
                detection_info: Some(detection),
                ..Default::default()
            })
            .collect();
        ctx.push_output(0, Arc::new(item), PUSH_TIMEOUT)?;
        Ok(())
    }
}
