//! Box decode + non-max suppression.
//!
//! Grounded on `original_source/algorithm/src/post_process/Yolov5Post.cpp`:
//! raw candidate scores are logits until `sigmoid` is applied, then
//! per-class greedy NMS keeps the highest-scoring box and discards any
//! later candidate whose IoU with it exceeds the threshold.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::element::{ElementContext, ElementImpl};
use crate::error::ErrorCode;
use crate::frame::{DetectionInfo, ObjectMetadata};

const PUSH_TIMEOUT: Duration = Duration::from_millis(500);

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Greedy per-class IoU suppression: candidates are consumed
/// highest-score-first, and any remaining candidate within
/// `iou_threshold` of an already-kept box of the same class is dropped.
pub fn nms(candidates: &mut [DetectionInfo], iou_threshold: f32) -> Vec<DetectionInfo> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .score
            .partial_cmp(&candidates[a].score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<DetectionInfo> = Vec::new();
    'candidates: for idx in order {
        let candidate = &candidates[idx];
        for k in &kept {
            if k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold {
                continue 'candidates;
            }
        }
        kept.push(candidate.clone());
    }
    kept
}

#[derive(Debug, Clone, Deserialize)]
struct PostprocessConfigure {
    #[serde(default = "default_score_threshold")]
    score_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    iou_threshold: f32,
}

fn default_score_threshold() -> f32 {
    0.5
}

fn default_iou_threshold() -> f32 {
    0.45
}

impl Default for PostprocessConfigure {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            iou_threshold: default_iou_threshold(),
        }
    }
}

pub struct PostprocessElement {
    configure: PostprocessConfigure,
}

impl PostprocessElement {
    pub fn new() -> Self {
        Self {
            configure: PostprocessConfigure::default(),
        }
    }
}

impl Default for PostprocessElement {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementImpl for PostprocessElement {
    fn init_internal(&mut self, configure: &Value) -> Result<(), ErrorCode> {
        if configure.is_null() {
            return Ok(());
        }
        self.configure =
            serde_json::from_value(configure.clone()).map_err(|_| ErrorCode::ParseConfigureFail)?;
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

        let mut item = (*item).clone();
        let mut candidates: Vec<DetectionInfo> = item
            .sub_objects
            .iter()
            .filter_map(|sub| sub.detection_info.clone())
            .collect();
        for candidate in &mut candidates {
            candidate.score = sigmoid(candidate.score);
        }
        candidates.retain(|c| c.score >= self.configure.score_threshold);

        let kept = nms(&mut candidates, self.configure.iou_threshold);
        item.sub_objects = kept
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
