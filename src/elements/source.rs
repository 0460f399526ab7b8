//! Synthetic frame generator standing in for a real decoder.
//!
//! Grounded on `original_source/element/multimedia/decode/src/decoder.cc`:
//! a `grab(frame_id, eof)` loop that stamps each frame with its channel and
//! sets `end_of_stream` on the last one. No codec is linked in (decoding a
//! real stream is out of scope) — frames are produced directly.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::element::{ElementContext, ElementImpl};
use crate::error::ErrorCode;
use crate::frame::{ControlOp, Frame, ObjectMetadata, PixelFormat};

const PUSH_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
struct SourceConfigure {
    #[serde(default)]
    channel_id: i64,
    #[serde(default = "default_frame_count")]
    frame_count: u64,
    #[serde(default = "default_dim")]
    width: u32,
    #[serde(default = "default_dim")]
    height: u32,
}

fn default_frame_count() -> u64 {
    5
}

fn default_dim() -> u32 {
    640
}

impl Default for SourceConfigure {
    fn default() -> Self {
        Self {
            channel_id: 0,
            frame_count: default_frame_count(),
            width: default_dim(),
            height: default_dim(),
        }
    }
}

/// A source worker: on a `ControlOp::Start` command it emits `frame_count`
/// synthetic frames for its channel, the last one flagged `end_of_stream`,
/// then goes idle until the next command. A `ControlOp::Stop` (or any item
/// with no control op) is a no-op.
pub struct SourceElement {
    configure: SourceConfigure,
    next_frame_id: u64,
}

impl SourceElement {
    pub fn new() -> Self {
        Self {
            configure: SourceConfigure::default(),
            next_frame_id: 0,
        }
    }
}

impl Default for SourceElement {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementImpl for SourceElement {
    fn init_internal(&mut self, configure: &Value) -> Result<(), ErrorCode> {
        if configure.is_null() {
            return Ok(());
        }
        self.configure =
            serde_json::from_value(configure.clone()).map_err(|_| ErrorCode::ParseConfigureFail)?;
        Ok(())
    }

    fn do_work(&mut self, ctx: &mut ElementContext) -> Result<(), ErrorCode> {
        let Some(command) = ctx.pop_input(0) else {
            return Ok(());
        };
        // `Stop` (or a command with no op at all) leaves the source idle;
        // going idle mid-burst beyond that would belong to a real
        // capture-device integration (out of scope here).
        if command.control != Some(ControlOp::Start) {
            return Ok(());
        }

        for i in 0..self.configure.frame_count {
            let frame_id = self.next_frame_id;
            self.next_frame_id += 1;
            let is_last = i + 1 == self.configure.frame_count;

            let frame = Frame {
                channel_id: self.configure.channel_id,
                frame_id,
                width: self.configure.width,
                height: self.configure.height,
                format: PixelFormat::Bgr,
                device_handle: 0,
                image_ref: Vec::new(),
                end_of_stream: is_last,
            };
            let item = std::sync::Arc::new(ObjectMetadata::from_frame(frame));
            ctx.push_output(0, item, PUSH_TIMEOUT)?;
        }
        Ok(())
    }
}
