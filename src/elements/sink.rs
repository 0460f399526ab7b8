//! Terminal file/packet sink. Writes `Packet` bytes to a file, tracking
//! end-of-stream per channel so a multi-channel graph knows when every
//! channel feeding this sink has finished.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::element::{ElementContext, ElementImpl};
use crate::error::ErrorCode;
use crate::frame::ChannelId;

#[derive(Debug, Clone, Deserialize, Default)]
struct FileSinkConfigure {
    path: Option<PathBuf>,
}

pub struct FileSinkElement {
    configure: FileSinkConfigure,
    file: Option<File>,
    finished_channels: HashSet<ChannelId>,
}

impl FileSinkElement {
    pub fn new() -> Self {
        Self {
            configure: FileSinkConfigure::default(),
            file: None,
            finished_channels: HashSet::new(),
        }
    }

    /// Channels that have delivered their end-of-stream item.
    pub fn finished_channels(&self) -> &HashSet<ChannelId> {
        &self.finished_channels
    }
}

impl Default for FileSinkElement {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementImpl for FileSinkElement {
    fn init_internal(&mut self, configure: &Value) -> Result<(), ErrorCode> {
        if !configure.is_null() {
            self.configure = serde_json::from_value(configure.clone())
                .map_err(|_| ErrorCode::ParseConfigureFail)?;
        }
        if let Some(path) = &self.configure.path {
            self.file = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|_| ErrorCode::ParseConfigureFail)?,
            );
        }
        Ok(())
    }

    fn uninit_internal(&mut self) {
        self.file = None;
    }

    fn do_work(&mut self, ctx: &mut ElementContext) -> Result<(), ErrorCode> {
        let item = match ctx.pop_input(0) {
            Some(item) => item,
            None => return Ok(()),
        };

        if let Some(packet) = &item.packet {
            if let Some(file) = &mut self.file {
                let _ = file.write_all(&packet.data);
            }
        }

        if item.is_end_of_stream() {
            if let Some(channel_id) = item.channel_id() {
                self.finished_channels.insert(channel_id);
                tracing::info!(element_id = ctx.element_id(), channel_id, "channel drained");
            }
        }
        Ok(())
    }
}
