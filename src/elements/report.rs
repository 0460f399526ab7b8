//! Terminal accounting sink: counts items per channel and records which
//! channels have reached end-of-stream, without writing anything out.
//! Useful as a graph's final stage in tests that assert delivery counts
//! and EOS propagation (invariant checks in SPEC_FULL.md §8).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::element::{ElementContext, ElementImpl};
use crate::error::ErrorCode;
use crate::frame::ChannelId;

#[derive(Debug, Default)]
pub struct ReportState {
    pub counts: HashMap<ChannelId, u64>,
    pub finished: HashSet<ChannelId>,
}

impl ReportState {
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_channel_done(&self, channel_id: ChannelId) -> bool {
        self.finished.contains(&channel_id)
    }
}

pub struct ReportElement {
    state: Arc<Mutex<ReportState>>,
}

impl ReportElement {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ReportState::default())),
        }
    }

    /// Shared handle callers keep before handing the element off to the
    /// engine, so counts can be inspected after the graph stops.
    pub fn state(&self) -> Arc<Mutex<ReportState>> {
        self.state.clone()
    }
}

impl Default for ReportElement {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementImpl for ReportElement {
    fn init_internal(&mut self, _configure: &Value) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn do_work(&mut self, ctx: &mut ElementContext) -> Result<(), ErrorCode> {
        let item = match ctx.pop_input(0) {
            Some(item) => item,
            None => return Ok(()),
        };

        let Some(channel_id) = item.channel_id() else {
            return Ok(());
        };

        let mut state = self.state.lock().unwrap();
        *state.counts.entry(channel_id).or_insert(0) += 1;
        if item.is_end_of_stream() {
            state.finished.insert(channel_id);
        }
        Ok(())
    }
}
