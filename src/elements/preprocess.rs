//! Resize/normalize stage.
//!
//! The `resize_vector` bookkeeping is grounded on
//! `original_source`'s PPOCR detection pre-process file: remember the
//! resize ratio (as integer-scaled dims) so a later stage can map box
//! coordinates back to the original frame.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::element::{ElementContext, ElementImpl};
use crate::error::ErrorCode;

const PUSH_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
struct PreprocessConfigure {
    #[serde(default = "default_dim")]
    target_width: u32,
    #[serde(default = "default_dim")]
    target_height: u32,
}

fn default_dim() -> u32 {
    224
}

impl Default for PreprocessConfigure {
    fn default() -> Self {
        Self {
            target_width: default_dim(),
            target_height: default_dim(),
        }
    }
}

pub struct PreprocessElement {
    configure: PreprocessConfigure,
}

impl PreprocessElement {
    pub fn new() -> Self {
        Self {
            configure: PreprocessConfigure::default(),
        }
    }
}

impl Default for PreprocessElement {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementImpl for PreprocessElement {
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
        if let Some(frame) = &item.frame {
            item.resize_vector = vec![
                frame.width as i64,
                frame.height as i64,
                self.configure.target_width as i64,
                self.configure.target_height as i64,
            ];
        }
        ctx.push_output(0, std::sync::Arc::new(item), PUSH_TIMEOUT)?;
        Ok(())
    }
}
