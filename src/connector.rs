//! Wires one element's output port to another's input port.
//!
//! Grounded on `dataflow_graph.rs::DataflowGraph::new`'s channel-table
//! construction and on the original `element.cc::Element::connect`: the
//! downstream element owns the pipe (`Arc`), the upstream element only
//! holds a `Weak` reference to it.

use std::sync::Arc;

use crate::element::{Element, DEFAULT_PIPE_CAPACITY};
use crate::error::ErrorCode;

/// Wire `src.output[src_port] -> dst.input[dst_port]`.
///
/// Creates the pipe on `dst` if this is its first connection at
/// `dst_port`, with `dst`'s notify handler bound as its push-handler.
/// Rejected once either endpoint has left `Stop` (wiring happens before
/// `start` and is not re-entrant).
pub fn connect(
    src: &Arc<Element>,
    src_port: u32,
    dst: &Arc<Element>,
    dst_port: u32,
    capacity: usize,
) -> Result<(), ErrorCode> {
    use crate::element::ThreadStatus;

    if src.status() != ThreadStatus::Stop || dst.status() != ThreadStatus::Stop {
        return Err(ErrorCode::ThreadStatusError);
    }

    let pipe = dst.input_pipe_for_connection(dst_port, capacity.max(1));
    src.set_output_pipe(src_port, Arc::downgrade(&pipe));
    Ok(())
}

/// Capacity used when a connection entry in the graph JSON omits it.
pub const DEFAULT_CONNECTION_CAPACITY: usize = DEFAULT_PIPE_CAPACITY;
