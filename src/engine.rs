//! Owns graphs, the element-name registry, and start/stop ordering.
//!
//! Reverse-topological shutdown is grounded on
//! `dependency_graph.rs::DependencyGraph` (`petgraph::algo::toposort`),
//! reused here over the connection graph instead of a per-sample data
//! dependency graph.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::config::{ConnectionConfig, GraphConfig};
use crate::connector;
use crate::element::{Element, ElementImpl, ElementSpec, Item, SinkHandler};
use crate::error::ErrorCode;
use crate::elements::{FileSinkElement, InferElement, PostprocessElement, PreprocessElement, ReportElement, SourceElement};

type Factory = fn() -> Box<dyn ElementImpl>;

struct Graph {
    elements: HashMap<u32, Arc<Element>>,
    connections: Vec<ConnectionConfig>,
    /// Element ids in topological order (sources first).
    topo_order: Vec<u32>,
}

/// Per-pipe snapshot returned by `graph_stats`.
#[derive(Debug, Clone, Copy)]
pub struct PipeStats {
    pub element_id: u32,
    pub port: u32,
    pub len: usize,
    pub capacity: usize,
}

pub struct Engine {
    registry: Mutex<HashMap<&'static str, Factory>>,
    graphs: Mutex<HashMap<u32, Graph>>,
}

impl Engine {
    pub fn new() -> Self {
        let mut registry: HashMap<&'static str, Factory> = HashMap::new();
        registry.insert("source", || Box::new(SourceElement::new()));
        registry.insert("resize", || Box::new(PreprocessElement::new()));
        registry.insert("infer", || Box::new(InferElement::new()));
        registry.insert("nms_postprocess", || Box::new(PostprocessElement::new()));
        registry.insert("file_sink", || Box::new(FileSinkElement::new()));
        registry.insert("report", || Box::new(ReportElement::new()));
        Self {
            registry: Mutex::new(registry),
            graphs: Mutex::new(HashMap::new()),
        }
    }

    /// Register a caller-supplied element type under `name`, making it
    /// available to subsequent `add_graph` calls.
    pub fn register(&self, name: &'static str, factory: Factory) {
        self.registry.lock().unwrap().insert(name, factory);
    }

    /// Parse a graph JSON document, instantiate every worker, `init` it,
    /// and wire every connection. Fails atomically: a malformed document or
    /// unknown element name never leaves a partially built graph behind.
    pub fn add_graph(&self, json: &str) -> Result<u32, ErrorCode> {
        let config = GraphConfig::from_json_str(json).map_err(|_| ErrorCode::ParseConfigureFail)?;

        let registry = self.registry.lock().unwrap();
        let mut elements = HashMap::new();
        for worker in &config.workers {
            let factory = registry.get(worker.name.as_str()).ok_or(ErrorCode::ParseConfigureFail)?;
            let spec = ElementSpec {
                side: worker.side.clone(),
                device_id: worker.device_id,
                thread_number: worker.thread_number,
                milliseconds_timeout: worker.milliseconds_timeout,
                repeated_timeout: worker.repeated_timeout,
                is_sink: worker.is_sink,
            };
            let element = Element::with_spec(worker.id, worker.name.clone(), factory(), spec);
            element.init(&worker.configure)?;
            elements.insert(worker.id, element);
        }
        drop(registry);

        for connection in &config.connections {
            let src = elements.get(&connection.src_id).ok_or(ErrorCode::ParseConfigureFail)?;
            let dst = elements.get(&connection.dst_id).ok_or(ErrorCode::ParseConfigureFail)?;
            connector::connect(src, connection.src_port, dst, connection.dst_port, connection.capacity)?;
        }

        let topo_order = topological_order(&config)?;

        self.graphs.lock().unwrap().insert(
            config.graph_id,
            Graph {
                elements,
                connections: config.connections,
                topo_order,
            },
        );
        Ok(config.graph_id)
    }

    /// Attach a terminal callback at `element_id`'s `output_port`,
    /// bypassing DataPipe delivery entirely.
    pub fn set_data_handler(
        &self,
        graph_id: u32,
        element_id: u32,
        output_port: u32,
        handler: SinkHandler,
    ) -> Result<(), ErrorCode> {
        let graphs = self.graphs.lock().unwrap();
        let graph = graphs.get(&graph_id).ok_or(ErrorCode::ParseConfigureFail)?;
        let element = graph.elements.get(&element_id).ok_or(ErrorCode::NoSuchWorkerPort)?;
        element.set_sink_handler(output_port, handler);
        Ok(())
    }

    /// External injection of an item onto an element's input port, e.g. a
    /// source-control command.
    pub fn send_data(
        &self,
        graph_id: u32,
        element_id: u32,
        input_port: u32,
        item: Item,
        timeout: Duration,
    ) -> Result<(), ErrorCode> {
        let element = self.element(graph_id, element_id)?;
        element.push_input(input_port, item, timeout)
    }

    pub fn start(&self, graph_id: u32) -> Result<(), ErrorCode> {
        let graphs = self.graphs.lock().unwrap();
        let graph = graphs.get(&graph_id).ok_or(ErrorCode::ParseConfigureFail)?;
        for id in &graph.topo_order {
            graph.elements[id].start()?;
        }
        Ok(())
    }

    /// Signal every element in topological order (sources first, so EOS
    /// has somewhere to drain to), then join threads in reverse order so a
    /// downstream element finishes consuming before its producer's thread
    /// is confirmed gone.
    pub fn stop(&self, graph_id: u32) -> Result<(), ErrorCode> {
        let graphs = self.graphs.lock().unwrap();
        let graph = graphs.get(&graph_id).ok_or(ErrorCode::ParseConfigureFail)?;

        for id in &graph.topo_order {
            let _ = graph.elements[id].signal_stop();
        }
        for id in graph.topo_order.iter().rev() {
            graph.elements[id].join();
        }
        Ok(())
    }

    pub fn graph_stats(&self, graph_id: u32) -> Result<Vec<PipeStats>, ErrorCode> {
        let graphs = self.graphs.lock().unwrap();
        let graph = graphs.get(&graph_id).ok_or(ErrorCode::ParseConfigureFail)?;
        let mut stats = Vec::new();
        for connection in &graph.connections {
            if let Some(src) = graph.elements.get(&connection.src_id) {
                if let Some((len, capacity)) = src.output_pipe_stats(connection.src_port) {
                    stats.push(PipeStats {
                        element_id: connection.dst_id,
                        port: connection.dst_port,
                        len,
                        capacity,
                    });
                }
            }
        }
        Ok(stats)
    }

    fn element(&self, graph_id: u32, element_id: u32) -> Result<Arc<Element>, ErrorCode> {
        let graphs = self.graphs.lock().unwrap();
        let graph = graphs.get(&graph_id).ok_or(ErrorCode::ParseConfigureFail)?;
        graph
            .elements
            .get(&element_id)
            .cloned()
            .ok_or(ErrorCode::NoSuchWorkerPort)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Topological order over the connection graph (`src -> dst`), falling
/// back to ascending id order if a worker has no edges at all.
fn topological_order(config: &GraphConfig) -> Result<Vec<u32>, ErrorCode> {
    let mut graph = DiGraph::<u32, ()>::new();
    let mut index_of: HashMap<u32, NodeIndex> = HashMap::new();
    for worker in &config.workers {
        let idx = graph.add_node(worker.id);
        index_of.insert(worker.id, idx);
    }
    for connection in &config.connections {
        if let (Some(&src), Some(&dst)) = (index_of.get(&connection.src_id), index_of.get(&connection.dst_id)) {
            graph.add_edge(src, dst, ());
        }
    }
    let order = toposort(&graph, None).map_err(|_| ErrorCode::ParseConfigureFail)?;
    Ok(order.into_iter().map(|idx| graph[idx]).collect())
}
