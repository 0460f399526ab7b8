//! Built-in element implementations. Each is an independent `ElementImpl`
//! behind the name-keyed registry in `engine::Engine::new`; the core only
//! ever reaches them through that trait object.

pub mod infer;
pub mod postprocess;
pub mod preprocess;
pub mod report;
pub mod sink;
pub mod source;

pub use infer::InferElement;
pub use postprocess::PostprocessElement;
pub use preprocess::PreprocessElement;
pub use report::ReportElement;
pub use sink::FileSinkElement;
pub use source::SourceElement;
