pub mod builtin;
pub mod plugin;
pub mod post_processor;
pub mod pre_analyzer;

pub use plugin::PluginManager;
pub use post_processor::PostProcessor;
pub use pre_analyzer::{PreAnalyzer, ReviewTarget};
