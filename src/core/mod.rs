pub mod comment;
pub mod context;
pub mod diff_parser;
pub mod draft;
pub mod line_map;
pub mod listing;
pub mod posting;
pub mod prompt;
pub mod reviewer;
pub mod threads;

pub use context::LLMContextChunk;
pub use diff_parser::DiffParser;
pub use line_map::DiffLineMap;
