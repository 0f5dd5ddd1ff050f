mod codebase_context;
mod duplicate_filter;
mod empty_filter;
mod line_anchor;

pub use codebase_context::CodebaseContextAnalyzer;
pub use duplicate_filter::DuplicateFilter;
pub use empty_filter::EmptyCommentFilter;
pub use line_anchor::LineSnapper;
