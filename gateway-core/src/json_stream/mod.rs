//! Incremental JSON parsing for streamed tool-call arguments (§4.7).

pub mod parser;
pub mod value;

pub use parser::{FeedResult, StreamingJsonParser, ToolInfo};
pub use value::JsonValue;
