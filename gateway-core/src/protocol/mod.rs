//! Anthropic <-> OpenAI protocol translation (§4.8, §4.8.1).

pub mod anthropic;
pub mod openai;
pub mod schema;
pub mod stream_translate;
pub mod translate;

pub use schema::rewrite_schema;
pub use stream_translate::StreamTranslator;
pub use translate::{anthropic_to_openai_request, openai_to_anthropic_response};
