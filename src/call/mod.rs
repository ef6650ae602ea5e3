//! LLM call extraction and execution

mod invoker;
mod parser;

pub use invoker::{Invoker, build_request};
pub use parser::{CALL_CLOSE, CALL_OPEN, ParsedCall, parse_call};
