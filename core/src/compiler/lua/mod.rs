//! Lua output: syntax tree and printer

pub mod ast;
pub mod emit;

pub use emit::{emit_chunk, EmittedLua, Mapping};
