//! brine-flat-compiler
//!
//! This crate implements:
//!  1) A tokenizer + parser for `.fbs` IDL files,
//!  2) A verifier for the rules a single file can decide (reserved names,
//!     enum ranges, id attributes, struct restrictions, etc.),
//!  3) A resolver that turns parsed files into a [brine_flat_schema::Schema],
//!     including files reached through `include`,
//!  4) `encode_binary_schema` / `decode_binary_schema` (the `BFBS` flat buffer),
//!  5) A JSON layout report (`compile_schema_to_json` → `String`),
//!  6) The error type (`FlatError`).

pub mod error;
pub mod types;
pub mod utils;
pub mod tokenizer;
pub mod parser;
pub mod verifier;
pub mod resolver;
pub mod compiler;
pub mod gen_json;

pub use compiler::compile_file;
pub use compiler::compile_schema;
pub use compiler::decode_binary_schema;
pub use compiler::encode_binary_schema;
pub use compiler::CompileOptions;
pub use compiler::BINARY_SCHEMA_IDENTIFIER;
pub use gen_json::compile_schema_to_json;
pub use error::FlatError;
