//! Compile the Factorio API documentation's type prose into a JSON Schema for
//! `Data.raw`.
//!
//! Stages, leaf to root: [`grammar`] parses type expressions, [`extract`]
//! turns scraped pages into a [`Doc`], [`compile`] lowers a `Doc` to JSON
//! Schema.
pub mod compile;
pub mod extract;
pub mod grammar;
pub mod ir;
pub mod jq_exec;
pub mod path_de;

pub use compile::{CompileError, CompileOptions, CompiledSchema, SchemaError, compile, make_json_schema};
pub use extract::{Diagnostic, ExtractError, Extraction, RawDoc, extract};
pub use grammar::{KnownNames, ParseError};
pub use ir::{Doc, Property, Prototype, StructType, Type, TypeExpression};
