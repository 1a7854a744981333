//! `schema` crate — the schema-validation boundary.
//!
//! The runtime never implements JSON Schema itself. It validates through a
//! [`SchemaValidator`] held by a [`ValidationContext`], which is compiled once
//! per scenario version (the only async, I/O-bound step) and then used
//! synchronously.

pub mod context;
pub mod error;
pub mod fetch;
pub mod mock;
pub mod validator;

pub use context::ValidationContext;
pub use error::SchemaError;
pub use fetch::{DirectoryFetcher, NoFetch, SchemaFetcher};
pub use validator::{JsonSchemaValidator, SchemaValidator};
