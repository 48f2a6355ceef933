//! Tidemark Schema - Relationship Catalog & Dependency Resolution
//!
//! The write path needs to answer one question: when a table changes, which
//! tables' cached queries must stop being served? This crate holds the two
//! pieces that answer it:
//!
//! - [`SchemaCatalog`]: the statically declared tables and relationship
//!   edges, with reverse edges synthesized at build time.
//! - [`DependencyResolver`]: a single-pass resolution from a changed table
//!   to the set of tables whose versions should be bumped.
//!
//! The catalog is intentionally static. Invalidation correctness depends on
//! the edge set being complete, and a fixed declaration reviewed at startup
//! is easier to audit than runtime discovery.

pub mod catalog;
pub mod resolver;

pub use catalog::{SchemaCatalog, SchemaCatalogBuilder};
pub use resolver::DependencyResolver;
