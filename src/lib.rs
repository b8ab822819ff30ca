//! navexpand - navigation expansion for entity queries
//!
//! This crate rewrites relationship traversals in query operator trees into
//! explicit joins:
//! - Entity models with typed relationships loaded from YAML
//! - Query operator trees with lambda arguments, read from JSON
//! - The navigation expansion analyzer pass
//! - Expansion results with the source mappings downstream stages need

pub mod utils;

pub mod config;
pub mod entity_catalog;
pub mod query_planner;
