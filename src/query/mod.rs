//! Query Parsing Module
//!
//! Turns raw SQL into the typed `ParsedQuery` shared by the planner and the aggregator.
//!
//! ## Core Concepts
//! - **Validation**: Only single SELECT statements over plain tables are accepted. Subqueries,
//!   CTEs, set operations, window functions and DISTINCT aggregates are rejected up front.
//! - **Decomposition**: Aggregates are rewritten into mergeable partials (AVG becomes SUM + COUNT)
//!   and every projection gets an internal alias so partial rows merge unambiguously.
//! - **Features**: Joins, grouping, ordering and the key range on the split column are recorded
//!   once so the planner never inspects SQL text.
//! - **Post-merge predicates**: HAVING is compiled to a `Predicate` evaluated on merged groups.

pub mod parser;
pub mod predicate;
pub mod types;
pub mod value;

pub use parser::parse_query;
pub use types::{ParsedQuery, QueryKind, Row};
