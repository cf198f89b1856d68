//! Query Gateway Module
//!
//! The external entry point of the dispatcher. A query flows through it as:
//!
//! 1. **Parse**: The SQL is validated and classified. Anything other than a single
//!    SELECT is rejected here, before any network call.
//! 2. **Plan**: The planner splits it against one snapshot of the active workers.
//! 3. **Dispatch**: The coordinator fans the sub-queries out under the request deadline.
//! 4. **Merge**: The aggregator combines the partial results.
//!
//! Every query gets a UUID that is carried through the logs of all four stages. Request
//! counters are bumped on entry, so they count attempted queries, not only successful ones.

pub mod handlers;
pub mod protocol;
pub mod service;

pub use service::QueryGateway;

#[cfg(test)]
mod tests;
