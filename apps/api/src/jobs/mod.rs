//! Durable job queue: data model, store trait, Postgres backend, handler
//! registry, and the polling worker.

#[cfg(test)]
pub mod memory;
pub mod model;
pub mod postgres;
pub mod registry;
pub mod store;
pub mod worker;
