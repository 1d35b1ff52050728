//! Purges rows older than a retention window from Azure Table Storage.
//!
//! Eligible row identifiers are first copied into a local SQLite staging
//! buffer and then deleted remotely in single-partition batches. A run can
//! be interrupted at any point and resumed later.

pub mod config;
pub mod models;
pub mod observability;
pub mod purge;
pub mod remote;
pub mod runner;
pub mod staging;

#[cfg(test)]
mod tests;
