//! MySQL diagnostic agent.
//!
//! Turns an operator question ("why is the database slow?") into a plan of
//! read-only diagnostic probes, runs them against MySQL, tracks which
//! required signals were actually collected, and asks a language model for a
//! report grounded in that data only.

pub mod agent;
pub mod config;
pub mod database;
pub mod error;
pub mod inference;
pub mod rpc;
pub mod service;
pub mod tools;
pub mod types;
