//! Shared types and domain logic for the Fabrication ERP Platform
//!
//! This crate contains the models, decimal conventions, and the pure decision
//! logic of the transaction engine (allocation planning, ledger replay, the
//! production state machine, sequence formatting). It has no database or HTTP
//! dependency so every invariant can be tested without infrastructure.

pub mod allocation;
pub mod ledger;
pub mod models;
pub mod sequence;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
