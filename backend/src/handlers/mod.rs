//! HTTP request handlers

pub mod batches;
pub mod health;
pub mod ledger;
pub mod purchases;
pub mod returns;
pub mod sales;

pub use batches::*;
pub use health::*;
pub use ledger::*;
pub use purchases::*;
pub use returns::*;
pub use sales::*;
