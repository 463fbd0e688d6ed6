//! Domain models for the Fabrication ERP Platform

mod batch;
mod ledger;
mod order;
mod product;
mod purchase;
mod returns;

pub use batch::*;
pub use ledger::*;
pub use order::*;
pub use product::*;
pub use purchase::*;
pub use returns::*;
