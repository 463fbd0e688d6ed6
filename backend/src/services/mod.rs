//! Business logic services for the Fabrication ERP Platform
//!
//! Every mutating operation runs inside one database transaction. Row locks
//! are always taken in the same global order: order header first, then
//! batches in processing order, then the contact row. Shared counters use the
//! advisory-lock-backed sequence allocator; these two primitives are the only
//! synchronization in the engine.

pub mod allocation;
pub mod batches;
pub mod ledger;
pub mod production;
pub mod purchases;
pub mod returns;
pub mod sales;
pub mod sequence;

pub use batches::BatchService;
pub use ledger::LedgerService;
pub use production::ProductionService;
pub use purchases::PurchaseService;
pub use returns::ReturnService;
pub use sales::SalesService;
