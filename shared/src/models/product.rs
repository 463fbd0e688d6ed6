//! Product classification (read-only master data for the engine)

use serde::{Deserialize, Serialize};

/// How the engine treats a product during allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// No batch tracking; stock is not managed per physical unit
    Standard,
    /// Sold directly from tracked batches (coils/pallets)
    Tracked,
    /// Virtual product produced from a raw product via a recipe
    Manufactured,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Standard => "standard",
            ProductKind::Tracked => "tracked",
            ProductKind::Manufactured => "manufactured",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(ProductKind::Standard),
            "tracked" => Some(ProductKind::Tracked),
            "manufactured" => Some(ProductKind::Manufactured),
            _ => None,
        }
    }
}
