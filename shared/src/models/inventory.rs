//! Stock position and movement-ledger models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current on-hand quantity of a product at a department.
///
/// Derived state: reconstructible by replaying all movement transactions
/// for the (product, department) pair. Created lazily on the first inbound
/// movement, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockPosition {
    pub id: Uuid,
    pub product_id: Uuid,
    pub department_id: Uuid,
    pub quantity: Decimal,
    /// Tracked for future reservation support; never mutated by the engine.
    pub reserved_quantity: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Types of ledger movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Inbound goods from a confirmed purchase
    Receipt,
    /// Outbound leg of a transfer
    Issue,
    /// Inbound leg of a transfer
    Transfer,
    /// Count reconciliation delta (carries no cost)
    Adjustment,
    Writeoff,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receipt => "receipt",
            MovementType::Issue => "issue",
            MovementType::Transfer => "transfer",
            MovementType::Adjustment => "adjustment",
            MovementType::Writeoff => "writeoff",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(MovementType::Receipt),
            "issue" => Some(MovementType::Issue),
            "transfer" => Some(MovementType::Transfer),
            "adjustment" => Some(MovementType::Adjustment),
            "writeoff" => Some(MovementType::Writeoff),
            _ => None,
        }
    }

    /// Whether a unit cost must be stamped on movements of this type
    pub fn carries_cost(&self) -> bool {
        !matches!(self, MovementType::Adjustment)
    }
}

/// Document type recorded as a movement's reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Purchase,
    Transfer,
    Writeoff,
    InventoryCount,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Purchase => "purchase",
            DocumentKind::Transfer => "transfer",
            DocumentKind::Writeoff => "writeoff",
            DocumentKind::InventoryCount => "inventory_count",
        }
    }
}

/// One immutable ledger entry recording a quantity change with optional cost.
///
/// Append-only: never updated or deleted after creation. `created_at` is the
/// authoritative ordering key. Exactly one department side is set: receipts
/// and inbound transfer legs carry only `to`, issues and write-offs only
/// `from`, adjustments one side depending on direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementTransaction {
    pub id: Uuid,
    pub movement_type: MovementType,
    pub product_id: Uuid,
    pub from_department_id: Option<Uuid>,
    pub to_department_id: Option<Uuid>,
    pub quantity: Decimal,
    /// Purchase price for receipts, computed average cost for outgoing
    /// movements, absent for adjustments.
    pub unit_cost: Option<Decimal>,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<DocumentKind>,
    pub performed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MovementTransaction {
    /// Signed effect of this movement on a given department's quantity
    pub fn signed_quantity_for(&self, department_id: Uuid) -> Decimal {
        let mut delta = Decimal::ZERO;
        if self.to_department_id == Some(department_id) {
            delta += self.quantity;
        }
        if self.from_department_id == Some(department_id) {
            delta -= self.quantity;
        }
        delta
    }
}
