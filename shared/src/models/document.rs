//! Document headers and items for purchases, transfers, write-offs and counts

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for purchases, transfers and write-offs.
///
/// Draft documents have no ledger effect and may be edited or cancelled.
/// Confirmed and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Confirmed,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Confirmed => "confirmed",
            DocumentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DocumentStatus::Draft),
            "confirmed" => Some(DocumentStatus::Confirmed),
            "cancelled" => Some(DocumentStatus::Cancelled),
            _ => None,
        }
    }

    /// Only drafts may be confirmed, edited or cancelled
    pub fn is_draft(&self) -> bool {
        matches!(self, DocumentStatus::Draft)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_draft()
    }
}

/// Lifecycle status for inventory counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    InProgress,
    Approved,
}

impl CountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountStatus::InProgress => "in_progress",
            CountStatus::Approved => "approved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(CountStatus::InProgress),
            "approved" => Some(CountStatus::Approved),
            _ => None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, CountStatus::InProgress)
    }
}

/// Purchase from a supplier into a department
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub number: String,
    pub date: NaiveDate,
    pub supplier_id: Uuid,
    pub department_id: Uuid,
    /// Sum of item total prices; fixed at creation from negotiated prices
    pub total_amount: Decimal,
    pub status: DocumentStatus,
    pub created_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    /// Negotiated purchase price; seeds future average costs on confirm
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub notes: Option<String>,
}

/// Movement of goods between two departments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub number: String,
    pub date: NaiveDate,
    pub from_department_id: Uuid,
    pub to_department_id: Uuid,
    /// Zero until confirm, then the sum of stamped item costs
    pub total_cost: Decimal,
    pub status: DocumentStatus,
    pub created_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    /// Average cost of the source department, stamped at confirm
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub notes: Option<String>,
}

/// Write-off of consumed or lost stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOff {
    pub id: Uuid,
    pub number: String,
    pub date: NaiveDate,
    pub department_id: Uuid,
    pub reason: String,
    pub total_cost: Decimal,
    pub status: DocumentStatus,
    pub created_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOffItem {
    pub id: Uuid,
    pub writeoff_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub notes: Option<String>,
}

/// Physical count act reconciling recorded vs actual quantities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryCount {
    pub id: Uuid,
    pub number: String,
    pub date: NaiveDate,
    pub department_id: Uuid,
    pub status: CountStatus,
    pub created_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryCountItem {
    pub id: Uuid,
    pub inventory_count_id: Uuid,
    pub product_id: Uuid,
    /// Recorded quantity snapshotted when the count was created
    pub system_quantity: Decimal,
    pub actual_quantity: Decimal,
    /// actual - system, recomputed whenever actual changes
    pub difference: Decimal,
    pub notes: Option<String>,
}

impl InventoryCountItem {
    pub fn set_actual_quantity(&mut self, actual: Decimal) {
        self.actual_quantity = actual;
        self.difference = self.actual_quantity - self.system_quantity;
    }
}
