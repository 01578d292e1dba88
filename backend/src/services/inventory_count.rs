//! Inventory counts: reconciling recorded stock with a physical count
//!
//! A count snapshots every non-zero position of one department when created.
//! Counters fill in actual quantities while the count is in progress.
//! Approval sets each discrepant position to the counted quantity and
//! appends a cost-less adjustment movement per discrepancy; differences
//! within tolerance are skipped.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::models::{
    CountStatus, DocumentKind, InventoryCount, InventoryCountItem, MovementType,
};
use shared::types::{DateRange, Pagination};
use shared::validation::{adjustment_direction, AdjustmentDirection};

use crate::error::{is_unique_violation, AppError, AppResult};
use crate::services::numbering::{self, NumberSeries, MAX_NUMBER_ATTEMPTS};
use crate::services::{catalog, ledger, ActorContext};

/// Inventory count service
#[derive(Clone)]
pub struct InventoryCountService {
    db: PgPool,
}

/// Input for starting a count
#[derive(Debug, Deserialize)]
pub struct CreateCountInput {
    pub department_id: Uuid,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

/// One counted quantity keyed by count item id
#[derive(Debug, Deserialize)]
pub struct CountItemUpdate {
    pub item_id: Uuid,
    pub actual_quantity: Decimal,
    pub notes: Option<String>,
}

/// Filters for count listings
#[derive(Debug, Clone, Default)]
pub struct CountFilter {
    pub status: Option<CountStatus>,
    pub department_id: Option<Uuid>,
    pub dates: DateRange,
}

/// Count header with its items
#[derive(Debug, Clone, Serialize)]
pub struct CountDetail {
    #[serde(flatten)]
    pub count: InventoryCount,
    pub items: Vec<InventoryCountItem>,
}

///// Outcome of approving a count: the approved document plus how many
/// positions were actually adjusted (items within tolerance are skipped)
#[derive(Debug, Clone, Serialize)]
pub struct CountApproval {
    #[serde(flatten)]
    pub detail: CountDetail,
    pub adjusted_count: usize,
}

#[derive(Debug, FromRow)]
struct CountRow {
    id: Uuid,
    number: String,
    date: NaiveDate,
    department_id: Uuid,
    status: String,
    created_by: Option<Uuid>,
    approved_by: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl CountRow {
    fn into_model(self) -> AppResult<InventoryCount> {
        let status = CountStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown count status '{}'", self.status)))?;
        Ok(InventoryCount {
            id: self.id,
            number: self.number,
            date: self.date,
            department_id: self.department_id,
            status,
            created_by: self.created_by,
            approved_by: self.approved_by,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CountItemRow {
    id: Uuid,
    inventory_count_id: Uuid,
    product_id: Uuid,
    system_quantity: Decimal,
    actual_quantity: Decimal,
    difference: Decimal,
    notes: Option<String>,
}

impl From<CountItemRow> for InventoryCountItem {
    fn from(r: CountItemRow) -> Self {
        InventoryCountItem {
            id: r.id,
            inventory_count_id: r.inventory_count_id,
            product_id: r.product_id,
            system_quantity: r.system_quantity,
            actual_quantity: r.actual_quantity,
            difference: r.difference,
            notes: r.notes,
        }
    }
}

const SELECT_COUNT: &str = r#"
    SELECT id, number, date, department_id, status, created_by, approved_by,
           notes, created_at, updated_at
    FROM inventory_counts
"#;

const SELECT_COUNT_ITEMS: &str = r#"
    SELECT id, inventory_count_id, product_id, system_quantity,
           actual_quantity, difference, notes
    FROM inventory_count_items
    WHERE inventory_count_id = $1
    ORDER BY id
"#;

impl InventoryCountService {
    /// Create a new InventoryCountService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Start a count: snapshot every position with stock in the department.
    /// Actual quantities start equal to the snapshot so untouched items
    /// reconcile to zero difference.
    pub async fn create(
        &self,
        actor: &ActorContext,
        input: CreateCountInput,
    ) -> AppResult<CountDetail> {
        catalog::ensure_department(&self.db, input.department_id).await?;

        let positions = sqlx::query_as::<_, (Uuid, Decimal)>(
            r#"
            SELECT product_id, quantity
            FROM stock_positions
            WHERE department_id = $1 AND quantity > 0
            ORDER BY product_id
            "#,
        )
        .bind(input.department_id)
        .fetch_all(&self.db)
        .await?;

        if positions.is_empty() {
            return Err(AppError::Validation {
                field: "department_id".to_string(),
                message: "No stock found for department".to_string(),
            });
        }

        let mut attempt = 0;
        let count_id = loop {
            let mut tx = self.db.begin().await?;
            let number =
                numbering::next_document_number(&mut tx, NumberSeries::InventoryCount).await?;

            let inserted = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO inventory_counts (number, date, department_id, status,
                                              created_by, notes)
                VALUES ($1, $2, $3, 'in_progress', $4, $5)
                RETURNING id
                "#,
            )
            .bind(&number)
            .bind(input.date)
            .bind(input.department_id)
            .bind(actor.user_id)
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await;

            match inserted {
                Ok(id) => {
                    for (product_id, quantity) in &positions {
                        sqlx::query(
                            r#"
                            INSERT INTO inventory_count_items
                                (inventory_count_id, product_id, system_quantity,
                                 actual_quantity, difference)
                            VALUES ($1, $2, $3, $3, 0)
                            "#,
                        )
                        .bind(id)
                        .bind(product_id)
                        .bind(quantity)
                        .execute(&mut *tx)
                        .await?;
                    }
                    tx.commit().await?;
                    break id;
                }
                Err(err) if is_unique_violation(&err) => {
                    tx.rollback().await?;
                    attempt += 1;
                    if attempt >= MAX_NUMBER_ATTEMPTS {
                        return Err(AppError::ConcurrencyConflict(format!(
                            "Could not allocate a unique count number after {} attempts",
                            MAX_NUMBER_ATTEMPTS
                        )));
                    }
                    tracing::warn!(%number, attempt, "Count number collision, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        };

        self.get(count_id).await
    }

    /// Get a count with its items
    pub async fn get(&self, count_id: Uuid) -> AppResult<CountDetail> {
        let row = sqlx::query_as::<_, CountRow>(&format!("{} WHERE id = $1", SELECT_COUNT))
            .bind(count_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Inventory count".to_string()))?;

        let items = sqlx::query_as::<_, CountItemRow>(SELECT_COUNT_ITEMS)
            .bind(count_id)
            .fetch_all(&self.db)
            .await?;

        Ok(CountDetail {
            count: row.into_model()?,
            items: items.into_iter().map(Into::into).collect(),
        })
    }

    /// List counts with filters, newest first
    pub async fn list(
        &self,
        filter: CountFilter,
        pagination: Pagination,
    ) -> AppResult<Vec<InventoryCount>> {
        let rows = sqlx::query_as::<_, CountRow>(&format!(
            r#"{}
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR department_id = $2)
              AND ($3::date IS NULL OR date >= $3)
              AND ($4::date IS NULL OR date <= $4)
            ORDER BY date DESC, created_at DESC
            LIMIT $5 OFFSET $6
            "#,
            SELECT_COUNT
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.department_id)
        .bind(filter.dates.from)
        .bind(filter.dates.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(CountRow::into_model).collect()
    }

    /// Record counted quantities on an in-progress count. Differences are
    /// recomputed here; nothing touches stock until approval.
    pub async fn update_items(
        &self,
        count_id: Uuid,
        updates: Vec<CountItemUpdate>,
    ) -> AppResult<CountDetail> {
        let existing = self.get(count_id).await?;
        if !existing.count.status.is_in_progress() {
            return Err(AppError::InvalidStateTransition(
                "Can only update an in-progress count".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;
        for update in &updates {
            if update.actual_quantity < Decimal::ZERO {
                return Err(AppError::Validation {
                    field: "actual_quantity".to_string(),
                    message: "Counted quantity cannot be negative".to_string(),
                });
            }

            let result = sqlx::query(
                r#"
                UPDATE inventory_count_items
                SET actual_quantity = $1,
                    difference = $1 - system_quantity,
                    notes = COALESCE($2, notes)
                WHERE id = $3 AND inventory_count_id = $4
                "#,
            )
            .bind(update.actual_quantity)
            .bind(&update.notes)
            .bind(update.item_id)
            .bind(count_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFound(format!(
                    "Count item {}",
                    update.item_id
                )));
            }
        }

        sqlx::query("UPDATE inventory_counts SET updated_at = NOW() WHERE id = $1")
            .bind(count_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get(count_id).await
    }

    /// Approve a count: set each discrepant position to its counted quantity
    /// and append a cost-less adjustment movement recording the change.
    /// Differences within tolerance leave both position and ledger untouched.
    /// Reports how many positions were adjusted.
    pub async fn approve(&self, count_id: Uuid, actor: &ActorContext) -> AppResult<CountApproval> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, CountRow>(&format!(
            "{} WHERE id = $1 FOR UPDATE",
            SELECT_COUNT
        ))
        .bind(count_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Inventory count".to_string()))?;

        let count = row.into_model()?;
        if !count.status.is_in_progress() {
            return Err(AppError::InvalidStateTransition(
                "Count is already approved".to_string(),
            ));
        }

        let items = sqlx::query_as::<_, CountItemRow>(SELECT_COUNT_ITEMS)
            .bind(count_id)
            .fetch_all(&mut *tx)
            .await?;

        let mut adjusted = 0usize;
        for item in &items {
            let Some(direction) = adjustment_direction(item.difference) else {
                continue;
            };
            adjusted += 1;

            // The position is set absolutely to the counted quantity; the
            // adjustment movement records the delta without touching it again.
            ledger::set_position_quantity(
                &mut tx,
                item.product_id,
                count.department_id,
                item.actual_quantity,
            )
            .await?;

            let (from_department_id, to_department_id) = match direction {
                AdjustmentDirection::Surplus => (None, Some(count.department_id)),
                AdjustmentDirection::Shortage => (Some(count.department_id), None),
            };
            ledger::append_movement(
                &mut tx,
                ledger::NewMovement {
                    movement_type: MovementType::Adjustment,
                    product_id: item.product_id,
                    from_department_id,
                    to_department_id,
                    quantity: item.difference.abs(),
                    unit_cost: None,
                    reference_id: Some(count_id),
                    reference_type: Some(DocumentKind::InventoryCount),
                    performed_by: Some(actor.user_id),
                    notes: Some(format!("Inventory count {}", count.number)),
                },
            )
            .await?;
        }

        sqlx::query(
            "UPDATE inventory_counts SET status = 'approved', approved_by = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(actor.user_id)
        .bind(count_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            number = %count.number,
            items = items.len(),
            adjusted,
            "Inventory count approved"
        );

        Ok(CountApproval {
            detail: self.get(count_id).await?,
            adjusted_count: adjusted,
        })
    }

    /// Delete a count that was never approved, items included
    pub async fn delete(&self, count_id: Uuid) -> AppResult<()> {
        let existing = self.get(count_id).await?;
        if !existing.count.status.is_in_progress() {
            return Err(AppError::InvalidStateTransition(
                "Cannot delete an approved count".to_string(),
            ));
        }

        // Items go with the header via ON DELETE CASCADE
        sqlx::query("DELETE FROM inventory_counts WHERE id = $1")
            .bind(count_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
