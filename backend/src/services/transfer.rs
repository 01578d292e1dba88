//! Transfers: goods moved between two departments at source average cost
//!
//! A transfer carries no prices at creation. On confirm, each item is costed
//! at the source department's historical average and the move is recorded as
//! a paired issue (out of the source) plus transfer receipt (into the
//! destination), so each ledger entry affects exactly one department side.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::models::{DocumentKind, DocumentStatus, MovementType, Transfer, TransferItem};
use shared::types::{DateRange, Pagination};
use shared::validation::{validate_distinct_departments, validate_quantity};

use crate::error::{is_unique_violation, AppError, AppResult};
use crate::services::numbering::{self, NumberSeries, MAX_NUMBER_ATTEMPTS};
use crate::services::{catalog, ledger, ActorContext};

/// Transfer document service
#[derive(Clone)]
pub struct TransferService {
    db: PgPool,
}

/// Input for creating a transfer
#[derive(Debug, Deserialize)]
pub struct CreateTransferInput {
    pub from_department_id: Uuid,
    pub to_department_id: Uuid,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<TransferItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct TransferItemInput {
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub notes: Option<String>,
}

/// Mutable fields of a draft transfer
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTransferInput {
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Filters for transfer listings
#[derive(Debug, Clone, Default)]
pub struct TransferFilter {
    pub status: Option<DocumentStatus>,
    pub from_department_id: Option<Uuid>,
    pub to_department_id: Option<Uuid>,
    pub dates: DateRange,
}

/// Transfer header with its items
#[derive(Debug, Clone, Serialize)]
pub struct TransferDetail {
    #[serde(flatten)]
    pub transfer: Transfer,
    pub items: Vec<TransferItem>,
}

#[derive(Debug, FromRow)]
struct TransferRow {
    id: Uuid,
    number: String,
    date: NaiveDate,
    from_department_id: Uuid,
    to_department_id: Uuid,
    total_cost: Decimal,
    status: String,
    created_by: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TransferRow {
    fn into_model(self) -> AppResult<Transfer> {
        let status = DocumentStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown transfer status '{}'", self.status)))?;
        Ok(Transfer {
            id: self.id,
            number: self.number,
            date: self.date,
            from_department_id: self.from_department_id,
            to_department_id: self.to_department_id,
            total_cost: self.total_cost,
            status,
            created_by: self.created_by,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransferItemRow {
    id: Uuid,
    transfer_id: Uuid,
    product_id: Uuid,
    quantity: Decimal,
    unit_cost: Option<Decimal>,
    total_cost: Option<Decimal>,
    notes: Option<String>,
}

impl From<TransferItemRow> for TransferItem {
    fn from(r: TransferItemRow) -> Self {
        TransferItem {
            id: r.id,
            transfer_id: r.transfer_id,
            product_id: r.product_id,
            quantity: r.quantity,
            unit_cost: r.unit_cost,
            total_cost: r.total_cost,
            notes: r.notes,
        }
    }
}

const SELECT_TRANSFER: &str = r#"
    SELECT id, number, date, from_department_id, to_department_id, total_cost,
           status, created_by, notes, created_at, updated_at
    FROM transfers
"#;

const SELECT_TRANSFER_ITEMS: &str = r#"
    SELECT id, transfer_id, product_id, quantity, unit_cost, total_cost, notes
    FROM transfer_items
    WHERE transfer_id = $1
    ORDER BY id
"#;

impl TransferService {
    /// Create a new TransferService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a transfer in draft; stock is not checked until confirm
    pub async fn create(
        &self,
        actor: &ActorContext,
        input: CreateTransferInput,
    ) -> AppResult<TransferDetail> {
        validate_distinct_departments(input.from_department_id, input.to_department_id).map_err(
            |msg| AppError::Validation {
                field: "to_department_id".to_string(),
                message: msg.to_string(),
            },
        )?;
        if input.items.is_empty() {
            return Err(AppError::Validation {
                field: "items".to_string(),
                message: "Transfer must contain at least one item".to_string(),
            });
        }

        catalog::ensure_department(&self.db, input.from_department_id).await?;
        catalog::ensure_department(&self.db, input.to_department_id).await?;
        for item in &input.items {
            validate_quantity(item.quantity).map_err(|msg| AppError::Validation {
                field: "quantity".to_string(),
                message: msg.to_string(),
            })?;
            catalog::ensure_product(&self.db, item.product_id).await?;
        }

        let mut attempt = 0;
        let transfer_id = loop {
            let mut tx = self.db.begin().await?;
            let number = numbering::next_document_number(&mut tx, NumberSeries::Transfer).await?;

            let inserted = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO transfers (number, date, from_department_id, to_department_id,
                                       total_cost, status, created_by, notes)
                VALUES ($1, $2, $3, $4, 0, 'draft', $5, $6)
                RETURNING id
                "#,
            )
            .bind(&number)
            .bind(input.date)
            .bind(input.from_department_id)
            .bind(input.to_department_id)
            .bind(actor.user_id)
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await;

            match inserted {
                Ok(id) => {
                    for item in &input.items {
                        sqlx::query(
                            r#"
                            INSERT INTO transfer_items (transfer_id, product_id, quantity, notes)
                            VALUES ($1, $2, $3, $4)
                            "#,
                        )
                        .bind(id)
                        .bind(item.product_id)
                        .bind(item.quantity)
                        .bind(&item.notes)
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
                            "Could not allocate a unique transfer number after {} attempts",
                            MAX_NUMBER_ATTEMPTS
                        )));
                    }
                    tracing::warn!(%number, attempt, "Transfer number collision, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        };

        self.get(transfer_id).await
    }

    /// Get a transfer with its items
    pub async fn get(&self, transfer_id: Uuid) -> AppResult<TransferDetail> {
        let row = sqlx::query_as::<_, TransferRow>(&format!("{} WHERE id = $1", SELECT_TRANSFER))
            .bind(transfer_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        let items = sqlx::query_as::<_, TransferItemRow>(SELECT_TRANSFER_ITEMS)
            .bind(transfer_id)
            .fetch_all(&self.db)
            .await?;

        Ok(TransferDetail {
            transfer: row.into_model()?,
            items: items.into_iter().map(Into::into).collect(),
        })
    }

    /// List transfers with filters, newest first
    pub async fn list(
        &self,
        filter: TransferFilter,
        pagination: Pagination,
    ) -> AppResult<Vec<Transfer>> {
        let rows = sqlx::query_as::<_, TransferRow>(&format!(
            r#"{}
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR from_department_id = $2)
              AND ($3::uuid IS NULL OR to_department_id = $3)
              AND ($4::date IS NULL OR date >= $4)
              AND ($5::date IS NULL OR date <= $5)
            ORDER BY date DESC, created_at DESC
            LIMIT $6 OFFSET $7
            "#,
            SELECT_TRANSFER
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.from_department_id)
        .bind(filter.to_department_id)
        .bind(filter.dates.from)
        .bind(filter.dates.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TransferRow::into_model).collect()
    }

    /// Update mutable fields of a draft transfer
    pub async fn update(
        &self,
        transfer_id: Uuid,
        input: UpdateTransferInput,
    ) -> AppResult<TransferDetail> {
        let existing = self.get(transfer_id).await?;
        if !existing.transfer.status.is_draft() {
            return Err(AppError::InvalidStateTransition(
                "Can only update draft transfers".to_string(),
            ));
        }

        let date = input.date.unwrap_or(existing.transfer.date);
        let notes = input.notes.or(existing.transfer.notes);

        sqlx::query("UPDATE transfers SET date = $1, notes = $2, updated_at = NOW() WHERE id = $3")
            .bind(date)
            .bind(&notes)
            .bind(transfer_id)
            .execute(&self.db)
            .await?;

        self.get(transfer_id).await
    }

    /// Confirm a draft transfer: check stock for every item, cost each at the
    /// source department's average, and record a paired issue + receipt per
    /// item. All-or-nothing; one short item fails the whole confirm.
    pub async fn confirm(
        &self,
        transfer_id: Uuid,
        actor: &ActorContext,
    ) -> AppResult<TransferDetail> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "{} WHERE id = $1 FOR UPDATE",
            SELECT_TRANSFER
        ))
        .bind(transfer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        let transfer = row.into_model()?;
        if !transfer.status.is_draft() {
            return Err(AppError::InvalidStateTransition(format!(
                "Transfer is already {}",
                transfer.status.as_str()
            )));
        }

        let items = sqlx::query_as::<_, TransferItemRow>(SELECT_TRANSFER_ITEMS)
            .bind(transfer_id)
            .fetch_all(&mut *tx)
            .await?;

        // Lock and check every source position before moving anything
        for item in &items {
            let available = ledger::locked_position_quantity(
                &mut tx,
                item.product_id,
                transfer.from_department_id,
            )
            .await?;
            if available < item.quantity {
                let product_name = ledger::product_name(&mut tx, item.product_id).await?;
                return Err(AppError::InsufficientStock {
                    product_id: item.product_id,
                    product_name,
                    available,
                    requested: item.quantity,
                });
            }
        }

        let mut total_cost = Decimal::ZERO;
        for item in &items {
            let unit_cost = ledger::average_unit_cost(
                &mut tx,
                item.product_id,
                transfer.from_department_id,
            )
            .await?;
            let item_cost = unit_cost * item.quantity;
            total_cost += item_cost;

            sqlx::query("UPDATE transfer_items SET unit_cost = $1, total_cost = $2 WHERE id = $3")
                .bind(unit_cost)
                .bind(item_cost)
                .bind(item.id)
                .execute(&mut *tx)
                .await?;

            ledger::apply_movement(
                &mut tx,
                ledger::NewMovement {
                    movement_type: MovementType::Issue,
                    product_id: item.product_id,
                    from_department_id: Some(transfer.from_department_id),
                    to_department_id: None,
                    quantity: item.quantity,
                    unit_cost: Some(unit_cost),
                    reference_id: Some(transfer_id),
                    reference_type: Some(DocumentKind::Transfer),
                    performed_by: Some(actor.user_id),
                    notes: None,
                },
            )
            .await?;
            ledger::apply_movement(
                &mut tx,
                ledger::NewMovement {
                    movement_type: MovementType::Transfer,
                    product_id: item.product_id,
                    from_department_id: None,
                    to_department_id: Some(transfer.to_department_id),
                    quantity: item.quantity,
                    unit_cost: Some(unit_cost),
                    reference_id: Some(transfer_id),
                    reference_type: Some(DocumentKind::Transfer),
                    performed_by: Some(actor.user_id),
                    notes: None,
                },
            )
            .await?;
        }

        sqlx::query(
            "UPDATE transfers SET status = 'confirmed', total_cost = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(total_cost)
        .bind(transfer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            number = %transfer.number,
            items = items.len(),
            %total_cost,
            "Transfer confirmed"
        );

        self.get(transfer_id).await
    }

    /// Cancel a draft transfer; terminal, no ledger effect
    pub async fn cancel(&self, transfer_id: Uuid) -> AppResult<()> {
        let existing = self.get(transfer_id).await?;
        if !existing.transfer.status.is_draft() {
            return Err(AppError::InvalidStateTransition(
                "Can only cancel draft transfers".to_string(),
            ));
        }

        sqlx::query("UPDATE transfers SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
            .bind(transfer_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
