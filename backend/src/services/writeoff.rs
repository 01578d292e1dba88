//! Write-offs: stock consumed, spoiled or lost, removed from one department
//!
//! Stock is checked twice: at creation for early feedback, and again under
//! lock at confirm, which is the check that counts. Confirmed write-offs
//! trigger best-effort notifications that never affect the outcome of the
//! confirm itself.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::models::{DocumentKind, DocumentStatus, MovementType, WriteOff, WriteOffItem};
use shared::types::{DateRange, Pagination};
use shared::validation::{validate_quantity, validate_reason};

use crate::error::{is_unique_violation, AppError, AppResult};
use crate::services::notification::NotificationService;
use crate::services::numbering::{self, NumberSeries, MAX_NUMBER_ATTEMPTS};
use crate::services::{catalog, ledger, ActorContext};

/// Write-off document service
#[derive(Clone)]
pub struct WriteOffService {
    db: PgPool,
    notifier: NotificationService,
}

/// Input for creating a write-off
#[derive(Debug, Deserialize)]
pub struct CreateWriteOffInput {
    pub department_id: Uuid,
    pub date: NaiveDate,
    pub reason: String,
    pub notes: Option<String>,
    pub items: Vec<WriteOffItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct WriteOffItemInput {
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub notes: Option<String>,
}

/// Mutable fields of a draft write-off
#[derive(Debug, Default, Deserialize)]
pub struct UpdateWriteOffInput {
    pub date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Filters for write-off listings
#[derive(Debug, Clone, Default)]
pub struct WriteOffFilter {
    pub status: Option<DocumentStatus>,
    pub department_id: Option<Uuid>,
    pub dates: DateRange,
}

/// Write-off header with its items
#[derive(Debug, Clone, Serialize)]
pub struct WriteOffDetail {
    #[serde(flatten)]
    pub writeoff: WriteOff,
    pub items: Vec<WriteOffItem>,
}

#[derive(Debug, FromRow)]
struct WriteOffRow {
    id: Uuid,
    number: String,
    date: NaiveDate,
    department_id: Uuid,
    reason: String,
    total_cost: Decimal,
    status: String,
    created_by: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl WriteOffRow {
    fn into_model(self) -> AppResult<WriteOff> {
        let status = DocumentStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("Unknown write-off status '{}'", self.status))
        })?;
        Ok(WriteOff {
            id: self.id,
            number: self.number,
            date: self.date,
            department_id: self.department_id,
            reason: self.reason,
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
struct WriteOffItemRow {
    id: Uuid,
    writeoff_id: Uuid,
    product_id: Uuid,
    quantity: Decimal,
    unit_cost: Option<Decimal>,
    total_cost: Option<Decimal>,
    notes: Option<String>,
}

impl From<WriteOffItemRow> for WriteOffItem {
    fn from(r: WriteOffItemRow) -> Self {
        WriteOffItem {
            id: r.id,
            writeoff_id: r.writeoff_id,
            product_id: r.product_id,
            quantity: r.quantity,
            unit_cost: r.unit_cost,
            total_cost: r.total_cost,
            notes: r.notes,
        }
    }
}

const SELECT_WRITEOFF: &str = r#"
    SELECT id, number, date, department_id, reason, total_cost, status,
           created_by, notes, created_at, updated_at
    FROM writeoffs
"#;

const SELECT_WRITEOFF_ITEMS: &str = r#"
    SELECT id, writeoff_id, product_id, quantity, unit_cost, total_cost, notes
    FROM writeoff_items
    WHERE writeoff_id = $1
    ORDER BY id
"#;

impl WriteOffService {
    /// Create a new WriteOffService instance
    pub fn new(db: PgPool, notifier: NotificationService) -> Self {
        Self { db, notifier }
    }

    /// Create a write-off in draft.
    ///
    /// Stock is pre-validated here for early feedback, but the draft does not
    /// reserve anything; confirm re-checks under lock.
    pub async fn create(
        &self,
        actor: &ActorContext,
        input: CreateWriteOffInput,
    ) -> AppResult<WriteOffDetail> {
        if !actor.writeoff_scope.allows(input.department_id) {
            return Err(AppError::InsufficientPermissions);
        }
        validate_reason(&input.reason).map_err(|msg| AppError::Validation {
            field: "reason".to_string(),
            message: msg.to_string(),
        })?;
        if input.items.is_empty() {
            return Err(AppError::Validation {
                field: "items".to_string(),
                message: "Write-off must contain at least one item".to_string(),
            });
        }

        catalog::ensure_department(&self.db, input.department_id).await?;
        for item in &input.items {
            validate_quantity(item.quantity).map_err(|msg| AppError::Validation {
                field: "quantity".to_string(),
                message: msg.to_string(),
            })?;
            catalog::ensure_product(&self.db, item.product_id).await?;

            let available = self
                .available_quantity(item.product_id, input.department_id)
                .await?;
            if available < item.quantity {
                let product_name =
                    catalog::product_display_name(&self.db, item.product_id).await?;
                return Err(AppError::InsufficientStock {
                    product_id: item.product_id,
                    product_name,
                    available,
                    requested: item.quantity,
                });
            }
        }

        let mut attempt = 0;
        let writeoff_id = loop {
            let mut tx = self.db.begin().await?;
            let number = numbering::next_document_number(&mut tx, NumberSeries::WriteOff).await?;

            let inserted = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO writeoffs (number, date, department_id, reason,
                                       total_cost, status, created_by, notes)
                VALUES ($1, $2, $3, $4, 0, 'draft', $5, $6)
                RETURNING id
                "#,
            )
            .bind(&number)
            .bind(input.date)
            .bind(input.department_id)
            .bind(&input.reason)
            .bind(actor.user_id)
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await;

            match inserted {
                Ok(id) => {
                    for item in &input.items {
                        sqlx::query(
                            r#"
                            INSERT INTO writeoff_items (writeoff_id, product_id, quantity, notes)
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
                            "Could not allocate a unique write-off number after {} attempts",
                            MAX_NUMBER_ATTEMPTS
                        )));
                    }
                    tracing::warn!(%number, attempt, "Write-off number collision, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        };

        self.get(writeoff_id).await
    }

    /// Get a write-off with its items
    pub async fn get(&self, writeoff_id: Uuid) -> AppResult<WriteOffDetail> {
        let row = sqlx::query_as::<_, WriteOffRow>(&format!("{} WHERE id = $1", SELECT_WRITEOFF))
            .bind(writeoff_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Write-off".to_string()))?;

        let items = sqlx::query_as::<_, WriteOffItemRow>(SELECT_WRITEOFF_ITEMS)
            .bind(writeoff_id)
            .fetch_all(&self.db)
            .await?;

        Ok(WriteOffDetail {
            writeoff: row.into_model()?,
            items: items.into_iter().map(Into::into).collect(),
        })
    }

    /// List write-offs with filters, newest first
    pub async fn list(
        &self,
        filter: WriteOffFilter,
        pagination: Pagination,
    ) -> AppResult<Vec<WriteOff>> {
        let rows = sqlx::query_as::<_, WriteOffRow>(&format!(
            r#"{}
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR department_id = $2)
              AND ($3::date IS NULL OR date >= $3)
              AND ($4::date IS NULL OR date <= $4)
            ORDER BY date DESC, created_at DESC
            LIMIT $5 OFFSET $6
            "#,
            SELECT_WRITEOFF
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.department_id)
        .bind(filter.dates.from)
        .bind(filter.dates.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(WriteOffRow::into_model).collect()
    }

    /// Update mutable fields of a draft write-off
    pub async fn update(
        &self,
        writeoff_id: Uuid,
        input: UpdateWriteOffInput,
    ) -> AppResult<WriteOffDetail> {
        let existing = self.get(writeoff_id).await?;
        if !existing.writeoff.status.is_draft() {
            return Err(AppError::InvalidStateTransition(
                "Can only update draft write-offs".to_string(),
            ));
        }

        if let Some(reason) = &input.reason {
            validate_reason(reason).map_err(|msg| AppError::Validation {
                field: "reason".to_string(),
                message: msg.to_string(),
            })?;
        }

        let date = input.date.unwrap_or(existing.writeoff.date);
        let reason = input.reason.unwrap_or(existing.writeoff.reason);
        let notes = input.notes.or(existing.writeoff.notes);

        sqlx::query(
            "UPDATE writeoffs SET date = $1, reason = $2, notes = $3, updated_at = NOW() WHERE id = $4",
        )
        .bind(date)
        .bind(&reason)
        .bind(&notes)
        .bind(writeoff_id)
        .execute(&self.db)
        .await?;

        self.get(writeoff_id).await
    }

    /// Confirm a draft write-off: re-check stock under lock, cost each item
    /// at the department's average, and issue a write-off movement per item.
    /// Notifications go out only after the transaction commits.
    pub async fn confirm(
        &self,
        writeoff_id: Uuid,
        actor: &ActorContext,
    ) -> AppResult<WriteOffDetail> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, WriteOffRow>(&format!(
            "{} WHERE id = $1 FOR UPDATE",
            SELECT_WRITEOFF
        ))
        .bind(writeoff_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Write-off".to_string()))?;

        let writeoff = row.into_model()?;
        if !writeoff.status.is_draft() {
            return Err(AppError::InvalidStateTransition(format!(
                "Write-off is already {}",
                writeoff.status.as_str()
            )));
        }

        let items = sqlx::query_as::<_, WriteOffItemRow>(SELECT_WRITEOFF_ITEMS)
            .bind(writeoff_id)
            .fetch_all(&mut *tx)
            .await?;

        for item in &items {
            let available = ledger::locked_position_quantity(
                &mut tx,
                item.product_id,
                writeoff.department_id,
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
            let unit_cost =
                ledger::average_unit_cost(&mut tx, item.product_id, writeoff.department_id)
                    .await?;
            let item_cost = unit_cost * item.quantity;
            total_cost += item_cost;

            sqlx::query("UPDATE writeoff_items SET unit_cost = $1, total_cost = $2 WHERE id = $3")
                .bind(unit_cost)
                .bind(item_cost)
                .bind(item.id)
                .execute(&mut *tx)
                .await?;

            ledger::apply_movement(
                &mut tx,
                ledger::NewMovement {
                    movement_type: MovementType::Writeoff,
                    product_id: item.product_id,
                    from_department_id: Some(writeoff.department_id),
                    to_department_id: None,
                    quantity: item.quantity,
                    unit_cost: Some(unit_cost),
                    reference_id: Some(writeoff_id),
                    reference_type: Some(DocumentKind::Writeoff),
                    performed_by: Some(actor.user_id),
                    notes: None,
                },
            )
            .await?;
        }

        sqlx::query(
            "UPDATE writeoffs SET status = 'confirmed', total_cost = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(total_cost)
        .bind(writeoff_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            number = %writeoff.number,
            items = items.len(),
            %total_cost,
            "Write-off confirmed"
        );

        self.notify_after_confirm(&writeoff, &items, total_cost).await;

        self.get(writeoff_id).await
    }

    /// Cancel a draft write-off; terminal, no ledger effect
    pub async fn cancel(&self, writeoff_id: Uuid) -> AppResult<()> {
        let existing = self.get(writeoff_id).await?;
        if !existing.writeoff.status.is_draft() {
            return Err(AppError::InvalidStateTransition(
                "Can only cancel draft write-offs".to_string(),
            ));
        }

        sqlx::query("UPDATE writeoffs SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
            .bind(writeoff_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn available_quantity(&self, product_id: Uuid, department_id: Uuid) -> AppResult<Decimal> {
        let quantity = sqlx::query_scalar::<_, Decimal>(
            "SELECT quantity FROM stock_positions WHERE product_id = $1 AND department_id = $2",
        )
        .bind(product_id)
        .bind(department_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(quantity.unwrap_or(Decimal::ZERO))
    }

    /// Post-commit side effects: write-off notification and low-stock alerts.
    /// Failures here are logged and swallowed; the write-off already stands.
    async fn notify_after_confirm(
        &self,
        writeoff: &WriteOff,
        items: &[WriteOffItemRow],
        total_cost: Decimal,
    ) {
        let department_name = match catalog::department_display_name(&self.db, writeoff.department_id)
            .await
        {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping write-off notification");
                return;
            }
        };

        self.notifier
            .notify_writeoff_confirmed(
                &writeoff.number,
                &department_name,
                &writeoff.reason,
                items.len(),
                total_cost,
            )
            .await;

        for item in items {
            match self.low_stock_level(item.product_id, writeoff.department_id).await {
                Ok(Some((product_name, quantity, min_level))) => {
                    self.notifier
                        .notify_low_stock(&product_name, &department_name, quantity, min_level)
                        .await;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "Low-stock check failed after write-off");
                }
            }
        }
    }

    /// Remaining quantity vs the product's minimum stock level, if breached
    async fn low_stock_level(
        &self,
        product_id: Uuid,
        department_id: Uuid,
    ) -> AppResult<Option<(String, Decimal, Decimal)>> {
        let row = sqlx::query_as::<_, (String, Option<Decimal>, Decimal)>(
            r#"
            SELECT p.name, p.min_stock_level, COALESCE(sp.quantity, 0)
            FROM products p
            LEFT JOIN stock_positions sp
                   ON sp.product_id = p.id AND sp.department_id = $2
            WHERE p.id = $1
            "#,
        )
        .bind(product_id)
        .bind(department_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.and_then(|(name, min_level, quantity)| match min_level {
            Some(min_level) if quantity < min_level => Some((name, quantity, min_level)),
            _ => None,
        }))
    }
}
