//! Purchase documents: goods bought from a supplier into a department
//!
//! A purchase is created in draft with negotiated prices and has no ledger
//! effect until confirmed. Confirming emits one receipt movement per item
//! with `unit_cost = unit_price`; those receipts are the ground truth that
//! seeds future average costs.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::models::{DocumentKind, DocumentStatus, MovementType, Purchase, PurchaseItem};
use shared::types::{DateRange, Pagination};
use shared::validation::{validate_quantity, validate_unit_price};

use crate::error::{is_unique_violation, AppError, AppResult};
use crate::services::numbering::{self, NumberSeries, MAX_NUMBER_ATTEMPTS};
use crate::services::{catalog, ledger, ActorContext};

/// Purchase document service
#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
}

/// Input for creating a purchase
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseInput {
    pub supplier_id: Uuid,
    pub department_id: Uuid,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<PurchaseItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseItemInput {
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub notes: Option<String>,
}

/// Mutable fields of a draft purchase
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePurchaseInput {
    pub date: Option<NaiveDate>,
    pub supplier_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Filters for purchase listings
#[derive(Debug, Clone, Default)]
pub struct PurchaseFilter {
    pub status: Option<DocumentStatus>,
    pub supplier_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub dates: DateRange,
}

/// Purchase header with its items
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseDetail {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub items: Vec<PurchaseItem>,
}

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: Uuid,
    number: String,
    date: NaiveDate,
    supplier_id: Uuid,
    department_id: Uuid,
    total_amount: Decimal,
    status: String,
    created_by: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl PurchaseRow {
    fn into_model(self) -> AppResult<Purchase> {
        let status = DocumentStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown purchase status '{}'", self.status)))?;
        Ok(Purchase {
            id: self.id,
            number: self.number,
            date: self.date,
            supplier_id: self.supplier_id,
            department_id: self.department_id,
            total_amount: self.total_amount,
            status,
            created_by: self.created_by,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PurchaseItemRow {
    id: Uuid,
    purchase_id: Uuid,
    product_id: Uuid,
    quantity: Decimal,
    unit_price: Decimal,
    total_price: Decimal,
    notes: Option<String>,
}

impl From<PurchaseItemRow> for PurchaseItem {
    fn from(r: PurchaseItemRow) -> Self {
        PurchaseItem {
            id: r.id,
            purchase_id: r.purchase_id,
            product_id: r.product_id,
            quantity: r.quantity,
            unit_price: r.unit_price,
            total_price: r.total_price,
            notes: r.notes,
        }
    }
}

const SELECT_PURCHASE: &str = r#"
    SELECT id, number, date, supplier_id, department_id, total_amount, status,
           created_by, notes, created_at, updated_at
    FROM purchases
"#;

impl PurchaseService {
    /// Create a new PurchaseService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a purchase in draft; no ledger effect until confirmed
    pub async fn create(
        &self,
        actor: &ActorContext,
        input: CreatePurchaseInput,
    ) -> AppResult<PurchaseDetail> {
        if input.items.is_empty() {
            return Err(AppError::Validation {
                field: "items".to_string(),
                message: "Purchase must contain at least one item".to_string(),
            });
        }

        catalog::ensure_supplier(&self.db, input.supplier_id).await?;
        catalog::ensure_department(&self.db, input.department_id).await?;

        let mut total_amount = Decimal::ZERO;
        for item in &input.items {
            validate_quantity(item.quantity).map_err(|msg| AppError::Validation {
                field: "quantity".to_string(),
                message: msg.to_string(),
            })?;
            validate_unit_price(item.unit_price).map_err(|msg| AppError::Validation {
                field: "unit_price".to_string(),
                message: msg.to_string(),
            })?;
            catalog::ensure_product(&self.db, item.product_id).await?;
            total_amount += item.quantity * item.unit_price;
        }

        let mut attempt = 0;
        let purchase_id = loop {
            let mut tx = self.db.begin().await?;
            let number = numbering::next_document_number(&mut tx, NumberSeries::Purchase).await?;

            let inserted = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO purchases (number, date, supplier_id, department_id,
                                       total_amount, status, created_by, notes)
                VALUES ($1, $2, $3, $4, $5, 'draft', $6, $7)
                RETURNING id
                "#,
            )
            .bind(&number)
            .bind(input.date)
            .bind(input.supplier_id)
            .bind(input.department_id)
            .bind(total_amount)
            .bind(actor.user_id)
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await;

            match inserted {
                Ok(id) => {
                    for item in &input.items {
                        sqlx::query(
                            r#"
                            INSERT INTO purchase_items (purchase_id, product_id, quantity,
                                                        unit_price, total_price, notes)
                            VALUES ($1, $2, $3, $4, $5, $6)
                            "#,
                        )
                        .bind(id)
                        .bind(item.product_id)
                        .bind(item.quantity)
                        .bind(item.unit_price)
                        .bind(item.quantity * item.unit_price)
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
                            "Could not allocate a unique purchase number after {} attempts",
                            MAX_NUMBER_ATTEMPTS
                        )));
                    }
                    tracing::warn!(%number, attempt, "Purchase number collision, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        };

        self.get(purchase_id).await
    }

    /// Get a purchase with its items
    pub async fn get(&self, purchase_id: Uuid) -> AppResult<PurchaseDetail> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!("{} WHERE id = $1", SELECT_PURCHASE))
            .bind(purchase_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

        let items = sqlx::query_as::<_, PurchaseItemRow>(
            r#"
            SELECT id, purchase_id, product_id, quantity, unit_price, total_price, notes
            FROM purchase_items
            WHERE purchase_id = $1
            ORDER BY id
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.db)
        .await?;

        Ok(PurchaseDetail {
            purchase: row.into_model()?,
            items: items.into_iter().map(Into::into).collect(),
        })
    }

    /// List purchases with filters, newest first
    pub async fn list(
        &self,
        filter: PurchaseFilter,
        pagination: Pagination,
    ) -> AppResult<Vec<Purchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            r#"{}
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR supplier_id = $2)
              AND ($3::uuid IS NULL OR department_id = $3)
              AND ($4::date IS NULL OR date >= $4)
              AND ($5::date IS NULL OR date <= $5)
            ORDER BY date DESC, created_at DESC
            LIMIT $6 OFFSET $7
            "#,
            SELECT_PURCHASE
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.supplier_id)
        .bind(filter.department_id)
        .bind(filter.dates.from)
        .bind(filter.dates.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(PurchaseRow::into_model).collect()
    }

    /// Update mutable fields of a draft purchase
    pub async fn update(
        &self,
        purchase_id: Uuid,
        input: UpdatePurchaseInput,
    ) -> AppResult<PurchaseDetail> {
        let existing = self.get(purchase_id).await?;
        if !existing.purchase.status.is_draft() {
            return Err(AppError::InvalidStateTransition(
                "Can only update draft purchases".to_string(),
            ));
        }

        if let Some(supplier_id) = input.supplier_id {
            catalog::ensure_supplier(&self.db, supplier_id).await?;
        }

        let date = input.date.unwrap_or(existing.purchase.date);
        let supplier_id = input.supplier_id.unwrap_or(existing.purchase.supplier_id);
        let notes = input.notes.or(existing.purchase.notes);

        sqlx::query(
            r#"
            UPDATE purchases
            SET date = $1, supplier_id = $2, notes = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(date)
        .bind(supplier_id)
        .bind(&notes)
        .bind(purchase_id)
        .execute(&self.db)
        .await?;

        self.get(purchase_id).await
    }

    /// Confirm a draft purchase: emit one receipt movement per item with the
    /// negotiated purchase price as its unit cost, all-or-nothing
    pub async fn confirm(
        &self,
        purchase_id: Uuid,
        actor: &ActorContext,
    ) -> AppResult<PurchaseDetail> {
        let mut tx = self.db.begin().await?;

        // Lock the header so a concurrent confirm of the same document waits
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "{} WHERE id = $1 FOR UPDATE",
            SELECT_PURCHASE
        ))
        .bind(purchase_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

        let purchase = row.into_model()?;
        if !purchase.status.is_draft() {
            return Err(AppError::InvalidStateTransition(format!(
                "Purchase is already {}",
                purchase.status.as_str()
            )));
        }

        let items = sqlx::query_as::<_, PurchaseItemRow>(
            r#"
            SELECT id, purchase_id, product_id, quantity, unit_price, total_price, notes
            FROM purchase_items
            WHERE purchase_id = $1
            ORDER BY id
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&mut *tx)
        .await?;

        for item in &items {
            ledger::apply_movement(
                &mut tx,
                ledger::NewMovement {
                    movement_type: MovementType::Receipt,
                    product_id: item.product_id,
                    from_department_id: None,
                    to_department_id: Some(purchase.department_id),
                    quantity: item.quantity,
                    unit_cost: Some(item.unit_price),
                    reference_id: Some(purchase_id),
                    reference_type: Some(DocumentKind::Purchase),
                    performed_by: Some(actor.user_id),
                    notes: None,
                },
            )
            .await?;
        }

        sqlx::query("UPDATE purchases SET status = 'confirmed', updated_at = NOW() WHERE id = $1")
            .bind(purchase_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            number = %purchase.number,
            items = items.len(),
            "Purchase confirmed"
        );

        self.get(purchase_id).await
    }

    /// Cancel a draft purchase; terminal, no ledger effect
    pub async fn cancel(&self, purchase_id: Uuid) -> AppResult<()> {
        let existing = self.get(purchase_id).await?;
        if !existing.purchase.status.is_draft() {
            return Err(AppError::InvalidStateTransition(
                "Can only cancel draft purchases".to_string(),
            ));
        }

        sqlx::query("UPDATE purchases SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
            .bind(purchase_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
