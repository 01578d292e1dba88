//! Movement ledger: exclusive owner of stock-position mutation
//!
//! Every stock-changing operation goes through [`apply_movement`] inside an
//! active transaction: the position update(s) and the movement append commit
//! or roll back as one unit. Movements are never edited or removed once
//! written; `created_at` is the authoritative ordering key.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::models::{DocumentKind, MovementTransaction, MovementType, StockPosition};
use shared::types::{DateRange, Pagination};

use crate::error::{AppError, AppResult};

/// Read-side service over the ledger, shared by reporting consumers
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// Input for appending one movement to the ledger
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub movement_type: MovementType,
    pub product_id: Uuid,
    pub from_department_id: Option<Uuid>,
    pub to_department_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<DocumentKind>,
    pub performed_by: Option<Uuid>,
    pub notes: Option<String>,
}

/// Filters for movement history queries
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    /// Matches movements touching the department on either side
    pub department_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub dates: DateRange,
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    movement_type: String,
    product_id: Uuid,
    from_department_id: Option<Uuid>,
    to_department_id: Option<Uuid>,
    quantity: Decimal,
    unit_cost: Option<Decimal>,
    reference_id: Option<Uuid>,
    reference_type: Option<String>,
    performed_by: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl MovementRow {
    fn into_model(self) -> AppResult<MovementTransaction> {
        let movement_type = MovementType::from_str(&self.movement_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown movement type '{}'", self.movement_type))
        })?;
        let reference_type = match self.reference_type.as_deref() {
            None => None,
            Some("purchase") => Some(DocumentKind::Purchase),
            Some("transfer") => Some(DocumentKind::Transfer),
            Some("writeoff") => Some(DocumentKind::Writeoff),
            Some("inventory_count") => Some(DocumentKind::InventoryCount),
            Some(other) => {
                return Err(AppError::Internal(format!(
                    "Unknown movement reference type '{}'",
                    other
                )))
            }
        };
        Ok(MovementTransaction {
            id: self.id,
            movement_type,
            product_id: self.product_id,
            from_department_id: self.from_department_id,
            to_department_id: self.to_department_id,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            reference_id: self.reference_id,
            reference_type,
            performed_by: self.performed_by,
            notes: self.notes,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PositionRow {
    id: Uuid,
    product_id: Uuid,
    department_id: Uuid,
    quantity: Decimal,
    reserved_quantity: Decimal,
    last_updated: DateTime<Utc>,
}

impl From<PositionRow> for StockPosition {
    fn from(r: PositionRow) -> Self {
        StockPosition {
            id: r.id,
            product_id: r.product_id,
            department_id: r.department_id,
            quantity: r.quantity,
            reserved_quantity: r.reserved_quantity,
            last_updated: r.last_updated,
        }
    }
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Current on-hand quantity for a (product, department) pair, zero when
    /// no position exists yet
    pub async fn position_quantity(
        &self,
        product_id: Uuid,
        department_id: Uuid,
    ) -> AppResult<Decimal> {
        let quantity = sqlx::query_scalar::<_, Decimal>(
            "SELECT quantity FROM stock_positions WHERE product_id = $1 AND department_id = $2",
        )
        .bind(product_id)
        .bind(department_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(quantity.unwrap_or(Decimal::ZERO))
    }

    /// Full stock position, if one exists
    pub async fn get_position(
        &self,
        product_id: Uuid,
        department_id: Uuid,
    ) -> AppResult<Option<StockPosition>> {
        let row = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT id, product_id, department_id, quantity, reserved_quantity, last_updated
            FROM stock_positions
            WHERE product_id = $1 AND department_id = $2
            "#,
        )
        .bind(product_id)
        .bind(department_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Historical average unit cost of a product at a department.
    ///
    /// Plain arithmetic mean of `unit_cost` over inbound movements with a
    /// recorded cost, zero when none qualify. Deliberately not
    /// quantity-weighted; see `shared::validation::arithmetic_mean_cost`.
    pub async fn average_unit_cost(
        &self,
        product_id: Uuid,
        department_id: Uuid,
    ) -> AppResult<Decimal> {
        let avg = sqlx::query_scalar::<_, Option<Decimal>>(
            r#"
            SELECT AVG(unit_cost)
            FROM movement_transactions
            WHERE product_id = $1 AND to_department_id = $2 AND unit_cost IS NOT NULL
            "#,
        )
        .bind(product_id)
        .bind(department_id)
        .fetch_one(&self.db)
        .await?;

        Ok(avg.unwrap_or(Decimal::ZERO))
    }

    /// Movement history, newest first
    pub async fn list_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> AppResult<Vec<MovementTransaction>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, movement_type, product_id, from_department_id, to_department_id,
                   quantity, unit_cost, reference_id, reference_type, performed_by,
                   notes, created_at
            FROM movement_transactions
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR from_department_id = $2 OR to_department_id = $2)
              AND ($3::text IS NULL OR movement_type = $3)
              AND ($4::date IS NULL OR created_at >= $4)
              AND ($5::date IS NULL OR created_at < $5 + INTERVAL '1 day')
            ORDER BY created_at DESC, id DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.product_id)
        .bind(filter.department_id)
        .bind(filter.movement_type.map(|t| t.as_str()))
        .bind(filter.dates.from)
        .bind(filter.dates.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MovementRow::into_model).collect()
    }
}

/// Current quantity for a pair, locking the position row for the remainder
/// of the transaction. Confirmations use this so concurrent stock checks on
/// the same position serialize instead of racing.
pub async fn locked_position_quantity(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    department_id: Uuid,
) -> AppResult<Decimal> {
    let quantity = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT quantity FROM stock_positions
        WHERE product_id = $1 AND department_id = $2
        FOR UPDATE
        "#,
    )
    .bind(product_id)
    .bind(department_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(quantity.unwrap_or(Decimal::ZERO))
}

/// Average unit cost computed inside an active transaction, so a confirm
/// sees costs consistent with the rows it has locked
pub async fn average_unit_cost(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    department_id: Uuid,
) -> AppResult<Decimal> {
    let avg = sqlx::query_scalar::<_, Option<Decimal>>(
        r#"
        SELECT AVG(unit_cost)
        FROM movement_transactions
        WHERE product_id = $1 AND to_department_id = $2 AND unit_cost IS NOT NULL
        "#,
    )
    .bind(product_id)
    .bind(department_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(avg.unwrap_or(Decimal::ZERO))
}

/// Apply one movement: increase the `to` position, decrease the `from`
/// position, and append the transaction record, all within the caller's
/// transaction.
///
/// The decrement is guarded in the UPDATE itself; a decrease that would take
/// the quantity negative fails with `InsufficientStock` and the store never
/// clamps. Callers pre-check with [`locked_position_quantity`] for precise
/// error reporting, but the guard holds regardless.
pub async fn apply_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: NewMovement,
) -> AppResult<MovementTransaction> {
    if movement.quantity <= Decimal::ZERO {
        return Err(AppError::Validation {
            field: "quantity".to_string(),
            message: "Movement quantity must be positive".to_string(),
        });
    }
    if movement.from_department_id.is_none() && movement.to_department_id.is_none() {
        return Err(AppError::Validation {
            field: "department".to_string(),
            message: "Movement must touch at least one department".to_string(),
        });
    }

    if let Some(to_department) = movement.to_department_id {
        increase_position(tx, movement.product_id, to_department, movement.quantity).await?;
    }

    if let Some(from_department) = movement.from_department_id {
        decrease_position(tx, movement.product_id, from_department, movement.quantity).await?;
    }

    append_movement(tx, movement).await
}

/// Append the movement record without touching positions. Used by count
/// approval, which sets position quantities absolutely rather than by delta.
pub async fn append_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: NewMovement,
) -> AppResult<MovementTransaction> {
    let row = sqlx::query_as::<_, MovementRow>(
        r#"
        INSERT INTO movement_transactions (
            movement_type, product_id, from_department_id, to_department_id,
            quantity, unit_cost, reference_id, reference_type, performed_by, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id, movement_type, product_id, from_department_id, to_department_id,
                  quantity, unit_cost, reference_id, reference_type, performed_by,
                  notes, created_at
        "#,
    )
    .bind(movement.movement_type.as_str())
    .bind(movement.product_id)
    .bind(movement.from_department_id)
    .bind(movement.to_department_id)
    .bind(movement.quantity)
    .bind(movement.unit_cost)
    .bind(movement.reference_id)
    .bind(movement.reference_type.map(|k| k.as_str()))
    .bind(movement.performed_by)
    .bind(&movement.notes)
    .fetch_one(&mut **tx)
    .await?;

    row.into_model()
}

/// Set a position's quantity to an absolute value, creating the position if
/// absent. Only count approval uses this; everything else moves by delta.
pub async fn set_position_quantity(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    department_id: Uuid,
    quantity: Decimal,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_positions (product_id, department_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (product_id, department_id)
        DO UPDATE SET quantity = EXCLUDED.quantity, last_updated = NOW()
        "#,
    )
    .bind(product_id)
    .bind(department_id)
    .bind(quantity)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn increase_position(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    department_id: Uuid,
    quantity: Decimal,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_positions (product_id, department_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (product_id, department_id)
        DO UPDATE SET quantity = stock_positions.quantity + EXCLUDED.quantity,
                      last_updated = NOW()
        "#,
    )
    .bind(product_id)
    .bind(department_id)
    .bind(quantity)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn decrease_position(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    department_id: Uuid,
    quantity: Decimal,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE stock_positions
        SET quantity = quantity - $3, last_updated = NOW()
        WHERE product_id = $1 AND department_id = $2 AND quantity >= $3
        "#,
    )
    .bind(product_id)
    .bind(department_id)
    .bind(quantity)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        let available = sqlx::query_scalar::<_, Decimal>(
            "SELECT quantity FROM stock_positions WHERE product_id = $1 AND department_id = $2",
        )
        .bind(product_id)
        .bind(department_id)
        .fetch_optional(&mut **tx)
        .await?
        .unwrap_or(Decimal::ZERO);

        let product_name = product_name(tx, product_id).await?;

        return Err(AppError::InsufficientStock {
            product_id,
            product_name,
            available,
            requested: quantity,
        });
    }

    Ok(())
}

/// Product display name for error messages, falling back to the id
pub async fn product_name(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
) -> AppResult<String> {
    let name = sqlx::query_scalar::<_, String>("SELECT name FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(name.unwrap_or_else(|| product_id.to_string()))
}
