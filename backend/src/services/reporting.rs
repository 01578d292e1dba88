//! Read-side valuation and stock reports
//!
//! Everything here is derived from stock positions and the movement ledger;
//! nothing is written. Valuations price each position at the arithmetic
//! average of recorded inbound unit costs for that product and department.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::models::StockPosition;
use shared::types::Pagination;

use crate::error::{AppError, AppResult};

/// Reporting service over positions and the ledger
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// Filters for the stock overview
#[derive(Debug, Clone, Default)]
pub struct StockFilter {
    pub department_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    /// Include positions counted down to zero
    pub show_zero: bool,
}

/// One valued stock position
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockValuation {
    pub product_id: Uuid,
    pub product_name: String,
    pub department_id: Uuid,
    pub department_name: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub total_value: Decimal,
}

/// Aggregate position of one department
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DepartmentSummary {
    pub department_id: Uuid,
    pub department_name: String,
    /// Positions with stock on hand
    pub total_items: i64,
    /// Sum of quantity times average cost over those positions
    pub total_value: Decimal,
}

/// Position below its product's minimum stock level
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LowStockItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub department_id: Uuid,
    pub department_name: String,
    pub quantity: Decimal,
    pub min_stock_level: Decimal,
}

#[derive(Debug, FromRow)]
struct PositionRow {
    id: Uuid,
    product_id: Uuid,
    department_id: Uuid,
    quantity: Decimal,
    reserved_quantity: Decimal,
    last_updated: chrono::DateTime<chrono::Utc>,
}

/// Correlated average over inbound costed movements, zero when none exist.
/// The same formula backs transfer and write-off costing.
const AVG_COST_SUBQUERY: &str = r#"
    COALESCE((
        SELECT AVG(mt.unit_cost)
        FROM movement_transactions mt
        WHERE mt.product_id = sp.product_id
          AND mt.to_department_id = sp.department_id
          AND mt.unit_cost IS NOT NULL
    ), 0)
"#;

impl ReportingService {
    /// Create a new ReportingService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Stock positions, optionally filtered, zero positions hidden by default
    pub async fn stock_overview(
        &self,
        filter: StockFilter,
        pagination: Pagination,
    ) -> AppResult<Vec<StockPosition>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT id, product_id, department_id, quantity, reserved_quantity, last_updated
            FROM stock_positions
            WHERE ($1::uuid IS NULL OR department_id = $1)
              AND ($2::uuid IS NULL OR product_id = $2)
              AND ($3 OR quantity > 0)
            ORDER BY department_id, product_id
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.department_id)
        .bind(filter.product_id)
        .bind(filter.show_zero)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StockPosition {
                id: r.id,
                product_id: r.product_id,
                department_id: r.department_id,
                quantity: r.quantity,
                reserved_quantity: r.reserved_quantity,
                last_updated: r.last_updated,
            })
            .collect())
    }

    /// Value every non-zero position, optionally for one department
    pub async fn stock_valuations(
        &self,
        department_id: Option<Uuid>,
    ) -> AppResult<Vec<StockValuation>> {
        let sql = format!(
            r#"
            SELECT sp.product_id,
                   p.name AS product_name,
                   sp.department_id,
                   d.name AS department_name,
                   sp.quantity,
                   {avg} AS average_cost,
                   sp.quantity * {avg} AS total_value
            FROM stock_positions sp
            JOIN products p ON p.id = sp.product_id
            JOIN departments d ON d.id = sp.department_id
            WHERE sp.quantity > 0
              AND ($1::uuid IS NULL OR sp.department_id = $1)
            ORDER BY d.name, p.name
            "#,
            avg = AVG_COST_SUBQUERY
        );

        let valuations = sqlx::query_as::<_, StockValuation>(&sql)
            .bind(department_id)
            .fetch_all(&self.db)
            .await?;

        Ok(valuations)
    }

    /// Item count and total value of one department's stock on hand
    pub async fn department_summary(&self, department_id: Uuid) -> AppResult<DepartmentSummary> {
        let sql = format!(
            r#"
            SELECT d.id AS department_id,
                   d.name AS department_name,
                   COUNT(sp.id) AS total_items,
                   COALESCE(SUM(sp.quantity * {avg}), 0) AS total_value
            FROM departments d
            LEFT JOIN stock_positions sp
                   ON sp.department_id = d.id AND sp.quantity > 0
            WHERE d.id = $1
            GROUP BY d.id, d.name
            "#,
            avg = AVG_COST_SUBQUERY
        );

        sqlx::query_as::<_, DepartmentSummary>(&sql)
            .bind(department_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Department".to_string()))
    }

    /// Positions currently below their product's minimum stock level.
    /// Products without a configured minimum are never reported.
    pub async fn low_stock_items(&self) -> AppResult<Vec<LowStockItem>> {
        let items = sqlx::query_as::<_, LowStockItem>(
            r#"
            SELECT sp.product_id,
                   p.name AS product_name,
                   sp.department_id,
                   d.name AS department_name,
                   sp.quantity,
                   p.min_stock_level
            FROM stock_positions sp
            JOIN products p ON p.id = sp.product_id
            JOIN departments d ON d.id = sp.department_id
            WHERE p.min_stock_level IS NOT NULL
              AND p.min_stock_level > 0
              AND sp.quantity < p.min_stock_level
            ORDER BY d.name, p.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }
}
