//! Existence checks against the catalog tables
//!
//! The engine references products, departments and suppliers by id only;
//! catalog administration happens elsewhere. These lookups validate incoming
//! document references before anything is written.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub async fn ensure_department(db: &PgPool, department_id: Uuid) -> AppResult<()> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM departments WHERE id = $1)")
            .bind(department_id)
            .fetch_one(db)
            .await?;

    if !exists {
        return Err(AppError::NotFound("Department".to_string()));
    }
    Ok(())
}

pub async fn ensure_supplier(db: &PgPool, supplier_id: Uuid) -> AppResult<()> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM suppliers WHERE id = $1)")
            .bind(supplier_id)
            .fetch_one(db)
            .await?;

    if !exists {
        return Err(AppError::NotFound("Supplier".to_string()));
    }
    Ok(())
}

pub async fn ensure_product(db: &PgPool, product_id: Uuid) -> AppResult<()> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(db)
            .await?;

    if !exists {
        return Err(AppError::NotFound(format!("Product {}", product_id)));
    }
    Ok(())
}

/// Product display name, falling back to the id for deleted references
pub async fn product_display_name(db: &PgPool, product_id: Uuid) -> AppResult<String> {
    let name = sqlx::query_scalar::<_, String>("SELECT name FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(db)
        .await?;

    Ok(name.unwrap_or_else(|| product_id.to_string()))
}

/// Department display name, falling back to the id
pub async fn department_display_name(db: &PgPool, department_id: Uuid) -> AppResult<String> {
    let name = sqlx::query_scalar::<_, String>("SELECT name FROM departments WHERE id = $1")
        .bind(department_id)
        .fetch_optional(db)
        .await?;

    Ok(name.unwrap_or_else(|| department_id.to_string()))
}
