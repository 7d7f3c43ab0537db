//! # Product Repository
//!
//! Database operations for the catalog.
//!
//! ## Pages
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The terminal shows one page at a time, at most PAGE_CAPACITY tiles.    │
//! │                                                                         │
//! │   page 1: [Wasser] [Cola] [...]   (≤ 9 active products)                 │
//! │   page 2: [Mate]   [...]                                                │
//! │                                                                         │
//! │  Capacity is checked on insert and on page moves. Soft-deleted          │
//! │  products free their slot.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is written by [`crate::Ledger`] only; `insert` sets the opening
//! stock and `update` leaves it alone.

use kasse_core::validation::{validate_page_capacity, validate_product_draft};
use kasse_core::{Product, ProductDraft};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::PRODUCT_COLUMNS;
use crate::error::{DbError, DbResult};

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Lists active products ordered by page, then id.
    pub async fn list_active(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE active = 1 ORDER BY page, id",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Lists every product including soft-deleted ones.
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {} FROM products ORDER BY page, id", PRODUCT_COLUMNS);
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found (active or not)
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Inserts a product after validating the draft and the page's capacity.
    pub async fn insert(&self, draft: &ProductDraft) -> DbResult<Product> {
        validate_product_draft(draft)?;

        let mut tx = self.pool.begin().await?;

        let occupied = count_on_page(&mut *tx, draft.page, None).await?;
        validate_page_capacity(draft.page, occupied)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (name, price_cents, image, stock, min_stock, page, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
            RETURNING id
            "#,
        )
        .bind(draft.name.trim())
        .bind(draft.price_cents)
        .bind(&draft.image)
        .bind(draft.stock)
        .bind(draft.min_stock)
        .bind(draft.page)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(product_id = id, page = draft.page, "Product created");
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Updates an active product's descriptive fields.
    ///
    /// `draft.stock` is ignored; stock moves only through the ledger.
    pub async fn update(&self, id: i64, draft: &ProductDraft) -> DbResult<Product> {
        validate_product_draft(draft)?;

        let mut tx = self.pool.begin().await?;

        let occupied = count_on_page(&mut *tx, draft.page, Some(id)).await?;
        validate_page_capacity(draft.page, occupied)?;

        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = ?2, price_cents = ?3, image = ?4, min_stock = ?5, page = ?6
            WHERE id = ?1 AND active = 1
            "#,
        )
        .bind(id)
        .bind(draft.name.trim())
        .bind(draft.price_cents)
        .bind(&draft.image)
        .bind(draft.min_stock)
        .bind(draft.page)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        tx.commit().await?;

        debug!(product_id = id, "Product updated");
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Soft-deletes a product by setting active = 0.
    ///
    /// Historical transactions and restocks still reference this product.
    pub async fn soft_delete(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET active = 0 WHERE id = ?1 AND active = 1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        info!(product_id = id, "Product deactivated");
        Ok(())
    }

    /// Distinct pages holding at least one active product, ascending.
    pub async fn pages(&self) -> DbResult<Vec<i64>> {
        let pages = sqlx::query_scalar("SELECT DISTINCT page FROM products WHERE active = 1 ORDER BY page")
            .fetch_all(&self.pool)
            .await?;
        Ok(pages)
    }

    /// Counts active products (for diagnostics and seeding).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Active products on `page`, optionally excluding one id.
async fn count_on_page(conn: &mut SqliteConnection, page: i64, excluding: Option<i64>) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products WHERE active = 1 AND page = ?1 AND (?2 IS NULL OR id <> ?2)",
    )
    .bind(page)
    .bind(excluding)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use kasse_core::{ValidationError, PAGE_CAPACITY};

    async fn repo() -> ProductRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().products()
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let repo = repo().await;
        let wasser = repo
            .insert(&ProductDraft::new("Wasser", 150).with_stock(24))
            .await
            .unwrap();
        repo.insert(&ProductDraft::new("Cola", 200).with_stock(12).on_page(2))
            .await
            .unwrap();

        assert_eq!(wasser.stock, 24);
        assert!(wasser.active);

        let names: Vec<String> = repo.list_active().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Wasser".to_string(), "Cola".to_string()]);
        assert_eq!(repo.pages().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_page_capacity_enforced() {
        let repo = repo().await;
        let mut ids = Vec::new();
        for i in 0..PAGE_CAPACITY {
            ids.push(repo.insert(&ProductDraft::new(format!("P{}", i), 100)).await.unwrap().id);
        }

        let err = repo.insert(&ProductDraft::new("Overflow", 100)).await.unwrap_err();
        assert!(matches!(err, DbError::Invalid(ValidationError::PageFull { page: 1, .. })));

        // Editing a product already on the full page is fine
        repo.update(ids[0], &ProductDraft::new("P0 renamed", 120)).await.unwrap();

        // Moving a product onto a full page is not
        let other = repo.insert(&ProductDraft::new("Mate", 250).on_page(2)).await.unwrap();
        assert!(repo.update(other.id, &ProductDraft::new("Mate", 250)).await.is_err());

        // Deleting frees a slot
        repo.soft_delete(ids[1]).await.unwrap();
        repo.insert(&ProductDraft::new("Fits now", 100)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_ignores_stock() {
        let repo = repo().await;
        let p = repo.insert(&ProductDraft::new("Wasser", 150).with_stock(5)).await.unwrap();
        let updated = repo
            .update(p.id, &ProductDraft::new("Wasser still", 160).with_stock(999))
            .await
            .unwrap();
        assert_eq!(updated.stock, 5);
        assert_eq!(updated.price_cents, 160);
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let repo = repo().await;
        let p = repo.insert(&ProductDraft::new("Wasser", 150)).await.unwrap();
        repo.soft_delete(p.id).await.unwrap();

        assert!(repo.list_active().await.unwrap().is_empty());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
        assert!(!repo.get_by_id(p.id).await.unwrap().unwrap().active);
        assert!(matches!(repo.soft_delete(p.id).await, Err(DbError::NotFound { .. })));
        assert!(matches!(
            repo.update(p.id, &ProductDraft::new("Back", 1)).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
