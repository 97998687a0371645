//! Catalog Store access layer.
//!
//! CRUD and bulk operations over product records keyed by unique code.
//! The unique index on `code` is the authoritative uniqueness check;
//! any pre-check elsewhere is advisory only. This layer never touches the
//! Asset Store — asset side effects belong to the coordinator.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{Page, Product, ProductDraft};

/// Rows per multi-value INSERT statement during bulk loads. Keeps each
/// statement well under SQLite's bind-parameter limit; all chunks run in
/// one transaction, so the batch still commits or aborts as a unit.
const BULK_CHUNK_ROWS: usize = 500;

#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> CatalogResult<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, code, name, description, price, image_ref FROM products WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| product_from_row(&r)).transpose()
    }

    pub async fn get_by_code(&self, code: &str) -> CatalogResult<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, code, name, description, price, image_ref FROM products WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| product_from_row(&r)).transpose()
    }

    /// Insert a new product and return its assigned id.
    ///
    /// A unique-constraint violation on `code` surfaces as
    /// [`CatalogError::DuplicateCode`]; everything else as
    /// [`CatalogError::StoreUnavailable`].
    pub async fn insert(
        &self,
        draft: &ProductDraft,
        image_ref: Option<&str>,
    ) -> CatalogResult<i64> {
        let result = sqlx::query(
            "INSERT INTO products (code, name, description, price, image_ref) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&draft.code)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(image_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_err(&draft.code, e))?;

        Ok(result.last_insert_rowid())
    }

    /// Rewrite all fields of an existing product, including its image
    /// reference. The caller passes the resolved final `image_ref`.
    pub async fn update(
        &self,
        id: i64,
        draft: &ProductDraft,
        image_ref: Option<&str>,
    ) -> CatalogResult<()> {
        let result = sqlx::query(
            "UPDATE products SET code = ?, name = ?, description = ?, price = ?, image_ref = ? WHERE id = ?",
        )
        .bind(&draft.code)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(image_ref)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_err(&draft.code, e))?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound);
        }
        Ok(())
    }

    /// Set or clear only the image reference of an existing product.
    pub async fn set_image_ref(&self, id: i64, image_ref: Option<&str>) -> CatalogResult<()> {
        let result = sqlx::query("UPDATE products SET image_ref = ? WHERE id = ?")
            .bind(image_ref)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound);
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> CatalogResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound);
        }
        Ok(())
    }

    /// Bulk-insert staged rows with insert-or-ignore-on-duplicate-code
    /// semantics, returning how many were actually inserted.
    ///
    /// Codes already present — previously committed or duplicated within
    /// the batch — are silently skipped, never aborting the batch. All
    /// statements run in one transaction: a connectivity failure rolls the
    /// whole batch back with nothing committed.
    pub async fn bulk_insert_ignore_duplicates(
        &self,
        rows: &[ProductDraft],
    ) -> CatalogResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in rows.chunks(BULK_CHUNK_ROWS) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO products (code, name, description, price) ");
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.code)
                    .push_bind(&row.name)
                    .push_bind(&row.description)
                    .push_bind(row.price);
            });
            qb.push(" ON CONFLICT(code) DO NOTHING");

            let result = qb.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Filtered, paginated read. `filter` is a case-insensitive substring
    /// match on name or code. Newest first by default; name order when a
    /// filter is active.
    pub async fn list(
        &self,
        filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> CatalogResult<Vec<Product>> {
        let rows = match filter {
            Some(f) => {
                let pattern = like_pattern(f);
                sqlx::query(
                    "SELECT id, code, name, description, price, image_ref FROM products \
                     WHERE name LIKE ?1 OR code LIKE ?1 \
                     ORDER BY name ASC LIMIT ?2 OFFSET ?3",
                )
                .bind(pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, code, name, description, price, image_ref FROM products \
                     ORDER BY id DESC LIMIT ?1 OFFSET ?2",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(product_from_row).collect()
    }

    pub async fn count(&self, filter: Option<&str>) -> CatalogResult<i64> {
        let count: i64 = match filter {
            Some(f) => {
                sqlx::query_scalar(
                    "SELECT COUNT(id) FROM products WHERE name LIKE ?1 OR code LIKE ?1",
                )
                .bind(like_pattern(f))
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(id) FROM products")
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(count)
    }
}

/// Listing layer: assemble one page of results. `page` is 1-based and
/// clamped; an all-whitespace filter counts as no filter.
pub async fn list_products(
    store: &CatalogStore,
    filter: Option<&str>,
    page: i64,
    page_size: i64,
) -> CatalogResult<Page> {
    let filter = filter.map(str::trim).filter(|f| !f.is_empty());
    let page = page.max(1);
    let page_size = page_size.max(1);

    let total_count = store.count(filter).await?;
    let page_count = (total_count + page_size - 1) / page_size;

    let offset = (page - 1) * page_size;
    let items = store.list(filter, page_size, offset).await?;

    Ok(Page {
        items,
        total_count,
        page,
        page_count,
    })
}

fn product_from_row(row: &SqliteRow) -> CatalogResult<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        image_ref: row.try_get("image_ref")?,
    })
}

/// SQLite LIKE is case-insensitive for ASCII; `%` wildcards are added
/// here, not in the SQL text.
fn like_pattern(filter: &str) -> String {
    format!("%{}%", filter.trim())
}

fn map_write_err(code: &str, e: sqlx::Error) -> CatalogError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return CatalogError::DuplicateCode(code.to_string());
        }
    }
    CatalogError::StoreUnavailable(e.to_string())
}
