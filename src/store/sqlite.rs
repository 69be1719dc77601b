use crate::error::StoreError;
use crate::models::Product;
use crate::store::{ProductStore, UpsertOutcome};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::info;

/// SQLite-backed product table with a unique constraint on `link`
pub struct SqliteProductStore {
    pool: SqlitePool,
    // Upserts are read-then-write; one at a time keeps them atomic per link
    write_lock: Mutex<()>,
}

impl SqliteProductStore {
    /// Open (creating if needed) the database file at `path` and ensure the schema
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Connect(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(StoreError::Connect)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::Connect)?;

        info!("✅ Product store open at {}", path.display());
        Self::with_pool(pool).await
    }

    /// Private in-memory database; a single connection so every query sees it
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(StoreError::Connect)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT,
                sku TEXT,
                name TEXT NOT NULL,
                price_text TEXT,
                price_value TEXT,
                image_url TEXT,
                link TEXT NOT NULL,
                category TEXT NOT NULL,
                availability_status TEXT NOT NULL,
                source_page TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(link)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Schema)?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_products_external_id ON products(external_id)",
            "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
            "CREATE INDEX IF NOT EXISTS idx_products_scraped_at ON products(scraped_at)",
        ] {
            sqlx::query(index)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Schema)?;
        }

        Ok(())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ProductStore for SqliteProductStore {
    async fn upsert_product(&self, product: &Product) -> Result<UpsertOutcome, StoreError> {
        let upsert_error = |source| StoreError::Upsert {
            link: product.link.clone(),
            source,
        };

        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let price_value = product.price_value.map(|v| v.to_string());

        let mut tx = self.pool.begin().await.map_err(upsert_error)?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE link = ?")
            .bind(&product.link)
            .fetch_optional(&mut *tx)
            .await
            .map_err(upsert_error)?;

        let outcome = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE products SET
                        external_id = ?, sku = ?, name = ?, price_text = ?, price_value = ?,
                        image_url = ?, category = ?, availability_status = ?,
                        source_page = ?, scraped_at = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&product.external_id)
                .bind(&product.sku)
                .bind(&product.name)
                .bind(&product.price_text)
                .bind(&price_value)
                .bind(&product.image_url)
                .bind(&product.category)
                .bind(product.availability_status.as_str())
                .bind(&product.source_page)
                .bind(product.scraped_at)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(upsert_error)?;
                UpsertOutcome::Updated
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO products (
                        external_id, sku, name, price_text, price_value, image_url, link,
                        category, availability_status, source_page, scraped_at,
                        created_at, updated_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&product.external_id)
                .bind(&product.sku)
                .bind(&product.name)
                .bind(&product.price_text)
                .bind(&price_value)
                .bind(&product.image_url)
                .bind(&product.link)
                .bind(&product.category)
                .bind(product.availability_status.as_str())
                .bind(&product.source_page)
                .bind(product.scraped_at)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(upsert_error)?;
                UpsertOutcome::Inserted
            }
        };

        tx.commit().await.map_err(upsert_error)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AvailabilityStatus;
    use crate::store::tests::product;
    use crate::store::{dedupe, persist_all};
    use chrono::DateTime;
    use rust_decimal::Decimal;
    use sqlx::Row;

    /// A stored row, including the timestamps the store manages
    #[derive(Debug, Clone, PartialEq)]
    struct StoredProduct {
        product: Product,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    async fn find_by_link(store: &SqliteProductStore, link: &str) -> Option<StoredProduct> {
        let row = sqlx::query(
            r#"
            SELECT external_id, sku, name, price_text, price_value, image_url, link,
                   category, availability_status, source_page, scraped_at,
                   created_at, updated_at
            FROM products WHERE link = ?
            "#,
        )
        .bind(link)
        .fetch_optional(&store.pool)
        .await
        .unwrap()?;

        let price_value: Option<String> = row.get("price_value");
        let availability: String = row.get("availability_status");
        Some(StoredProduct {
            product: Product {
                external_id: row.get("external_id"),
                sku: row.get("sku"),
                name: row.get("name"),
                price_text: row.get("price_text"),
                price_value: price_value.map(|v| Decimal::from_str(&v).unwrap()),
                image_url: row.get("image_url"),
                link: row.get("link"),
                category: row.get("category"),
                availability_status: AvailabilityStatus::from_stored(&availability),
                source_page: row.get("source_page"),
                scraped_at: row.get("scraped_at"),
            },
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    #[tokio::test]
    async fn second_upsert_updates_in_place_and_keeps_created_at() {
        let store = SqliteProductStore::in_memory().await.unwrap();
        let link = "https://loja.example/produto-1";

        let first = store
            .upsert_product(&product(link, "Grelha", "Bancada"))
            .await
            .unwrap();
        let created = find_by_link(&store, link).await.unwrap();

        let second = store
            .upsert_product(&product(link, "Grelha Inox", "Bancada"))
            .await
            .unwrap();
        let updated = find_by_link(&store, link).await.unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Updated);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(updated.product.name, "Grelha Inox");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn stores_every_field() {
        let store = SqliteProductStore::in_memory().await.unwrap();
        let mut original = product("https://loja.example/produto-2", "Espeto", "Acessórios");
        original.external_id = Some("202".into());
        original.sku = Some("ESP-2".into());
        original.price_value = Some(Decimal::new(151040, 2));
        original.image_url = Some("https://loja.example/img/2.jpg".into());
        original.availability_status = AvailabilityStatus::Unavailable;

        store.upsert_product(&original).await.unwrap();
        let stored = find_by_link(&store, &original.link).await.unwrap();

        assert_eq!(stored.product, original);
        assert_eq!(stored.created_at, stored.updated_at);
    }

    #[tokio::test]
    async fn duplicate_link_across_categories_leaves_the_last_one() {
        let store = SqliteProductStore::in_memory().await.unwrap();
        let link = "https://loja.example/kit-churrasco";
        let records = vec![
            product(link, "Kit Churrasco", "Bancada"),
            product("https://loja.example/outro", "Outro", "Bancada"),
            product(link, "Kit Churrasco", "Acessórios"),
        ];

        let stats = persist_all(&store, &dedupe(records)).await;

        assert_eq!(stats.inserted, 2);
        assert_eq!(store.count().await.unwrap(), 2);
        let stored = find_by_link(&store, link).await.unwrap();
        assert_eq!(stored.product.category, "Acessórios");
    }

    #[tokio::test]
    async fn reruns_update_instead_of_duplicating() {
        let store = SqliteProductStore::in_memory().await.unwrap();
        let set = dedupe(vec![
            product("https://loja.example/a", "A", "Bancada"),
            product("https://loja.example/b", "B", "Bancada"),
        ]);

        persist_all(&store, &set).await;
        let stats = persist_all(&store, &set).await;

        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.updated, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn connects_to_a_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("produtos.sqlite");

        let store = SqliteProductStore::connect(&path).await.unwrap();
        store
            .upsert_product(&product("https://loja.example/a", "A", "Bancada"))
            .await
            .unwrap();

        assert!(path.exists());
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
