//! Scrape-result cache: a system-wide, TTL-bounded memoization table keyed
//! by URL, independent of any job.
//!
//! A cache read answers "do we have *recent* data for this URL", nothing
//! more. The artifact files a row points to may have been deleted by the
//! retention cleaner, so callers must check the filesystem themselves
//! before trusting a hit.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "scrape_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Success,
    Failure,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: i64,
    pub url: String,
    pub dealership_name: String,
    pub last_scraped_at: DateTime<Utc>,
    pub inventory_path: Option<String>,
    pub tools_path: Option<String>,
    pub vehicle_count: i32,
    pub tools_count: i32,
    pub status: ScrapeStatus,
    pub error_message: Option<String>,
    pub cache_valid_until: DateTime<Utc>,
}

/// A scrape result to memoize. Saving resets the TTL window.
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub url: String,
    pub dealership_name: String,
    pub inventory_path: String,
    pub tools_path: String,
    pub vehicle_count: i32,
    pub tools_count: i32,
    pub status: ScrapeStatus,
    pub error_message: Option<String>,
}

/// TTL-bounded cache reads and upsert writes.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Entry for the URL, only if unexpired and the cached attempt
    /// succeeded. Does not check the filesystem; that is the caller's
    /// contract.
    async fn get(&self, url: &str) -> Result<Option<CacheEntry>>;

    /// Upsert: exactly one row per URL, all fields overwritten, TTL reset.
    async fn save(&self, entry: NewCacheEntry) -> Result<()>;

    /// Delete every expired row. Returns the count deleted.
    async fn sweep_expired(&self) -> Result<u64>;

    /// Count expired rows without deleting (dry-run support).
    async fn count_expired(&self) -> Result<u64>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

pub struct PgCacheStore {
    pool: PgPool,
    ttl: Duration,
}

impl PgCacheStore {
    pub fn new(pool: PgPool, ttl_days: i64) -> Self {
        Self {
            pool,
            ttl: Duration::days(ttl_days),
        }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, url: &str) -> Result<Option<CacheEntry>> {
        let entry = sqlx::query_as::<_, CacheEntry>(
            r#"
            SELECT id, url, dealership_name, last_scraped_at, inventory_path,
                   tools_path, vehicle_count, tools_count, status,
                   error_message, cache_valid_until
            FROM cached_sites
            WHERE url = $1
              AND cache_valid_until > NOW()
              AND status = 'success'
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn save(&self, entry: NewCacheEntry) -> Result<()> {
        let cache_valid_until = Utc::now() + self.ttl;

        sqlx::query(
            r#"
            INSERT INTO cached_sites (
                url, dealership_name, last_scraped_at, inventory_path,
                tools_path, vehicle_count, tools_count, status,
                error_message, cache_valid_until
            ) VALUES ($1, $2, NOW(), $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (url) DO UPDATE SET
                dealership_name = EXCLUDED.dealership_name,
                last_scraped_at = NOW(),
                inventory_path = EXCLUDED.inventory_path,
                tools_path = EXCLUDED.tools_path,
                vehicle_count = EXCLUDED.vehicle_count,
                tools_count = EXCLUDED.tools_count,
                status = EXCLUDED.status,
                error_message = EXCLUDED.error_message,
                cache_valid_until = EXCLUDED.cache_valid_until
            "#,
        )
        .bind(&entry.url)
        .bind(&entry.dealership_name)
        .bind(&entry.inventory_path)
        .bind(&entry.tools_path)
        .bind(entry.vehicle_count)
        .bind(entry.tools_count)
        .bind(entry.status)
        .bind(&entry.error_message)
        .bind(cache_valid_until)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cached_sites WHERE cache_valid_until < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_expired(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cached_sites WHERE cache_valid_until < NOW()",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }
}

// ============================================================================
// In-memory implementation (testing)
// ============================================================================

/// Cache store backed by a map, for tests.
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    next_id: std::sync::atomic::AtomicI64,
}

impl InMemoryCacheStore {
    pub fn new(ttl_days: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::days(ttl_days),
            next_id: std::sync::atomic::AtomicI64::new(1),
        }
    }

    /// Seed a row directly, bypassing TTL computation (expiry tests).
    pub fn insert_raw(&self, entry: CacheEntry) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry.url.clone(), entry);
    }

    /// Snapshot of a row regardless of validity.
    pub fn peek(&self, url: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, url: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(url)
            .filter(|e| e.cache_valid_until > Utc::now() && e.status == ScrapeStatus::Success)
            .cloned())
    }

    async fn save(&self, entry: NewCacheEntry) -> Result<()> {
        let now = Utc::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        let id = entries.get(&entry.url).map(|e| e.id).unwrap_or_else(|| {
            self.next_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
        });

        entries.insert(
            entry.url.clone(),
            CacheEntry {
                id,
                url: entry.url,
                dealership_name: entry.dealership_name,
                last_scraped_at: now,
                inventory_path: Some(entry.inventory_path),
                tools_path: Some(entry.tools_path),
                vehicle_count: entry.vehicle_count,
                tools_count: entry.tools_count,
                status: entry.status,
                error_message: entry.error_message,
                cache_valid_until: now + self.ttl,
            },
        );

        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.cache_valid_until >= now);
        Ok((before - entries.len()) as u64)
    }

    async fn count_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .values()
            .filter(|e| e.cache_valid_until < now)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrape_result(url: &str) -> NewCacheEntry {
        NewCacheEntry {
            url: url.to_string(),
            dealership_name: "Some Dealer".to_string(),
            inventory_path: "data/inv.json".to_string(),
            tools_path: "data/tools.json".to_string(),
            vehicle_count: 42,
            tools_count: 5,
            status: ScrapeStatus::Success,
            error_message: None,
        }
    }

    fn expired_entry(url: &str) -> CacheEntry {
        CacheEntry {
            id: 99,
            url: url.to_string(),
            dealership_name: "Some Dealer".to_string(),
            last_scraped_at: Utc::now() - Duration::days(8),
            inventory_path: Some("data/inv.json".to_string()),
            tools_path: Some("data/tools.json".to_string()),
            vehicle_count: 42,
            tools_count: 5,
            status: ScrapeStatus::Success,
            error_message: None,
            cache_valid_until: Utc::now() - Duration::seconds(1),
        }
    }

    #[tokio::test]
    async fn saved_entry_is_a_hit() {
        let cache = InMemoryCacheStore::new(7);
        cache.save(scrape_result("https://a.example.com")).await.unwrap();

        let hit = cache.get("https://a.example.com").await.unwrap().unwrap();
        assert_eq!(hit.vehicle_count, 42);
        assert!(hit.cache_valid_until > Utc::now());
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_even_when_successful() {
        let cache = InMemoryCacheStore::new(7);
        cache.insert_raw(expired_entry("https://a.example.com"));

        assert!(cache.get("https://a.example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_entry_is_a_miss() {
        let cache = InMemoryCacheStore::new(7);
        let mut entry = expired_entry("https://a.example.com");
        entry.cache_valid_until = Utc::now() + Duration::days(1);
        entry.status = ScrapeStatus::Failure;
        cache.insert_raw(entry);

        assert!(cache.get("https://a.example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_twice_leaves_one_row_with_refreshed_values() {
        let cache = InMemoryCacheStore::new(7);
        let url = "https://a.example.com";
        cache.save(scrape_result(url)).await.unwrap();
        let first = cache.peek(url).unwrap();

        let mut second_result = scrape_result(url);
        second_result.vehicle_count = 100;
        cache.save(second_result).await.unwrap();

        let second = cache.peek(url).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.vehicle_count, 100);
        assert!(second.cache_valid_until >= first.cache_valid_until);
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired_rows() {
        let cache = InMemoryCacheStore::new(7);
        cache.insert_raw(expired_entry("https://old.example.com"));
        cache.save(scrape_result("https://fresh.example.com")).await.unwrap();

        assert_eq!(cache.count_expired().await.unwrap(), 1);
        assert_eq!(cache.sweep_expired().await.unwrap(), 1);
        assert!(cache.peek("https://old.example.com").is_none());
        assert!(cache.peek("https://fresh.example.com").is_some());
    }
}
