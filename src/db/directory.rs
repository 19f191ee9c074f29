//! SQLite-backed user directory.
//!
//! Category overlap is evaluated in SQL with `json_each`, then re-checked
//! after normalizing the stored text, since rows written by other services
//! may carry categories as strings or as garbage.

use super::DbError;
use crate::directory::{Candidate, Claim, Directory, DirectoryStats, RoleCounts};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::str::FromStr;
use supportline_proto::{CategorySet, Role};

/// Repository for directory operations.
#[derive(Clone)]
pub struct DirectoryRepository {
    pool: SqlitePool,
    auto_register: bool,
}

impl DirectoryRepository {
    /// Create a new directory repository.
    pub fn new(pool: SqlitePool, auto_register: bool) -> Self {
        Self {
            pool,
            auto_register,
        }
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl Directory for DirectoryRepository {
    async fn ensure_user(&self, name: &str) -> Result<(), DbError> {
        if !self.auto_register {
            return Ok(());
        }
        let now = Self::now_millis();
        sqlx::query(
            r#"
            INSERT INTO users (name, categories, is_available, last_active, created_at)
            VALUES (?, '[]', 0, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_profile(
        &self,
        name: &str,
        role: Role,
        categories: &CategorySet,
    ) -> Result<(), DbError> {
        let now = Self::now_millis();
        let query = if self.auto_register {
            r#"
            INSERT INTO users (name, role, categories, is_available, last_active, created_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            ON CONFLICT(name) DO UPDATE SET
                role = excluded.role,
                categories = excluded.categories,
                is_available = 1,
                last_active = excluded.last_active
            "#
        } else {
            r#"
            UPDATE users
            SET role = ?2, categories = ?3, is_available = 1, last_active = ?4
            WHERE name = ?1
            "#
        };
        sqlx::query(query)
            .bind(name)
            .bind(role.as_str())
            .bind(categories.to_json())
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_candidates(
        &self,
        role: Role,
        categories: &CategorySet,
        exclude: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Candidate>, DbError> {
        if categories.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // `name <> ?` compares with the column's NOCASE collation.
        let rows: Vec<(String, Option<String>, String, i64)> = sqlx::query_as(
            r#"
            SELECT name, role, categories, last_active
            FROM users
            WHERE role = ?1
              AND is_available = 1
              AND (?2 IS NULL OR name <> ?2)
              AND EXISTS (
                  SELECT 1
                  FROM json_each(CASE WHEN json_valid(users.categories)
                                      THEN users.categories ELSE '[]' END) AS mine
                  WHERE CAST(mine.value AS INTEGER) IN (SELECT value FROM json_each(?3))
              )
            ORDER BY last_active DESC, id ASC
            LIMIT ?4
            "#,
        )
        .bind(role.as_str())
        .bind(exclude)
        .bind(categories.to_json())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .into_iter()
            .filter_map(|(name, row_role, row_categories, last_active)| {
                let row_role = Role::from_str(row_role.as_deref()?).ok()?;
                let row_categories = CategorySet::from_json(&row_categories);
                if row_role != role || !row_categories.overlaps(categories) {
                    return None;
                }
                Some(Candidate {
                    name,
                    role: row_role,
                    categories: row_categories,
                    last_active,
                })
            })
            .collect();

        Ok(candidates)
    }

    async fn claim_pair(
        &self,
        requester: Option<&str>,
        counterpart: Option<&str>,
    ) -> Result<Claim, DbError> {
        let mut tx = self.pool.begin().await?;

        for (name, taken) in [
            (requester, Claim::RequesterTaken),
            (counterpart, Claim::CounterpartTaken),
        ] {
            let Some(name) = name else { continue };

            let updated = sqlx::query(
                "UPDATE users SET is_available = 0 WHERE name = ? AND is_available = 1",
            )
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&mut *tx)
                    .await?;
                if exists.is_some() {
                    tx.rollback().await?;
                    return Ok(taken);
                }
            }
        }

        tx.commit().await?;
        Ok(Claim::Claimed)
    }

    async fn set_available(&self, names: &[&str], available: bool) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for name in names {
            sqlx::query("UPDATE users SET is_available = ? WHERE name = ?")
                .bind(available)
                .bind(*name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_active(&self, name: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET is_available = 1, last_active = ? WHERE name = ?")
            .bind(Self::now_millis())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<DirectoryStats, DbError> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT role, COUNT(*), COALESCE(SUM(is_available), 0)
            FROM users
            WHERE role IS NOT NULL
            GROUP BY role
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = DirectoryStats::default();
        for (role, total, available) in rows {
            let counts = RoleCounts {
                total: u64::try_from(total).unwrap_or_default(),
                available: u64::try_from(available).unwrap_or_default(),
            };
            match Role::from_str(&role) {
                Ok(Role::Listener) => stats.listeners = counts,
                Ok(Role::SupportSeeker) => stats.support_seekers = counts,
                Err(_) => {}
            }
        }
        Ok(stats)
    }
}
