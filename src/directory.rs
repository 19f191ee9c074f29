//! The persisted user directory, as seen by the matchmaker.
//!
//! Registration and credentials belong to another service. The matchmaker
//! only reads "who is available with this role and these categories" and
//! flips availability flags. The SQLite implementation lives in
//! [`crate::db::DirectoryRepository`].

use crate::db::DbError;
use async_trait::async_trait;
use serde::Serialize;
use supportline_proto::{CategorySet, Role};

/// A directory row offered as a match candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub role: Role,
    pub categories: CategorySet,
    /// Unix milliseconds.
    pub last_active: i64,
}

/// Outcome of the availability compare-and-set that commits a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Both rows were available and are now unavailable.
    Claimed,
    /// The requester was matched by someone else in the meantime.
    RequesterTaken,
    /// The chosen counterpart was matched by someone else in the meantime.
    CounterpartTaken,
}

/// Totals for one role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub total: u64,
    pub available: u64,
}

/// Directory-wide counts served by `/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStats {
    pub listeners: RoleCounts,
    pub support_seekers: RoleCounts,
}

/// Query and update surface the matchmaker consumes.
///
/// Names are compared case-insensitively by every implementation.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Insert a row for `name` if none exists. New rows start unavailable.
    async fn ensure_user(&self, name: &str) -> Result<(), DbError>;

    /// Record the role and categories of a match request and mark the user
    /// available with a fresh `last_active`.
    async fn set_profile(
        &self,
        name: &str,
        role: Role,
        categories: &CategorySet,
    ) -> Result<(), DbError>;

    /// Up to `limit` available users with `role` whose categories intersect
    /// `categories`, most recently active first, never `exclude`.
    async fn find_candidates(
        &self,
        role: Role,
        categories: &CategorySet,
        exclude: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Candidate>, DbError>;

    /// Atomically mark both participants unavailable, provided neither is
    /// already unavailable. Absent names and unknown rows are skipped.
    async fn claim_pair(
        &self,
        requester: Option<&str>,
        counterpart: Option<&str>,
    ) -> Result<Claim, DbError>;

    /// Set the availability flag for each name.
    async fn set_available(&self, names: &[&str], available: bool) -> Result<(), DbError>;

    /// Mark available and refresh `last_active`.
    async fn mark_active(&self, name: &str) -> Result<(), DbError>;

    /// Per-role totals.
    async fn stats(&self) -> Result<DirectoryStats, DbError>;
}
