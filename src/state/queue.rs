//! The match queue: users whose request found no counterpart yet.
//!
//! Entries are kept in insertion order and keyed by identity, so a user has
//! at most one outstanding request. Re-queuing replaces the old entry and
//! moves it to the back.

use super::ConnId;
use std::collections::VecDeque;
use std::time::Instant;
use supportline_proto::{CategorySet, Role, name_key};

/// Identity a queue entry is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueueKey {
    /// Case-folded bound name.
    Named(String),
    /// Nameless requester, keyed by its connection.
    Anonymous(ConnId),
}

impl QueueKey {
    pub fn for_requester(conn: &ConnId, name: Option<&str>) -> Self {
        match name {
            Some(name) => Self::Named(name_key(name)),
            None => Self::Anonymous(conn.clone()),
        }
    }
}

/// A pending match request.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub key: QueueKey,
    pub conn: ConnId,
    /// Display name as the user typed it.
    pub name: Option<String>,
    pub role: Role,
    pub categories: CategorySet,
    pub enqueued_at: Instant,
}

impl QueueEntry {
    pub fn new(conn: ConnId, name: Option<String>, role: Role, categories: CategorySet) -> Self {
        Self {
            key: QueueKey::for_requester(&conn, name.as_deref()),
            conn,
            name,
            role,
            categories,
            enqueued_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MatchQueue {
    entries: VecDeque<QueueEntry>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `entry.key`.
    ///
    /// Returns `true` if an older entry was replaced.
    pub fn enqueue(&mut self, entry: QueueEntry) -> bool {
        let replaced = self.remove(&entry.key).is_some();
        self.entries.push_back(entry);
        replaced
    }

    /// Put an entry back at the head of the queue, unless its owner has
    /// queued a newer request in the meantime.
    pub fn restore(&mut self, entry: QueueEntry) -> bool {
        if self.contains(&entry.key) {
            return false;
        }
        self.entries.push_front(entry);
        true
    }

    /// Remove and return the oldest entry with `role` whose categories
    /// intersect `categories`, skipping the requester's own key.
    pub fn take_first_match(
        &mut self,
        requester: &QueueKey,
        role: Role,
        categories: &CategorySet,
    ) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|entry| {
            &entry.key != requester && entry.role == role && entry.categories.overlaps(categories)
        })?;
        self.entries.remove(index)
    }

    pub fn remove(&mut self, key: &QueueKey) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|entry| &entry.key == key)?;
        self.entries.remove(index)
    }

    /// Drop every entry owned by `conn`.
    pub fn remove_conn(&mut self, conn: &ConnId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.conn != conn);
        before - self.entries.len()
    }

    pub fn contains(&self, key: &QueueKey) -> bool {
        self.entries.iter().any(|entry| &entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
