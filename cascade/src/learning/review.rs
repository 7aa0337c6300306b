//! Manual promotion review and the global pattern registry.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{PatternError, PatternResult};
use super::pattern::{LearnedPattern, PatternId, Scope};
use crate::types::TenantId;

/// A promotion waiting for an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub review_id: String,
    pub source_tenant_id: TenantId,
    pub pattern_id: PatternId,
    /// Scope the pattern would move to on approval
    pub target_scope: Scope,
    /// Pattern as it stood when queued
    pub pattern: LearnedPattern,
    pub requested_at: DateTime<Utc>,
}

/// Pending promotions, oldest first.
#[derive(Debug, Default)]
pub struct ReviewQueue {
    pending: RwLock<BTreeMap<String, ReviewItem>>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant: &TenantId, pattern: &PatternId, scope: Scope) -> String {
        format!("{}:{}:{}", tenant, scope, pattern.short())
    }

    /// Queue a promotion. Returns `None` if the same promotion is already
    /// pending.
    pub fn enqueue(&self, pattern: &LearnedPattern, target_scope: Scope) -> Option<String> {
        let review_id = Self::key(&pattern.source_tenant_id, &pattern.id, target_scope);
        let mut pending = self.pending.write().ok()?;
        if pending.contains_key(&review_id) {
            return None;
        }
        pending.insert(
            review_id.clone(),
            ReviewItem {
                review_id: review_id.clone(),
                source_tenant_id: pattern.source_tenant_id.clone(),
                pattern_id: pattern.id.clone(),
                target_scope,
                pattern: pattern.clone(),
                requested_at: Utc::now(),
            },
        );
        Some(review_id)
    }

    pub fn is_pending(&self, tenant: &TenantId, pattern: &PatternId, scope: Scope) -> bool {
        self.pending
            .read()
            .map(|p| p.contains_key(&Self::key(tenant, pattern, scope)))
            .unwrap_or(false)
    }

    pub fn pending(&self) -> Vec<ReviewItem> {
        let mut items: Vec<ReviewItem> = self
            .pending
            .read()
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        items
    }

    /// Remove and return a pending item.
    pub fn take(&self, review_id: &str) -> PatternResult<ReviewItem> {
        let mut pending = self
            .pending
            .write()
            .map_err(|_| PatternError::UnknownReview(review_id.to_string()))?;
        pending
            .remove(review_id)
            .ok_or_else(|| PatternError::UnknownReview(review_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pending.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Registry version this entry introduced
    pub version: u64,
    pub pattern: LearnedPattern,
    pub approved_at: DateTime<Utc>,
}

/// Append-only, versioned list of globally approved patterns.
#[derive(Debug, Default)]
pub struct GlobalPatternRegistry {
    entries: RwLock<Vec<RegistryEntry>>,
}

impl GlobalPatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pattern; returns the new registry version. Appending an id
    /// that is already present returns the existing entry's version.
    pub fn append(&self, pattern: LearnedPattern) -> u64 {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        if let Some(existing) = entries.iter().find(|e| e.pattern.id == pattern.id) {
            return existing.version;
        }
        let version = entries.len() as u64 + 1;
        entries.push(RegistryEntry {
            version,
            pattern,
            approved_at: Utc::now(),
        });
        version
    }

    pub fn version(&self) -> u64 {
        self.entries.read().map(|e| e.len() as u64).unwrap_or(0)
    }

    pub fn contains(&self, id: &PatternId) -> bool {
        self.entries
            .read()
            .map(|e| e.iter().any(|x| &x.pattern.id == id))
            .unwrap_or(false)
    }

    /// Entries added after `version`, oldest first.
    pub fn since(&self, version: u64) -> Vec<RegistryEntry> {
        self.entries
            .read()
            .map(|e| e.iter().filter(|x| x.version > version).cloned().collect())
            .unwrap_or_default()
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.since(0)
    }
}
