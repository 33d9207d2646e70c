//! Member projection cache
//!
//! Last-known member state for the offline path. Each entry keeps the
//! committed snapshot (versioned) plus the speculative sessions queued
//! offline; the projection is recomputed from both, never patched in
//! place by unrelated callbacks.
//!
//! Updated by the event router subscription and, for the caller's own
//! writes, directly by the service and reconciler.

use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::models::Member;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::events::AttendanceEvent;
use super::membership;

#[derive(Debug, Clone)]
struct Speculative {
    pending_id: String,
    date: NaiveDate,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    committed: Member,
    speculative: Vec<Speculative>,
    projected: Member,
}

impl CacheEntry {
    fn new(committed: Member) -> Self {
        Self {
            projected: committed.clone(),
            committed,
            speculative: Vec::new(),
        }
    }

    fn reproject(&mut self) {
        let mut projected = self.committed.clone();
        for spec in &self.speculative {
            // Day already attended in the store: the replay will be discarded
            if self.committed.last_attendance == Some(spec.date) {
                continue;
            }
            let mut next = projected.clone();
            if membership::ensure_eligible(&mut next, spec.date).is_ok() {
                membership::apply_session(&mut next, spec.date);
                projected = next;
            }
        }
        self.projected = projected;
    }
}

#[derive(Debug, Default)]
pub struct MemberCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load committed snapshots (startup warmup)
    pub fn warm(&self, members: Vec<Member>) -> usize {
        let count = members.len();
        for member in members {
            self.refresh(&member);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install a committed snapshot unless an equal or newer one is cached
    pub fn refresh(&self, member: &Member) -> bool {
        match self.entries.entry(member.id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if member.version <= entry.committed.version {
                    return false;
                }
                entry.committed = member.clone();
                entry.reproject();
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(member.clone()));
                true
            }
        }
    }

    /// Committed state plus speculative offline sessions
    pub fn projected(&self, member_id: &str) -> Option<Member> {
        self.entries.get(member_id).map(|e| e.projected.clone())
    }

    /// Committed snapshot only
    pub fn committed(&self, member_id: &str) -> Option<Member> {
        self.entries.get(member_id).map(|e| e.committed.clone())
    }

    /// Record an offline session and recompute the projection
    pub fn add_speculative(&self, member_id: &str, pending_id: &str, date: NaiveDate) {
        if let Some(mut entry) = self.entries.get_mut(member_id) {
            entry.speculative.push(Speculative {
                pending_id: pending_id.to_string(),
                date,
            });
            entry.reproject();
        }
    }

    /// Drop a speculative session once its pending check-in is resolved
    pub fn settle(&self, member_id: &str, pending_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(member_id) {
            let before = entry.speculative.len();
            entry.speculative.retain(|s| s.pending_id != pending_id);
            if entry.speculative.len() != before {
                entry.reproject();
            }
        }
    }

    pub fn speculative_count(&self, member_id: &str) -> usize {
        self.entries.get(member_id).map(|e| e.speculative.len()).unwrap_or(0)
    }

    /// Event listener: keep committed snapshots current
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Arc<AttendanceEvent>>) {
        tracing::info!(members = self.len(), "Member cache listener started");
        while let Some(event) = rx.recv().await {
            if let Some(member) = event.member()
                && self.refresh(member)
            {
                tracing::trace!(member_id = %member.id, version = member.version, event = event.kind(), "Member cache refreshed");
            }
        }
        tracing::info!("Member cache channel closed, listener stopping");
    }
}
