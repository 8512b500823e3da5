//! In-memory context store.
//!
//! Each conversation lives in its own mutex-guarded slot so updates to one
//! conversation never wait on another. Updates are applied to a working copy
//! and only committed when the caller's closure succeeds. A slot that has
//! been cleared or swept is tombstoned; anyone still holding it retries on a
//! fresh slot instead of writing into a detached one.
//!
//! Aggregate statistics are running totals adjusted by each write's
//! before/after difference, so a turn on one conversation never visits
//! another conversation's slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::ContextError;
use crate::types::{ContextStats, ConversationContext};

struct Slot {
    context: Option<ConversationContext>,
    removed: bool,
}

impl Slot {
    fn empty() -> Self {
        Self {
            context: None,
            removed: false,
        }
    }
}

type SharedSlot = Arc<Mutex<Slot>>;

/// Longest TTL the store honours; larger values are clamped to it.
const MAX_TTL_DAYS: i64 = 36_500;

/// How far past the local clock an imported timestamp may lie.
const IMPORT_CLOCK_SKEW_HOURS: i64 = 24;

/// Running totals over every stored context.
#[derive(Debug, Default)]
struct Totals {
    contexts: i64,
    history_entries: i64,
    pending_operations: i64,
    created_at_ms: i128,
}

impl Totals {
    fn add(&mut self, ctx: &ConversationContext) {
        self.contexts += 1;
        self.history_entries += ctx.context_history.len() as i64;
        self.pending_operations += ctx.pending_operations.len() as i64;
        self.created_at_ms += i128::from(ctx.created_at.timestamp_millis());
    }

    fn remove(&mut self, ctx: &ConversationContext) {
        self.contexts -= 1;
        self.history_entries -= ctx.context_history.len() as i64;
        self.pending_operations -= ctx.pending_operations.len() as i64;
        self.created_at_ms -= i128::from(ctx.created_at.timestamp_millis());
    }

    fn snapshot(&self, now: DateTime<Utc>) -> ContextStats {
        let active = self.contexts.max(0) as usize;
        let mut stats = ContextStats {
            active_contexts: active,
            total_history_entries: self.history_entries.max(0) as usize,
            pending_operations: self.pending_operations.max(0) as usize,
            ..ContextStats::default()
        };
        if active > 0 {
            let mean_created_ms = self.created_at_ms as f64 / active as f64;
            let age_ms = now.timestamp_millis() as f64 - mean_created_ms;
            stats.average_context_age_secs = (age_ms / 1000.0).max(0.0);
        }
        stats
    }
}

/// Restore the required/pending invariant and stamp the update time.
fn seal(ctx: &mut ConversationContext) {
    ctx.active_context.normalize();
    ctx.last_updated = Utc::now();
}

fn poisoned<E: std::fmt::Display>(e: E) -> ContextError {
    ContextError::Storage(format!("Lock poisoned: {}", e))
}

/// Keyed store of conversation contexts with TTL-based expiry.
pub struct ContextStore {
    slots: RwLock<HashMap<String, SharedSlot>>,
    ttl: chrono::Duration,
    totals: Mutex<Totals>,
}

impl ContextStore {
    /// Create a store whose contexts expire after `ttl` without updates.
    ///
    /// TTLs above 100 years are clamped.
    pub fn new(ttl: Duration) -> Self {
        let max = chrono::Duration::days(MAX_TTL_DAYS);
        let ttl = chrono::Duration::from_std(ttl)
            .ok()
            .filter(|ttl| *ttl <= max)
            .unwrap_or(max);
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl,
            totals: Mutex::new(Totals::default()),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    fn slot(&self, id: &str, create: bool) -> Result<Option<SharedSlot>, ContextError> {
        {
            let slots = self.slots.read().map_err(poisoned)?;
            if let Some(slot) = slots.get(id) {
                return Ok(Some(Arc::clone(slot)));
            }
        }
        if !create {
            return Ok(None);
        }
        let mut slots = self.slots.write().map_err(poisoned)?;
        let slot = slots
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::empty())));
        Ok(Some(Arc::clone(slot)))
    }

    /// Run `f` against the live context for `id` and commit the context it
    /// returns.
    ///
    /// With `create` set, a missing or expired context is replaced by a fresh
    /// one; otherwise it is reported as `ContextNotFound`.
    fn modify<R>(
        &self,
        id: &str,
        create: bool,
        f: impl FnOnce(ConversationContext) -> Result<(ConversationContext, R), ContextError>,
    ) -> Result<R, ContextError> {
        let now = Utc::now();
        let (result, created) = loop {
            let slot = self
                .slot(id, create)?
                .ok_or_else(|| ContextError::ContextNotFound(id.to_string()))?;
            let mut guard = slot.lock().map_err(poisoned)?;
            if guard.removed {
                continue;
            }

            let live = guard
                .context
                .as_ref()
                .filter(|ctx| !ctx.is_expired(now, self.ttl))
                .cloned();
            let created = live.is_none();
            let current = match live {
                Some(ctx) => ctx,
                None if create => {
                    if guard.context.is_some() {
                        debug!(conversation_id = %id, "Replacing expired context");
                    }
                    ConversationContext::new(id)
                }
                None => return Err(ContextError::ContextNotFound(id.to_string())),
            };

            let (next, result) = f(current)?;
            self.record(guard.context.as_ref(), Some(&next))?;
            guard.context = Some(next);
            break (result, created);
        };

        if created {
            debug!(conversation_id = %id, "Context created");
        }
        Ok(result)
    }

    /// Return the context for `id`, creating an empty one if none is live.
    ///
    /// Does not touch `last_updated` of an existing context.
    pub fn ensure_exists(&self, id: &str) -> Result<ConversationContext, ContextError> {
        let now = Utc::now();
        let created = loop {
            let slot = self
                .slot(id, true)?
                .ok_or_else(|| ContextError::ContextNotFound(id.to_string()))?;
            let mut guard = slot.lock().map_err(poisoned)?;
            if guard.removed {
                continue;
            }
            if let Some(ctx) = guard
                .context
                .as_ref()
                .filter(|ctx| !ctx.is_expired(now, self.ttl))
            {
                return Ok(ctx.clone());
            }
            let ctx = ConversationContext::new(id);
            self.record(guard.context.as_ref(), Some(&ctx))?;
            guard.context = Some(ctx.clone());
            break ctx;
        };
        debug!(conversation_id = %id, "Context created");
        Ok(created)
    }

    /// Live context for `id`, if any. Expired contexts are not returned.
    pub fn get(&self, id: &str) -> Result<Option<ConversationContext>, ContextError> {
        let Some(slot) = self.slot(id, false)? else {
            return Ok(None);
        };
        let guard = slot.lock().map_err(poisoned)?;
        let now = Utc::now();
        Ok(guard
            .context
            .as_ref()
            .filter(|ctx| !guard.removed && !ctx.is_expired(now, self.ttl))
            .cloned())
    }

    /// Replace the context for `id` with `f(current)`, creating it if needed.
    pub fn update(
        &self,
        id: &str,
        f: impl FnOnce(ConversationContext) -> ConversationContext,
    ) -> Result<ConversationContext, ContextError> {
        self.modify(id, true, |ctx| {
            let mut next = f(ctx);
            seal(&mut next);
            Ok((next.clone(), next))
        })
    }

    /// Mutate a working copy of the context; commit only if `f` succeeds.
    pub fn update_with<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut ConversationContext) -> Result<R, ContextError>,
    ) -> Result<R, ContextError> {
        self.modify(id, true, |mut ctx| {
            let result = f(&mut ctx)?;
            seal(&mut ctx);
            Ok((ctx, result))
        })
    }

    /// Like [`update_with`](Self::update_with) but fails with `ContextNotFound`
    /// instead of creating a context.
    pub fn update_existing_with<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut ConversationContext) -> Result<R, ContextError>,
    ) -> Result<R, ContextError> {
        self.modify(id, false, |mut ctx| {
            let result = f(&mut ctx)?;
            seal(&mut ctx);
            Ok((ctx, result))
        })
    }

    /// Remove the context for `id`. Returns whether one existed.
    pub fn clear(&self, id: &str) -> Result<bool, ContextError> {
        let slot = {
            let mut slots = self.slots.write().map_err(poisoned)?;
            slots.remove(id)
        };
        let Some(slot) = slot else {
            return Ok(false);
        };
        let mut guard = slot.lock().map_err(poisoned)?;
        guard.removed = true;
        let old = guard.context.take();
        self.record(old.as_ref(), None)?;
        Ok(old.is_some())
    }

    /// Serialize the live context for `id` as pretty JSON.
    pub fn export(&self, id: &str) -> Result<String, ContextError> {
        let ctx = self
            .get(id)?
            .ok_or_else(|| ContextError::ContextNotFound(id.to_string()))?;
        Ok(serde_json::to_string_pretty(&ctx)?)
    }

    /// Insert or replace a context from exported JSON. Returns its id.
    ///
    /// Timestamps are kept as exported but may not lie more than a day in
    /// the future.
    pub fn import(&self, json: &str) -> Result<String, ContextError> {
        let mut ctx: ConversationContext = serde_json::from_str(json)?;
        if ctx.conversation_id.trim().is_empty() {
            return Err(ContextError::InvalidState(
                "imported context has no conversation id".to_string(),
            ));
        }
        let horizon = Utc::now() + chrono::Duration::hours(IMPORT_CLOCK_SKEW_HOURS);
        if ctx.created_at > horizon || ctx.last_updated > horizon {
            return Err(ContextError::InvalidState(format!(
                "imported context {} is timestamped in the future",
                ctx.conversation_id
            )));
        }
        ctx.active_context.normalize();
        let id = ctx.conversation_id.clone();

        loop {
            let slot = self
                .slot(&id, true)?
                .ok_or_else(|| ContextError::ContextNotFound(id.clone()))?;
            let mut guard = slot.lock().map_err(poisoned)?;
            if guard.removed {
                continue;
            }
            self.record(guard.context.as_ref(), Some(&ctx))?;
            guard.context = Some(ctx);
            break;
        }

        info!(conversation_id = %id, "Context imported");
        Ok(id)
    }

    /// Evict every context expired at `now`. Returns the evicted ids.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, ContextError> {
        let mut evicted = Vec::new();
        let mut dropped = Vec::new();
        {
            let mut slots = self.slots.write().map_err(poisoned)?;
            slots.retain(|id, slot| {
                let Ok(mut guard) = slot.lock() else {
                    return true;
                };
                let expired = match guard.context.as_ref() {
                    Some(ctx) => ctx.is_expired(now, self.ttl),
                    None => true,
                };
                if expired {
                    if let Some(ctx) = guard.context.take() {
                        evicted.push(id.clone());
                        dropped.push(ctx);
                    }
                    guard.removed = true;
                }
                !expired
            });
        }
        if !dropped.is_empty() {
            let mut totals = self.totals.lock().map_err(poisoned)?;
            for ctx in &dropped {
                totals.remove(ctx);
            }
            info!(count = evicted.len(), "Evicted expired contexts");
        }
        evicted.sort();
        Ok(evicted)
    }

    /// Ids of all live contexts, sorted.
    pub fn ids(&self) -> Vec<String> {
        let slots: Vec<(String, SharedSlot)> = match self.slots.read() {
            Ok(slots) => slots
                .iter()
                .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
                .collect(),
            Err(_) => return Vec::new(),
        };
        let now = Utc::now();
        let mut ids: Vec<String> = slots
            .into_iter()
            .filter(|(_, slot)| {
                slot.lock().is_ok_and(|guard| {
                    !guard.removed
                        && guard
                            .context
                            .as_ref()
                            .is_some_and(|ctx| !ctx.is_expired(now, self.ttl))
                })
            })
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate statistics over every stored context.
    ///
    /// Expired contexts count until they are swept or replaced.
    pub fn stats(&self) -> ContextStats {
        match self.totals.lock() {
            Ok(totals) => totals.snapshot(Utc::now()),
            Err(_) => ContextStats::default(),
        }
    }

    /// Swap `before` for `after` in the running totals.
    fn record(
        &self,
        before: Option<&ConversationContext>,
        after: Option<&ConversationContext>,
    ) -> Result<(), ContextError> {
        let mut totals = self.totals.lock().map_err(poisoned)?;
        if let Some(ctx) = before {
            totals.remove(ctx);
        }
        if let Some(ctx) = after {
            totals.add(ctx);
        }
        Ok(())
    }
}
