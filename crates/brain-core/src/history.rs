//! Per-conversation working state.
//!
//! This module keeps, for every active conversation, a bounded window of
//! turn items, the last classification and the sticky slots extracted so
//! far. Entries idle for longer than the TTL are removed by a periodic
//! sweep, and the total number of tracked conversations is capped with LRU
//! eviction to prevent memory exhaustion.
//!
//! This is a single-process, in-memory structure. Turns for the same
//! conversation are expected to be serialized by the caller; if two turns
//! race, the last write wins.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::message::TurnItem;

/// Default maximum number of conversations to track before LRU eviction.
pub const DEFAULT_MAX_CONVERSATIONS: usize = 10000;

/// Slot values remembered across turns.
///
/// Slots are sticky: once extracted they persist until a later extraction
/// overwrites them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots {
    /// Water service contract number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_number: Option<String>,
    /// Locality (neighbourhood / municipality) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
}

impl Slots {
    /// Overwrite slots with any non-empty values from `other`.
    pub fn merge(&mut self, other: &Slots) {
        if let Some(contract) = non_empty(&other.contract_number) {
            self.contract_number = Some(contract);
        }
        if let Some(locality) = non_empty(&other.locality) {
            self.locality = Some(locality);
        }
    }

    /// Whether no slot has a value.
    pub fn is_empty(&self) -> bool {
        self.contract_number.is_none() && self.locality.is_none()
    }

    /// Slots as a key/value map (only populated slots).
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(ref contract) = self.contract_number {
            map.insert("contract_number".to_string(), contract.clone());
        }
        if let Some(ref locality) = self.locality {
            map.insert("locality".to_string(), locality.clone());
        }
        map
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// State kept for one conversation.
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Working history, oldest first.
    pub history: Vec<TurnItem>,
    /// Last time the conversation was read or written.
    pub last_access: Instant,
    /// Last intent label assigned.
    pub classification: Option<String>,
    /// Sticky slots.
    pub slots: Slots,
}

impl ConversationState {
    fn new(now: Instant) -> Self {
        Self {
            history: Vec::new(),
            last_access: now,
            classification: None,
            slots: Slots::default(),
        }
    }
}

/// Drop the oldest items so that at most `max_items` remain.
///
/// Retained items keep their original relative order.
pub fn bound_history(history: &mut Vec<TurnItem>, max_items: usize) {
    if history.len() > max_items {
        let to_remove = history.len() - max_items;
        history.drain(0..to_remove);
    }
}

/// In-memory conversation store with TTL sweeping and LRU capping.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use brain_core::{ConversationStore, TurnItem};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let store = ConversationStore::new(4, Duration::from_secs(1800));
///
///     store
///         .append("5215512345678", vec![TurnItem::user("Hola"), TurnItem::assistant("Hola!")])
///         .await;
///
///     let state = store.get("5215512345678").await;
///     assert_eq!(state.history.len(), 2);
/// }
/// ```
#[derive(Debug)]
pub struct ConversationStore {
    /// Map from conversation ID to state.
    /// IndexMap order is access order: the front is least recently used.
    conversations: RwLock<IndexMap<String, ConversationState>>,
    /// Maximum number of history items kept per conversation.
    max_items: usize,
    /// Idle time after which a conversation is swept.
    ttl: Duration,
    /// Maximum number of conversations to track before LRU eviction.
    max_conversations: usize,
}

impl ConversationStore {
    /// Create a store with the default conversation cap.
    pub fn new(max_items: usize, ttl: Duration) -> Self {
        Self::with_limits(max_items, ttl, DEFAULT_MAX_CONVERSATIONS)
    }

    /// Create a store with custom limits.
    pub fn with_limits(max_items: usize, ttl: Duration, max_conversations: usize) -> Self {
        Self {
            conversations: RwLock::new(IndexMap::new()),
            max_items,
            ttl,
            max_conversations,
        }
    }

    /// Maximum history items per conversation.
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Idle TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Move an entry to the back (most recently used), creating it if needed,
    /// and refresh its access time.
    fn touch_entry<'a>(
        conversations: &'a mut IndexMap<String, ConversationState>,
        id: &str,
        now: Instant,
    ) -> &'a mut ConversationState {
        let mut state = conversations
            .shift_remove(id)
            .unwrap_or_else(|| ConversationState::new(now));
        state.last_access = now;
        let (index, _) = conversations.insert_full(id.to_string(), state);
        &mut conversations[index]
    }

    fn evict_over_limit(&self, conversations: &mut IndexMap<String, ConversationState>) {
        while conversations.len() > self.max_conversations {
            if let Some((id, _)) = conversations.shift_remove_index(0) {
                debug!(conversation_id = %id, "evicting least recently used conversation");
            }
        }
    }

    /// Get the state for a conversation, creating it on first access.
    ///
    /// Every call refreshes the conversation's last-access time.
    pub async fn get(&self, id: &str) -> ConversationState {
        let mut conversations = self.conversations.write().await;
        let state = Self::touch_entry(&mut conversations, id, Instant::now()).clone();
        self.evict_over_limit(&mut conversations);
        state
    }

    /// Append items to a conversation's history and apply the bounding policy.
    ///
    /// Returns the history length after bounding.
    pub async fn append(&self, id: &str, items: Vec<TurnItem>) -> usize {
        let mut conversations = self.conversations.write().await;
        let state = Self::touch_entry(&mut conversations, id, Instant::now());
        state.history.extend(items);
        bound_history(&mut state.history, self.max_items);
        let len = state.history.len();
        self.evict_over_limit(&mut conversations);
        len
    }

    /// Record the classification of the latest turn and merge extracted slots.
    pub async fn record_classification(&self, id: &str, label: &str, extracted: &Slots) {
        let mut conversations = self.conversations.write().await;
        let state = Self::touch_entry(&mut conversations, id, Instant::now());
        state.classification = Some(label.to_string());
        state.slots.merge(extracted);
        self.evict_over_limit(&mut conversations);
    }

    /// Merge slot values without changing the classification.
    pub async fn merge_slots(&self, id: &str, slots: &Slots) {
        let mut conversations = self.conversations.write().await;
        let state = Self::touch_entry(&mut conversations, id, Instant::now());
        state.slots.merge(slots);
        self.evict_over_limit(&mut conversations);
    }

    /// Whether a conversation is currently tracked. Does not refresh access time.
    pub async fn contains(&self, id: &str) -> bool {
        self.conversations.read().await.contains_key(id)
    }

    /// Remove a conversation.
    pub async fn remove(&self, id: &str) -> bool {
        self.conversations.write().await.shift_remove(id).is_some()
    }

    /// Number of tracked conversations.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Whether the store tracks no conversations.
    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }

    /// Remove every conversation idle for longer than the TTL.
    ///
    /// Returns the number of evicted conversations.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut conversations = self.conversations.write().await;
        let mut evicted = 0;

        // Entries are kept in access order, so expired ones are at the front.
        while let Some((_, state)) = conversations.first() {
            if now.saturating_duration_since(state.last_access) <= self.ttl {
                break;
            }
            conversations.shift_remove_index(0);
            evicted += 1;
        }

        if evicted > 0 {
            info!(
                evicted,
                remaining = conversations.len(),
                "swept idle conversations"
            );
        }
        evicted
    }

    /// Spawn a background task that sweeps expired conversations every `interval`.
    ///
    /// Abort the returned handle to stop sweeping.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep_expired().await;
            }
        })
    }
}
