use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::transcript::{ChatTurn, Transcript};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Identifies one lifetime of a session entry. A reset ends it, so turns
/// checked out under an older generation are dropped instead of appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Debug)]
struct SessionEntry {
    transcript: Transcript,
    generation: Generation,
    last_seen: Instant,
}

/// In-memory transcripts keyed by session id. Nothing is shared across sessions.
///
/// Entries idle for longer than the TTL are swept on every checkout, and the
/// least recently seen entry is evicted once the capacity is reached.
#[derive(Debug)]
pub struct SessionStore {
    entries: RwLock<HashMap<Uuid, SessionEntry>>,
    next_generation: AtomicU64,
    ttl: Duration,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_SESSION_TTL, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of the session's transcript; empty for unknown sessions.
    pub async fn transcript(&self, id: Uuid) -> Transcript {
        self.entries
            .read()
            .await
            .get(&id)
            .map(|entry| entry.transcript.clone())
            .unwrap_or_default()
    }

    /// Snapshot plus the generation that a later [`append`](Self::append) must match.
    pub async fn checkout(&self, id: Uuid) -> (Transcript, Generation) {
        self.checkout_at(id, Instant::now()).await
    }

    async fn checkout_at(&self, id: Uuid, now: Instant) -> (Transcript, Generation) {
        let mut entries = self.entries.write().await;
        Self::sweep(&mut entries, now, self.ttl);

        if !entries.contains_key(&id) && entries.len() >= self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(oldest, _)| *oldest)
            {
                debug!(session_id = %oldest, "Evicting least recently seen session");
                entries.remove(&oldest);
            }
        }

        let entry = entries.entry(id).or_insert_with(|| SessionEntry {
            transcript: Transcript::new(),
            generation: Generation(self.next_generation.fetch_add(1, Ordering::Relaxed)),
            last_seen: now,
        });
        entry.last_seen = now;
        (entry.transcript.clone(), entry.generation)
    }

    /// Appends `turns` if the session still has `generation`. Returns whether they landed.
    pub async fn append(&self, id: Uuid, generation: Generation, turns: impl IntoIterator<Item = ChatTurn>) -> bool {
        match self.entries.write().await.get_mut(&id) {
            Some(entry) if entry.generation == generation => {
                entry.transcript.extend(turns);
                entry.last_seen = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Forgets the session entirely.
    pub async fn reset(&self, id: Uuid) {
        self.entries.write().await.remove(&id);
    }

    pub async fn session_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drops every session idle for longer than the TTL as of `now`.
    pub async fn evict_idle(&self, now: Instant) {
        Self::sweep(&mut *self.entries.write().await, now, self.ttl);
    }

    fn sweep(entries: &mut HashMap<Uuid, SessionEntry>, now: Instant, ttl: Duration) {
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "Swept idle sessions");
        }
    }
}
