//! Transcript aggregation
//!
//! Keeps an append-only log of speech events from the host and the player.
//! Storage order is arrival order; chronological order is applied only when
//! the log is queried, so late deliveries from the recognition stream never
//! reshuffle what earlier queries saw.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Speaker of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The AI host
    #[serde(alias = "assistant")]
    Host,
    /// The person holding the talk button
    #[serde(alias = "user")]
    Player,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Player => write!(f, "player"),
        }
    }
}

/// A single recognized utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Unique entry id
    pub id: String,
    /// Who spoke
    pub role: Role,
    /// Recognized text (may be empty for placeholder items)
    pub text: String,
    /// Creation time in milliseconds
    pub created_at_ms: u64,
}

impl TranscriptEntry {
    /// Create an entry with a fresh id
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>, created_at_ms: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            created_at_ms,
        }
    }

    /// Whether the entry carries any non-whitespace text
    #[must_use]
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Event pushed by a transcript stream
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptEvent {
    /// Upstream item id, if the stream provides one
    #[serde(default)]
    pub id: Option<String>,
    /// Who spoke
    pub role: Role,
    /// Recognized text
    pub text: String,
    /// Creation time in milliseconds
    pub created_at_ms: u64,
}

impl From<TranscriptEvent> for TranscriptEntry {
    fn from(event: TranscriptEvent) -> Self {
        Self {
            id: event
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            role: event.role,
            text: event.text,
            created_at_ms: event.created_at_ms,
        }
    }
}

/// Append-only transcript log with role/time queries
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    entries: RwLock<Vec<TranscriptEntry>>,
}

impl TranscriptAggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the log
    pub fn append(&self, entry: TranscriptEntry) {
        tracing::trace!(
            role = %entry.role,
            created_at_ms = entry.created_at_ms,
            "transcript entry appended"
        );
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Number of entries recorded
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the log in arrival order
    #[must_use]
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest non-empty entry for `role`
    ///
    /// Equal timestamps resolve to the entry appended last.
    #[must_use]
    pub fn latest_by_role(&self, role: Role) -> Option<TranscriptEntry> {
        self.latest_matching(|entry| entry.role == role)
    }

    /// Latest non-empty entry for `role` created strictly after `timestamp_ms`
    ///
    /// This is the utterance a push-to-talk window produced.
    #[must_use]
    pub fn latest_since(&self, role: Role, timestamp_ms: u64) -> Option<TranscriptEntry> {
        self.latest_matching(|entry| entry.role == role && entry.created_at_ms > timestamp_ms)
    }

    /// All entries for `role` created strictly after `timestamp_ms`, newest first
    #[must_use]
    pub fn entries_since(&self, role: Role, timestamp_ms: u64) -> Vec<TranscriptEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let mut matching: Vec<(usize, &TranscriptEntry)> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.role == role && entry.created_at_ms > timestamp_ms)
            .collect();

        // Newest first; among equal timestamps the later arrival comes first
        matching.sort_by(|(ia, a), (ib, b)| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| ib.cmp(ia))
        });

        matching.into_iter().map(|(_, entry)| entry.clone()).collect()
    }

    fn latest_matching(&self, predicate: impl Fn(&TranscriptEntry) -> bool) -> Option<TranscriptEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.has_text() && predicate(entry))
            .max_by_key(|(index, entry)| (entry.created_at_ms, *index))
            .map(|(_, entry)| entry.clone())
    }

    /// Consume a transcript stream until it closes or `cancel` fires
    pub fn spawn_ingest(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<TranscriptEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => aggregator.append(event.into()),
                        None => break,
                    },
                }
            }
            tracing::debug!(entries = aggregator.len(), "transcript ingest stopped");
        })
    }
}
