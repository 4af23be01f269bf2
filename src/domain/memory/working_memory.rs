//! Working Memory
//!
//! Immutable, ordered conversation state for one soul. Every update returns a
//! new `WorkingMemory`; earlier values stay valid and unchanged, so callers can
//! keep snapshots around (for retries, UI polling or comparisons) for free.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use super::entry::{MemoryEntry, Message, MessageRole};
use super::errors::MemoryError;
use super::region::RegionLayout;

/// Deferred completion flag shared by every clone of a streaming state.
#[derive(Clone)]
struct FinishedSignal(Arc<watch::Sender<bool>>);

impl FinishedSignal {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(Arc::new(tx))
    }

    fn resolve(&self) {
        self.0.send_replace(true);
    }

    fn is_resolved(&self) -> bool {
        *self.0.borrow()
    }

    async fn wait(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// A soul's conversation state.
#[derive(Clone)]
pub struct WorkingMemory {
    soul_name: Arc<str>,
    layout: Arc<RegionLayout>,
    entries: Arc<Vec<MemoryEntry>>,
    compression_pending: BTreeSet<String>,
    finished: Option<FinishedSignal>,
}

impl WorkingMemory {
    /// Creates an empty memory with the default region layout.
    pub fn new(soul_name: impl Into<String>) -> Self {
        Self::with_layout(soul_name, RegionLayout::default())
    }

    /// Creates an empty memory with a custom region layout.
    pub fn with_layout(soul_name: impl Into<String>, layout: RegionLayout) -> Self {
        let soul_name: String = soul_name.into();
        Self {
            soul_name: Arc::from(soul_name),
            layout: Arc::new(layout),
            entries: Arc::new(Vec::new()),
            compression_pending: BTreeSet::new(),
            finished: None,
        }
    }

    /// Name of the soul this memory belongs to.
    pub fn soul_name(&self) -> &str {
        &self.soul_name
    }

    /// The region layout.
    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    /// Appends a freeform entry chronologically.
    ///
    /// Empty content is stored as-is; filtering is the caller's business.
    pub fn with_memory(&self, entry: MemoryEntry) -> Self {
        self.push(entry.in_region(None))
    }

    /// Appends several freeform entries in order.
    pub fn with_memories(&self, entries: impl IntoIterator<Item = MemoryEntry>) -> Self {
        let mut next = self.clone();
        let list = Arc::make_mut(&mut next.entries);
        list.extend(entries.into_iter().map(|entry| entry.in_region(None)));
        next
    }

    /// Replaces the designated entry of `region` with `entry`.
    ///
    /// The designated entry is the first one tagged with the region; if none
    /// exists yet the entry is appended. Unknown regions degrade to a freeform
    /// append.
    pub fn with_region(&self, region: &str, entry: MemoryEntry) -> Self {
        if self.layout.get(region).is_none() {
            tracing::warn!(soul = %self.soul_name, region, "Unknown region, appending as freeform memory");
            return self.with_memory(entry);
        }

        let entry = entry.in_region(Some(region));
        let mut next = self.clone();
        let list = Arc::make_mut(&mut next.entries);
        match list
            .iter()
            .position(|existing| existing.region.as_deref() == Some(region))
        {
            Some(index) => list[index] = entry,
            None => list.push(entry),
        }
        next
    }

    /// Adds an entry to `region` without replacing existing ones.
    pub fn with_region_append(&self, region: &str, entry: MemoryEntry) -> Self {
        if self.layout.get(region).is_none() {
            tracing::warn!(soul = %self.soul_name, region, "Unknown region, appending as freeform memory");
            return self.with_memory(entry);
        }
        self.push(entry.in_region(Some(region)))
    }

    /// Entries currently held by a region, in insertion order.
    pub fn region(&self, region: &str) -> Vec<&MemoryEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.region.as_deref() == Some(region))
            .collect()
    }

    /// Marks a compressible region as awaiting compression.
    pub fn with_compression_pending(&self, region: &str) -> Result<Self, MemoryError> {
        self.require_compressible(region)?;
        let mut next = self.clone();
        next.compression_pending.insert(region.to_string());
        Ok(next)
    }

    /// Returns true if `region` was marked for compression and not yet compressed.
    pub fn is_compression_pending(&self, region: &str) -> bool {
        self.compression_pending.contains(region)
    }

    /// Replaces older freeform history with a summary held in `region`.
    ///
    /// All freeform entries except the most recent `keep_recent` are dropped,
    /// along with any previous entries of `region`; `summary` becomes the
    /// region's single entry. Clears the region's pending marker.
    pub fn compress_history(
        &self,
        region: &str,
        keep_recent: usize,
        summary: MemoryEntry,
    ) -> Result<Self, MemoryError> {
        self.require_compressible(region)?;

        let freeform_total = self.freeform_len();
        let drop_count = freeform_total.saturating_sub(keep_recent);
        let mut dropped = 0;

        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter() {
            match entry.region.as_deref() {
                None if dropped < drop_count => dropped += 1,
                Some(name) if name == region => {}
                _ => kept.push(entry.clone()),
            }
        }
        kept.push(summary.in_region(Some(region)));

        let mut next = self.clone();
        next.entries = Arc::new(kept);
        next.compression_pending.remove(region);
        Ok(next)
    }

    /// Returns a copy carrying an unresolved completion signal.
    pub fn with_pending_finished(&self) -> Self {
        let mut next = self.clone();
        next.finished = Some(FinishedSignal::new());
        next
    }

    /// Resolves the pending completion signal, if any.
    pub fn resolve_finished(&self) {
        if let Some(signal) = &self.finished {
            signal.resolve();
        }
    }

    /// True unless a pending completion signal is still unresolved.
    pub fn is_finished(&self) -> bool {
        self.finished.as_ref().map_or(true, FinishedSignal::is_resolved)
    }

    /// Waits until the pending completion signal resolves.
    pub async fn finished(&self) {
        if let Some(signal) = &self.finished {
            signal.wait().await;
        }
    }

    /// Linearizes the memory into provider messages.
    ///
    /// Persistent regions come first, then compressible regions, then freeform
    /// entries in insertion order.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.entries.len());
        for region in self.layout.linearization_order() {
            messages.extend(
                self.entries
                    .iter()
                    .filter(|entry| entry.region.as_deref() == Some(region))
                    .map(MemoryEntry::to_message),
            );
        }
        messages.extend(
            self.entries
                .iter()
                .filter(|entry| entry.region.is_none())
                .map(MemoryEntry::to_message),
        );
        messages
    }

    /// Keeps every region entry but only the last `n` freeform entries.
    pub fn slice_recent(&self, n: usize) -> Self {
        let skip = self.freeform_len().saturating_sub(n);
        let mut skipped = 0;
        let kept: Vec<MemoryEntry> = self
            .entries
            .iter()
            .filter(|entry| {
                if entry.region.is_some() {
                    return true;
                }
                if skipped < skip {
                    skipped += 1;
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();

        let mut next = self.clone();
        next.entries = Arc::new(kept);
        next
    }

    /// Read-only view of all entries in insertion order.
    pub fn memories(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries exist.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries not assigned to any region.
    pub fn freeform_len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.region.is_none()).count()
    }

    /// Most recent freeform entry with the given role.
    pub fn last_of_role(&self, role: MessageRole) -> Option<&MemoryEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.region.is_none() && entry.role == role)
    }

    fn push(&self, entry: MemoryEntry) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.entries).push(entry);
        next
    }

    fn require_compressible(&self, region: &str) -> Result<(), MemoryError> {
        match self.layout.get(region) {
            None => Err(MemoryError::UnknownRegion(region.to_string())),
            Some(_) if !self.layout.is_compressible(region) => {
                Err(MemoryError::NotCompressible(region.to_string()))
            }
            Some(_) => Ok(()),
        }
    }
}

impl fmt::Debug for WorkingMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingMemory")
            .field("soul_name", &self.soul_name)
            .field("entries", &self.entries.len())
            .field("compression_pending", &self.compression_pending)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory::region::{CONTEXT_REGION, CORE_REGION, SUMMARY_REGION};
    use std::time::Duration;

    fn contents(memory: &WorkingMemory) -> Vec<String> {
        memory.to_messages().into_iter().map(|m| m.content).collect()
    }

    #[test]
    fn with_memory_leaves_previous_state_untouched() {
        let original = WorkingMemory::new("Kothar").with_memory(MemoryEntry::user("first"));
        let before = original.to_messages();

        let updated = original.with_memory(MemoryEntry::assistant("second"));

        assert_eq!(original.to_messages(), before);
        assert_eq!(original.len(), 1);
        assert_eq!(updated.len(), 2);
    }

    #[test]
    fn to_messages_is_deterministic() {
        let memory = WorkingMemory::new("Kothar")
            .with_region(CORE_REGION, MemoryEntry::system("You are Kothar."))
            .with_memory(MemoryEntry::user("hello"));

        assert_eq!(memory.to_messages(), memory.to_messages());
    }

    #[test]
    fn linearization_puts_regions_before_freeform() {
        let memory = WorkingMemory::new("Kothar")
            .with_memory(MemoryEntry::user("question"))
            .with_region(SUMMARY_REGION, MemoryEntry::system("summary"))
            .with_region(CONTEXT_REGION, MemoryEntry::system("context"))
            .with_region(CORE_REGION, MemoryEntry::system("core"))
            .with_memory(MemoryEntry::assistant("answer"));

        assert_eq!(
            contents(&memory),
            vec!["core", "context", "summary", "question", "answer"]
        );
    }

    #[test]
    fn region_upsert_replaces_designated_entry() {
        let memory = WorkingMemory::new("Kothar")
            .with_region(CONTEXT_REGION, MemoryEntry::system("old facts"))
            .with_region(CONTEXT_REGION, MemoryEntry::system("new facts"));

        assert_eq!(memory.len(), 1);
        assert_eq!(contents(&memory), vec!["new facts"]);
    }

    #[test]
    fn region_append_keeps_existing_entries() {
        let memory = WorkingMemory::new("Kothar")
            .with_region(CONTEXT_REGION, MemoryEntry::system("fact one"))
            .with_region_append(CONTEXT_REGION, MemoryEntry::system("fact two"));

        assert_eq!(memory.region(CONTEXT_REGION).len(), 2);
        assert_eq!(contents(&memory), vec!["fact one", "fact two"]);
    }

    #[test]
    fn unknown_region_falls_back_to_freeform() {
        let memory = WorkingMemory::new("Kothar").with_region("nowhere", MemoryEntry::user("stray"));

        assert_eq!(memory.freeform_len(), 1);
        assert!(memory.memories()[0].region.is_none());
    }

    #[test]
    fn empty_content_is_still_stored() {
        let memory = WorkingMemory::new("Kothar").with_memory(MemoryEntry::user(""));
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn compress_history_replaces_old_span_with_summary() {
        let memory = WorkingMemory::new("Kothar")
            .with_region(CORE_REGION, MemoryEntry::system("core"))
            .with_memories((0..5).map(|i| MemoryEntry::user(format!("m{i}"))))
            .with_compression_pending(SUMMARY_REGION)
            .unwrap();
        assert!(memory.is_compression_pending(SUMMARY_REGION));

        let compressed = memory
            .compress_history(SUMMARY_REGION, 2, MemoryEntry::system("earlier: m0-m2"))
            .unwrap();

        assert_eq!(contents(&compressed), vec!["core", "earlier: m0-m2", "m3", "m4"]);
        assert!(!compressed.is_compression_pending(SUMMARY_REGION));
        assert_eq!(memory.len(), 6);
    }

    #[test]
    fn compressing_persistent_region_fails() {
        let memory = WorkingMemory::new("Kothar");

        assert_eq!(
            memory
                .compress_history(CORE_REGION, 0, MemoryEntry::system("x"))
                .unwrap_err(),
            MemoryError::NotCompressible(CORE_REGION.to_string())
        );
        assert_eq!(
            memory.with_compression_pending("ghost").unwrap_err(),
            MemoryError::UnknownRegion("ghost".to_string())
        );
    }

    #[test]
    fn slice_recent_keeps_regions_and_tail() {
        let memory = WorkingMemory::new("Kothar")
            .with_region(CORE_REGION, MemoryEntry::system("core"))
            .with_memories((0..4).map(|i| MemoryEntry::user(format!("m{i}"))));

        assert_eq!(contents(&memory.slice_recent(1)), vec!["core", "m3"]);
    }

    #[test]
    fn last_of_role_ignores_regions() {
        let memory = WorkingMemory::new("Kothar")
            .with_memory(MemoryEntry::assistant("said this"))
            .with_region(CORE_REGION, MemoryEntry::assistant("persona"));

        assert_eq!(
            memory.last_of_role(MessageRole::Assistant).map(|e| e.content.as_str()),
            Some("said this")
        );
    }

    #[tokio::test]
    async fn pending_finished_resolves_across_clones() {
        let memory = WorkingMemory::new("Kothar");
        assert!(memory.is_finished());

        let pending = memory.with_pending_finished();
        assert!(!pending.is_finished());

        let waiter = pending.clone();
        let handle = tokio::spawn(async move { waiter.finished().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        pending.resolve_finished();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("finished() should return once resolved")
            .unwrap();
        assert!(pending.is_finished());
        assert!(memory.is_finished());
    }
}
