//! Immutable in-memory taxonomy snapshot.
//!
//! Loaded once (usually from the database) and shared read-only by every
//! matcher layer. Entries are kept sorted by URI so lookups return
//! candidates in a stable order.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use skillex_core::defaults::MIN_TOKEN_CHARS;
use skillex_core::text::tokenize;
use skillex_core::{Result, TaxonomyEntry, TaxonomyStore};
use tracing::info;

#[derive(Debug, Default)]
pub struct TaxonomySnapshot {
    entries: Vec<TaxonomyEntry>,
    by_label: HashMap<String, Vec<usize>>,
    by_token: HashMap<String, Vec<usize>>,
}

impl TaxonomySnapshot {
    /// Build a snapshot. Inactive entries are dropped.
    pub fn new(entries: Vec<TaxonomyEntry>) -> Self {
        let mut entries: Vec<TaxonomyEntry> = entries.into_iter().filter(|e| e.active).collect();
        entries.sort_by(|a, b| a.uri.cmp(&b.uri));
        entries.dedup_by(|a, b| a.uri == b.uri);

        let mut by_label: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_token: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            for label in entry.all_labels() {
                let key = label_key(label);
                if key.is_empty() {
                    continue;
                }
                let slot = by_label.entry(key).or_default();
                if slot.last() != Some(&idx) {
                    slot.push(idx);
                }
                for token in tokenize(label) {
                    if token.chars().count() < MIN_TOKEN_CHARS {
                        continue;
                    }
                    let slot = by_token.entry(token).or_default();
                    if slot.last() != Some(&idx) {
                        slot.push(idx);
                    }
                }
            }
        }

        Self {
            entries,
            by_label,
            by_token,
        }
    }

    /// Load every entry from another store into a snapshot.
    pub async fn load(store: &dyn TaxonomyStore) -> Result<Self> {
        let started = std::time::Instant::now();
        let snapshot = Self::new(store.all_entries().await?);
        info!(
            subsystem = "match",
            component = "snapshot",
            op = "load",
            entry_count = snapshot.len(),
            label_count = snapshot.by_label.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Taxonomy snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in URI order.
    pub fn entries(&self) -> &[TaxonomyEntry] {
        &self.entries
    }

    pub fn get(&self, uri: &str) -> Option<&TaxonomyEntry> {
        self.entries
            .binary_search_by(|e| e.uri.as_str().cmp(uri))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    fn collect(&self, indices: impl IntoIterator<Item = usize>) -> Vec<TaxonomyEntry> {
        indices
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|idx| self.entries[idx].clone())
            .collect()
    }
}

fn label_key(label: &str) -> String {
    label.trim().to_lowercase()
}

#[async_trait]
impl TaxonomyStore for TaxonomySnapshot {
    async fn lookup_by_label(&self, text: &str) -> Result<Vec<TaxonomyEntry>> {
        let indices = self
            .by_label
            .get(&label_key(text))
            .cloned()
            .unwrap_or_default();
        Ok(self.collect(indices))
    }

    async fn lookup_candidates_by_token(&self, tokens: &[String]) -> Result<Vec<TaxonomyEntry>> {
        let indices = tokens
            .iter()
            .filter_map(|t| self.by_token.get(t.as_str()))
            .flatten()
            .copied();
        Ok(self.collect(indices))
    }

    async fn all_entries(&self) -> Result<Vec<TaxonomyEntry>> {
        Ok(self.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillex_core::LocalizedLabel;

    fn snapshot() -> TaxonomySnapshot {
        TaxonomySnapshot::new(vec![
            TaxonomyEntry::new("u:3", "en", "React Native"),
            TaxonomyEntry::new("u:1", "es", "Programación en Python")
                .with_label(LocalizedLabel::preferred("en", "Python programming")),
            TaxonomyEntry::new("u:2", "en", "Python"),
            TaxonomyEntry::new("u:0", "en", "Python 2").with_active(false),
        ])
    }

    #[tokio::test]
    async fn test_lookup_by_label_is_case_insensitive() {
        let snap = snapshot();
        let hits = snap.lookup_by_label("  PYTHON ").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uri, "u:2");
        assert_eq!(snap.lookup_by_label("python programming").await.unwrap()[0].uri, "u:1");
        assert!(snap.lookup_by_label("python 2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_candidates_are_ordered_and_unique() {
        let snap = snapshot();
        let hits = snap
            .lookup_candidates_by_token(&["python".into(), "programacion".into()])
            .await
            .unwrap();
        let uris: Vec<_> = hits.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris, vec!["u:1", "u:2"]);
    }

    #[tokio::test]
    async fn test_all_entries_sorted_active_only() {
        let snap = snapshot();
        let all = snap.all_entries().await.unwrap();
        let uris: Vec<_> = all.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris, vec!["u:1", "u:2", "u:3"]);
        assert!(snap.get("u:3").is_some());
        assert!(snap.get("u:0").is_none());
    }
}
