//! PostgreSQL taxonomy store.
//!
//! Entries live in `taxonomy_entries`, their localized labels in
//! `taxonomy_labels`. Workers normally load everything once through
//! [`all_entries`](TaxonomyStore::all_entries) into an in-memory snapshot;
//! the per-mention lookups here serve tools and tests that query directly.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use skillex_core::defaults::FUZZY_CANDIDATE_LIMIT;
use skillex_core::text::tokenize;
use skillex_core::{Error, LocalizedLabel, Result, TaxonomyEntry, TaxonomyStore};

const ENTRY_COLUMNS: &str = "e.uri, e.category, e.skill_type, e.is_active,
        l.locale, l.label, l.is_preferred";

/// Accent folding for the token pre-filter, mirroring [`tokenize`] for the
/// Latin letters that occur in labels.
const FOLD_SQL: &str =
    "translate(lower(l2.label), 'áàâäãéèêëíìîïóòôöõúùûüñç', 'aaaaaeeeeiiiiooooouuuunc')";

/// PostgreSQL implementation of [`TaxonomyStore`].
pub struct PgTaxonomyStore {
    pool: Pool<Postgres>,
}

impl PgTaxonomyStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Fold `(entry, label)` rows, ordered by uri, into entries.
    fn group_rows(rows: Vec<PgRow>) -> Vec<TaxonomyEntry> {
        let mut entries: Vec<TaxonomyEntry> = Vec::new();
        for row in rows {
            let uri: String = row.get("uri");
            let label = LocalizedLabel {
                locale: row.get("locale"),
                label: row.get("label"),
                preferred: row.get("is_preferred"),
            };
            match entries.last_mut() {
                Some(entry) if entry.uri == uri => entry.labels.push(label),
                _ => entries.push(TaxonomyEntry {
                    uri,
                    labels: vec![label],
                    category: row.get("category"),
                    skill_type: row.get("skill_type"),
                    active: row.get("is_active"),
                }),
            }
        }
        entries
    }

    /// Entries with a label containing any of `$1`, capped at
    /// [`FUZZY_CANDIDATE_LIMIT`] uris.
    fn token_filter_sql() -> String {
        format!(
            "AND e.uri IN (SELECT DISTINCT l2.uri FROM taxonomy_labels l2
                            WHERE {FOLD_SQL} LIKE ANY($1)
                            ORDER BY l2.uri
                            LIMIT {FUZZY_CANDIDATE_LIMIT})"
        )
    }

    async fn fetch_entries(&self, filter: &str, bind: Option<Vec<String>>) -> Result<Vec<TaxonomyEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS}
               FROM taxonomy_entries e
               JOIN taxonomy_labels l ON l.uri = e.uri
              WHERE e.is_active {filter}
              ORDER BY e.uri, l.is_preferred DESC, l.locale, l.label"
        );
        let mut query = sqlx::query(&sql);
        if let Some(values) = bind {
            query = query.bind(values);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(Self::group_rows(rows))
    }
}

#[async_trait]
impl TaxonomyStore for PgTaxonomyStore {
    async fn lookup_by_label(&self, text: &str) -> Result<Vec<TaxonomyEntry>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_entries(
            "AND e.uri IN (SELECT l2.uri FROM taxonomy_labels l2 WHERE lower(l2.label) = ANY($1))",
            Some(vec![needle]),
        )
        .await
    }

    async fn lookup_candidates_by_token(&self, tokens: &[String]) -> Result<Vec<TaxonomyEntry>> {
        let wanted: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let patterns: Vec<String> = wanted.iter().map(|t| format!("%{}%", t)).collect();
        let coarse = self
            .fetch_entries(&Self::token_filter_sql(), Some(patterns))
            .await?;

        // LIKE matches inside words too; keep entries sharing a whole token.
        let entries: Vec<TaxonomyEntry> = coarse
            .into_iter()
            .filter(|entry| {
                entry
                    .all_labels()
                    .any(|label| tokenize(label).iter().any(|t| wanted.contains(t.as_str())))
            })
            .collect();
        debug!(
            subsystem = "db",
            component = "taxonomy",
            op = "lookup_candidates_by_token",
            token_count = tokens.len(),
            result_count = entries.len(),
            "Token candidates loaded"
        );
        Ok(entries)
    }

    async fn all_entries(&self) -> Result<Vec<TaxonomyEntry>> {
        self.fetch_entries("", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_filter_caps_candidates() {
        let sql = PgTaxonomyStore::token_filter_sql();
        assert!(sql.contains(&format!("LIMIT {}", FUZZY_CANDIDATE_LIMIT)));
        assert!(sql.contains("SELECT DISTINCT l2.uri"));
        assert!(sql.contains("LIKE ANY($1)"));
    }
}
