//! Domain models: documents, mentions, taxonomy entries, match results,
//! persisted skill records, and backlog claims.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::{EXTRACTION_WEIGHT, MATCH_WEIGHT};
use crate::error::{Error, Result};
use crate::text::mention_key;

// =============================================================================
// DOCUMENTS
// =============================================================================

/// A job posting awaiting (or undergoing) extraction. Read-only to this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: String,
    /// Pre-normalized combination of the text fields, when ingestion supplied one.
    #[serde(default)]
    pub combined_text: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub word_count: Option<i32>,
}

impl Document {
    pub fn new(id: Uuid, combined_text: impl Into<String>) -> Self {
        Self {
            id,
            title: String::new(),
            description: String::new(),
            requirements: String::new(),
            combined_text: Some(combined_text.into()),
            locale: None,
            word_count: None,
        }
    }

    /// Text the extractors run over. Spans in mentions and records index into it.
    pub fn text(&self) -> String {
        match &self.combined_text {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => [&self.title, &self.description, &self.requirements]
                .iter()
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Which extractor produced a mention or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Pattern,
    Entity,
    Ngram,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Pattern => "pattern",
            ExtractionMethod::Entity => "entity",
            ExtractionMethod::Ngram => "ngram",
        }
    }
}

impl FromStr for ExtractionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pattern" => Ok(ExtractionMethod::Pattern),
            "entity" => Ok(ExtractionMethod::Entity),
            "ngram" => Ok(ExtractionMethod::Ngram),
            other => Err(Error::InvalidInput(format!(
                "unknown extraction method: {}",
                other
            ))),
        }
    }
}

/// A span of document text believed to reference a skill. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSkillMention {
    pub text: String,
    /// Pattern category, entity label, or taxonomy category.
    pub category: String,
    pub method: ExtractionMethod,
    pub confidence: f64,
    pub document_id: Uuid,
    /// Character offset of the first character.
    pub span_start: usize,
    /// Character offset one past the last character.
    pub span_end: usize,
    /// Surrounding text for diagnostics.
    #[serde(default)]
    pub context: String,
}

impl CandidateSkillMention {
    /// Dedup key (trimmed, lowercased).
    pub fn key(&self) -> String {
        mention_key(&self.text)
    }
}

// =============================================================================
// TAXONOMY
// =============================================================================

/// One label of a taxonomy entry in one locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedLabel {
    pub locale: String,
    pub label: String,
    /// Preferred label (vs. an alternative/synonym label).
    #[serde(default = "default_true")]
    pub preferred: bool,
}

fn default_true() -> bool {
    true
}

impl LocalizedLabel {
    pub fn preferred(locale: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            label: label.into(),
            preferred: true,
        }
    }

    pub fn alternative(locale: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            label: label.into(),
            preferred: false,
        }
    }
}

/// A skill concept in the controlled vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    /// Stable identifier.
    pub uri: String,
    pub labels: Vec<LocalizedLabel>,
    pub category: Option<String>,
    pub skill_type: Option<String>,
    pub active: bool,
}

impl TaxonomyEntry {
    /// Active entry with a single preferred label.
    pub fn new(uri: impl Into<String>, locale: &str, label: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            labels: vec![LocalizedLabel::preferred(locale, label)],
            category: None,
            skill_type: None,
            active: true,
        }
    }

    pub fn with_label(mut self, label: LocalizedLabel) -> Self {
        self.labels.push(label);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_skill_type(mut self, skill_type: impl Into<String>) -> Self {
        self.skill_type = Some(skill_type.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Preferred labels in stored order.
    pub fn preferred_labels(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .filter(|l| l.preferred)
            .map(|l| l.label.as_str())
    }

    /// Every label (preferred and alternative) in stored order.
    pub fn all_labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.label.as_str())
    }

    /// Label used for display and as the n-gram engine's skill text.
    pub fn primary_label(&self) -> &str {
        self.preferred_labels()
            .next()
            .or_else(|| self.all_labels().next())
            .unwrap_or(self.uri.as_str())
    }
}

/// Which matcher layer resolved a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    Semantic,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Fuzzy => "fuzzy",
            MatchMethod::Semantic => "semantic",
        }
    }
}

impl FromStr for MatchMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(MatchMethod::Exact),
            "fuzzy" => Ok(MatchMethod::Fuzzy),
            "semantic" => Ok(MatchMethod::Semantic),
            other => Err(Error::InvalidInput(format!("unknown match method: {}", other))),
        }
    }
}

/// A mention resolved to a taxonomy entry.
///
/// `confidence == 1.0` exactly when `method == Exact`. A mention with no
/// result is emergent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyMatchResult {
    pub mention: String,
    pub uri: String,
    pub label: String,
    pub confidence: f64,
    pub method: MatchMethod,
    pub category: Option<String>,
    pub skill_type: Option<String>,
}

impl TaxonomyMatchResult {
    pub fn new(
        mention: &str,
        entry: &TaxonomyEntry,
        label: &str,
        confidence: f64,
        method: MatchMethod,
    ) -> Self {
        Self {
            mention: mention.to_string(),
            uri: entry.uri.clone(),
            label: label.to_string(),
            confidence,
            method,
            category: entry.category.clone(),
            skill_type: entry.skill_type.clone(),
        }
    }
}

/// Persisted confidence: `0.7 × extraction + 0.3 × match` (match counts 0 when unmatched).
///
/// Rounded to four decimals so equal inputs persist as equal values.
///
/// ```
/// use skillex_core::blend_confidence;
/// assert_eq!(blend_confidence(0.8, Some(1.0)), 0.86);
/// assert_eq!(blend_confidence(0.5, None), 0.35);
/// ```
pub fn blend_confidence(extraction: f64, matched: Option<f64>) -> f64 {
    let raw = EXTRACTION_WEIGHT * extraction + MATCH_WEIGHT * matched.unwrap_or(0.0);
    (raw.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

/// Round a similarity score to three decimals.
pub fn round3(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

/// A skill extracted from a document, ready to persist.
///
/// At most one record exists per (document, normalized skill text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSkillRecord {
    pub document_id: Uuid,
    pub skill_text: String,
    pub extraction_method: ExtractionMethod,
    pub final_confidence: f64,
    pub taxonomy_uri: Option<String>,
    pub match_method: Option<MatchMethod>,
    pub skill_type: Option<String>,
    pub span_start: Option<i32>,
    pub span_end: Option<i32>,
}

impl ExtractedSkillRecord {
    /// Combine a mention with its (optional) taxonomy match.
    ///
    /// `skill_type` is the matched entry's type when it has one, otherwise the
    /// mention's category.
    pub fn from_mention(
        mention: &CandidateSkillMention,
        matched: Option<&TaxonomyMatchResult>,
    ) -> Self {
        let skill_type = matched
            .and_then(|m| m.skill_type.clone())
            .or_else(|| Some(mention.category.clone()).filter(|c| !c.is_empty()));
        Self {
            document_id: mention.document_id,
            skill_text: mention.text.trim().to_string(),
            extraction_method: mention.method,
            final_confidence: blend_confidence(
                mention.confidence,
                matched.map(|m| m.confidence),
            ),
            taxonomy_uri: matched.map(|m| m.uri.clone()),
            match_method: matched.map(|m| m.method),
            skill_type,
            span_start: i32::try_from(mention.span_start).ok(),
            span_end: i32::try_from(mention.span_end).ok(),
        }
    }

    /// Key enforcing one record per document and skill text.
    pub fn normalized_text(&self) -> String {
        mention_key(&self.skill_text)
    }

    /// No matcher layer resolved this skill.
    pub fn is_emergent(&self) -> bool {
        self.taxonomy_uri.is_none()
    }
}

// =============================================================================
// BACKLOG
// =============================================================================

/// Extraction status of a backlog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Processing => "processing",
            ClaimStatus::Completed => "completed",
            ClaimStatus::Failed => "failed",
        }
    }

    /// Allowed transitions. Only retry (`failed → pending`) and stale reset
    /// (`processing → pending`) move backwards.
    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Failed, Pending)
        )
    }
}

impl FromStr for ClaimStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "processing" => Ok(ClaimStatus::Processing),
            "completed" => Ok(ClaimStatus::Completed),
            "failed" => Ok(ClaimStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown claim status: {}", other))),
        }
    }
}

/// Backlog row state for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkClaim {
    pub document_id: Uuid,
    pub status: ClaimStatus,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkClaim {
    pub fn pending(document_id: Uuid) -> Self {
        Self {
            document_id,
            status: ClaimStatus::Pending,
            attempts: 0,
            error_message: None,
            claimed_by: None,
            claimed_at: None,
            completed_at: None,
        }
    }
}

/// Proof of one claim, required to report its outcome.
///
/// `attempt` is the row's attempt count right after the claim. Every claim
/// increments it and nothing decrements it, so a lease held by a stalled
/// worker never matches a later claimer's row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimLease {
    pub document_id: Uuid,
    pub attempt: i32,
}

/// A document handed out by `claim_batch`, with the lease that fences it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedDocument {
    pub document: Document,
    pub lease: ClaimLease,
}

impl ClaimedDocument {
    pub fn id(&self) -> Uuid {
        self.document.id
    }
}

/// Backlog counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}

/// Outcome counts for one claimed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Persisted skills no matcher layer resolved.
    pub emergent: usize,
    pub skills_persisted: usize,
    /// Persisted skills resolved to a taxonomy entry.
    pub matched: usize,
}

impl BatchSummary {
    /// Fold another summary into this one.
    pub fn absorb(&mut self, other: &BatchSummary) {
        self.claimed += other.claimed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.emergent += other.emergent;
        self.skills_persisted += other.skills_persisted;
        self.matched += other.matched;
    }

    pub fn is_empty(&self) -> bool {
        self.claimed == 0
    }
}
