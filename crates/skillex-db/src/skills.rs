//! Extracted skill record persistence.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Pool, Postgres, Row};
use uuid::Uuid;

use skillex_core::{
    new_v7, Error, ExtractedSkillRecord, ExtractionMethod, MatchMethod, Result, SkillRecordStore,
};

const SELECT_RECORDS: &str = "SELECT document_id, skill_text, extraction_method, final_confidence,
        taxonomy_uri, match_method, skill_type, span_start, span_end
   FROM extracted_skills
  WHERE document_id = $1
  ORDER BY span_start NULLS LAST, skill_text";

/// PostgreSQL implementation of [`SkillRecordStore`].
pub struct PgSkillRepository {
    pool: Pool<Postgres>,
}

impl PgSkillRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: PgRow) -> Result<ExtractedSkillRecord> {
        let method: String = row.get("extraction_method");
        let match_method: Option<String> = row.get("match_method");
        Ok(ExtractedSkillRecord {
            document_id: row.get("document_id"),
            skill_text: row.get("skill_text"),
            extraction_method: method.parse::<ExtractionMethod>()?,
            final_confidence: row.get("final_confidence"),
            taxonomy_uri: row.get("taxonomy_uri"),
            match_method: match_method
                .map(|m| m.parse::<MatchMethod>())
                .transpose()?,
            skill_type: row.get("skill_type"),
            span_start: row.get("span_start"),
            span_end: row.get("span_end"),
        })
    }
}

/// Replace the record set of `document_id` with `records`.
///
/// Runs on the caller's connection so it can share the status-flip
/// transaction. Records colliding on normalized text keep the last one written.
pub(crate) async fn replace_records(
    conn: &mut PgConnection,
    document_id: Uuid,
    records: &[ExtractedSkillRecord],
) -> Result<()> {
    sqlx::query("DELETE FROM extracted_skills WHERE document_id = $1")
        .bind(document_id)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;

    for record in records {
        sqlx::query(
            "INSERT INTO extracted_skills
                 (id, document_id, skill_text, normalized_text, extraction_method,
                  final_confidence, taxonomy_uri, match_method, skill_type,
                  span_start, span_end, extracted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
             ON CONFLICT (document_id, normalized_text) DO UPDATE SET
                 skill_text = EXCLUDED.skill_text,
                 extraction_method = EXCLUDED.extraction_method,
                 final_confidence = EXCLUDED.final_confidence,
                 taxonomy_uri = EXCLUDED.taxonomy_uri,
                 match_method = EXCLUDED.match_method,
                 skill_type = EXCLUDED.skill_type,
                 span_start = EXCLUDED.span_start,
                 span_end = EXCLUDED.span_end,
                 extracted_at = NOW()",
        )
        .bind(new_v7())
        .bind(document_id)
        .bind(&record.skill_text)
        .bind(record.normalized_text())
        .bind(record.extraction_method.as_str())
        .bind(record.final_confidence)
        .bind(&record.taxonomy_uri)
        .bind(record.match_method.map(|m| m.as_str()))
        .bind(&record.skill_type)
        .bind(record.span_start)
        .bind(record.span_end)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
    }
    Ok(())
}

#[async_trait]
impl SkillRecordStore for PgSkillRepository {
    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<ExtractedSkillRecord>> {
        let rows = sqlx::query(SELECT_RECORDS)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.into_iter().map(Self::parse_row).collect()
    }
}
