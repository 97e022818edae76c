//! Database operations for counter documents.
//!
//! A document is one row in `documents` plus one `word_counts` row per key.
//! Every change bumps the document's revision inside the same transaction,
//! so a snapshot read after the change is consistent with that revision.

use sqlx::{PgConnection, PgPool, Row};
use wordcloud_engine::{DocumentId, IncrementField, RemoteSnapshot, WordEntry, WordMap};

/// A stored word counter row.
#[derive(Debug)]
pub struct StoredWord {
    pub key: String,
    pub text: String,
    pub count: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredWord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredWord {
            key: row.try_get("key")?,
            text: row.try_get("text")?,
            count: row.try_get("count")?,
        })
    }
}

/// A document with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub revision: i64,
    pub snapshot: RemoteSnapshot,
}

/// Read a document. `None` if it does not exist.
pub async fn load_document(
    pool: &PgPool,
    doc_id: &DocumentId,
) -> Result<Option<StoredDocument>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    fetch_document(&mut conn, doc_id).await
}

/// Create a document with the given words unless it already exists.
///
/// Returns the created document, or `None` if one was already there; an
/// existing document is never touched.
pub async fn create_document(
    pool: &PgPool,
    doc_id: &DocumentId,
    words: &WordMap,
) -> Result<Option<StoredDocument>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO documents (doc_id, revision)
        VALUES ($1, 1)
        ON CONFLICT (doc_id) DO NOTHING
        "#,
    )
    .bind(doc_id.as_str())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    for (key, entry) in words {
        sqlx::query(
            r#"
            INSERT INTO word_counts (doc_id, key, text, count)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(doc_id.as_str())
        .bind(key)
        .bind(&entry.text)
        .bind(to_db_count(entry.count))
        .execute(&mut *tx)
        .await?;
    }

    let document = fetch_document(&mut tx, doc_id).await?;
    tx.commit().await?;

    tracing::debug!(doc_id = %doc_id, words = words.len(), "Document created");
    Ok(document)
}

/// Add to one word's counter, creating the document if needed.
///
/// Non-empty text replaces the stored display text. Returns the document
/// as of this change.
pub async fn increment_word(
    pool: &PgPool,
    op: &IncrementField,
) -> Result<StoredDocument, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Row lock on the document serializes concurrent increments.
    sqlx::query(
        r#"
        INSERT INTO documents (doc_id, revision)
        VALUES ($1, 1)
        ON CONFLICT (doc_id) DO UPDATE SET
            revision = documents.revision + 1,
            updated_at = now()
        "#,
    )
    .bind(op.document_id.as_str())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO word_counts (doc_id, key, text, count)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (doc_id, key) DO UPDATE SET
            count = word_counts.count + EXCLUDED.count,
            text = CASE WHEN EXCLUDED.text <> '' THEN EXCLUDED.text ELSE word_counts.text END,
            updated_at = now()
        "#,
    )
    .bind(op.document_id.as_str())
    .bind(&op.key)
    .bind(&op.text)
    .bind(to_db_count(op.amount))
    .execute(&mut *tx)
    .await?;

    let document = fetch_document(&mut tx, &op.document_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    tx.commit().await?;

    tracing::debug!(
        doc_id = %op.document_id,
        key = %op.key,
        amount = op.amount,
        revision = document.revision,
        "Word incremented"
    );
    Ok(document)
}

async fn fetch_document(
    conn: &mut PgConnection,
    doc_id: &DocumentId,
) -> Result<Option<StoredDocument>, sqlx::Error> {
    let revision: Option<i64> =
        sqlx::query_scalar("SELECT revision FROM documents WHERE doc_id = $1")
            .bind(doc_id.as_str())
            .fetch_optional(&mut *conn)
            .await?;

    let Some(revision) = revision else {
        return Ok(None);
    };

    let rows = sqlx::query_as::<_, StoredWord>(
        r#"
        SELECT key, text, count
        FROM word_counts
        WHERE doc_id = $1
        "#,
    )
    .bind(doc_id.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let words = rows
        .into_iter()
        .map(|row| (row.key, WordEntry::new(row.text, row.count.max(0) as u64)))
        .collect();

    Ok(Some(StoredDocument {
        revision,
        snapshot: RemoteSnapshot::new(words),
    }))
}

fn to_db_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
