//! Document handlers: read, create-if-absent and increment.
//!
//! Every change is published to the document's subscribers with the
//! revision it produced.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wordcloud_engine::{
    normalize::{clean_text, is_canonical_key},
    DocumentId, Error as EngineError, IncrementField, RemoteSnapshot,
};

use crate::db::{self, StoredDocument};
use crate::error::{AppError, Result};
use crate::websocket::ServerMessage;
use crate::AppState;

/// Body of an increment request.
#[derive(Debug, Deserialize)]
pub struct IncrementRequest {
    /// Canonical word key
    pub key: String,
    /// Display text; empty keeps the stored text
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_amount")]
    pub amount: u64,
}

fn default_amount() -> u64 {
    1
}

/// A document as returned to clients.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub document_id: DocumentId,
    pub revision: i64,
    pub fields: Value,
}

impl DocumentResponse {
    fn new(document_id: DocumentId, document: &StoredDocument) -> Self {
        Self {
            document_id,
            revision: document.revision,
            fields: document.snapshot.to_fields(),
        }
    }
}

/// Result of a create-if-absent request.
#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub created: bool,
}

/// Parse a document id from a path segment.
pub fn parse_document_id(raw: &str) -> Result<DocumentId> {
    Ok(DocumentId::parse(raw)?)
}

/// Validate an increment request into the operation to apply.
pub fn validate_increment(
    document_id: DocumentId,
    request: IncrementRequest,
    max_increment: u64,
) -> Result<IncrementField> {
    if !is_canonical_key(&request.key) {
        return Err(EngineError::InvalidKey(request.key).into());
    }
    if request.amount == 0 || request.amount > max_increment {
        return Err(AppError::BadRequest(format!(
            "amount must be between 1 and {}",
            max_increment
        )));
    }

    Ok(IncrementField {
        document_id,
        key: request.key,
        text: clean_text(&request.text),
        amount: request.amount,
    })
}

/// Read a document.
pub async fn handle_get(state: &AppState, document_id: DocumentId) -> Result<DocumentResponse> {
    match db::load_document(&state.pool, &document_id).await? {
        Some(document) => Ok(DocumentResponse::new(document_id, &document)),
        None => Err(AppError::NotFound(format!("document {}", document_id))),
    }
}

/// Create a document from the given fields unless it exists.
pub async fn handle_create(
    state: &AppState,
    document_id: DocumentId,
    fields: Value,
) -> Result<CreateResponse> {
    let snapshot = RemoteSnapshot::from_fields(&fields)?;
    if let Some(key) = snapshot.words.keys().find(|k| !is_canonical_key(k)) {
        return Err(EngineError::InvalidKey(key.clone()).into());
    }

    let Some(document) = db::create_document(&state.pool, &document_id, &snapshot.words).await?
    else {
        tracing::debug!(document_id = %document_id, "Document exists, not overwritten");
        return Ok(CreateResponse { created: false });
    };

    publish(state, &document_id, &document);
    Ok(CreateResponse { created: true })
}

/// Apply an increment and publish the result.
pub async fn handle_increment(
    state: &AppState,
    document_id: DocumentId,
    request: IncrementRequest,
) -> Result<()> {
    let op = validate_increment(document_id, request, state.config.max_increment)?;
    let document = db::increment_word(&state.pool, &op).await?;
    publish(state, &op.document_id, &document);
    Ok(())
}

fn publish(state: &AppState, document_id: &DocumentId, document: &StoredDocument) {
    let message = ServerMessage::snapshot(
        document_id.clone(),
        document.revision,
        document.snapshot.to_fields(),
    );
    state
        .subscriptions
        .publish(document_id, document.revision, message);
}
