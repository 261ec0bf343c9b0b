//! Input validation shared by backends
//!
//! Every check runs before a backend touches its store, so a rejected call
//! leaves state unchanged.
//!
//! Author: codevec contributors

use codevec_core::{CodevecError, DocumentPatch, Metadata, Result, VectorDocument};

/// Longest accepted document id, in bytes
pub const MAX_ID_LEN: usize = 1024;

fn invalid(message: impl Into<String>) -> CodevecError {
    CodevecError::ValidationError(message.into())
}

/// Ids must be non-empty, bounded, and free of control characters
pub fn id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(invalid("Document id must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(invalid(format!(
            "Document id exceeds {MAX_ID_LEN} bytes ({} bytes)",
            id.len()
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(invalid("Document id contains control characters"));
    }
    Ok(())
}

/// Embedding must be non-empty, finite, and match the backend dimension
pub fn embedding(values: &[f32], dimension: usize) -> Result<()> {
    if values.is_empty() {
        return Err(invalid("Embedding must not be empty"));
    }
    if values.len() != dimension {
        return Err(invalid(format!(
            "Embedding has {} dimensions, expected {dimension}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(invalid("Embedding contains non-finite values"));
    }
    Ok(())
}

/// Same rules as [`embedding`], reported as a query error
pub fn query_vector(values: &[f32], dimension: usize) -> Result<()> {
    embedding(values, dimension).map_err(|e| match e {
        CodevecError::ValidationError(msg) => invalid(format!("Invalid query vector: {msg}")),
        other => other,
    })
}

/// Metadata values must be JSON scalars
pub fn metadata(metadata: &Metadata) -> Result<()> {
    for (key, value) in metadata {
        if key.is_empty() {
            return Err(invalid("Metadata keys must not be empty"));
        }
        if value.is_array() || value.is_object() {
            return Err(invalid(format!(
                "Metadata value for '{key}' must be a scalar"
            )));
        }
    }
    Ok(())
}

/// Validate a document about to be stored
pub fn document(doc: &VectorDocument, dimension: usize) -> Result<()> {
    id(&doc.id)?;
    metadata(&doc.metadata)?;

    match &doc.embedding {
        Some(values) => embedding(values, dimension),
        None if doc.content.is_empty() => Err(invalid(format!(
            "Document '{}' has neither content nor embedding",
            doc.id
        ))),
        None => Ok(()),
    }
}

/// Validate a partial update
pub fn patch(patch: &DocumentPatch, dimension: usize) -> Result<()> {
    if let Some(values) = &patch.embedding {
        embedding(values, dimension)?;
    }
    if let Some(map) = &patch.metadata {
        metadata(map)?;
    }
    if patch.content.as_deref() == Some("") && patch.embedding.is_none() {
        return Err(invalid("Empty content requires an explicit embedding"));
    }
    Ok(())
}
