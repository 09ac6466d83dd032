// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("id prefix {prefix:?} matches {count} entities")]
    Ambiguous { prefix: String, count: usize },
}

impl StoreError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        StoreError::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }
}

/// Result of an id-or-prefix lookup.
#[derive(Debug)]
pub enum Found<T> {
    None,
    One(T),
    Many(usize),
}

impl<T> Found<T> {
    /// Collapse into `Result`, mapping `None` → not-found and `Many` →
    /// ambiguous, labelled with the entity kind for the error message.
    pub fn required(self, kind: &str, prefix: &str) -> Result<T, StoreError> {
        match self {
            Found::One(v) => Ok(v),
            Found::None => Err(StoreError::not_found(format!("{} {}", kind, prefix))),
            Found::Many(count) => {
                Err(StoreError::Ambiguous { prefix: prefix.to_string(), count })
            }
        }
    }
}
