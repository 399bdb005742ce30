//! Error types for session handling and key rotation
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::time::Duration;
use thiserror::Error;

/// Failure reported by a single identity service call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("No such entity: {0}")]
    NoSuchEntity(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl ServiceError {
    /// Whether polling again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::LimitExceeded(_)
                | ServiceError::Unavailable(_)
                | ServiceError::Unexpected(_)
        )
    }
}

/// Result type for identity service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Session and key rotation errors
#[derive(Error, Debug, Clone)]
pub enum KeyError {
    #[error("Session initialization error: {0}")]
    SessionInit(String),

    #[error("Session unavailable: no session has been initialized")]
    SessionUnavailable,

    #[error("Identity query error: {0}")]
    IdentityQuery(#[source] ServiceError),

    #[error("Error listing access keys for {identity}: {source}")]
    KeyList {
        identity: String,
        #[source]
        source: ServiceError,
    },

    #[error("Error deleting access key {key_id}: {source}")]
    KeyDelete {
        key_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("Error creating access key for {identity}: {source}")]
    KeyCreation {
        identity: String,
        #[source]
        source: ServiceError,
    },

    #[error(
        "Timed out after {waited:?} ({attempts} attempts) waiting for access key capacity{}",
        .last_error.as_ref().map(|e| format!(": last error: {}", e)).unwrap_or_default()
    )]
    RotationTimeout {
        waited: Duration,
        attempts: u32,
        last_error: Option<Box<KeyError>>,
    },

    #[error("Key rotation error: {0}")]
    RotationFailed(String),

    #[error("Key rotation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl KeyError {
    /// Whether the rotation loop may absorb this error and poll again.
    ///
    /// Every failed deletion is retried: the next listing shows whether the
    /// key is still there.
    pub fn is_retryable(&self) -> bool {
        match self {
            KeyError::KeyList { source, .. } => source.is_retryable(),
            KeyError::KeyDelete { .. } => true,
            _ => false,
        }
    }
}

/// Result type for key operations
pub type KeyResult<T> = Result<T, KeyError>;
