//! Caller identity verification
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


use crate::error::{KeyError, KeyResult};
use crate::identity::IdentityService;
use crate::session::{SessionFactory, SessionProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of an identity check. A mismatch is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCheck {
    pub identity_name: String,
    pub matches_expected: bool,
}

/// Confirms the session is authenticated as the expected service account
pub struct IdentityVerifier<F: SessionFactory> {
    sessions: Arc<SessionProvider<F>>,
    expected_identity: String,
}

impl<F> IdentityVerifier<F>
where
    F: SessionFactory,
    F::Session: IdentityService,
{
    pub fn new(sessions: Arc<SessionProvider<F>>, expected_identity: impl Into<String>) -> Self {
        Self {
            sessions,
            expected_identity: expected_identity.into(),
        }
    }

    pub fn expected_identity(&self) -> &str {
        &self.expected_identity
    }

    /// Look up the caller identity and compare it with the expected name
    pub async fn verify_identity(&self) -> KeyResult<IdentityCheck> {
        let session = self.sessions.get_session().await?;

        let identity_name = session.current_identity().await.map_err(|e| {
            warn!(error = %e, "Error querying caller identity");
            KeyError::IdentityQuery(e)
        })?;

        let matches_expected = identity_name == self.expected_identity;
        if matches_expected {
            info!(identity = %identity_name, "Verified caller identity");
        } else {
            warn!(
                identity = %identity_name,
                expected = %self.expected_identity,
                "Caller is not the expected service account"
            );
        }

        Ok(IdentityCheck {
            identity_name,
            matches_expected,
        })
    }
}
