//! Access key rotation
//!
//! An identity may hold at most `max_keys` access keys. Rotation polls the
//! identity's keys until there is room, deleting keys that have outlived the
//! age guard, and then issues a new key pair. Transient list/delete failures
//! are absorbed by the poll loop; creation failures are terminal.
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
use crate::key_types::{AccessKey, KeyPair};
use crate::policy::{Decision, RotationPolicy};
use crate::session::{SessionFactory, SessionProvider};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One poll iteration: the key snapshot and what was decided about it
#[derive(Debug, Clone)]
pub struct RotationAttempt {
    pub attempt: u32,
    pub keys: Vec<AccessKey>,
    pub decision: Decision,
}

/// State of the wait for key capacity
#[derive(Debug)]
pub enum RotationState {
    Polling,
    Satisfied(RotationAttempt),
    Failed(KeyError),
    TimedOut,
    Cancelled,
}

impl RotationState {
    /// State after a single poll iteration
    pub fn after_poll(poll: KeyResult<RotationAttempt>) -> Self {
        match poll {
            Ok(attempt) => match attempt.decision.clone() {
                Decision::Satisfied => RotationState::Satisfied(attempt),
                Decision::Fail(reason) => RotationState::Failed(KeyError::RotationFailed(reason)),
                Decision::Delete(_) | Decision::Wait => RotationState::Polling,
            },
            Err(e) if e.is_retryable() => RotationState::Polling,
            Err(e) => RotationState::Failed(e),
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, RotationState::Polling)
    }
}

/// Rotates the access keys of an identity
pub struct KeyRotator<F: SessionFactory> {
    sessions: Arc<SessionProvider<F>>,
    policy: RotationPolicy,
}

impl<F> KeyRotator<F>
where
    F: SessionFactory,
    F::Session: IdentityService,
{
    pub fn new(sessions: Arc<SessionProvider<F>>, policy: RotationPolicy) -> Self {
        Self { sessions, policy }
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Make room for and create a new key pair for `identity`
    pub async fn rotate_keys(&self, identity: &str) -> KeyResult<KeyPair> {
        self.rotate_keys_with_cancel(identity, CancellationToken::new())
            .await
    }

    /// Like [`rotate_keys`](Self::rotate_keys), aborting with
    /// [`KeyError::Cancelled`] once `cancel` fires
    pub async fn rotate_keys_with_cancel(
        &self,
        identity: &str,
        cancel: CancellationToken,
    ) -> KeyResult<KeyPair> {
        if cancel.is_cancelled() {
            return Err(KeyError::Cancelled);
        }

        let session = self.sessions.get_session().await?;

        info!(
            identity = identity,
            poll_interval_secs = self.policy.poll_interval.as_secs(),
            timeout_secs = self.policy.timeout.as_secs(),
            "Starting access key rotation"
        );

        let ready = self
            .wait_for_capacity(session.as_ref(), identity, &cancel)
            .await?;

        let pair = session.create_access_key(identity).await.map_err(|source| {
            error!(identity = identity, error = %source, "Error creating access key");
            KeyError::KeyCreation {
                identity: identity.to_string(),
                source,
            }
        })?;

        info!(
            identity = identity,
            key_id = %pair.access_key_id,
            attempts = ready.attempt,
            "Created new key pair"
        );

        Ok(pair)
    }

    /// Poll until the identity is below its key quota
    async fn wait_for_capacity(
        &self,
        service: &F::Session,
        identity: &str,
        cancel: &CancellationToken,
    ) -> KeyResult<RotationAttempt> {
        let started = Instant::now();
        let deadline = started.checked_add(self.policy.timeout).ok_or_else(|| {
            KeyError::Configuration(format!(
                "rotation timeout of {}s is out of range",
                self.policy.timeout.as_secs()
            ))
        })?;
        let mut attempts = 0u32;
        let mut last_error: Option<KeyError> = None;

        loop {
            attempts += 1;

            let poll = self.poll_once(service, identity, attempts).await;
            match &poll {
                Ok(_) => last_error = None,
                Err(e) if e.is_retryable() => {
                    warn!(attempt = attempts, error = %e, "Access key poll failed, retrying");
                    last_error = Some(e.clone());
                }
                Err(_) => {}
            }

            let state = RotationState::after_poll(poll);
            if let Some(outcome) = settle(state, identity, attempts, started, &mut last_error) {
                return outcome;
            }

            let now = Instant::now();
            if now >= deadline {
                let state = RotationState::TimedOut;
                if let Some(outcome) = settle(state, identity, attempts, started, &mut last_error) {
                    return outcome;
                }
            }

            let pause = self.policy.poll_interval.min(deadline - now);
            debug!(attempt = attempts, pause_secs = pause.as_secs(), "Waiting before next poll");

            let cancelled = tokio::select! {
                _ = cancel.cancelled() => true,
                _ = sleep(pause) => false,
            };
            if cancelled {
                let state = RotationState::Cancelled;
                if let Some(outcome) = settle(state, identity, attempts, started, &mut last_error) {
                    return outcome;
                }
            }
        }
    }

    /// List keys, decide, and carry out any deletions
    async fn poll_once(
        &self,
        service: &F::Session,
        identity: &str,
        attempt: u32,
    ) -> KeyResult<RotationAttempt> {
        let keys = service
            .list_access_keys(identity)
            .await
            .map_err(|source| KeyError::KeyList {
                identity: identity.to_string(),
                source,
            })?;

        let decision = self.policy.decide(&keys, Utc::now());
        debug!(
            identity = identity,
            attempt = attempt,
            key_count = keys.len(),
            decision = ?decision,
            "Evaluated access keys"
        );

        match &decision {
            Decision::Delete(key_ids) => {
                for key_id in key_ids {
                    service
                        .delete_access_key(identity, key_id)
                        .await
                        .map_err(|source| KeyError::KeyDelete {
                            key_id: key_id.clone(),
                            source,
                        })?;
                    info!(identity = identity, key_id = %key_id, "Deleted stale access key");
                }
            }
            Decision::Wait => {
                info!(
                    identity = identity,
                    attempt = attempt,
                    "Existing access keys are too recent to delete, waiting"
                );
            }
            Decision::Satisfied | Decision::Fail(_) => {}
        }

        Ok(RotationAttempt {
            attempt,
            keys,
            decision,
        })
    }
}

/// Final result for a settled state, `None` while still polling
fn settle(
    state: RotationState,
    identity: &str,
    attempts: u32,
    started: Instant,
    last_error: &mut Option<KeyError>,
) -> Option<KeyResult<RotationAttempt>> {
    match state {
        RotationState::Polling => None,
        RotationState::Satisfied(attempt) => Some(Ok(attempt)),
        RotationState::Failed(e) => {
            error!(identity = identity, attempt = attempts, error = %e, "Access key rotation failed");
            Some(Err(e))
        }
        RotationState::TimedOut => {
            let waited = started.elapsed();
            error!(
                identity = identity,
                attempts = attempts,
                waited_secs = waited.as_secs(),
                "Timed out waiting for access key capacity"
            );
            Some(Err(KeyError::RotationTimeout {
                waited,
                attempts,
                last_error: last_error.take().map(Box::new),
            }))
        }
        RotationState::Cancelled => {
            warn!(identity = identity, attempts = attempts, "Access key rotation cancelled");
            Some(Err(KeyError::Cancelled))
        }
    }
}
