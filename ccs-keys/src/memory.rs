//! In-memory identity service
//!
//! Mirrors the IAM behaviour the rotator depends on (per-identity key quota,
//! case-sensitive identity names) and records every call so rotation runs can
//! be inspected. Faults can be scheduled per operation.
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


use crate::error::{KeyResult, ServiceError, ServiceResult};
use crate::identity::IdentityService;
use crate::key_types::{AccessKey, KeyPair};
use crate::session::SessionFactory;
use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Operation a fault can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CurrentIdentity,
    ListKeys,
    DeleteKey,
    CreateKey,
}

#[derive(Debug)]
struct Fault {
    error: ServiceError,
    /// `None` fails forever
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    caller: String,
    keys: HashMap<String, Vec<AccessKey>>,
    max_keys: usize,
    faults: HashMap<Operation, Fault>,
    calls: HashMap<Operation, usize>,
    deleted: Vec<String>,
    created: Vec<String>,
}

impl State {
    fn record(&mut self, operation: Operation) -> ServiceResult<()> {
        *self.calls.entry(operation).or_insert(0) += 1;

        let Some(fault) = self.faults.get_mut(&operation) else {
            return Ok(());
        };
        let error = fault.error.clone();
        let exhausted = match fault.remaining.as_mut() {
            None => false,
            Some(n) => {
                *n -= 1;
                *n == 0
            }
        };
        if exhausted {
            self.faults.remove(&operation);
        }
        Err(error)
    }

    fn keys_for(&mut self, identity: &str) -> ServiceResult<&mut Vec<AccessKey>> {
        self.keys
            .get_mut(identity)
            .ok_or_else(|| ServiceError::NoSuchEntity(format!("The user with name {} cannot be found.", identity)))
    }
}

/// Identity service backed by process memory.
///
/// Cloning shares the underlying state, so a clone handed to a
/// [`SessionProvider`](crate::SessionProvider) stays observable from the test.
#[derive(Clone)]
pub struct InMemoryIdentityService {
    state: Arc<Mutex<State>>,
}

impl InMemoryIdentityService {
    /// Create a service authenticated as `caller`, who exists with no keys
    pub fn new(caller: impl Into<String>) -> Self {
        let caller = caller.into();
        let mut keys = HashMap::new();
        keys.insert(caller.clone(), Vec::new());

        Self {
            state: Arc::new(Mutex::new(State {
                caller,
                keys,
                max_keys: 2,
                ..Default::default()
            })),
        }
    }

    /// Change the per-identity key quota (IAM allows 2)
    pub async fn set_max_keys(&self, max_keys: usize) {
        self.state.lock().await.max_keys = max_keys;
    }

    /// Register an identity with no keys
    pub async fn add_identity(&self, identity: impl Into<String>) {
        self.state
            .lock()
            .await
            .keys
            .entry(identity.into())
            .or_default();
    }

    /// Seed an existing key, bypassing the quota
    pub async fn insert_key(&self, key: AccessKey) {
        self.state
            .lock()
            .await
            .keys
            .entry(key.owning_identity.clone())
            .or_default()
            .push(key);
    }

    /// Remove a key out of band, as another operator would
    pub async fn retire_key(&self, identity: &str, key_id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.keys.get_mut(identity) {
            Some(keys) => {
                let before = keys.len();
                keys.retain(|k| k.id != key_id);
                keys.len() != before
            }
            None => false,
        }
    }

    /// Fail the next `times` calls of `operation`
    pub async fn fail_times(&self, operation: Operation, error: ServiceError, times: usize) {
        if times == 0 {
            return;
        }
        self.state.lock().await.faults.insert(
            operation,
            Fault {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Fail every call of `operation` until cleared
    pub async fn fail_always(&self, operation: Operation, error: ServiceError) {
        self.state.lock().await.faults.insert(
            operation,
            Fault {
                error,
                remaining: None,
            },
        );
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    /// Current keys of `identity`
    pub async fn keys(&self, identity: &str) -> Vec<AccessKey> {
        self.state
            .lock()
            .await
            .keys
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of calls made to `operation`, including failed ones
    pub async fn calls(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Ids of keys deleted through the service, in order
    pub async fn deleted_keys(&self) -> Vec<String> {
        self.state.lock().await.deleted.clone()
    }

    /// Ids of keys created through the service, in order
    pub async fn created_keys(&self) -> Vec<String> {
        self.state.lock().await.created.clone()
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentityService {
    async fn current_identity(&self) -> ServiceResult<String> {
        let mut state = self.state.lock().await;
        state.record(Operation::CurrentIdentity)?;
        Ok(state.caller.clone())
    }

    async fn list_access_keys(&self, identity: &str) -> ServiceResult<Vec<AccessKey>> {
        let mut state = self.state.lock().await;
        state.record(Operation::ListKeys)?;
        Ok(state.keys_for(identity)?.clone())
    }

    async fn delete_access_key(&self, identity: &str, key_id: &str) -> ServiceResult<()> {
        let mut state = self.state.lock().await;
        state.record(Operation::DeleteKey)?;

        let keys = state.keys_for(identity)?;
        let position = keys
            .iter()
            .position(|k| k.id == key_id)
            .ok_or_else(|| ServiceError::NoSuchEntity(format!("The Access Key with id {} cannot be found.", key_id)))?;
        keys.remove(position);
        state.deleted.push(key_id.to_string());

        debug!(identity = identity, key_id = key_id, "Deleted in-memory access key");
        Ok(())
    }

    async fn create_access_key(&self, identity: &str) -> ServiceResult<KeyPair> {
        let mut state = self.state.lock().await;
        state.record(Operation::CreateKey)?;

        let max_keys = state.max_keys;
        let keys = state.keys_for(identity)?;
        if keys.len() >= max_keys {
            return Err(ServiceError::LimitExceeded(format!(
                "Cannot exceed quota for AccessKeysPerUser: {}",
                max_keys
            )));
        }

        let pair = KeyPair::new(generate_key_id(), generate_secret());
        keys.push(AccessKey::new(pair.access_key_id.clone(), identity, Utc::now()));
        state.created.push(pair.access_key_id.clone());

        debug!(identity = identity, key_id = %pair.access_key_id, "Created in-memory access key");
        Ok(pair)
    }
}

#[async_trait]
impl SessionFactory for InMemoryIdentityService {
    type Session = InMemoryIdentityService;

    async fn create_session(&self) -> KeyResult<InMemoryIdentityService> {
        Ok(self.clone())
    }
}

fn generate_key_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("AKIA{}", &suffix[..16])
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect()
}
