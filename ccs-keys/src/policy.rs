//! Key rotation policy and the pure decision step of the poll loop
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


use crate::key_types::{AccessKey, AccessKeyId};
use ccs_config::RotationConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Reason reported when the identity holds more keys than the quota allows
pub const OVER_QUOTA_REASON: &str = "unable to generate key pair";

/// What one poll iteration decided to do with the listed keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The identity has room for a new key
    Satisfied,
    /// Delete these keys, then poll again
    Delete(Vec<AccessKeyId>),
    /// At quota and every key is too young to delete
    Wait,
    /// Terminal, rotation cannot proceed
    Fail(String),
}

/// Timing and quota parameters for key rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Delay between poll iterations
    pub poll_interval: Duration,
    /// Ceiling for the whole wait for capacity
    pub timeout: Duration,
    /// Keys younger than this are still in use by a recent consumer
    pub min_key_age: Duration,
    pub max_keys: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2 * 60),
            timeout: Duration::from_secs(90 * 60),
            min_key_age: Duration::from_secs(5 * 60),
            max_keys: 2,
        }
    }
}

impl RotationPolicy {
    pub fn from_config(config: &RotationConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            min_key_age: Duration::from_secs(config.min_key_age_secs),
            max_keys: config.max_keys_per_identity,
        }
    }

    /// Decide the next step for a snapshot of the identity's keys.
    ///
    /// Below quota the identity has capacity. At quota, every key created
    /// strictly before `now - min_key_age` is selected for deletion; success
    /// is only ever claimed by a later snapshot that is below quota.
    pub fn decide(&self, keys: &[AccessKey], now: DateTime<Utc>) -> Decision {
        if keys.len() < self.max_keys {
            return Decision::Satisfied;
        }

        if keys.len() > self.max_keys {
            return Decision::Fail(OVER_QUOTA_REASON.to_string());
        }

        let Ok(min_age) = chrono::Duration::from_std(self.min_key_age) else {
            return Decision::Wait;
        };
        let stale: Vec<AccessKeyId> = keys
            .iter()
            .filter(|key| key.is_older_than(min_age, now))
            .map(|key| key.id.clone())
            .collect();

        if stale.is_empty() {
            Decision::Wait
        } else {
            Decision::Delete(stale)
        }
    }
}
