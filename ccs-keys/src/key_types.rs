//! Access key type definitions
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


use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical name of the CCS admin service account.
///
/// Listing, deletion and creation must all address this exact name; IAM user
/// names are case sensitive.
pub const CCS_ADMIN_IDENTITY: &str = ccs_config::DEFAULT_IDENTITY_NAME;

/// Unique identifier for an access key
pub type AccessKeyId = String;

/// Access key status as reported by IAM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStatus {
    Active,
    Inactive,
}

impl KeyStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("inactive") => KeyStatus::Inactive,
            _ => KeyStatus::Active,
        }
    }
}

/// Metadata for an access key owned by an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub id: AccessKeyId,
    pub owning_identity: String,
    pub created_at: DateTime<Utc>,
    pub status: KeyStatus,
}

impl AccessKey {
    pub fn new(
        id: impl Into<AccessKeyId>,
        owning_identity: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owning_identity: owning_identity.into(),
            created_at,
            status: KeyStatus::Active,
        }
    }

    /// Age of the key relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// True when the key was created strictly before `now - min_age`
    pub fn is_older_than(&self, min_age: Duration, now: DateTime<Utc>) -> bool {
        now.checked_sub_signed(min_age)
            .map_or(false, |cutoff| self.created_at < cutoff)
    }
}

/// Newly issued credential pair.
///
/// The secret is only ever handed back to the caller; `Debug` redacts it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub access_key_id: AccessKeyId,
    pub secret_access_key: String,
}

impl KeyPair {
    pub fn new(access_key_id: impl Into<AccessKeyId>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}
