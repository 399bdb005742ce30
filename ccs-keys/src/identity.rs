//! Identity service interface
//!
//! The rotation protocol only needs four operations from the cloud identity
//! service. Backends:
//! - AWS IAM via rusoto (`AwsSession`)
//! - In-process service with fault injection (`InMemoryIdentityService`)
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


use crate::error::ServiceResult;
use crate::key_types::{AccessKey, KeyPair};
use async_trait::async_trait;

/// Trait for identity service backends
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Name of the identity the session is authenticated as
    async fn current_identity(&self) -> ServiceResult<String>;

    /// List all access keys owned by `identity`
    async fn list_access_keys(&self, identity: &str) -> ServiceResult<Vec<AccessKey>>;

    /// Delete a single access key owned by `identity`
    async fn delete_access_key(&self, identity: &str, key_id: &str) -> ServiceResult<()>;

    /// Issue a new access key pair for `identity`
    async fn create_access_key(&self, identity: &str) -> ServiceResult<KeyPair>;
}
