//! CCS credential session and access key rotation
//!
//! Provides a lazily initialized identity service session, verification of
//! the caller identity, and safe rotation of a service account's access keys
//! under the provider's two-keys-per-identity quota.
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


pub mod aws;
pub mod error;
pub mod identity;
pub mod key_types;
pub mod memory;
pub mod policy;
pub mod rotator;
pub mod session;
pub mod verifier;

pub use aws::{AwsSession, AwsSessionFactory};
pub use error::{KeyError, KeyResult, ServiceError, ServiceResult};
pub use identity::IdentityService;
pub use key_types::{AccessKey, AccessKeyId, KeyPair, KeyStatus, CCS_ADMIN_IDENTITY};
pub use memory::InMemoryIdentityService;
pub use policy::{Decision, RotationPolicy};
pub use rotator::{KeyRotator, RotationAttempt, RotationState};
pub use session::{SessionFactory, SessionProvider};
pub use verifier::{IdentityCheck, IdentityVerifier};
