//! AWS IAM backed identity service
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


use crate::error::{KeyError, KeyResult, ServiceError, ServiceResult};
use crate::identity::IdentityService;
use crate::key_types::{AccessKey, KeyPair, KeyStatus};
use crate::session::SessionFactory;
use async_trait::async_trait;
use ccs_config::AwsCredentialsConfig;
use chrono::{DateTime, Utc};
use rusoto_core::{request::HttpClient, Region, RusotoError};
use rusoto_credential::StaticProvider;
use rusoto_iam::{
    AccessKeyMetadata, CreateAccessKeyError, CreateAccessKeyRequest, DeleteAccessKeyError,
    DeleteAccessKeyRequest, GetUserError, GetUserRequest, Iam, IamClient, ListAccessKeysError,
    ListAccessKeysRequest,
};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Builds [`AwsSession`]s from static credentials
pub struct AwsSessionFactory {
    credentials: AwsCredentialsConfig,
}

impl AwsSessionFactory {
    pub fn new(credentials: AwsCredentialsConfig) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl SessionFactory for AwsSessionFactory {
    type Session = AwsSession;

    async fn create_session(&self) -> KeyResult<AwsSession> {
        AwsSession::new(&self.credentials)
    }
}

/// Authenticated IAM client
pub struct AwsSession {
    client: IamClient,
    region: Region,
}

impl fmt::Debug for AwsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSession")
            .field("region", &self.region.name())
            .finish()
    }
}

impl AwsSession {
    /// Create an IAM client for the given credentials and region
    pub fn new(config: &AwsCredentialsConfig) -> KeyResult<Self> {
        if config.access_key.trim().is_empty() || config.secret_key.trim().is_empty() {
            return Err(KeyError::Configuration(
                "AWS access key and secret key are required".to_string(),
            ));
        }

        let region = Region::from_str(config.region.trim()).map_err(|e| {
            KeyError::Configuration(format!("Invalid AWS region {:?}: {}", config.region, e))
        })?;

        let credentials =
            StaticProvider::new_minimal(config.access_key.clone(), config.secret_key.clone());

        let http_client = HttpClient::new()
            .map_err(|e| KeyError::SessionInit(format!("Failed to create HTTP client: {}", e)))?;

        let signing = signing_region(&region);
        info!(
            region = region.name(),
            signing_region = signing.name(),
            "Creating IAM client"
        );

        Ok(Self {
            client: IamClient::new_with(http_client, credentials, signing),
            region,
        })
    }

    pub fn region(&self) -> &Region {
        &self.region
    }
}

#[async_trait]
impl IdentityService for AwsSession {
    async fn current_identity(&self) -> ServiceResult<String> {
        let response = self
            .client
            .get_user(GetUserRequest::default())
            .await
            .map_err(|e| {
                classify(e, |e| match e {
                    GetUserError::NoSuchEntity(m) => ServiceError::NoSuchEntity(m),
                    GetUserError::ServiceFailure(m) => ServiceError::Unavailable(m),
                })
            })?;

        Ok(response.user.user_name)
    }

    async fn list_access_keys(&self, identity: &str) -> ServiceResult<Vec<AccessKey>> {
        let mut keys = Vec::new();
        let mut marker = None;

        loop {
            let response = self
                .client
                .list_access_keys(ListAccessKeysRequest {
                    marker: marker.take(),
                    max_items: None,
                    user_name: Some(identity.to_string()),
                })
                .await
                .map_err(|e| {
                    classify(e, |e| match e {
                        ListAccessKeysError::NoSuchEntity(m) => ServiceError::NoSuchEntity(m),
                        ListAccessKeysError::ServiceFailure(m) => ServiceError::Unavailable(m),
                    })
                })?;

            for metadata in response.access_key_metadata {
                keys.push(to_access_key(identity, metadata)?);
            }

            match (response.is_truncated, response.marker) {
                (Some(true), Some(next)) => marker = Some(next),
                _ => break,
            }
        }

        debug!(identity = identity, count = keys.len(), "Listed access keys");
        Ok(keys)
    }

    async fn delete_access_key(&self, identity: &str, key_id: &str) -> ServiceResult<()> {
        self.client
            .delete_access_key(DeleteAccessKeyRequest {
                access_key_id: key_id.to_string(),
                user_name: Some(identity.to_string()),
            })
            .await
            .map_err(|e| {
                classify(e, |e| match e {
                    DeleteAccessKeyError::LimitExceeded(m) => ServiceError::LimitExceeded(m),
                    DeleteAccessKeyError::NoSuchEntity(m) => ServiceError::NoSuchEntity(m),
                    DeleteAccessKeyError::ServiceFailure(m) => ServiceError::Unavailable(m),
                })
            })
    }

    async fn create_access_key(&self, identity: &str) -> ServiceResult<KeyPair> {
        let response = self
            .client
            .create_access_key(CreateAccessKeyRequest {
                user_name: Some(identity.to_string()),
            })
            .await
            .map_err(|e| {
                classify(e, |e| match e {
                    CreateAccessKeyError::LimitExceeded(m) => ServiceError::LimitExceeded(m),
                    CreateAccessKeyError::NoSuchEntity(m) => ServiceError::NoSuchEntity(m),
                    CreateAccessKeyError::ServiceFailure(m) => ServiceError::Unavailable(m),
                })
            })?;

        let key = response.access_key;
        Ok(KeyPair::new(key.access_key_id, key.secret_access_key))
    }
}

fn to_access_key(identity: &str, metadata: AccessKeyMetadata) -> ServiceResult<AccessKey> {
    let id = metadata
        .access_key_id
        .ok_or_else(|| ServiceError::Unexpected("access key without an id".to_string()))?;

    let created_at = metadata
        .create_date
        .as_deref()
        .ok_or_else(|| ServiceError::Unexpected(format!("access key {} has no create date", id)))
        .and_then(parse_create_date)?;

    Ok(AccessKey {
        owning_identity: metadata.user_name.unwrap_or_else(|| identity.to_string()),
        status: KeyStatus::parse(metadata.status.as_deref()),
        created_at,
        id,
    })
}

fn parse_create_date(raw: &str) -> ServiceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| ServiceError::Unexpected(format!("invalid create date {:?}: {}", raw, e)))
}

/// Map a rusoto error onto the retry classification used by the rotator
/// IAM is a global service: requests go to the partition endpoint and must be
/// signed for the partition's home region, whatever region the cluster runs in.
fn signing_region(region: &Region) -> Region {
    match region {
        Region::Custom { .. } => region.clone(),
        Region::CnNorth1 | Region::CnNorthwest1 => Region::CnNorth1,
        Region::UsGovEast1 | Region::UsGovWest1 => Region::Custom {
            name: Region::UsGovWest1.name().to_string(),
            endpoint: "https://iam.us-gov.amazonaws.com".to_string(),
        },
        _ => Region::UsEast1,
    }
}

fn classify<E>(err: RusotoError<E>, service: impl FnOnce(E) -> ServiceError) -> ServiceError {
    match err {
        RusotoError::Service(e) => service(e),
        RusotoError::HttpDispatch(e) => ServiceError::Unavailable(e.to_string()),
        RusotoError::Credentials(e) => ServiceError::AccessDenied(e.to_string()),
        RusotoError::Validation(message) => ServiceError::InvalidRequest(message),
        RusotoError::ParseError(message) => ServiceError::Unexpected(message),
        RusotoError::Unknown(response) => {
            let status = response.status.as_u16();
            let body = String::from_utf8_lossy(&response.body).to_string();
            classify_status(status, body)
        }
        RusotoError::Blocking => {
            ServiceError::Unavailable("blocking call to IAM failed".to_string())
        }
    }
}

fn classify_status(status: u16, body: String) -> ServiceError {
    let message = format!("HTTP {}: {}", status, body);
    match status {
        _ if body.contains("Throttling") => ServiceError::Unavailable(message),
        401 | 403 => ServiceError::AccessDenied(message),
        429 | 500..=599 => ServiceError::Unavailable(message),
        _ => ServiceError::Unexpected(message),
    }
}
