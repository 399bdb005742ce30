//! Rotate the CCS admin access keys
//!
//! Usage:
//!   cargo run --bin rotate-ccs-keys
//!
//! Credentials and rotation settings come from the environment (or `.env`).
//! The caller identity is verified, the access keys are rotated, and the new
//! key pair is printed to stdout as JSON. Logs go to stderr.
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


use anyhow::Result;
use ccs_config::AppConfig;
use ccs_keys::{AwsSessionFactory, IdentityVerifier, KeyRotator, RotationPolicy, SessionProvider};
use ccs_logging::init_console_logging;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_console_logging("rotate-ccs-keys", "info");

    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    let identity = config.rotation.identity_name.clone();
    info!(
        identity = %identity,
        region = %config.aws.region,
        "Configuration loaded"
    );

    let sessions = Arc::new(SessionProvider::new(AwsSessionFactory::new(
        config.aws.clone(),
    )));

    let verifier = IdentityVerifier::new(Arc::clone(&sessions), identity.clone());
    let check = verifier.verify_identity().await?;
    if !check.matches_expected {
        warn!(
            caller = %check.identity_name,
            identity = %identity,
            "Rotating keys with credentials of a different identity"
        );
    }

    let rotator = KeyRotator::new(sessions, RotationPolicy::from_config(&config.rotation));

    // Ctrl-C aborts a rotation that is still waiting for capacity
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling key rotation");
            on_interrupt.cancel();
        }
    });

    let pair = rotator.rotate_keys_with_cancel(&identity, cancel).await?;

    println!("{}", serde_json::to_string_pretty(&pair)?);
    Ok(())
}
