//! Lazily initialized, shared identity service session
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
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// Builds the authenticated session handed out by a [`SessionProvider`]
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Send + Sync;

    async fn create_session(&self) -> KeyResult<Self::Session>;
}

/// Owns a single session, created on first use.
///
/// Concurrent first callers wait on the same initializer, and every caller
/// observes the same session or the same initialization error. A failed
/// initialization is not retried until [`SessionProvider::reset`] is called.
pub struct SessionProvider<F: SessionFactory> {
    factory: F,
    session: OnceCell<KeyResult<Arc<F::Session>>>,
}

impl<F: SessionFactory> SessionProvider<F> {
    /// Create a provider; nothing is initialized until the first request
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            session: OnceCell::new(),
        }
    }

    /// Get the session, initializing it if this is the first call
    pub async fn get_session(&self) -> KeyResult<Arc<F::Session>> {
        self.session
            .get_or_init(|| async {
                match self.factory.create_session().await {
                    Ok(session) => {
                        info!("Identity service session initialized");
                        Ok(Arc::new(session))
                    }
                    Err(e) => {
                        error!(error = %e, "Error initializing identity service session");
                        Err(match e {
                            KeyError::SessionInit(message) => KeyError::SessionInit(message),
                            other => KeyError::SessionInit(other.to_string()),
                        })
                    }
                }
            })
            .await
            .clone()
    }

    /// Get the session without triggering initialization
    pub fn current(&self) -> KeyResult<Arc<F::Session>> {
        match self.session.get() {
            Some(Ok(session)) => Ok(Arc::clone(session)),
            _ => Err(KeyError::SessionUnavailable),
        }
    }

    /// Whether a session was successfully initialized
    pub fn is_initialized(&self) -> bool {
        matches!(self.session.get(), Some(Ok(_)))
    }

    /// Drop the cached session or initialization error.
    ///
    /// The next [`get_session`](Self::get_session) call runs the factory again.
    pub fn reset(&mut self) {
        if self.session.take().is_some() {
            warn!("Identity service session reset");
        }
    }
}
