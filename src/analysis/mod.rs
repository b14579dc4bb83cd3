//! Analysis Invoker
//!
//! Performs exactly one remote call per dequeued question and hands the raw
//! body to the normalizer. Every failure below this point (transport,
//! timeout, unrecognized payload, a panicking normalizer) is absorbed here
//! and turned into the fixed fallback reply, so the queue's drain loop never
//! sees an error.

pub mod http;
pub mod normalizer;
pub mod provider;

pub use http::HttpAnalysisService;
pub use normalizer::{normalize, NormalizationError, Reply};
pub use provider::{AnalysisService, TransportError};

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// User-facing text for any failed analysis exchange.
pub const FALLBACK_TEXT: &str = "Unable to respond right now.";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error("analysis pipeline panicked")]
    Panicked,
}

/// Result of one exchange: always a displayable reply, plus the cause when
/// that reply is the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub reply: Reply,
    pub error: Option<InvokeError>,
}

impl Invocation {
    pub fn answered(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone)]
pub struct AnalysisInvoker {
    service: Arc<dyn AnalysisService>,
    timeout: Duration,
}

impl AnalysisInvoker {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self {
            service,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn invoke(&self, storage_key: &str, question: &str) -> Invocation {
        match self.try_invoke(storage_key, question).await {
            Ok(reply) => {
                info!(kind = ?reply.body.kind(), "Analysis answered");
                Invocation { reply, error: None }
            }
            Err(err) => {
                warn!(error = %err, storage_key, "Analysis failed, replying with fallback");
                Invocation {
                    reply: Reply::text(FALLBACK_TEXT),
                    error: Some(err),
                }
            }
        }
    }

    pub async fn try_invoke(&self, storage_key: &str, question: &str) -> Result<Reply, InvokeError> {
        let call = AssertUnwindSafe(self.service.analyze(storage_key, question)).catch_unwind();

        let raw = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => return Err(TransportError::Timeout.into()),
            Ok(Err(_)) => return Err(InvokeError::Panicked),
            Ok(Ok(result)) => result?,
        };

        std::panic::catch_unwind(|| normalize(&raw, question))
            .map_err(|_| InvokeError::Panicked)?
            .map_err(InvokeError::from)
    }
}
