//! Diagnostic reporting for failed API calls.
//!
//! Diagnostics see the full failure and its context. Nothing recorded here
//! ever reaches the user-facing message.

use anyhow::Result;
use log::{debug, error};
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::BuildMode;
use crate::http::Operation;

/// What was being attempted when a request failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationContext {
    /// Resource path, e.g. `/contactos/42`. Never the full URL.
    pub endpoint: String,
    pub method: String,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Body sent with write requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl OperationContext {
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            operation,
            status: None,
            status_text: None,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_status(mut self, status: u16, status_text: impl Into<String>) -> Self {
        self.status = Some(status);
        self.status_text = Some(status_text.into());
        self
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.method, self.endpoint, self.operation)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
            if let Some(text) = &self.status_text {
                write!(f, " {}", text)?;
            }
        }
        if let Some(payload) = &self.payload {
            write!(f, " payload={}", payload)?;
        }
        Ok(())
    }
}

/// Remote error collector used in production builds.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteSink: Send + Sync {
    fn capture(&self, failure: &str, context: &OperationContext) -> Result<()>;
}

/// Routes failures to the local log in development and to the remote
/// sink in production. Test mode stays silent.
#[derive(Clone, Default)]
pub struct Diagnostics {
    mode: BuildMode,
    remote: Option<Arc<dyn RemoteSink>>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("mode", &self.mode)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

impl Diagnostics {
    pub fn new(mode: BuildMode) -> Self {
        Self { mode, remote: None }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteSink>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Best effort: sink errors and sink panics are logged at debug and
    /// dropped.
    pub fn record(&self, failure: &dyn fmt::Display, context: &OperationContext) {
        match self.mode {
            BuildMode::Development => {
                error!("[API Error] {}", failure);
                error!("[API Error Context] {}", context);
            }
            BuildMode::Production => {
                if let Some(remote) = &self.remote {
                    let message = failure.to_string();
                    let captured =
                        panic::catch_unwind(AssertUnwindSafe(|| remote.capture(&message, context)));
                    match captured {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => debug!("Remote error capture failed: {}", e),
                        Err(_) => debug!("Remote error capture panicked"),
                    }
                }
            }
            BuildMode::Test => {}
        }
    }
}
