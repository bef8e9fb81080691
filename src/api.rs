//! Contacts API client.
//!
//! Each operation runs through [`execute_with_retry`] and, on any failure,
//! through [`handle_api_error`]. Callers get an [`ApiError`] that carries the
//! safe message and nothing else.

use anyhow::Result;
use log::debug;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{ApiConfig, RetryPolicy};
use crate::contact::{Contact, ContactId, ContactInput};
use crate::diagnostics::{Diagnostics, OperationContext, RemoteSink};
use crate::http::{
    ApiRequest, ClassifiedError, ErrorKind, Failure, Operation, ReqwestTransport, Transport,
    execute_with_retry, handle_api_error, safe_message,
};

/// Error returned to API callers. Its `Display` is exactly the safe message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    kind: ErrorKind,
    message: &'static str,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn safe_message(&self) -> &'static str {
        self.message
    }
}

impl From<ClassifiedError> for ApiError {
    fn from(classified: ClassifiedError) -> Self {
        Self {
            kind: classified.kind,
            message: classified.safe_message,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for ApiError {}

/// Client for the `contactos` resource.
///
/// Holds no per-call state: clones share the transport and concurrent calls
/// are independent.
pub struct ContactsApi<T: Transport = ReqwestTransport> {
    transport: Arc<T>,
    config: ApiConfig,
    policy: RetryPolicy,
    diagnostics: Diagnostics,
}

impl<T: Transport> Clone for ContactsApi<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            policy: self.policy.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

impl ContactsApi<ReqwestTransport> {
    /// Builds a reqwest-backed client.
    pub fn from_config(config: ApiConfig) -> Result<Self> {
        let transport = ReqwestTransport::build(config.request_timeout())?;
        Self::new(transport, config)
    }
}

impl<T: Transport> ContactsApi<T> {
    /// Diagnostics follow `config.mode`.
    pub fn new(transport: T, config: ApiConfig) -> Result<Self> {
        config.validate()?;
        let policy = config.retry_policy()?;
        let diagnostics = Diagnostics::new(config.mode);
        Ok(Self {
            transport: Arc::new(transport),
            config,
            policy,
            diagnostics,
        })
    }

    /// Sends production failures to `remote`. Other modes ignore it.
    pub fn with_remote_sink(mut self, remote: Arc<dyn RemoteSink>) -> Self {
        self.diagnostics = self.diagnostics.with_remote(remote);
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Lists all contacts. A body that is not a JSON array yields an empty list.
    pub async fn list(&self) -> Result<Vec<Contact>, ApiError> {
        self.list_with(&CancellationToken::new()).await
    }

    /// Creates a contact and returns the stored record.
    pub async fn create(&self, input: &ContactInput) -> Result<Contact, ApiError> {
        self.create_with(input, &CancellationToken::new()).await
    }

    /// Deletes a contact by id.
    pub async fn delete(&self, id: &ContactId) -> Result<bool, ApiError> {
        self.delete_with(id, &CancellationToken::new()).await
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn list_with(&self, cancel: &CancellationToken) -> Result<Vec<Contact>, ApiError> {
        let request = ApiRequest::get(self.config.contactos_url());
        let context = OperationContext::new(self.endpoint(None), "GET", Operation::List);

        let result = async {
            let response =
                execute_with_retry(self.transport.as_ref(), &request, &self.policy, cancel).await?;
            decode_list(&response.body)
        }
        .await;

        result.map_err(|failure| self.fail(failure, context))
    }

    #[tracing::instrument(skip(self, input, cancel))]
    pub async fn create_with(
        &self,
        input: &ContactInput,
        cancel: &CancellationToken,
    ) -> Result<Contact, ApiError> {
        let payload = match serde_json::to_value(input) {
            Ok(payload) => payload,
            Err(e) => {
                let context = OperationContext::new(self.endpoint(None), "POST", Operation::Create);
                return Err(self.fail(Failure::Decode(e.to_string()), context));
            }
        };
        let request = ApiRequest::post_json(self.config.contactos_url(), payload.clone());
        let context = OperationContext::new(self.endpoint(None), "POST", Operation::Create)
            .with_payload(payload);

        let result = async {
            let response =
                execute_with_retry(self.transport.as_ref(), &request, &self.policy, cancel).await?;
            serde_json::from_slice::<Contact>(&response.body)
                .map_err(|e| Failure::Decode(e.to_string()))
        }
        .await;

        result.map_err(|failure| self.fail(failure, context))
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_with(
        &self,
        id: &ContactId,
        cancel: &CancellationToken,
    ) -> Result<bool, ApiError> {
        let context = OperationContext::new(self.endpoint(Some(id)), "DELETE", Operation::Delete);
        let request = match self.item_url(id) {
            Ok(url) => ApiRequest::delete(url),
            Err(failure) => return Err(self.fail(failure, context)),
        };

        execute_with_retry(self.transport.as_ref(), &request, &self.policy, cancel)
            .await
            .map(|_| true)
            .map_err(|failure| self.fail(failure, context))
    }

    /// URL of a single contact. The id is one percent-encoded path segment,
    /// so `/`, `?` and `#` cannot address another resource.
    fn item_url(&self, id: &ContactId) -> Result<String, Failure> {
        if matches!(id.as_str(), "" | "." | "..") {
            return Err(Failure::Invalid(format!("contact id {:?}", id.as_str())));
        }

        let mut url = reqwest::Url::parse(&self.config.contactos_url())
            .map_err(|e| Failure::Invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| Failure::Invalid("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url.into())
    }

    /// Resource path for diagnostics, never the full URL.
    fn endpoint(&self, id: Option<&ContactId>) -> String {
        let path = self.config.resource_path();
        match id {
            Some(id) => format!("/{}/{}", path, id),
            None => format!("/{}", path),
        }
    }

    /// Turns a failure into the sanitized caller-facing error.
    fn fail(&self, failure: Failure, mut context: OperationContext) -> ApiError {
        if let Failure::Status {
            status,
            status_text,
        } = &failure
        {
            context = context.with_status(*status, status_text.clone());
        }

        if failure == Failure::Cancelled {
            debug!("{}: cancelled by caller", context);
            return ApiError {
                kind: ErrorKind::Default,
                message: safe_message(ErrorKind::Default, Some(context.operation)),
            };
        }

        handle_api_error(&failure, &context, &self.diagnostics).into()
    }
}

/// Elements that are not contacts at all (no id, not an object) are dropped;
/// the rest of the array is kept.
fn decode_list(body: &[u8]) -> Result<Vec<Contact>, Failure> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Failure::Decode(e.to_string()))?;

    let serde_json::Value::Array(items) = value else {
        return Ok(Vec::new());
    };

    let total = items.len();
    let contacts: Vec<Contact> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if contacts.len() < total {
        debug!(
            "Skipped {} of {} list entries that are not contacts",
            total - contacts.len(),
            total
        );
    }
    Ok(contacts)
}
