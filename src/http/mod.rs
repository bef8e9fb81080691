//! HTTP plumbing: transport seam, error classification and retry.

mod classify;
mod retry;
mod transport;

pub use classify::{
    ClassifiedError, ErrorKind, Operation, classify, classify_message, handle_api_error,
    safe_message,
};
pub use retry::{Failure, execute_with_retry};
pub use transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, Transport, TransportError};

#[cfg(test)]
pub use transport::MockTransport;
