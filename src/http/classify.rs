//! Error classification and the safe messages shown to users.
//!
//! Every failure maps to exactly one [`ErrorKind`]. The kind decides whether a
//! request is retried and which message the caller gets back. Messages are
//! fixed strings: they never carry URLs, status codes or backend details.

use serde::Serialize;
use std::fmt;

use super::retry::Failure;
use super::transport::TransportError;
use crate::diagnostics::{Diagnostics, OperationContext};

/// Coarse class of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No connectivity or another transport-level failure.
    Network,
    /// The request exceeded its time budget or was aborted.
    Timeout,
    /// The server answered with a 5xx status.
    Server,
    /// The server answered with a 4xx status.
    Client,
    /// Nothing more specific applies.
    Default,
}

impl ErrorKind {
    /// Network, timeout and server failures may succeed when re-sent.
    /// Client errors will not change on retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server)
    }

    /// Generic safe message for this kind.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::Network => "No hay conexión con el servidor.",
            ErrorKind::Timeout => "El servidor tardó demasiado en responder.",
            ErrorKind::Server => "El servidor presentó un problema.",
            ErrorKind::Client => {
                "No pudimos completar la acción. Verifica los datos e intenta de nuevo."
            }
            ErrorKind::Default => "Ocurrió un error inesperado.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "NETWORK"),
            ErrorKind::Timeout => write!(f, "TIMEOUT"),
            ErrorKind::Server => write!(f, "SERVER"),
            ErrorKind::Client => write!(f, "CLIENT"),
            ErrorKind::Default => write!(f, "DEFAULT"),
        }
    }
}

/// Resource operations that have their own contextual message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Create,
    Delete,
}

impl Operation {
    /// Contextual safe message for this operation.
    pub fn message(self) -> &'static str {
        match self {
            Operation::List => "No pudimos cargar los contactos. Intenta nuevamente más tarde.",
            Operation::Create => {
                "Ocurrió un problema de conexión. No se pudo agregar el contacto."
            }
            Operation::Delete => {
                "Ocurrió un problema de conexión. No se pudo eliminar el contacto."
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::List => write!(f, "list"),
            Operation::Create => write!(f, "create"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Kind plus the message the caller will see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub safe_message: &'static str,
}

/// Classifies a failure. First match wins:
///
/// 1. a response status of 500+ is [`ErrorKind::Server`], 400+ is [`ErrorKind::Client`];
/// 2. tagged transport failures map directly;
/// 3. untagged failures fall back to sniffing their message.
pub fn classify(error: Option<&TransportError>, status: Option<u16>) -> ErrorKind {
    if let Some(status) = status {
        if status >= 500 {
            return ErrorKind::Server;
        }
        if status >= 400 {
            return ErrorKind::Client;
        }
    }

    match error {
        Some(TransportError::Connect(_)) | Some(TransportError::Request(_)) => {
            ErrorKind::Network
        }
        Some(TransportError::Timeout(_)) => ErrorKind::Timeout,
        Some(TransportError::Other(msg)) => classify_message(msg),
        None => ErrorKind::Default,
    }
}

/// Message heuristics for transports that give no structured signal.
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();
    if message.contains("network") || message.contains("failed to fetch") {
        ErrorKind::Network
    } else if message.contains("timeout") || message.contains("aborted") {
        ErrorKind::Timeout
    } else {
        ErrorKind::Default
    }
}

/// Message for a failed operation. The operation's contextual message wins
/// over the generic one for the kind.
pub fn safe_message(kind: ErrorKind, operation: Option<Operation>) -> &'static str {
    match operation {
        Some(operation) => operation.message(),
        None => kind.message(),
    }
}

/// Central failure handler: classifies, records diagnostics with the full
/// context, and returns what the caller is allowed to see.
pub fn handle_api_error(
    failure: &Failure,
    context: &OperationContext,
    diagnostics: &Diagnostics,
) -> ClassifiedError {
    let kind = failure.kind();
    let safe_message = safe_message(kind, Some(context.operation));

    diagnostics.record(failure, context);

    ClassifiedError { kind, safe_message }
}
