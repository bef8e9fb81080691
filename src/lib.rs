pub mod api;
pub mod config;
pub mod contact;
pub mod diagnostics;
pub mod http;

pub use api::{ApiError, ContactsApi};
pub use config::{ApiConfig, BuildMode, RetryPolicy};
pub use contact::{Contact, ContactId, ContactInput};
pub use diagnostics::{Diagnostics, OperationContext, RemoteSink};
pub use http::{ErrorKind, Operation};
