//! Networking for GreenWatch
//!
//! This crate provides the single request pipeline every backend call goes
//! through: header attachment, dispatch with a fixed timeout, retry with
//! exponential backoff, and routing of terminal failures to the session
//! store and the global alert channel.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod request;
pub mod retry;
pub mod router;

pub use client::{ApiClient, ApiClientBuilder, ClientConfig};
pub use error::{ApiError, ErrorClass};
pub use request::{ApiResponse, HttpMethod, RequestContext};
pub use retry::{RetryDecision, RetryPolicy};
pub use router::{Disposition, ErrorRouter, LoginRedirect};

/// Result type for networking operations
pub type Result<T> = std::result::Result<T, ApiError>;
