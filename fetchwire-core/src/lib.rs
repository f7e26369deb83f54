//! Core types for the fetchwire HTTP client.
//!
//! This crate holds the data model shared by the client crate
//! (`fetchwire-client`) and by code that extends it, such as custom
//! interceptors and event listeners.
//!
//! ## Modules
//!
//! - [`error`]: Error taxonomy for the request pipeline
//! - [`origin`]: Scheme, host and port of a connection target
//! - [`request`] / [`response`]: The logical request and response
//! - [`body`]: Request and response bodies
//! - [`cancel`]: Cancellation tokens and derived timeouts

pub mod body;
pub mod cancel;
pub mod error;
pub mod headers;
pub mod origin;
pub mod request;
pub mod response;

pub use body::{BodyFrame, BodySender, RequestBody, ResponseBody};
pub use cancel::{CancellationToken, LinkedToken};
pub use error::{Error, ErrorKind};
pub use origin::{Origin, Scheme};
pub use request::{DEFAULT_BODY_SIZE_LIMIT, DEFAULT_HEADER_SIZE_LIMIT, Request};
pub use response::{Completion, Response};

pub use http::{HeaderMap, Method, StatusCode, Uri, Version, header};
