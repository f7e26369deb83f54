//! Bundled interceptors.
//!
//! Header and closure-based mutators work in both chains; the rest are
//! application interceptors because they act across attempts.
//!
//! | Interceptor | Chain |
//! |---|---|
//! | [`SetRequestHeader`], [`AddRequestHeader`], [`RemoveRequestHeader`] | both |
//! | [`SetResponseHeader`], [`AddResponseHeader`], [`RemoveResponseHeader`] | both |
//! | [`ModifyRequest`], [`ModifyResponse`] | both |
//! | [`SetRequestTimeout`] | application |
//! | [`MatchOrigin`] | application |
//! | [`RetryRequests`] | application |
//! | [`FollowRedirects`] | application |
//! | [`CookieHandler`] | application |

mod cookie;
mod headers;
mod modify;
mod origin;
mod redirect;
mod retry;
mod timeout;

pub use cookie::{Cookie, CookieHandler, CookieJar, InMemoryCookieJar};
pub use headers::{
    AddRequestHeader, AddResponseHeader, RemoveRequestHeader, RemoveResponseHeader,
    SetRequestHeader, SetResponseHeader,
};
pub use modify::{ModifyRequest, ModifyResponse};
pub use origin::MatchOrigin;
pub use redirect::FollowRedirects;
pub use retry::RetryRequests;
pub use timeout::SetRequestTimeout;
