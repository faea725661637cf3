//! Errors raised while handling an admin request.
//!
//! Anything a handler can answer with a proper status code it answers
//! directly; an `ApiError` escaping a handler is logged by the server and the
//! request is concluded with a 500 and `Connection: close`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("the {0} event loop is not running")]
    LoopStopped(&'static str),

    #[error("request body was not parsed before dispatch")]
    MissingBody,
}
