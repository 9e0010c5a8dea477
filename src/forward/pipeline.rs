//! Body hooks applied while relaying.
//!
//! A pipeline can swap or reject the request body before it is sent, and
//! rewrite each response chunk before it reaches the sink.

use axum::body::{Body, Bytes};

use crate::forward::error::BoxError;

pub trait Pipeline: Send + Sync {
    /// Called once with the inbound body. An error aborts the relay before
    /// anything is sent to the backend.
    fn request_body(&self, body: Body) -> Result<Body, BoxError> {
        Ok(body)
    }

    /// Called for every chunk of the backend response body.
    fn response_chunk(&self, chunk: Bytes) -> Result<Bytes, BoxError> {
        Ok(chunk)
    }
}

/// Forwards both bodies untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Pipeline for Passthrough {}
