//! Axum middleware rejecting unauthenticated requests.
//!
//! Mounted with `axum::middleware::from_fn_with_state`. The body is buffered
//! (up to the configured limit) so the digest can be checked, then handed to
//! the inner handler unchanged.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{OriginalUri, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::SignatureVerifier;

/// Verifies the request signature before running the inner service.
pub async fn verify_signature(
    State(verifier): State<Arc<SignatureVerifier>>,
    request: Request,
    next: Next,
) -> Response {
    if verifier.skips_verification() {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, verifier.config().max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to read callback body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    // Nested routers strip their prefix from `uri`; the signer saw the full path.
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| parts.uri.clone());
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());

    match verifier
        .verify(&parts.method, target, &parts.headers, &body)
        .await
    {
        Ok(key_id) => {
            debug!(key_id = %key_id, "Authenticated callback");
            next.run(Request::from_parts(parts, Body::from(body))).await
        }
        Err(e) => {
            warn!(error = %e, "Rejected callback");
            e.into_response()
        }
    }
}
