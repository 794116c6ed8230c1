//! Webhook entrypoint and the handler capability it dispatches to.

use std::future::Future;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use super::CallbackState;
use crate::codec;
use crate::types::QueryResult;

/// Receives every successfully decoded callback result.
#[async_trait]
pub trait ResultHandler: Send + Sync + 'static {
    async fn handle(&self, result: QueryResult);
}

/// Adapts an async closure into a [`ResultHandler`].
///
/// ```
/// use query_delivery::callback::handler_fn;
///
/// let handler = handler_fn(|result| async move {
///     println!("{} done", result.request_id);
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(QueryResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    HandlerFn(f)
}

/// See [`handler_fn`].
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> ResultHandler for HandlerFn<F>
where
    F: Fn(QueryResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, result: QueryResult) {
        (self.0)(result).await
    }
}

/// Callback handler.
///
/// Decodes the body under its `Content-Type` and hands the result to the
/// correlator registry and the registered [`ResultHandler`] on a spawned task.
///
/// # Response
///
/// - 200 OK: always, once the body has been read. Undecodable payloads are
///   logged and dropped: the sender would only retry a payload that can never
///   decode.
/// - 413 Payload Too Large: body exceeded the limit (from the extractor).
pub async fn callback_handler(
    State(state): State<CallbackState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    match codec::decode_with_header(content_type, &body) {
        Ok(result) => {
            debug!(request_id = %result.request_id, complete = result.is_complete(), "Received callback");
            tokio::spawn(dispatch(state, result));
        }
        Err(e) => {
            warn!(error = %e, len = body.len(), "Dropping undecodable callback");
        }
    }

    StatusCode::OK
}

async fn dispatch(state: CallbackState, result: QueryResult) {
    if let Some(registry) = state.registry() {
        registry.deliver(&result);
    }
    state.handler().handle(result).await;
}
