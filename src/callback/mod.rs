//! HTTP callback sink.
//!
//! # Endpoints
//!
//! - `POST <path>` - Accepts result callbacks (returns 200 once read)
//! - `GET /health` - Returns 200 if the listener is running
//!
//! When a [`SignatureVerifier`] is supplied, the callback route is wrapped in
//! [`verify_signature`] and unauthenticated requests get 401 before the body
//! is decoded. A callback that is not fully received within the request
//! timeout gets 408.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;

pub mod handler;
pub mod health;

pub use handler::{HandlerFn, ResultHandler, callback_handler, handler_fn};
pub use health::health_handler;

use crate::correlate::CorrelatorRegistry;
use crate::signature::{DEFAULT_MAX_BODY_BYTES, SignatureVerifier, verify_signature};

/// Default callback route.
pub const DEFAULT_CALLBACK_PATH: &str = "/";

/// Default limit on handling one callback, body read included.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

const HEALTH_PATH: &str = "/health";

/// Whether `path` can be served as the callback route.
///
/// The path must be absolute, use only URI path characters, contain no
/// capture syntax, and not collide with the health route.
pub fn is_valid_callback_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    let allowed = |c: char| c.is_ascii_alphanumeric() || "-._~/!$&'()+,;=:@%".contains(c);
    path != HEALTH_PATH
        && path.chars().all(allowed)
        && !rest.split('/').any(|segment| segment.starts_with(':'))
}

/// Shared state for the callback routes.
#[derive(Clone)]
pub struct CallbackState {
    inner: Arc<CallbackStateInner>,
}

struct CallbackStateInner {
    handler: Arc<dyn ResultHandler>,
    registry: Option<CorrelatorRegistry>,
    path: String,
    max_body_bytes: usize,
    request_timeout: Duration,
}

impl CallbackState {
    pub fn new(handler: Arc<dyn ResultHandler>) -> Self {
        CallbackState {
            inner: Arc::new(CallbackStateInner {
                handler,
                registry: None,
                path: DEFAULT_CALLBACK_PATH.to_string(),
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
                request_timeout: DEFAULT_CALLBACK_TIMEOUT,
            }),
        }
    }

    /// Routes decoded results to active correlators as well as the handler.
    pub fn with_registry(self, registry: CorrelatorRegistry) -> Self {
        self.map(|inner| inner.registry = Some(registry))
    }

    pub fn with_path(self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.map(|inner| inner.path = path)
    }

    pub fn with_max_body_bytes(self, limit: usize) -> Self {
        self.map(|inner| inner.max_body_bytes = limit)
    }

    pub fn with_request_timeout(self, timeout: Duration) -> Self {
        self.map(|inner| inner.request_timeout = timeout)
    }

    pub fn handler(&self) -> &Arc<dyn ResultHandler> {
        &self.inner.handler
    }

    pub fn registry(&self) -> Option<&CorrelatorRegistry> {
        self.inner.registry.as_ref()
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn max_body_bytes(&self) -> usize {
        self.inner.max_body_bytes
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    /// Builder helper; only used before the state is shared.
    fn map(self, f: impl FnOnce(&mut CallbackStateInner)) -> Self {
        let mut inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => CallbackStateInner {
                handler: Arc::clone(&shared.handler),
                registry: shared.registry.clone(),
                path: shared.path.clone(),
                max_body_bytes: shared.max_body_bytes,
                request_timeout: shared.request_timeout,
            },
        };
        f(&mut inner);
        CallbackState {
            inner: Arc::new(inner),
        }
    }
}

/// Builds the callback router.
///
/// # Panics
///
/// If the state's path fails [`is_valid_callback_path`].
pub fn build_router(state: CallbackState, verifier: Option<Arc<SignatureVerifier>>) -> Router {
    let callback = post(callback_handler).layer(DefaultBodyLimit::max(state.max_body_bytes()));
    let mut callback_routes = Router::new().route(state.path(), callback);
    if let Some(verifier) = verifier {
        callback_routes =
            callback_routes.route_layer(axum::middleware::from_fn_with_state(verifier, verify_signature));
    }
    callback_routes = callback_routes.route_layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_timeout))
            .layer(TimeoutLayer::new(state.request_timeout())),
    );

    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .merge(callback_routes)
        .with_state(state)
}

async fn handle_timeout(_: tower::BoxError) -> (StatusCode, &'static str) {
    (StatusCode::REQUEST_TIMEOUT, "Request Timeout")
}
