use std::process::ExitCode;
use std::sync::Arc;

use query_delivery::callback::{CallbackState, build_router, handler_fn};
use query_delivery::config::Config;
use query_delivery::keys::KeyCache;
use query_delivery::signature::SignatureVerifier;
use query_delivery::transport::ReqwestTransport;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_delivery=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let verifier = if config.verify_signatures {
        let transport = Arc::new(ReqwestTransport::with_default_timeout()?);
        let keys = Arc::new(KeyCache::new(transport, config.key_cache_config()));
        Some(Arc::new(SignatureVerifier::new(keys, config.verifier_config())))
    } else {
        warn!("Signature verification disabled");
        None
    };

    let handler = handler_fn(|result| async move {
        info!(
            request_id = %result.request_id,
            url = %result.url,
            complete = result.is_complete(),
            "Result received"
        );
    });
    let state = CallbackState::new(Arc::new(handler))
        .with_path(config.callback_path.clone())
        .with_max_body_bytes(config.max_body_bytes)
        .with_request_timeout(config.callback_timeout);
    let app = build_router(state, verifier);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, path = %config.callback_path, "Listening for callbacks");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
