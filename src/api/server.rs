//! HTTP server lifecycle: bind, serve, shut down.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::api::router::api_router;
use crate::core_state::CoreState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bind `addr`; port 0 picks an ephemeral port.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(core: Arc<CoreState>, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local = listener.local_addr()?;
    let app = api_router(core);

    tracing::info!(addr = %local, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!(addr = %local, "API server stopped");
    Ok(())
}

/// Serve on the configured address until Ctrl-C.
pub async fn run_server(core: Arc<CoreState>) -> Result<(), ServerError> {
    let listener = bind(core.settings.bind).await?;
    serve(core, listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Ctrl-C handler failed: {e}");
        }
        tracing::info!("Shutting down");
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_state::test_settings;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn serves_health_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let core = Arc::new(CoreState::new(test_settings(dir.path())));
        let listener = bind(core.settings.bind).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port > 0);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(core, listener, async move {
            let _ = stop_rx.await;
        }));

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        stream
            .write_all(b"GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");

        stop_tx.send(()).unwrap();
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn bind_conflict_reports_address() {
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = held.local_addr().unwrap();

        let err = bind(addr).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { addr: a, .. } if a == addr));
        assert!(err.to_string().contains(&addr.to_string()));
    }
}
