//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::router;
use crate::dispatch::Dispatcher;
use crate::error::{RatekeeperError, Result};

/// HTTP server exposing a dispatcher's limiters.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Limiters served by this instance
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, dispatcher: Arc<Dispatcher>) -> Self {
        Self { addr, dispatcher }
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let addr = listener.local_addr()?;

        info!(
            addr = %addr,
            limiters = self.dispatcher.len(),
            "Starting HTTP server"
        );

        axum::serve(listener, router(self.dispatcher))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                RatekeeperError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8000".parse().unwrap();
        let _server = HttpServer::new(addr, Arc::new(Dispatcher::new()));
    }

    #[tokio::test]
    async fn test_graceful_shutdown() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::new(addr, Arc::new(Dispatcher::new()));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(server.serve_with_shutdown(async {
            let _ = stop_rx.await;
        }));

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = listener.local_addr().unwrap();

        let server = HttpServer::new(taken, Arc::new(Dispatcher::new()));
        let err = server.serve().await.unwrap_err();
        assert!(matches!(err, RatekeeperError::Io(_)));
    }
}
