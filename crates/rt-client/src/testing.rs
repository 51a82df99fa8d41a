//! In-process gateway for tests
//!
//! [`TestServer`] serves a router on an ephemeral loopback port and hands out
//! an [`RtClient`] pointed at it, so tests exercise the real HTTP path
//! (serialization, status mapping, connection handling) without a daemon.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{Result, RtClient};

/// Client timeout used by [`TestServer::start`]. Native estimates of long
/// series take a few seconds in debug builds.
const TEST_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// A gateway router listening on `127.0.0.1:<ephemeral>`.
///
/// Stops accepting connections when dropped; call [`TestServer::shutdown`]
/// to also wait for in-flight requests.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: RtClient,
    stop: Option<oneshot::Sender<()>>,
    serving: Option<JoinHandle<std::io::Result<()>>>,
}

impl TestServer {
    /// Serve `router` and connect a client to it
    pub async fn start(router: Router) -> Result<Self> {
        Self::start_with_client_timeout(router, TEST_CLIENT_TIMEOUT).await
    }

    /// Serve `router` with a client that gives up after `timeout`
    pub async fn start_with_client_timeout(router: Router, timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let (stop, stopped) = oneshot::channel::<()>();

        let serving = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    stopped.await.ok();
                })
                .await
        });

        let client = RtClient::with_config(&format!("http://{}", addr), timeout, timeout)?;
        tracing::debug!(%addr, "Test gateway listening");

        Ok(Self {
            addr,
            client,
            stop: Some(stop),
            serving: Some(serving),
        })
    }

    /// `http://127.0.0.1:<port>`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections, wait for open ones to finish, and report
    /// any error the server loop ended with
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.serving.take() {
            Some(serving) => match serving.await {
                Ok(served) => Ok(served?),
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => Err(std::io::Error::other(e).into()),
            },
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(serving) = self.serving.take() {
            serving.abort();
        }
    }
}
