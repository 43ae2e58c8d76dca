use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatcher::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub exchanges: usize,
    /// `false` when the session ended on a read or write fault, or had to be
    /// dropped while draining.
    pub clean: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_body_bytes: usize,
    /// Longest wait for the head of the next request, counted from the end of
    /// the previous response. Body uploads are not timed. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// How long an in-flight exchange may take to finish after shutdown.
    pub shutdown_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            idle_timeout: Some(Duration::from_secs(30)),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Drives one connection: hyper reads a request, the dispatcher answers it,
/// hyper writes the response and decides whether the connection stays open.
pub struct ConnectionSession {
    dispatcher: Arc<Dispatcher>,
    settings: SessionSettings,
    shutdown: CancellationToken,
}

impl ConnectionSession {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        settings: SessionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            settings,
            shutdown,
        }
    }

    pub async fn run<S>(&self, stream: S) -> SessionSummary
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let exchanges = Arc::new(AtomicUsize::new(0));
        let service = {
            let dispatcher = self.dispatcher.clone();
            let exchanges = exchanges.clone();
            let max_body_bytes = self.settings.max_body_bytes;
            service_fn(move |request: Request<Incoming>| {
                let dispatcher = dispatcher.clone();
                let exchanges = exchanges.clone();
                async move {
                    let response = dispatcher.serve(request, max_body_bytes).await;
                    if response.is_ok() {
                        exchanges.fetch_add(1, Ordering::Relaxed);
                    }
                    response
                }
            })
        };

        let mut builder = http1::Builder::new();
        builder
            .keep_alive(true)
            .timer(TokioTimer::new())
            .header_read_timeout(self.settings.idle_timeout);
        let connection = builder.serve_connection(TokioIo::new(stream), service);
        tokio::pin!(connection);

        let result = tokio::select! {
            result = connection.as_mut() => result,
            _ = self.shutdown.cancelled() => {
                debug!("closing session for shutdown");
                connection.as_mut().graceful_shutdown();
                match timeout(self.settings.shutdown_grace, connection.as_mut()).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            "session still busy {:?} after shutdown, dropping it",
                            self.settings.shutdown_grace
                        );
                        return SessionSummary {
                            exchanges: exchanges.load(Ordering::Relaxed),
                            clean: false,
                        };
                    }
                }
            }
        };

        let clean = match result {
            Ok(()) => true,
            Err(err) if err.is_timeout() => {
                debug!("connection idle, closing");
                true
            }
            Err(err) => {
                warn!("connection error: {err}");
                false
            }
        };
        SessionSummary {
            exchanges: exchanges.load(Ordering::Relaxed),
            clean,
        }
    }
}
