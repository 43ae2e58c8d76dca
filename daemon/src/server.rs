use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::session::{ConnectionSession, SessionSettings};

const FIRST_CONNECTION_ID: u64 = 1000;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of accepted connections for the accept loop.
pub trait Accept: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY for {peer}: {err}");
        }
        Ok((stream, peer))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFault {
    /// Concerns one pending connection only.
    Connection,
    /// Temporary shortage (descriptors, buffers, memory) or unrecognised;
    /// retried after a pause for as long as it lasts.
    Transient,
    /// The listening socket itself is gone.
    Broken,
}

fn classify_accept_error(err: &io::Error) -> AcceptFault {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => return AcceptFault::Connection,
        io::ErrorKind::OutOfMemory => return AcceptFault::Transient,
        _ => {}
    }
    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        match code {
            libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM => {
                return AcceptFault::Transient
            }
            libc::EBADF | libc::EINVAL | libc::ENOTSOCK | libc::EOPNOTSUPP => {
                return AcceptFault::Broken
            }
            _ => {}
        }
    }
    AcceptFault::Transient
}

pub struct SuggestServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    settings: SessionSettings,
}

impl SuggestServer {
    pub async fn bind(config: &ServerConfig, dispatcher: Dispatcher) -> Result<Self> {
        let addr = config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            listener,
            dispatcher: Arc::new(dispatcher),
            settings: config.session_settings(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Accepts connections until `shutdown` fires, then waits for running
    /// sessions. Returns an error only when the listener itself is unusable.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!("starting server at {addr}");
        serve(
            self.listener,
            self.dispatcher,
            self.settings,
            shutdown,
            ACCEPT_BACKOFF,
        )
        .await
    }
}

async fn serve<A: Accept>(
    mut acceptor: A,
    dispatcher: Arc<Dispatcher>,
    settings: SessionSettings,
    shutdown: CancellationToken,
    backoff: Duration,
) -> Result<()> {
    let tracker = TaskTracker::new();
    let mut next_id = FIRST_CONNECTION_ID;

    let result = loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            accepted = acceptor.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(err) => match classify_accept_error(&err) {
                AcceptFault::Connection => {
                    warn!("accept failed for one connection: {err}");
                    continue;
                }
                AcceptFault::Transient => {
                    warn!("accept failed: {err}; retrying in {backoff:?}");
                    tokio::select! {
                        _ = shutdown.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(backoff) => continue,
                    }
                }
                AcceptFault::Broken => {
                    error!("listener unusable: {err}");
                    break Err(anyhow::Error::new(err).context("accept loop failed"));
                }
            },
        };

        let id = next_id;
        next_id += 1;
        info!("[{id}] connection established from {peer}");

        let session = ConnectionSession::new(dispatcher.clone(), settings, shutdown.child_token());
        let span = info_span!("session", id, peer = %peer);
        tracker.spawn(
            async move {
                let summary = session.run(stream).await;
                let status = if summary.clean { "OK" } else { "FAIL" };
                info!(
                    exchanges = summary.exchanges,
                    "[{id}] session finished. Status {status}"
                );
            }
            .instrument(span),
        );
    };

    // Every session gives up within its shutdown grace, so this wait is bounded.
    tracker.close();
    if !tracker.is_empty() {
        info!("waiting for {} open sessions", tracker.len());
    }
    tracker.wait().await;
    info!("server stopped");
    result
}
