use std::{
    error::Error as StdError,
    fmt,
    future::Future,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub mod config;
pub mod extract;
pub mod ingest;
pub mod materialize;
pub mod problem;
pub mod template;

pub use config::{Config, Transport};
pub use ingest::{IngestError, Ingested, Ingestor};
pub use problem::{problem_name, Problem, TestCase};

#[derive(Debug)]
pub enum ServeError {
    Resolve { addr: String, source: io::Error },
    NoAddress { addr: String, transport: Transport },
    Bind { addr: SocketAddr, source: io::Error },
    Accept(io::Error),
}

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve { addr, .. } => write!(f, "could not resolve {addr}"),
            Self::NoAddress { addr, transport } => {
                write!(f, "{addr} has no address usable over {transport}")
            }
            Self::Bind { addr, .. } => write!(f, "could not listen on {addr}"),
            Self::Accept(err) => write!(f, "listener stopped accepting: {err}"),
        }
    }
}

impl StdError for ServeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Resolve { source, .. } | Self::Bind { source, .. } => Some(source),
            Self::Accept(err) => Some(err),
            Self::NoAddress { .. } => None,
        }
    }
}

pub struct Connection {
    pub stream: TcpStream,
    pub addr: SocketAddr,
    pub id: usize,
}

impl Connection {
    pub fn new(stream: TcpStream, addr: SocketAddr, id: usize) -> Self {
        Self { stream, addr, id }
    }
}

/// Outcome of one connection, handed from its task to the supervisor.
struct Report {
    id: usize,
    addr: SocketAddr,
    outcome: Result<Ingested, IngestError>,
}

pub struct Listener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl Listener {
    pub async fn bind(config: &Config) -> Result<Self, ServeError> {
        let target = format!("{}:{}", config.host, config.port);
        let addr = lookup_host((config.host.as_str(), config.port))
            .await
            .map_err(|source| ServeError::Resolve {
                addr: target.clone(),
                source,
            })?
            .find(|addr| config.transport.allows(addr))
            .ok_or_else(|| ServeError::NoAddress {
                addr: target,
                transport: config.transport,
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServeError::Bind { addr, source })?;
        info!("Listening for problems on {addr}");

        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepts connections until `shutdown` resolves, running `handler` on
    /// each in its own task.
    ///
    /// Handler failures are only logged; they never stop the loop. The loop
    /// ends early only on an accept error that is not tied to a single peer.
    pub async fn run<H, Fut, S>(self, handler: H, shutdown: S) -> Result<(), ServeError>
    where
        H: Fn(Connection) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<Ingested, IngestError>> + Send + 'static,
        S: Future<Output = ()>,
    {
        let (reports, receiver) = mpsc::unbounded_channel();
        tokio::spawn(supervise(receiver));
        tokio::pin!(shutdown);

        let mut id = 0_usize;
        let running = Arc::new(AtomicUsize::new(0_usize));

        loop {
            let accepted = select! {
                _ = &mut shutdown => {
                    info!("Shutting down listener on {}", self.addr);
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, addr) = match accepted {
                Ok(accepted) => accepted,
                Err(err) if is_transient(&err) => {
                    warn!("Could not accept a connection: {err}");
                    continue;
                }
                Err(err) => {
                    error!("Listener failed: {err}");
                    return Err(ServeError::Accept(err));
                }
            };

            let connection = Connection::new(stream, addr, id);
            let handler = handler.clone();
            let reports = reports.clone();
            let running = running.clone();
            tokio::spawn(async move {
                let currently_running = running.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(">> [{id:>3}/{currently_running:>3}] {addr}");
                let outcome = handler(connection).await;
                debug!("<< [{id:>3}/___] {addr}");
                running.fetch_sub(1, Ordering::SeqCst);
                let _ = reports.send(Report { id, addr, outcome });
            });
            id = id.wrapping_add(1);
        }
    }
}

async fn supervise(mut reports: mpsc::UnboundedReceiver<Report>) {
    while let Some(Report { id, addr, outcome }) = reports.recv().await {
        match outcome {
            Ok(ingested) => info!(
                "[{id:>3}] {addr}: problem {} created with {} tests",
                ingested.problem_name, ingested.tests
            ),
            Err(err) => error!(
                "[{id:>3}] {addr}: {} failed: {}",
                err.stage(),
                error_chain(&err)
            ),
        }
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.ends_with(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
