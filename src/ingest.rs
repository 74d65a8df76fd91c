use std::{error::Error as StdError, fmt, io, sync::Arc, time::Duration};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, instrument};

use crate::{
    config::Config,
    extract::{extract, ExtractError, ObjectScanner},
    materialize::{Materialized, MaterializeError, Materializer},
    template::Template,
    Connection,
};

const CHUNK_SIZE: usize = 4096;

pub type Ingested = Materialized;

#[derive(Debug)]
pub enum IngestError {
    Read(io::Error),
    ReadTimeout(Duration),
    PayloadTooLarge { limit: usize },
    Extract(ExtractError),
    Materialize(MaterializeError),
    Join(tokio::task::JoinError),
}

impl IngestError {
    /// The step of the ingestion that failed, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Read(_) | Self::ReadTimeout(_) | Self::PayloadTooLarge { .. } => "read",
            Self::Extract(_) => "extract",
            Self::Materialize(_) | Self::Join(_) => "materialize",
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(err) => write!(f, "could not read submission: {err}"),
            Self::ReadTimeout(timeout) => write!(f, "no complete submission within {timeout:?}"),
            Self::PayloadTooLarge { limit } => {
                write!(f, "submission is larger than {limit} bytes")
            }
            Self::Extract(err) => write!(f, "could not parse submission: {err}"),
            Self::Materialize(err) => write!(f, "could not create problem: {err}"),
            Self::Join(err) => write!(f, "problem writer did not finish: {err}"),
        }
    }
}

impl StdError for IngestError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Read(err) => Some(err),
            Self::Extract(err) => Some(err),
            Self::Materialize(err) => Some(err),
            Self::Join(err) => Some(err),
            Self::ReadTimeout(_) | Self::PayloadTooLarge { .. } => None,
        }
    }
}

/// Turns one connection's submission into files on disk.
#[derive(Debug)]
pub struct Ingestor<T> {
    materializer: Arc<Materializer<T>>,
    max_payload: usize,
    read_timeout: Duration,
}

impl<T: Template + 'static> Ingestor<T> {
    pub fn new(materializer: Materializer<T>, max_payload: usize, read_timeout: Duration) -> Self {
        Self {
            materializer: Arc::new(materializer),
            max_payload,
            read_timeout,
        }
    }

    pub fn from_config(config: &Config, template: T) -> Self {
        let materializer = Materializer::new(&config.root, &config.extension, template);
        Self::new(materializer, config.max_payload, config.read_timeout)
    }

    #[instrument(skip_all, fields(id = connection.id, addr = %connection.addr))]
    pub async fn ingest(&self, connection: Connection) -> Result<Ingested, IngestError> {
        let mut stream = connection.stream;
        let payload = tokio::time::timeout(
            self.read_timeout,
            read_payload(&mut stream, self.max_payload),
        )
        .await
        .map_err(|_| IngestError::ReadTimeout(self.read_timeout))??;
        drop(stream);
        debug!("Read {} bytes", payload.len());

        let problem = extract(&payload).map_err(IngestError::Extract)?;
        info!(
            "Received {:?} ({}) with {} tests",
            problem.name,
            problem.group,
            problem.tests.len()
        );

        let materializer = Arc::clone(&self.materializer);
        tokio::task::spawn_blocking(move || materializer.materialize(&problem))
            .await
            .map_err(IngestError::Join)?
            .map_err(IngestError::Materialize)
    }
}

/// Reads until the peer stops sending or a whole object has arrived,
/// whichever comes first. Browser helpers that post over HTTP keep the
/// socket open waiting for a reply, so end-of-input alone is not enough.
///
/// Only bytes up to the end of the object count against `max_payload`;
/// anything after it is dropped. A mismatched closer ends the read at once.
pub async fn read_payload<R>(reader: &mut R, max_payload: usize) -> Result<Vec<u8>, IngestError>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::with_capacity(CHUNK_SIZE);
    let mut chunk = [0_u8; CHUNK_SIZE];
    let mut scanner = ObjectScanner::new();

    loop {
        let bytes_read = reader.read(&mut chunk).await.map_err(IngestError::Read)?;
        if bytes_read == 0 {
            break;
        }

        payload.extend_from_slice(&chunk[..bytes_read]);
        match scanner.scan(&payload).map_err(IngestError::Extract)? {
            Some(object) if object.end <= max_payload => {
                payload.truncate(object.end);
                break;
            }
            _ if payload.len() > max_payload => {
                return Err(IngestError::PayloadTooLarge { limit: max_payload });
            }
            _ => {}
        }
    }

    Ok(payload)
}
