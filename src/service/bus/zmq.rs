//! ZeroMQ subscriber implementation of the bus client.
//!
//! The subscriber speaks ZMTP 3.0 (see [`super::zmtp`]) over TCP or IPC from
//! a background task. Connecting never blocks startup: the task keeps
//! retrying until a publisher answers, the way a ZeroMQ `connect` does.
//! Once connected, losing the publisher is reported as a receive error.

use std::{fmt, io, path::PathBuf, str::FromStr, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

use super::{BusClient, BusError, GenericBusClient, zmtp};

/// Messages buffered between the socket and the relay before reads from the publisher pause.
pub const HIGH_WATER_MARK: usize = 1000;

const RECONNECT_INITIAL: Duration = Duration::from_millis(100);
const RECONNECT_MAX: Duration = Duration::from_secs(5);

// Extra methods on `BusClient` applied by the zmq implementation.

impl BusClient {
    /// Subscribes to the configured endpoint.
    pub fn zmq(config: &Config) -> Res<Self> {
        let client = ZmqBusClient::connect(&config.bus_endpoint, &config.bus_topics)?;
        Ok(Self::new(Box::new(client)))
    }
}

// Endpoints.

/// A `connect`-able ZeroMQ endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEndpoint {
    Tcp { host: String, port: u16 },
    Ipc(PathBuf),
}

impl FromStr for BusEndpoint {
    type Err = BusError;

    fn from_str(endpoint: &str) -> Result<Self, Self::Err> {
        let bad = |message: &str| BusError::Connect {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        };

        if let Some(path) = endpoint.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(bad("missing socket path"));
            }
            return Ok(Self::Ipc(PathBuf::from(path)));
        }

        let address = endpoint.strip_prefix("tcp://").ok_or_else(|| bad("expected `tcp://host:port` or `ipc://path`"))?;
        let (host, port) = address.rsplit_once(':').ok_or_else(|| bad("missing port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        if host.is_empty() || host == "*" {
            return Err(bad("a subscriber needs a concrete host"));
        }

        let port = port.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(|| bad("invalid port"))?;

        Ok(Self::Tcp { host: host.to_string(), port })
    }
}

impl fmt::Display for BusEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "tcp://[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

trait BusStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> BusStream for T {}

impl BusEndpoint {
    async fn open(&self) -> io::Result<Box<dyn BusStream>> {
        match self {
            Self::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Self::Ipc(path) => Ok(Box::new(tokio::net::UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            Self::Ipc(_) => Err(io::Error::new(io::ErrorKind::Unsupported, "ipc endpoints need a unix platform")),
        }
    }
}

// Structs.

type Delivery = Res<Vec<Vec<u8>>>;

/// ZeroMQ subscriber.
///
/// Frames are read by a background task and handed over through a channel
/// bounded at [`HIGH_WATER_MARK`]. The task is aborted on drop.
pub struct ZmqBusClient {
    frames: mpsc::Receiver<Delivery>,
    pump: JoinHandle<()>,
}

impl ZmqBusClient {
    /// Subscribe to each of `topics` on `endpoint`, or to everything when `topics` is empty.
    ///
    /// Only a malformed endpoint fails here. The publisher does not need to be up yet.
    #[instrument(name = "ZmqBusClient::connect", skip(topics))]
    pub fn connect(endpoint: &str, topics: &[String]) -> Res<Self> {
        let endpoint = endpoint.parse::<BusEndpoint>()?;
        let topics = if topics.is_empty() { vec![String::new()] } else { topics.to_vec() };

        let (sender, frames) = mpsc::channel(HIGH_WATER_MARK);

        let pump = tokio::spawn(async move {
            if let Err(err) = subscribe_and_forward(&endpoint, &topics, &sender).await {
                // The relay may already be gone, in which case there is no one to tell.
                let _ = sender.send(Err(err)).await;
            }
        });

        Ok(Self { frames, pump })
    }
}

impl Drop for ZmqBusClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
impl GenericBusClient for ZmqBusClient {
    async fn recv(&mut self) -> Res<Vec<Vec<u8>>> {
        let parts = self.frames.recv().await.ok_or_else(|| BusError::Receive {
            message: "subscriber task stopped".to_string(),
        })??;

        trace!("Received {} part message.", parts.len());

        Ok(parts)
    }
}

// Subscriber task.

#[instrument(name = "ZmqBusClient::subscribe", skip_all, fields(endpoint = %endpoint))]
async fn subscribe_and_forward(endpoint: &BusEndpoint, topics: &[String], sender: &mpsc::Sender<Delivery>) -> Void {
    let mut stream = connect_with_retry(endpoint).await;

    zmtp::handshake(&mut stream).await.map_err(|e| BusError::Handshake {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })?;

    for topic in topics {
        stream.write_all(&zmtp::subscribe_message(topic)).await.map_err(|e| BusError::Subscribe {
            topic: topic.clone(),
            message: e.to_string(),
        })?;
    }
    stream.flush().await.map_err(|e| lost(endpoint, e))?;

    info!("Subscribed to {} ({} topic prefix(es)).", endpoint, topics.len());

    loop {
        let parts = read_message(&mut stream).await.map_err(|e| lost(endpoint, e))?;

        if sender.send(Ok(parts)).await.is_err() {
            debug!("Relay stopped listening, closing the subscription.");
            return Ok(());
        }
    }
}

async fn connect_with_retry(endpoint: &BusEndpoint) -> Box<dyn BusStream> {
    let mut delay = RECONNECT_INITIAL;
    let mut attempts = 0u32;

    loop {
        match endpoint.open().await {
            Ok(stream) => {
                debug!("Connected to {} after {} failed attempt(s).", endpoint, attempts);
                return stream;
            }
            Err(err) if attempts == 0 => warn!("Publisher at {} is not reachable yet ({}), retrying.", endpoint, err),
            Err(err) => debug!("Publisher at {} still not reachable: {}", endpoint, err),
        }

        attempts += 1;
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(RECONNECT_MAX);
    }
}

/// Read one complete (possibly multipart) message, answering heartbeats on the way.
async fn read_message<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> io::Result<Vec<Vec<u8>>> {
    let mut parts = Vec::new();

    loop {
        let frame = zmtp::read_frame(stream).await?;

        if frame.command {
            if let Some(pong) = zmtp::pong_for(&frame.body) {
                stream.write_all(&pong).await?;
                stream.flush().await?;
            }
            continue;
        }

        parts.push(frame.body);

        if !frame.more {
            return Ok(parts);
        }
    }
}

fn lost(endpoint: &BusEndpoint, err: io::Error) -> BusError {
    let message = match err.kind() {
        io::ErrorKind::UnexpectedEof => format!("publisher at {endpoint} closed the connection"),
        _ => format!("connection to {endpoint} failed: {err}"),
    };

    BusError::Receive { message }
}

// Tests.
