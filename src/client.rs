use clap::Subcommand;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::engine::WriteOutcome;
use crate::replication::Mode;
use crate::store::ValueRecord;
use crate::{Error, Result};

/// Largest frame accepted from a peer.
pub const MAX_FRAME_SIZE: u64 = 16 * 1024 * 1024;

/// Actions that can be performed by the client.
#[derive(Debug, Subcommand)]
pub enum Action {
    /// Write a key-value pair through the leader.
    Write { key: String, value: String },

    /// Get a value and its sequence number from any node.
    Get { key: String },

    /// Print every record held by a node.
    Dump,

    /// Clear the store of a node.
    Reset,

    /// Compare the store of the leader (`--addr`) with its followers.
    Check {
        #[clap(long, value_delimiter = ',', required = true)]
        followers: Vec<String>,
    },
}

/// Requests understood by a node.
///
/// Each request is sent as a single length-prefixed, bincode-encoded frame and is
/// answered with exactly one [`Response`] frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// A client write, only accepted by the leader.
    Write { key: String, value: String },

    /// A write sequenced by the leader, only accepted by followers.
    Replicate { key: String, value: String, seq: u64 },

    Get { key: String },
    Dump,
    Reset,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Replicate { .. } => "replicate",
            Self::Get { .. } => "get",
            Self::Dump => "dump",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Written {
        seq: u64,
        quorum_reached: bool,
        message: String,
    },
    Replicated {
        ok: bool,
        applied: bool,
    },
    Value(Option<ValueRecord>),
    Dump {
        role: Mode,
        entries: BTreeMap<String, ValueRecord>,
    },
    Reset,
    /// The request is not served by a node in this role.
    Unsupported {
        role: Mode,
        request: String,
    },
    /// The request could not be decoded.
    Error(String),
}

impl Response {
    pub fn written(outcome: WriteOutcome) -> Self {
        let message = if outcome.quorum_reached {
            "committed (quorum reached)"
        } else {
            "quorum not reached"
        };
        Self::Written {
            seq: outcome.seq,
            quorum_reached: outcome.quorum_reached,
            message: message.to_string(),
        }
    }
}

/// Write a message prefixed by its size, this allows the reader to use `read_exact`.
pub async fn write_frame<W, M>(stream: &mut W, message: &M) -> Result<()>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    let data = bincode::serialize(message)?;
    stream.write_u64(data.len() as u64).await?;
    stream.write_all(&data).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_frame<R, M>(stream: &mut R) -> Result<M>
where
    R: AsyncRead + Unpin,
    M: DeserializeOwned,
{
    let size = stream.read_u64().await?;
    if size > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size,
            limit: MAX_FRAME_SIZE,
        });
    }
    let mut buf = vec![0; size as usize];
    stream.read_exact(&mut buf).await?;
    Ok(bincode::deserialize(&buf)?)
}

pub async fn send_request(stream: &mut TcpStream, request: &Request) -> Result<Response> {
    write_frame(stream, request).await?;
    read_frame(stream).await
}

pub async fn write(stream: &mut TcpStream, key: String, value: String) -> Result<Response> {
    send_request(stream, &Request::Write { key, value }).await
}

pub async fn get(stream: &mut TcpStream, key: String) -> Result<Option<ValueRecord>> {
    match send_request(stream, &Request::Get { key }).await? {
        Response::Value(record) => Ok(record),
        other => Err(unexpected(stream, other)),
    }
}

pub async fn dump(stream: &mut TcpStream) -> Result<(Mode, BTreeMap<String, ValueRecord>)> {
    match send_request(stream, &Request::Dump).await? {
        Response::Dump { role, entries } => Ok((role, entries)),
        other => Err(unexpected(stream, other)),
    }
}

pub async fn reset(stream: &mut TcpStream) -> Result<()> {
    match send_request(stream, &Request::Reset).await? {
        Response::Reset => Ok(()),
        other => Err(unexpected(stream, other)),
    }
}

fn unexpected(stream: &TcpStream, response: Response) -> Error {
    Error::UnexpectedResponse {
        peer: stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string()),
        response: format!("{response:?}"),
    }
}
