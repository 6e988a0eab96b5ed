use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::client::{read_frame, write_frame, Request, Response};
use crate::engine::ReadableNode;
use crate::{Error, Result};

/// Role-specific handling of decoded requests.
pub trait RequestHandler: Clone + Send + Sync + 'static {
    fn handle(&self, request: Request) -> impl Future<Output = Response> + Send;
}

/// Serve the requests every role answers the same way.
pub fn handle_read<N: ReadableNode + ?Sized>(node: &N, request: Request) -> Response {
    match request {
        Request::Get { key } => Response::Value(node.get(&key)),
        Request::Dump => Response::Dump {
            role: node.mode(),
            entries: node.dump(),
        },
        Request::Reset => {
            node.reset();
            info!(role = %node.mode(), "Store cleared");
            Response::Reset
        }
        request => Response::Unsupported {
            role: node.mode(),
            request: request.name().to_string(),
        },
    }
}

/// TCP front for a node. It has no knowledge of replication itself and simply
/// hands every request to its [`RequestHandler`].
pub struct NodeServer<H> {
    handler: H,
    listener: TcpListener,
}

impl<H: RequestHandler> NodeServer<H> {
    pub async fn bind(handler: H, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { handler, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Failed to accept connection: {e}");
                            continue;
                        }
                    };
                    debug!(%peer, "Connection established");
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler).await {
                            error!(%peer, "{}", e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutting down");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection<H: RequestHandler>(mut stream: TcpStream, handler: H) -> Result<()> {
    loop {
        let request: Request = match read_frame(&mut stream).await {
            Ok(request) => request,
            // The peer closed the connection between requests.
            Err(Error::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            // The whole frame was consumed, so the connection is still usable.
            Err(e @ Error::BincodeSerialization(_)) => {
                warn!("Undecodable request: {e}");
                write_frame(&mut stream, &Response::Error(e.to_string())).await?;
                continue;
            }
            // The body was never read, answer once then drop the connection.
            Err(e @ Error::FrameTooLarge { .. }) => {
                write_frame(&mut stream, &Response::Error(e.to_string())).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        debug!(request = request.name(), "Handling request");
        let response = handler.handle(request).await;
        write_frame(&mut stream, &response).await?;
    }
}
