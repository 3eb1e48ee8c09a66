//! Wire framing for an authenticated session: a 4-byte length prefix around
//! each bincode-encoded `NetworkMessage`.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use trustmesh_gossip::{CodecError, NetworkMessage};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("message codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("peer closed the session")]
    Closed,
}

/// A framed, authenticated duplex stream carrying `NetworkMessage`s.
/// Generic over the underlying stream so it works the same over
/// `tokio_rustls::server::TlsStream` and `tokio_rustls::client::TlsStream`.
pub struct PeerSession<S> {
    framed: Framed<S, LengthDelimitedCodec>,
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, LengthDelimitedCodec::new()),
        }
    }

    pub async fn send(&mut self, message: &NetworkMessage) -> Result<(), SessionError> {
        let bytes = message.to_bytes()?;
        self.framed.send(bytes.into()).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<NetworkMessage, SessionError> {
        match self.framed.next().await {
            Some(Ok(bytes)) => Ok(NetworkMessage::from_bytes(&bytes)?),
            Some(Err(e)) => Err(SessionError::Io(e)),
            None => Err(SessionError::Closed),
        }
    }

    /// Splits into independent read and write halves so a send loop and a
    /// receive loop can run as separate tasks against the same session.
    pub fn split(self) -> (PeerSessionReader<S>, PeerSessionWriter<S>) {
        let (sink, stream) = self.framed.split();
        (PeerSessionReader { stream }, PeerSessionWriter { sink })
    }
}

/// The read half of a split [`PeerSession`].
pub struct PeerSessionReader<S> {
    stream: SplitStream<Framed<S, LengthDelimitedCodec>>,
}

impl<S> PeerSessionReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn recv(&mut self) -> Result<NetworkMessage, SessionError> {
        match self.stream.next().await {
            Some(Ok(bytes)) => Ok(NetworkMessage::from_bytes(&bytes)?),
            Some(Err(e)) => Err(SessionError::Io(e)),
            None => Err(SessionError::Closed),
        }
    }
}

/// The write half of a split [`PeerSession`].
pub struct PeerSessionWriter<S> {
    sink: SplitSink<Framed<S, LengthDelimitedCodec>, bytes::Bytes>,
}

impl<S> PeerSessionWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn send(&mut self, message: &NetworkMessage) -> Result<(), SessionError> {
        let bytes = message.to_bytes()?;
        self.sink.send(bytes.into()).await?;
        Ok(())
    }
}
