use std::{future::Future, io};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{
    buffer::{GrowthStrategy, LinearBuffer},
    error::SocksError,
    protocol::Decoded,
};

/// A byte stream paired with the cancellation token of the handshake using it.
///
/// Every operation checks the token before touching the stream and races the
/// pending I/O against it, so a cancelled handshake never issues another read
/// or write.
pub(crate) struct Channel<'a, S> {
    stream: &'a mut S,
    cancel: &'a CancellationToken,
}

async fn cancellable<F, T>(cancel: &CancellationToken, io: F) -> Result<T, SocksError>
where
    F: Future<Output = io::Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(SocksError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SocksError::Cancelled),
        result = io => Ok(result?),
    }
}

impl<'a, S> Channel<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: &'a mut S, cancel: &'a CancellationToken) -> Self {
        Self { stream, cancel }
    }

    /// Writes the whole readable window of `buf` to the stream, consuming it.
    pub(crate) async fn send<G: GrowthStrategy>(
        &mut self,
        buf: &mut LinearBuffer<G>,
    ) -> Result<(), SocksError> {
        while !buf.is_empty() {
            let n = cancellable(self.cancel, self.stream.write(buf.data())).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            trace!(bytes = n, "sent to proxy");
            buf.consume(n);
        }
        cancellable(self.cancel, self.stream.flush()).await
    }

    /// Encodes a message of `len` bytes straight into `buf` and sends it.
    pub(crate) async fn send_encoded<G, F>(
        &mut self,
        buf: &mut LinearBuffer<G>,
        len: usize,
        encode: F,
    ) -> Result<(), SocksError>
    where
        G: GrowthStrategy,
        F: FnOnce(&mut [u8]) -> Result<usize, SocksError>,
    {
        let written = encode(buf.prepare(len)?)?;
        buf.commit(written);
        self.send(buf).await
    }

    /// Reads exactly `n` bytes from the stream into the readable window of `buf`.
    pub(crate) async fn receive<G: GrowthStrategy>(
        &mut self,
        buf: &mut LinearBuffer<G>,
        n: usize,
    ) -> Result<(), SocksError> {
        let region = buf.prepare(n)?;
        let mut filled = 0;
        while filled < n {
            let read = cancellable(self.cancel, self.stream.read(&mut region[filled..])).await?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "proxy closed the connection during the handshake",
                )
                .into());
            }
            filled += read;
        }
        trace!(bytes = n, "received from proxy");
        buf.commit(n);
        Ok(())
    }

    /// Receives one message, reading only as many bytes as `decode` asks for.
    ///
    /// The decoded bytes are consumed from `buf`. Nothing past the end of the
    /// message is read from the stream.
    pub(crate) async fn read_frame<G, T, D>(
        &mut self,
        buf: &mut LinearBuffer<G>,
        decode: D,
    ) -> Result<T, SocksError>
    where
        G: GrowthStrategy,
        D: Fn(&[u8]) -> Result<Decoded<T>, SocksError>,
    {
        loop {
            match decode(buf.data())? {
                Decoded::Complete(value, consumed) => {
                    buf.consume(consumed);
                    return Ok(value);
                }
                Decoded::Incomplete(more) => self.receive(buf, more).await?,
            }
        }
    }
}
