//! In-memory streams for exercising handshakes without a real proxy.

use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// One end of an in-memory duplex byte stream.
///
/// Bytes written to one end become readable on the other. The peer end can
/// also be driven synchronously with [`write_immediate`](MockStream::write_immediate)
/// and [`read_available`](MockStream::read_available), which is how tests play
/// the proxy server: replies are queued up front and the client's requests are
/// inspected afterwards.
#[derive(Debug)]
pub struct MockStream {
    rx: Arc<Mutex<Pipe>>,
    tx: Arc<Mutex<Pipe>>,
}

#[derive(Debug, Default)]
struct Pipe {
    buffer: VecDeque<u8>,
    closed: bool,
    waker: Option<Waker>,
}

impl Pipe {
    fn push(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "writing to a closed stream",
            ));
        }
        self.buffer.extend(data);
        self.wake();
        Ok(data.len())
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Creates a pair of connected mock streams.
///
/// Conventionally the first end is handed to the client under test and the
/// second end plays the proxy.
pub fn create_mock_stream() -> (MockStream, MockStream) {
    let a = Arc::new(Mutex::new(Pipe::default()));
    let b = Arc::new(Mutex::new(Pipe::default()));

    let client = MockStream {
        rx: a.clone(),
        tx: b.clone(),
    };
    let server = MockStream { rx: b, tx: a };
    (client, server)
}

/// Creates a stream pair whose proxy end has already queued `replies`.
///
/// The returned client end reads the replies in order; the proxy end collects
/// whatever the client writes.
pub fn scripted_proxy(replies: &[&[u8]]) -> (MockStream, MockStream) {
    let (client, server) = create_mock_stream();
    for reply in replies {
        server
            .write_immediate(reply)
            .expect("fresh mock stream accepts writes");
    }
    (client, server)
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut rx = self.rx.lock().unwrap();

        if !rx.buffer.is_empty() {
            let n = buf.remaining().min(rx.buffer.len());
            let chunk: Vec<u8> = rx.buffer.drain(..n).collect();
            buf.put_slice(&chunk);
            Poll::Ready(Ok(()))
        } else if rx.closed {
            // EOF
            Poll::Ready(Ok(()))
        } else {
            rx.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.tx.lock().unwrap().push(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut tx = self.tx.lock().unwrap();
        tx.closed = true;
        tx.wake();
        Poll::Ready(Ok(()))
    }
}

impl MockStream {
    /// Queues `data` for the peer without going through the async API.
    pub fn write_immediate(&self, data: &[u8]) -> io::Result<usize> {
        self.tx.lock().unwrap().push(data)
    }

    /// Drains everything the peer has written so far.
    pub fn read_available(&self) -> io::Result<Vec<u8>> {
        Ok(self.rx.lock().unwrap().buffer.drain(..).collect())
    }

    /// Closes the writing side, so the peer reads EOF once the queue is empty.
    pub fn close(&self) {
        let mut tx = self.tx.lock().unwrap();
        tx.closed = true;
        tx.wake();
    }
}

#[cfg(test)]
mod test {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_scripted_replies() {
        let (mut client, server) = scripted_proxy(&[&[0x05, 0x00], &[0x01, 0x00]]);

        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00, 0x01, 0x00]);

        client.write_all(b"request").await.unwrap();
        assert_eq!(server.read_available().unwrap(), b"request");
        assert!(server.read_available().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_reads_eof() {
        let (mut client, server) = create_mock_stream();
        server.write_immediate(b"last").unwrap();
        server.close();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"last");
        assert!(server.write_immediate(b"more").is_err());
    }

    #[tokio::test]
    async fn test_pending_read_is_woken() {
        let (mut client, mut server) = create_mock_stream();

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 5];
            client.read_exact(&mut buf).await.unwrap();
            buf
        });
        tokio::task::yield_now().await;
        server.write_all(b"hello").await.unwrap();

        assert_eq!(&reader.await.unwrap(), b"hello");
    }
}
