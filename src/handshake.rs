use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    Address,
    AuthConfig,
    auth::authenticate,
    buffer::{Doubling, GrowthStrategy, LinearBuffer},
    channel::Channel,
    connect::connect,
    error::SocksError,
    greet::greet,
    protocol::{AuthMethod, Command, Version},
};

/// Position of a [`Session`] in the handshake.
///
/// Stages only move forward: `Greet`, then `Auth` when the proxy selected a
/// method that needs a sub-negotiation, then `Connect` and finally `Done`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    /// Negotiate the authentication method.
    Greet,
    /// Authenticate with the selected method.
    Auth(AuthMethod),
    /// Send the request and wait for the reply.
    Connect,
    /// The tunnel is established.
    Done,
}

/// The state of one handshake over `stream`.
///
/// A session owns its wire buffer and borrows the stream for the duration of
/// the handshake. Once [`run`](Session::run) returns, successful or not, the
/// session is gone; errors are never retried.
///
/// ```no_run
/// use socks_client_kit::{
///     Address, AuthConfig, CancellationToken, Command, LinearBuffer, Session, Version,
/// };
/// use tokio::net::TcpStream;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let mut stream = TcpStream::connect("127.0.0.1:1080").await?;
/// let auth = AuthConfig::new();
/// let cancel = CancellationToken::new();
/// let target = Address::DomainName(("example.com".to_string(), 80));
///
/// let bound = Session::new(&mut stream, Version::V5, Command::Connect, target, &auth, &cancel)
///     .with_buffer(LinearBuffer::with_max_size(512))
///     .run()
///     .await?;
/// println!("tunnel bound at {bound}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session<'a, S, G = Doubling> {
    stream: &'a mut S,
    cancel: &'a CancellationToken,
    auth: &'a AuthConfig,
    version: Version,
    command: Command,
    target: Address,
    buffer: LinearBuffer<G>,
    stage: Stage,
    bound: Option<Address>,
    failed: bool,
}

impl<'a, S> Session<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a session in the [`Stage::Greet`] stage with an unbounded buffer.
    pub fn new(
        stream: &'a mut S,
        version: Version,
        command: Command,
        target: Address,
        auth: &'a AuthConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            stream,
            cancel,
            auth,
            version,
            command,
            target,
            buffer: LinearBuffer::new(),
            stage: Stage::Greet,
            bound: None,
            failed: false,
        }
    }
}

impl<'a, S, G> Session<'a, S, G>
where
    S: AsyncRead + AsyncWrite + Unpin,
    G: GrowthStrategy,
{
    /// Replaces the session's buffer, for example with a recycled or size-limited one.
    ///
    /// Any bytes left in `buffer` are discarded.
    pub fn with_buffer<H: GrowthStrategy>(self, mut buffer: LinearBuffer<H>) -> Session<'a, S, H> {
        buffer.clear();
        Session {
            stream: self.stream,
            cancel: self.cancel,
            auth: self.auth,
            version: self.version,
            command: self.command,
            target: self.target,
            buffer,
            stage: self.stage,
            bound: self.bound,
            failed: self.failed,
        }
    }

    /// The stage the next call to [`resume`](Session::resume) runs.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The address the proxy bound, once the session is [`Stage::Done`].
    pub fn bound_address(&self) -> Option<&Address> {
        self.bound.as_ref()
    }

    /// Runs the current stage and advances to the next one, which is returned.
    ///
    /// Resuming a finished session is a no-op. After an error the session
    /// cannot make progress and every further call fails with
    /// [`SocksError::InvalidInput`].
    pub async fn resume(&mut self) -> Result<Stage, SocksError> {
        if self.failed {
            return Err(SocksError::InvalidInput("handshake already failed"));
        }
        let result = self.run_stage().await;
        if result.is_err() {
            self.failed = true;
        }
        let next = result?;

        debug!(from = ?self.stage, to = ?next, "handshake stage complete");
        self.stage = next;
        Ok(next)
    }

    async fn run_stage(&mut self) -> Result<Stage, SocksError> {
        let mut channel = Channel::new(&mut *self.stream, self.cancel);
        let buf = &mut self.buffer;

        match self.stage {
            Stage::Greet => match greet(&mut channel, buf, self.version, self.auth).await? {
                AuthMethod::None => Ok(Stage::Connect),
                method => Ok(Stage::Auth(method)),
            },
            Stage::Auth(method) => {
                authenticate(&mut channel, buf, method, self.auth).await?;
                Ok(Stage::Connect)
            }
            Stage::Connect => {
                let bound = connect(
                    &mut channel,
                    buf,
                    self.version,
                    self.command,
                    &self.target,
                    self.auth,
                )
                .await?;
                self.bound = Some(bound);
                Ok(Stage::Done)
            }
            Stage::Done => Ok(Stage::Done),
        }
    }

    /// Runs the remaining stages and returns the bound address.
    pub async fn run(mut self) -> Result<Address, SocksError> {
        debug!(
            destination = %self.target,
            version = ?self.version,
            command = ?self.command,
            "starting SOCKS handshake"
        );
        while self.resume().await? != Stage::Done {}

        let bound = self
            .bound
            .ok_or(SocksError::ProtocolViolation("handshake finished without a reply"))?;
        debug!(%bound, "SOCKS handshake complete");
        Ok(bound)
    }
}

/// Performs a complete SOCKS handshake over `stream`.
///
/// On success the stream is a tunnel to `target` and the returned address is
/// the one the proxy bound for it. No byte beyond the proxy's reply has been
/// read, so any data that follows belongs to the tunnel.
///
/// Cancelling `cancel` aborts the handshake with [`SocksError::Cancelled`]
/// before the next read or write, or while one is pending.
pub async fn connect_via_proxy<S>(
    stream: &mut S,
    version: Version,
    command: Command,
    target: Address,
    auth: &AuthConfig,
    cancel: &CancellationToken,
) -> Result<Address, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Session::new(stream, version, command, target, auth, cancel)
        .run()
        .await
}
