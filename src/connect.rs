use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

use crate::{
    Address,
    AuthConfig,
    buffer::{GrowthStrategy, LinearBuffer},
    channel::Channel,
    error::SocksError,
    protocol::{self, Command, Version},
};

/// Sends the request for `target` and waits for the proxy's reply.
///
/// Returns the address the proxy bound for the tunnel. The reply is read
/// incrementally, so the stream is left positioned at the first tunnel byte.
pub(crate) async fn connect<S, G>(
    channel: &mut Channel<'_, S>,
    buf: &mut LinearBuffer<G>,
    version: Version,
    command: Command,
    target: &Address,
    auth: &AuthConfig,
) -> Result<Address, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    G: GrowthStrategy,
{
    let reply = match version {
        Version::V5 => {
            let len = protocol::connect_request_len(target)?;
            channel
                .send_encoded(buf, len, |out| {
                    protocol::encode_connect_request(command, target, out)
                })
                .await?;
            channel.read_frame(buf, protocol::decode_connect_reply).await
        }
        Version::V4 => {
            let user_id = auth.user_id();
            let len = protocol::socks4_request_len(command, target, user_id)?;
            channel
                .send_encoded(buf, len, |out| {
                    protocol::encode_socks4_request(command, target, user_id, out)
                })
                .await?;
            channel.read_frame(buf, protocol::decode_socks4_reply).await
        }
    };

    if let Err(e) = &reply
        && e.is_protocol_error()
    {
        warn!(destination = %target, ?command, error = %e, "proxy refused request");
    }
    reply
}
