use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::{
    AuthConfig,
    buffer::{GrowthStrategy, LinearBuffer},
    channel::Channel,
    error::SocksError,
    protocol::{self, AuthMethod, Version},
};

/// Negotiates the authentication method.
///
/// SOCKS4 has no negotiation and always yields [`AuthMethod::None`] without
/// touching the stream.
pub(crate) async fn greet<S, G>(
    channel: &mut Channel<'_, S>,
    buf: &mut LinearBuffer<G>,
    version: Version,
    auth: &AuthConfig,
) -> Result<AuthMethod, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    G: GrowthStrategy,
{
    if version == Version::V4 {
        return Ok(AuthMethod::None);
    }

    let methods = auth.methods();
    if methods.contains(&AuthMethod::UsernamePassword) && auth.credentials().is_none() {
        return Err(SocksError::InvalidInput(
            "username/password offered without credentials",
        ));
    }

    let len = protocol::greeting_request_len(methods)?;
    channel
        .send_encoded(buf, len, |out| protocol::encode_greeting_request(methods, out))
        .await?;

    match channel.read_frame(buf, protocol::decode_greeting_reply).await? {
        AuthMethod::NoAcceptable => {
            warn!(offered = ?methods, "proxy accepted none of the offered methods");
            Err(SocksError::NoAcceptableAuthMethod)
        }
        method if methods.contains(&method) => {
            debug!(?method, "proxy selected authentication method");
            Ok(method)
        }
        _ => Err(SocksError::ProtocolViolation(
            "proxy selected a method that was not offered",
        )),
    }
}
