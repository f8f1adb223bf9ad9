use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::{
    AuthConfig,
    buffer::{GrowthStrategy, LinearBuffer},
    channel::Channel,
    error::SocksError,
    protocol::{self, AuthMethod},
};

/// Runs the sub-negotiation for the method the proxy selected.
pub(crate) async fn authenticate<S, G>(
    channel: &mut Channel<'_, S>,
    buf: &mut LinearBuffer<G>,
    method: AuthMethod,
    auth: &AuthConfig,
) -> Result<(), SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    G: GrowthStrategy,
{
    match method {
        AuthMethod::None => Ok(()),
        AuthMethod::GssApi => Err(SocksError::CommandNotSupported),
        AuthMethod::NoAcceptable => Err(SocksError::NoAcceptableAuthMethod),
        AuthMethod::UsernamePassword => {
            let credentials = auth.credentials().ok_or(SocksError::InvalidInput(
                "username/password selected without credentials",
            ))?;

            let len = protocol::auth_request_len(credentials)?;
            channel
                .send_encoded(buf, len, |out| protocol::encode_auth_request(credentials, out))
                .await?;

            let status = channel.read_frame(buf, protocol::decode_auth_reply).await?;
            if status != 0 {
                warn!(username = %credentials.username, status, "proxy rejected credentials");
                return Err(SocksError::LoginFailed);
            }
            debug!(username = %credentials.username, "authenticated with proxy");
            Ok(())
        }
    }
}
