//! A lightweight library for the client side of the SOCKS4, SOCKS4a and SOCKS5
//! proxy handshakes, designed to run over any asynchronous byte stream.
//!
//! The library takes an already connected stream to a proxy server and drives
//! the handshake on it: version and authentication method negotiation,
//! username/password authentication (RFC 1929) and the connect request. When
//! the handshake succeeds the stream is a tunnel to the target and is handed
//! back to the caller untouched. The library employs I/O-agnostic design,
//! meaning it doesn't spawn internal threads, establish network connections,
//! or perform DNS resolution.
//!
//! Socks-Client-Kit supports:
//!
//! - SOCKS5 (RFC 1928)
//!     - CONNECT, BIND and UDP_ASSOCIATE requests.
//!     - No authentication and username/password authentication.
//!     - IPv4, IPv6 and domain name targets.
//!
//! - SOCKS4 and SOCKS4a
//!     - CONNECT and BIND requests with a user id.
//!     - Domain name targets through the SOCKS4a extension.
//!
//! ### Handshake
//!
//! - Use [`connect_via_proxy`] to run a complete handshake with a
//!   cancellation token, returning the address the proxy bound for the tunnel.
//! - Use [`Session`] to control the buffer, run the handshake one stage at a
//!   time, or observe the current [`Stage`].
//!
//! ### Wire format
//!
//! - [`protocol`] exposes the encoders and decoders for every handshake
//!   message, independent of any I/O.
//! - [`decode_from_buf`] and [`encode_to_buf`] decode/encode SOCKS5-style
//!   addresses in memory buffers.
//! - [`LinearBuffer`] is the growable byte buffer the handshake reads into and
//!   writes from.
//!
//! [`decode_from_buf`]: Address::decode_from_buf
//! [`encode_to_buf`]: Address::encode_to_buf
#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]
use std::{
    fmt::{Display, Formatter},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use thiserror::Error;

mod auth;
mod buffer;
mod channel;
mod connect;
mod error;
mod greet;
mod handshake;
pub mod protocol;

#[cfg(test)]
#[doc(hidden)]
pub mod test_utils;

pub use buffer::{Doubling, Exact, GrowthStrategy, LinearBuffer};
pub use error::{ErrorKind, Rejection, SocksError};
pub use handshake::{Session, Stage, connect_via_proxy};
pub use protocol::{AuthMethod, Command, Decoded, Version};
pub use tokio_util::sync::CancellationToken;

/// Represents a network address in various supported formats.
///
/// This enum is used both for the target of a request and for the address the
/// proxy reports as bound, supporting IPv4, IPv6, and domain name address types
/// as defined in RFC 1928.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Address {
    /// An IPv4 address with a port number.
    IPv4((Ipv4Addr, u16)),

    /// A domain name with a port number.
    DomainName((String, u16)),

    /// An IPv6 address with a port number.
    IPv6((Ipv6Addr, u16)),
}

impl Address {
    /// The port number of the address.
    pub fn port(&self) -> u16 {
        match self {
            Address::IPv4((_, port))
            | Address::DomainName((_, port))
            | Address::IPv6((_, port)) => *port,
        }
    }

    /// Number of bytes [`encode_to_buf`](Address::encode_to_buf) writes.
    ///
    /// Fails with [`SocksError::InvalidInput`] for domain names longer than 255 bytes.
    pub fn encoded_len(&self) -> Result<usize, SocksError> {
        match self {
            // len(addr_type) + len(ip) + len(port)
            Address::IPv4(_) => Ok(1 + 4 + 2),
            Address::DomainName((domain, _)) => {
                if domain.len() > 255 {
                    return Err(SocksError::InvalidInput("domain name longer than 255 bytes"));
                }
                // len(addr_type) + len(domain_len) + len(domain) + len(port)
                Ok(1 + 1 + domain.len() + 2)
            }
            Address::IPv6(_) => Ok(1 + 16 + 2),
        }
    }

    /// Decodes a SOCKS5-like address from a byte buffer.
    ///
    /// According to RFC 1928, SOCKS5 address format is:
    /// ```text
    /// +------+----------+----------+
    /// | ATYP | DST.ADDR | DST.PORT |
    /// +------+----------+----------+
    /// |  1   | Variable |    2     |
    /// +------+----------+----------+
    /// ```
    /// `ATYP`: Address type - 0x01 (IPv4), 0x03 (domain name), 0x04 (IPv6)
    ///
    /// `ADDR`: Destination address, format depends on ATYP
    ///
    /// `PORT`: Destination port, network byte order (big-endian)
    ///
    /// Returns [`Decoded::Incomplete`] with the number of missing bytes when
    /// `buf` ends before the address does.
    pub fn decode_from_buf(buf: &[u8]) -> Result<Decoded<Self>, SocksError> {
        let Some(&addr_type) = buf.first() else {
            return Ok(Decoded::Incomplete(1));
        };
        let len = match AddressType::try_from(addr_type)? {
            AddressType::IPv4 => 1 + 4 + 2,
            AddressType::DomainName => match buf.get(1) {
                Some(domain_len) => 1 + 1 + *domain_len as usize + 2,
                None => return Ok(Decoded::Incomplete(1)),
            },
            AddressType::IPv6 => 1 + 16 + 2,
        };
        if buf.len() < len {
            return Ok(Decoded::Incomplete(len - buf.len()));
        }

        let mut cursor = Cursor::new(&buf[1..len]);
        let address = match AddressType::try_from(addr_type)? {
            AddressType::IPv4 => {
                let mut ip = [0u8; 4];
                cursor.read_slice(&mut ip)?;
                Address::IPv4((Ipv4Addr::from(ip), cursor.read_u16()?))
            }
            AddressType::DomainName => {
                let mut domain = vec![0u8; cursor.read_u8()? as usize];
                cursor.read_slice(&mut domain)?;
                let domain = String::from_utf8(domain)
                    .map_err(|_| SocksError::ProtocolViolation("domain name is not valid UTF-8"))?;
                Address::DomainName((domain, cursor.read_u16()?))
            }
            AddressType::IPv6 => {
                let mut ip = [0u8; 16];
                cursor.read_slice(&mut ip)?;
                Address::IPv6((Ipv6Addr::from(ip), cursor.read_u16()?))
            }
        };
        Ok(Decoded::Complete(address, len))
    }

    /// Encodes the address to a SOCKS5-like format and writes it to a byte buffer.
    pub fn encode_to_buf(&self, buf: &mut [u8]) -> Result<usize, SocksError> {
        let len = self.encoded_len()?;
        let mut cursor = CursorMut::new(buf);
        match self {
            Address::IPv4((ip, port)) => {
                cursor.write_u8(AddressType::IPv4 as u8)?;
                cursor.write_slice(&ip.octets())?;
                cursor.write_u16(*port)?;
            }
            Address::DomainName((domain, port)) => {
                cursor.write_u8(AddressType::DomainName as u8)?;
                cursor.write_u8(domain.len() as u8)?;
                cursor.write_slice(domain.as_bytes())?;
                cursor.write_u16(*port)?;
            }
            Address::IPv6((ip, port)) => {
                cursor.write_u8(AddressType::IPv6 as u8)?;
                cursor.write_slice(&ip.octets())?;
                cursor.write_u16(*port)?;
            }
        }
        Ok(len)
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Address::IPv4((*v4.ip(), v4.port())),
            SocketAddr::V6(v6) => Address::IPv6((*v6.ip(), v6.port())),
        }
    }
}

impl Display for Address {
    /// Formats the address as `host:port`, with IPv6 hosts in square brackets.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::IPv4((ip, port)) => write!(f, "{}:{}", ip, port),
            // IPv6 addresses need to be enclosed in square brackets
            Address::IPv6((ip, port)) => write!(f, "[{}]:{}", ip, port),
            Address::DomainName((domain, port)) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<&Address> for String {
    fn from(address: &Address) -> Self {
        address.to_string()
    }
}

impl TryFrom<&str> for Address {
    type Error = AddrError;

    /// Parses `host:port`, `[ipv6]:port` or `ipv4:port` into an `Address`.
    fn try_from(string: &str) -> Result<Self, Self::Error> {
        if let Some(rest) = string.strip_prefix('[') {
            // IPv6 format: [IPv6]:port
            let (host, after) = rest
                .split_once(']')
                .ok_or(AddrError::InvalidIPv6MissingClosingBracket)?;
            let port_str = after
                .strip_prefix(':')
                .ok_or(AddrError::InvalidIPv6MissingPortSeparator)?;

            let port = port_str
                .parse::<u16>()
                .map_err(|_| AddrError::InvalidPortNumber)?;
            let ipv6 = host
                .parse::<Ipv6Addr>()
                .map_err(|_| AddrError::InvalidIPv6Address)?;

            Ok(Address::IPv6((ipv6, port)))
        } else {
            // IPv4 or domain name format: host:port
            let (host, port_str) = string
                .rsplit_once(':')
                .ok_or(AddrError::MissingPortSeparator)?;
            let port = port_str
                .parse::<u16>()
                .map_err(|_| AddrError::InvalidPortNumber)?;

            // Try to parse as IPv4 address, otherwise treat as domain name
            if let Ok(ipv4) = host.parse::<Ipv4Addr>() {
                Ok(Address::IPv4((ipv4, port)))
            } else if host.is_empty() || host.len() > 255 {
                Err(AddrError::InvalidDomainName)
            } else {
                Ok(Address::DomainName((host.to_string(), port)))
            }
        }
    }
}

impl TryFrom<String> for Address {
    type Error = AddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::try_from(value.as_str())
    }
}

/// Errors from parsing a textual `host:port` address.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum AddrError {
    /// IPv6 address format is missing the closing bracket.
    #[error("invalid IPv6 address format: missing closing bracket")]
    InvalidIPv6MissingClosingBracket,
    /// IPv6 address format is missing the port separator after the closing bracket.
    #[error("invalid IPv6 address format: missing port separator")]
    InvalidIPv6MissingPortSeparator,
    /// IPv6 address contains invalid format or characters.
    #[error("invalid IPv6 address")]
    InvalidIPv6Address,
    /// Target address is missing the port separator.
    #[error("invalid target address format: missing port separator")]
    MissingPortSeparator,
    /// Port number is not a valid integer between 0-65535.
    #[error("invalid port number")]
    InvalidPortNumber,
    /// The host is empty or longer than 255 bytes.
    #[error("invalid domain name")]
    InvalidDomainName,
}

/// Username and password for RFC 1929 authentication.
///
/// Each field must not exceed 255 bytes.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates a new pair of credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication settings for a handshake.
///
/// The methods are offered to a SOCKS5 server in the order they were added.
/// SOCKS4 ignores them and sends the user id instead.
///
/// ```
/// use socks_client_kit::AuthConfig;
///
/// // Offers "no authentication" first, then username/password.
/// let auth = AuthConfig::new().with_credentials("user", "pass");
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthConfig {
    methods: Vec<AuthMethod>,
    credentials: Option<Credentials>,
    user_id: String,
}

impl AuthConfig {
    /// Offers only [`AuthMethod::None`] and uses an empty SOCKS4 user id.
    pub fn new() -> Self {
        Self {
            methods: vec![AuthMethod::None],
            credentials: None,
            user_id: String::new(),
        }
    }

    /// Sets the credentials and offers [`AuthMethod::UsernamePassword`].
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self.with_method(AuthMethod::UsernamePassword)
    }

    /// Adds `method` to the offered methods unless it is already offered.
    pub fn with_method(mut self, method: AuthMethod) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Replaces the offered methods, keeping their order.
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = AuthMethod>) -> Self {
        self.methods.clear();
        for method in methods {
            self = self.with_method(method);
        }
        self
    }

    /// Sets the user id sent in SOCKS4 requests.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// The offered methods, in preference order.
    pub fn methods(&self) -> &[AuthMethod] {
        &self.methods
    }

    /// The configured credentials, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// The SOCKS4 user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AddressType {
    IPv4 = 0x01,
    DomainName = 0x03,
    IPv6 = 0x04,
}

impl TryFrom<u8> for AddressType {
    type Error = SocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(AddressType::IPv4),
            0x03 => Ok(AddressType::DomainName),
            0x04 => Ok(AddressType::IPv6),
            _ => Err(SocksError::ProtocolViolation("unsupported address type")),
        }
    }
}

// Decoders check the full message length before reading, so an underflow here
// means the length computation and the layout disagree.
const UNDERFLOW: SocksError = SocksError::ProtocolViolation("truncated message");
const OVERFLOW: SocksError = SocksError::InvalidInput("output buffer too small");

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, SocksError> {
        let p = self.buf.get(self.pos).ok_or(UNDERFLOW)?;
        self.pos += 1;
        Ok(*p)
    }

    fn read_u16(&mut self) -> Result<u16, SocksError> {
        let p = self.buf.get(self.pos..self.pos + 2).ok_or(UNDERFLOW)?;
        self.pos += 2;
        Ok(u16::from_be_bytes([p[0], p[1]]))
    }

    fn read_slice(&mut self, buf: &mut [u8]) -> Result<(), SocksError> {
        let p = self
            .buf
            .get(self.pos..self.pos + buf.len())
            .ok_or(UNDERFLOW)?;
        self.pos += buf.len();
        buf.copy_from_slice(p);
        Ok(())
    }
}

struct CursorMut<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> CursorMut<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn write_u8(&mut self, value: u8) -> Result<(), SocksError> {
        let p = self.buf.get_mut(self.pos).ok_or(OVERFLOW)?;
        *p = value;
        self.pos += 1;
        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> Result<(), SocksError> {
        self.write_slice(&value.to_be_bytes())
    }

    fn write_slice(&mut self, value: &[u8]) -> Result<(), SocksError> {
        let p = self
            .buf
            .get_mut(self.pos..self.pos + value.len())
            .ok_or(OVERFLOW)?;
        p.copy_from_slice(value);
        self.pos += value.len();
        Ok(())
    }

    fn remaining(&mut self) -> &mut [u8] {
        &mut self.buf[self.pos..]
    }
}
