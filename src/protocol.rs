//! Pure encoders and decoders for the SOCKS4/4a and SOCKS5 wire structures.
//!
//! Nothing here performs I/O. Encoders come in pairs: a `*_len` function that
//! validates the input and returns the exact encoded size, and an `encode_*`
//! function that writes into a caller-provided slice (typically a region
//! returned by [`LinearBuffer::prepare`](crate::LinearBuffer::prepare)).
//! Decoders inspect a slice of received bytes and either return the decoded
//! value with the number of bytes it occupies, or report how many more bytes
//! they need before they can make progress.

use std::net::Ipv4Addr;

use crate::{
    Address,
    Credentials,
    Cursor,
    CursorMut,
    error::{Rejection, SocksError},
};

/// SOCKS4 protocol version byte.
pub const SOCKS4_VER: u8 = 0x04;
/// SOCKS5 protocol version byte.
pub const SOCKS5_VER: u8 = 0x05;
/// Username/password sub-negotiation version byte (RFC 1929).
pub const SOCKS5_AUTH_VER: u8 = 0x01;

// Version byte of a SOCKS4 reply.
const SOCKS4_REPLY_VER: u8 = 0x00;

// SOCKS4a signals a domain name with an address of the form 0.0.0.x, x != 0.
const SOCKS4A_MARKER: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 1);

/// Result of running a decoder over a partially received message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Decoded<T> {
    /// The message is complete. Carries the value and the bytes it occupied.
    Complete(T, usize),
    /// At least this many additional bytes are needed.
    Incomplete(usize),
}

impl<T> Decoded<T> {
    fn need(total: usize, available: usize) -> Option<Self> {
        (available < total).then(|| Decoded::Incomplete(total - available))
    }

    /// Maps the decoded value, shifting the consumed length by `offset`.
    pub(crate) fn map<U>(self, offset: usize, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Complete(value, len) => Decoded::Complete(f(value), offset + len),
            Decoded::Incomplete(n) => Decoded::Incomplete(n),
        }
    }
}

/// SOCKS protocol versions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Version {
    /// SOCKS4, including the SOCKS4a domain name extension.
    V4,
    /// SOCKS5 (RFC 1928).
    V5,
}

impl Version {
    /// The version byte sent on the wire.
    pub fn as_byte(self) -> u8 {
        match self {
            Version::V4 => SOCKS4_VER,
            Version::V5 => SOCKS5_VER,
        }
    }
}

/// SOCKS5 authentication methods as defined in RFC 1928 section 3.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AuthMethod {
    /// No authentication required.
    None = 0x00,
    /// GSSAPI. Recognized during negotiation, its sub-negotiation is not implemented.
    GssApi = 0x01,
    /// Username/password authentication (RFC 1929).
    UsernamePassword = 0x02,
    /// Server response when none of the offered methods is acceptable.
    /// Never offered by a client.
    NoAcceptable = 0xFF,
}

impl TryFrom<u8> for AuthMethod {
    type Error = SocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(AuthMethod::None),
            0x01 => Ok(AuthMethod::GssApi),
            0x02 => Ok(AuthMethod::UsernamePassword),
            0xFF => Ok(AuthMethod::NoAcceptable),
            _ => Err(SocksError::ProtocolViolation("unknown authentication method")),
        }
    }
}

/// SOCKS commands.
///
/// Reference: <https://datatracker.ietf.org/doc/html/rfc1928#section-4>
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    /// Establish and proxy a TCP connection to the target.
    Connect = 0x01,
    /// Ask the server to listen for one incoming connection.
    Bind = 0x02,
    /// Associate a UDP relay (SOCKS5 only).
    BindUdp = 0x03,
}

impl TryFrom<u8> for Command {
    type Error = SocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Command::Connect),
            0x02 => Ok(Command::Bind),
            0x03 => Ok(Command::BindUdp),
            _ => Err(SocksError::ProtocolViolation("unknown command")),
        }
    }
}

/// SOCKS5 reply codes as defined in RFC 1928 section 6.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[allow(missing_docs)]
pub enum Socks5Reply {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl TryFrom<u8> for Socks5Reply {
    type Error = SocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Socks5Reply::Succeeded),
            0x01 => Ok(Socks5Reply::GeneralFailure),
            0x02 => Ok(Socks5Reply::ConnectionNotAllowed),
            0x03 => Ok(Socks5Reply::NetworkUnreachable),
            0x04 => Ok(Socks5Reply::HostUnreachable),
            0x05 => Ok(Socks5Reply::ConnectionRefused),
            0x06 => Ok(Socks5Reply::TtlExpired),
            0x07 => Ok(Socks5Reply::CommandNotSupported),
            0x08 => Ok(Socks5Reply::AddressTypeNotSupported),
            _ => Err(SocksError::ProtocolViolation("unassigned reply code")),
        }
    }
}

impl Socks5Reply {
    fn into_result(self) -> Result<(), SocksError> {
        let rejection = match self {
            Socks5Reply::Succeeded => return Ok(()),
            Socks5Reply::CommandNotSupported => return Err(SocksError::CommandNotSupported),
            Socks5Reply::GeneralFailure => Rejection::GeneralFailure,
            Socks5Reply::ConnectionNotAllowed => Rejection::ConnectionNotAllowed,
            Socks5Reply::NetworkUnreachable => Rejection::NetworkUnreachable,
            Socks5Reply::HostUnreachable => Rejection::HostUnreachable,
            Socks5Reply::ConnectionRefused => Rejection::ConnectionRefused,
            Socks5Reply::TtlExpired => Rejection::TtlExpired,
            Socks5Reply::AddressTypeNotSupported => Rejection::AddressTypeNotSupported,
        };
        Err(SocksError::Rejected(rejection))
    }
}

/// SOCKS4 reply codes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Socks4Reply {
    /// Request granted.
    Granted = 0x5A,
    /// Request rejected or failed.
    Rejected = 0x5B,
    /// The server cannot reach the client's identd.
    IdentdUnreachable = 0x5C,
    /// identd reported a different user id.
    IdentdMismatch = 0x5D,
}

impl TryFrom<u8> for Socks4Reply {
    type Error = SocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x5A => Ok(Socks4Reply::Granted),
            0x5B => Ok(Socks4Reply::Rejected),
            0x5C => Ok(Socks4Reply::IdentdUnreachable),
            0x5D => Ok(Socks4Reply::IdentdMismatch),
            _ => Err(SocksError::ProtocolViolation("unknown SOCKS4 reply code")),
        }
    }
}

impl Socks4Reply {
    fn into_result(self) -> Result<(), SocksError> {
        match self {
            Socks4Reply::Granted => Ok(()),
            Socks4Reply::Rejected => Err(SocksError::Rejected(Rejection::GeneralFailure)),
            Socks4Reply::IdentdUnreachable => {
                Err(SocksError::Rejected(Rejection::IdentdUnreachable))
            }
            Socks4Reply::IdentdMismatch => Err(SocksError::LoginFailed),
        }
    }
}

/// Size of the SOCKS5 greeting offering `methods`.
pub fn greeting_request_len(methods: &[AuthMethod]) -> Result<usize, SocksError> {
    if methods.is_empty() {
        return Err(SocksError::InvalidInput("no authentication methods offered"));
    }
    if methods.len() > 255 {
        return Err(SocksError::InvalidInput("more than 255 authentication methods"));
    }
    if methods.contains(&AuthMethod::NoAcceptable) {
        return Err(SocksError::InvalidInput("no_acceptable cannot be offered"));
    }
    Ok(1 + 1 + methods.len())
}

/// According to RFC 1928, the client greeting format is:
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
pub fn encode_greeting_request(
    methods: &[AuthMethod],
    out: &mut [u8],
) -> Result<usize, SocksError> {
    let len = greeting_request_len(methods)?;
    let mut cursor = CursorMut::new(out);
    cursor.write_u8(SOCKS5_VER)?;
    cursor.write_u8(methods.len() as u8)?;
    for method in methods {
        cursor.write_u8(*method as u8)?;
    }
    Ok(len)
}

/// Decodes a SOCKS5 client greeting.
pub fn decode_greeting_request(buf: &[u8]) -> Result<Decoded<Vec<AuthMethod>>, SocksError> {
    if let Some(incomplete) = Decoded::need(2, buf.len()) {
        return Ok(incomplete);
    }
    if buf[0] != SOCKS5_VER {
        return Err(SocksError::InvalidVersion(buf[0]));
    }
    let len = 2 + buf[1] as usize;
    if let Some(incomplete) = Decoded::need(len, buf.len()) {
        return Ok(incomplete);
    }

    let methods = buf[2..len]
        .iter()
        .map(|b| AuthMethod::try_from(*b))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Decoded::Complete(methods, len))
}

/// According to RFC 1928, the server's method selection format is:
/// ```text
/// +----+--------+
/// |VER | METHOD |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
pub fn encode_greeting_reply(method: AuthMethod, out: &mut [u8]) -> Result<usize, SocksError> {
    let mut cursor = CursorMut::new(out);
    cursor.write_u8(SOCKS5_VER)?;
    cursor.write_u8(method as u8)?;
    Ok(2)
}

/// Decodes the server's method selection. [`AuthMethod::NoAcceptable`] is
/// returned as a value, not as an error.
pub fn decode_greeting_reply(buf: &[u8]) -> Result<Decoded<AuthMethod>, SocksError> {
    if let Some(incomplete) = Decoded::need(2, buf.len()) {
        return Ok(incomplete);
    }
    if buf[0] != SOCKS5_VER {
        return Err(SocksError::InvalidVersion(buf[0]));
    }
    Ok(Decoded::Complete(AuthMethod::try_from(buf[1])?, 2))
}

/// Size of the username/password request for `credentials`.
pub fn auth_request_len(credentials: &Credentials) -> Result<usize, SocksError> {
    if credentials.username.len() > 255 {
        return Err(SocksError::InvalidInput("username longer than 255 bytes"));
    }
    if credentials.password.len() > 255 {
        return Err(SocksError::InvalidInput("password longer than 255 bytes"));
    }
    Ok(1 + 1 + credentials.username.len() + 1 + credentials.password.len())
}

/// According to RFC 1929, the username/password request format is:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
pub fn encode_auth_request(credentials: &Credentials, out: &mut [u8]) -> Result<usize, SocksError> {
    let len = auth_request_len(credentials)?;
    let mut cursor = CursorMut::new(out);
    cursor.write_u8(SOCKS5_AUTH_VER)?;
    cursor.write_u8(credentials.username.len() as u8)?;
    cursor.write_slice(credentials.username.as_bytes())?;
    cursor.write_u8(credentials.password.len() as u8)?;
    cursor.write_slice(credentials.password.as_bytes())?;
    Ok(len)
}

/// Decodes a username/password request.
pub fn decode_auth_request(buf: &[u8]) -> Result<Decoded<Credentials>, SocksError> {
    if let Some(incomplete) = Decoded::need(2, buf.len()) {
        return Ok(incomplete);
    }
    if buf[0] != SOCKS5_AUTH_VER {
        return Err(SocksError::InvalidAuthVersion(buf[0]));
    }
    let ulen = buf[1] as usize;
    if let Some(incomplete) = Decoded::need(2 + ulen + 1, buf.len()) {
        return Ok(incomplete);
    }
    let plen = buf[2 + ulen] as usize;
    let len = 2 + ulen + 1 + plen;
    if let Some(incomplete) = Decoded::need(len, buf.len()) {
        return Ok(incomplete);
    }

    let username = std::str::from_utf8(&buf[2..2 + ulen])
        .map_err(|_| SocksError::ProtocolViolation("username is not valid UTF-8"))?;
    let password = std::str::from_utf8(&buf[3 + ulen..len])
        .map_err(|_| SocksError::ProtocolViolation("password is not valid UTF-8"))?;
    Ok(Decoded::Complete(Credentials::new(username, password), len))
}

/// According to RFC 1929, the username/password reply format is:
/// ```text
/// +----+--------+
/// |VER | STATUS |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
/// A zero status means success.
pub fn encode_auth_reply(status: u8, out: &mut [u8]) -> Result<usize, SocksError> {
    let mut cursor = CursorMut::new(out);
    cursor.write_u8(SOCKS5_AUTH_VER)?;
    cursor.write_u8(status)?;
    Ok(2)
}

/// Decodes a username/password reply and returns its status byte.
pub fn decode_auth_reply(buf: &[u8]) -> Result<Decoded<u8>, SocksError> {
    if let Some(incomplete) = Decoded::need(2, buf.len()) {
        return Ok(incomplete);
    }
    if buf[0] != SOCKS5_AUTH_VER {
        return Err(SocksError::InvalidAuthVersion(buf[0]));
    }
    Ok(Decoded::Complete(buf[1], 2))
}

/// Size of a SOCKS5 request for `target`.
pub fn connect_request_len(target: &Address) -> Result<usize, SocksError> {
    Ok(1 + 1 + 1 + target.encoded_len()?)
}

/// According to RFC 1928, the request format is:
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn encode_connect_request(
    command: Command,
    target: &Address,
    out: &mut [u8],
) -> Result<usize, SocksError> {
    let len = connect_request_len(target)?;
    let mut cursor = CursorMut::new(out);
    cursor.write_u8(SOCKS5_VER)?;
    cursor.write_u8(command as u8)?;
    cursor.write_u8(0)?;
    target.encode_to_buf(cursor.remaining())?;
    Ok(len)
}

/// Decodes a SOCKS5 request.
pub fn decode_connect_request(buf: &[u8]) -> Result<Decoded<(Command, Address)>, SocksError> {
    if let Some(incomplete) = Decoded::need(3, buf.len()) {
        return Ok(incomplete);
    }
    if buf[0] != SOCKS5_VER {
        return Err(SocksError::InvalidVersion(buf[0]));
    }
    let command = Command::try_from(buf[1])?;
    if buf[2] != 0 {
        return Err(SocksError::ProtocolViolation("reserved byte is not zero"));
    }
    Ok(Address::decode_from_buf(&buf[3..])?.map(3, |address| (command, address)))
}

/// Size of a SOCKS5 reply carrying `bound`.
pub fn connect_reply_len(bound: &Address) -> Result<usize, SocksError> {
    Ok(1 + 1 + 1 + bound.encoded_len()?)
}

/// According to RFC 1928, the reply format is:
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn encode_connect_reply(
    reply: Socks5Reply,
    bound: &Address,
    out: &mut [u8],
) -> Result<usize, SocksError> {
    let len = connect_reply_len(bound)?;
    let mut cursor = CursorMut::new(out);
    cursor.write_u8(SOCKS5_VER)?;
    cursor.write_u8(reply as u8)?;
    cursor.write_u8(0)?;
    bound.encode_to_buf(cursor.remaining())?;
    Ok(len)
}

/// Decodes a SOCKS5 reply and returns the bound address.
///
/// A reply code other than `succeeded` is reported as soon as the status byte
/// has arrived, without waiting for the rest of the reply.
pub fn decode_connect_reply(buf: &[u8]) -> Result<Decoded<Address>, SocksError> {
    if let Some(incomplete) = Decoded::need(2, buf.len()) {
        return Ok(incomplete);
    }
    if buf[0] != SOCKS5_VER {
        return Err(SocksError::InvalidVersion(buf[0]));
    }
    Socks5Reply::try_from(buf[1])?.into_result()?;

    if let Some(incomplete) = Decoded::need(3, buf.len()) {
        return Ok(incomplete);
    }
    if buf[2] != 0 {
        return Err(SocksError::ProtocolViolation("reserved byte is not zero"));
    }
    Ok(Address::decode_from_buf(&buf[3..])?.map(3, |address| address))
}

fn check_nul_free(s: &str, what: &'static str) -> Result<(), SocksError> {
    if s.as_bytes().contains(&0) {
        return Err(SocksError::InvalidInput(what));
    }
    Ok(())
}

/// Size of a SOCKS4 request for `target` and `user_id`.
///
/// Domain name targets use the SOCKS4a extension. IPv6 targets and the UDP
/// associate command cannot be expressed in SOCKS4.
pub fn socks4_request_len(
    command: Command,
    target: &Address,
    user_id: &str,
) -> Result<usize, SocksError> {
    if command == Command::BindUdp {
        return Err(SocksError::InvalidInput("SOCKS4 has no UDP associate command"));
    }
    check_nul_free(user_id, "user id contains a NUL byte")?;

    let header = 1 + 1 + 2 + 4 + user_id.len() + 1;
    match target {
        Address::IPv4(_) => Ok(header),
        Address::DomainName((domain, _)) => {
            check_nul_free(domain, "domain name contains a NUL byte")?;
            Ok(header + domain.len() + 1)
        }
        Address::IPv6(_) => Err(SocksError::InvalidInput(
            "SOCKS4 only supports IPv4 addresses and domain names",
        )),
    }
}

/// The SOCKS4 request format is:
/// ```text
/// +----+----+---------+--------+--------+------+
/// | VN | CD | DSTPORT | DSTIP  | USERID | NULL |
/// +----+----+---------+--------+--------+------+
/// | 1  | 1  |    2    |   4    |  var   |  1   |
/// +----+----+---------+--------+--------+------+
/// ```
/// SOCKS4a sets DSTIP to `0.0.0.1` and appends the NUL-terminated domain name.
pub fn encode_socks4_request(
    command: Command,
    target: &Address,
    user_id: &str,
    out: &mut [u8],
) -> Result<usize, SocksError> {
    let len = socks4_request_len(command, target, user_id)?;
    let mut cursor = CursorMut::new(out);
    cursor.write_u8(SOCKS4_VER)?;
    cursor.write_u8(command as u8)?;
    cursor.write_u16(target.port())?;
    match target {
        Address::IPv4((ip, _)) => cursor.write_slice(&ip.octets())?,
        _ => cursor.write_slice(&SOCKS4A_MARKER.octets())?,
    }
    cursor.write_slice(user_id.as_bytes())?;
    cursor.write_u8(0)?;
    if let Address::DomainName((domain, _)) = target {
        cursor.write_slice(domain.as_bytes())?;
        cursor.write_u8(0)?;
    }
    Ok(len)
}

/// Decodes a SOCKS4 or SOCKS4a request into command, target and user id.
pub fn decode_socks4_request(
    buf: &[u8],
) -> Result<Decoded<(Command, Address, String)>, SocksError> {
    const HEADER: usize = 1 + 1 + 2 + 4;

    if let Some(incomplete) = Decoded::need(HEADER, buf.len()) {
        return Ok(incomplete);
    }
    let mut cursor = Cursor::new(buf);
    let ver = cursor.read_u8()?;
    if ver != SOCKS4_VER {
        return Err(SocksError::InvalidVersion(ver));
    }
    let command = Command::try_from(cursor.read_u8()?)?;
    let port = cursor.read_u16()?;
    let mut ip = [0u8; 4];
    cursor.read_slice(&mut ip)?;

    let Some((user_id, after_user)) = read_nul_terminated(buf, HEADER)? else {
        return Ok(Decoded::Incomplete(1));
    };

    // 0.0.0.x with x != 0 announces a SOCKS4a domain name
    let is_socks4a = matches!(ip, [0, 0, 0, x] if x != 0);
    if !is_socks4a {
        return Ok(Decoded::Complete(
            (command, Address::IPv4((Ipv4Addr::from(ip), port)), user_id),
            after_user,
        ));
    }

    let Some((domain, len)) = read_nul_terminated(buf, after_user)? else {
        return Ok(Decoded::Incomplete(1));
    };
    Ok(Decoded::Complete(
        (command, Address::DomainName((domain, port)), user_id),
        len,
    ))
}

fn read_nul_terminated(buf: &[u8], start: usize) -> Result<Option<(String, usize)>, SocksError> {
    let Some(nul) = buf[start..].iter().position(|b| *b == 0) else {
        return Ok(None);
    };
    let s = std::str::from_utf8(&buf[start..start + nul])
        .map_err(|_| SocksError::ProtocolViolation("SOCKS4 string is not valid UTF-8"))?;
    Ok(Some((s.to_owned(), start + nul + 1)))
}

/// The SOCKS4 reply format is:
/// ```text
/// +----+----+---------+--------+
/// | VN | CD | DSTPORT | DSTIP  |
/// +----+----+---------+--------+
/// | 1  | 1  |    2    |   4    |
/// +----+----+---------+--------+
/// ```
/// VN is always zero.
pub fn encode_socks4_reply(
    reply: Socks4Reply,
    bound: (Ipv4Addr, u16),
    out: &mut [u8],
) -> Result<usize, SocksError> {
    let mut cursor = CursorMut::new(out);
    cursor.write_u8(SOCKS4_REPLY_VER)?;
    cursor.write_u8(reply as u8)?;
    cursor.write_u16(bound.1)?;
    cursor.write_slice(&bound.0.octets())?;
    Ok(8)
}

/// Decodes a SOCKS4 reply and returns the bound address.
pub fn decode_socks4_reply(buf: &[u8]) -> Result<Decoded<Address>, SocksError> {
    if let Some(incomplete) = Decoded::need(2, buf.len()) {
        return Ok(incomplete);
    }
    if buf[0] != SOCKS4_REPLY_VER {
        return Err(SocksError::InvalidVersion(buf[0]));
    }
    Socks4Reply::try_from(buf[1])?.into_result()?;

    if let Some(incomplete) = Decoded::need(8, buf.len()) {
        return Ok(incomplete);
    }
    let mut cursor = Cursor::new(&buf[2..]);
    let port = cursor.read_u16()?;
    let mut ip = [0u8; 4];
    cursor.read_slice(&mut ip)?;
    Ok(Decoded::Complete(Address::IPv4((Ipv4Addr::from(ip), port)), 8))
}

#[cfg(test)]
mod test {
    use std::net::Ipv6Addr;

    use super::*;
    use crate::error::ErrorKind;

    fn encode(len: usize, f: impl FnOnce(&mut [u8]) -> Result<usize, SocksError>) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let written = f(&mut out).unwrap();
        assert_eq!(written, len);
        out
    }

    #[test]
    fn test_greeting_request_bytes() {
        let methods = [AuthMethod::None, AuthMethod::UsernamePassword];
        let len = greeting_request_len(&methods).unwrap();
        let bytes = encode(len, |out| encode_greeting_request(&methods, out));
        assert_eq!(bytes, [0x05, 0x02, 0x00, 0x02]);

        let Decoded::Complete(decoded, n) = decode_greeting_request(&bytes).unwrap() else {
            panic!("greeting should be complete");
        };
        assert_eq!(decoded, methods);
        assert_eq!(n, 4);
    }

    #[test]
    fn test_greeting_request_invalid_input() {
        assert_eq!(
            greeting_request_len(&[]).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            greeting_request_len(&[AuthMethod::NoAcceptable])
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            greeting_request_len(&[AuthMethod::None; 256])
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_greeting_reply() {
        assert_eq!(
            decode_greeting_reply(&[0x05, 0x02]).unwrap(),
            Decoded::Complete(AuthMethod::UsernamePassword, 2)
        );
        assert_eq!(
            decode_greeting_reply(&[0x05, 0xFF]).unwrap(),
            Decoded::Complete(AuthMethod::NoAcceptable, 2)
        );
        assert_eq!(decode_greeting_reply(&[0x05]).unwrap(), Decoded::Incomplete(1));
        assert_eq!(decode_greeting_reply(&[]).unwrap(), Decoded::Incomplete(2));
        assert!(matches!(
            decode_greeting_reply(&[0x04, 0x00]),
            Err(SocksError::InvalidVersion(0x04))
        ));
        assert!(matches!(
            decode_greeting_reply(&[0x05, 0x80]),
            Err(SocksError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_auth_request() {
        let credentials = Credentials::new("user", "pass");
        let len = auth_request_len(&credentials).unwrap();
        let bytes = encode(len, |out| encode_auth_request(&credentials, out));
        assert_eq!(
            bytes,
            [0x01, 0x04, b'u', b's', b'e', b'r', 0x04, b'p', b'a', b's', b's']
        );

        assert_eq!(
            decode_auth_request(&bytes).unwrap(),
            Decoded::Complete(credentials, bytes.len())
        );
        // Missing the password length byte
        assert_eq!(
            decode_auth_request(&bytes[..6]).unwrap(),
            Decoded::Incomplete(1)
        );
    }

    #[test]
    fn test_auth_request_too_long() {
        let username = Credentials::new("a".repeat(256), "pass");
        assert!(matches!(
            auth_request_len(&username),
            Err(SocksError::InvalidInput(_))
        ));
        let password = Credentials::new("user", "a".repeat(256));
        assert!(matches!(
            auth_request_len(&password),
            Err(SocksError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_auth_request_invalid_encoding() {
        let bytes = [0x01, 0x02, 0xFF, 0xFF, 0x01, b'p'];
        assert!(matches!(
            decode_auth_request(&bytes),
            Err(SocksError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_auth_reply() {
        assert_eq!(decode_auth_reply(&[0x01, 0x00]).unwrap(), Decoded::Complete(0, 2));
        assert_eq!(decode_auth_reply(&[0x01, 0x01]).unwrap(), Decoded::Complete(1, 2));
        assert!(matches!(
            decode_auth_reply(&[0x02, 0x00]),
            Err(SocksError::InvalidAuthVersion(0x02))
        ));
    }

    #[test]
    fn test_connect_request_ipv4_round_trip() {
        let target = Address::IPv4((Ipv4Addr::new(198, 51, 100, 7), 443));
        let len = connect_request_len(&target).unwrap();
        let bytes = encode(len, |out| encode_connect_request(Command::Connect, &target, out));
        assert_eq!(bytes, [0x05, 0x01, 0x00, 0x01, 198, 51, 100, 7, 0x01, 0xBB]);

        let Decoded::Complete((command, decoded), n) = decode_connect_request(&bytes).unwrap()
        else {
            panic!("request should be complete");
        };
        assert_eq!(command, Command::Connect);
        assert_eq!(decoded, target);
        assert_eq!(n, bytes.len());
    }

    #[test]
    fn test_connect_request_domain_round_trip() {
        let target = Address::DomainName(("example.com".to_string(), 80));
        let len = connect_request_len(&target).unwrap();
        assert_eq!(len, 3 + 1 + 1 + 11 + 2);
        let bytes = encode(len, |out| encode_connect_request(Command::Bind, &target, out));
        assert_eq!(bytes[3], 0x03);
        assert_eq!(bytes[4], 11);
        assert_eq!(&bytes[5..16], b"example.com");

        let Decoded::Complete((command, Address::DomainName((domain, port))), n) =
            decode_connect_request(&bytes).unwrap()
        else {
            panic!("request should carry a domain name");
        };
        assert_eq!(command, Command::Bind);
        assert_eq!(domain.len(), 11);
        assert_eq!(domain, "example.com");
        assert_eq!(port, 80);
        assert_eq!(n, len);
    }

    #[test]
    fn test_connect_request_domain_too_long() {
        let target = Address::DomainName(("a".repeat(256), 80));
        assert!(matches!(
            connect_request_len(&target),
            Err(SocksError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_connect_reply_ipv6() {
        let bound = Address::IPv6((Ipv6Addr::LOCALHOST, 1080));
        let len = connect_reply_len(&bound).unwrap();
        let bytes = encode(len, |out| {
            encode_connect_reply(Socks5Reply::Succeeded, &bound, out)
        });
        assert_eq!(len, 3 + 1 + 16 + 2);

        // Each prefix reports exactly what is still missing
        for cut in 4..len {
            assert_eq!(
                decode_connect_reply(&bytes[..cut]).unwrap(),
                Decoded::Incomplete(len - cut)
            );
        }
        assert_eq!(
            decode_connect_reply(&bytes).unwrap(),
            Decoded::Complete(bound, len)
        );
    }

    #[test]
    fn test_connect_reply_status_mapping() {
        let cases = [
            (0x01, ErrorKind::Rejected),
            (0x02, ErrorKind::Rejected),
            (0x03, ErrorKind::Rejected),
            (0x04, ErrorKind::Rejected),
            (0x05, ErrorKind::Rejected),
            (0x06, ErrorKind::Rejected),
            (0x07, ErrorKind::CommandNotSupported),
            (0x08, ErrorKind::Rejected),
            (0x09, ErrorKind::ProtocolViolation),
            (0xFF, ErrorKind::ProtocolViolation),
        ];
        for (status, kind) in cases {
            // Only the status byte is needed to fail
            let err = decode_connect_reply(&[0x05, status]).unwrap_err();
            assert_eq!(err.kind(), kind, "status {status:#04x}");
        }
        assert!(matches!(
            decode_connect_reply(&[0x05, 0x05]),
            Err(SocksError::Rejected(Rejection::ConnectionRefused))
        ));
    }

    #[test]
    fn test_connect_reply_malformed() {
        assert!(matches!(
            decode_connect_reply(&[0x04, 0x00, 0x00, 0x01]),
            Err(SocksError::InvalidVersion(0x04))
        ));
        assert!(matches!(
            decode_connect_reply(&[0x05, 0x00, 0x01, 0x01]),
            Err(SocksError::ProtocolViolation(_))
        ));
        assert!(matches!(
            decode_connect_reply(&[0x05, 0x00, 0x00, 0x02]),
            Err(SocksError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_socks4_request_ipv4() {
        let target = Address::IPv4((Ipv4Addr::new(198, 51, 100, 7), 443));
        let len = socks4_request_len(Command::Connect, &target, "bob").unwrap();
        let bytes = encode(len, |out| {
            encode_socks4_request(Command::Connect, &target, "bob", out)
        });
        assert_eq!(
            bytes,
            [0x04, 0x01, 0x01, 0xBB, 198, 51, 100, 7, b'b', b'o', b'b', 0x00]
        );
        assert_eq!(
            decode_socks4_request(&bytes).unwrap(),
            Decoded::Complete((Command::Connect, target, "bob".to_string()), len)
        );
    }

    #[test]
    fn test_socks4a_request_domain() {
        let target = Address::DomainName(("example.com".to_string(), 80));
        let len = socks4_request_len(Command::Connect, &target, "").unwrap();
        let bytes = encode(len, |out| {
            encode_socks4_request(Command::Connect, &target, "", out)
        });
        assert_eq!(&bytes[..9], &[0x04, 0x01, 0x00, 0x50, 0, 0, 0, 1, 0x00]);
        assert_eq!(&bytes[9..20], b"example.com");
        assert_eq!(bytes[20], 0x00);

        assert_eq!(
            decode_socks4_request(&bytes[..15]).unwrap(),
            Decoded::Incomplete(1)
        );
        assert_eq!(
            decode_socks4_request(&bytes).unwrap(),
            Decoded::Complete((Command::Connect, target, String::new()), len)
        );
    }

    #[test]
    fn test_socks4_request_invalid_input() {
        let ipv6 = Address::IPv6((Ipv6Addr::LOCALHOST, 80));
        assert!(matches!(
            socks4_request_len(Command::Connect, &ipv6, ""),
            Err(SocksError::InvalidInput(_))
        ));
        let ipv4 = Address::IPv4((Ipv4Addr::LOCALHOST, 80));
        assert!(matches!(
            socks4_request_len(Command::BindUdp, &ipv4, ""),
            Err(SocksError::InvalidInput(_))
        ));
        assert!(matches!(
            socks4_request_len(Command::Connect, &ipv4, "a\0b"),
            Err(SocksError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_socks4_reply() {
        let bytes = encode(8, |out| {
            encode_socks4_reply(Socks4Reply::Granted, (Ipv4Addr::new(10, 0, 0, 1), 8080), out)
        });
        assert_eq!(bytes, [0x00, 0x5A, 0x1F, 0x90, 10, 0, 0, 1]);
        assert_eq!(
            decode_socks4_reply(&bytes).unwrap(),
            Decoded::Complete(Address::IPv4((Ipv4Addr::new(10, 0, 0, 1), 8080)), 8)
        );
        assert_eq!(decode_socks4_reply(&bytes[..5]).unwrap(), Decoded::Incomplete(3));
    }

    #[test]
    fn test_socks4_reply_status_mapping() {
        assert!(matches!(
            decode_socks4_reply(&[0x00, 0x5B]),
            Err(SocksError::Rejected(Rejection::GeneralFailure))
        ));
        assert!(matches!(
            decode_socks4_reply(&[0x00, 0x5C]),
            Err(SocksError::Rejected(Rejection::IdentdUnreachable))
        ));
        assert!(matches!(
            decode_socks4_reply(&[0x00, 0x5D]),
            Err(SocksError::LoginFailed)
        ));
        assert!(matches!(
            decode_socks4_reply(&[0x00, 0x00]),
            Err(SocksError::ProtocolViolation(_))
        ));
        assert!(matches!(
            decode_socks4_reply(&[0x04, 0x5A]),
            Err(SocksError::InvalidVersion(0x04))
        ));
    }
}
