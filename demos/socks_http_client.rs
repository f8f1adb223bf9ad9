//! Fetches a page over HTTP/1.0 through a SOCKS proxy.
//!
//! ```text
//! cargo run --example socks_http_client -- --proxy 127.0.0.1:1080 --target example.com:80
//! ```
use anyhow::{Result, bail};
use clap::Parser;
use socks_client_kit::{
    Address,
    AuthConfig,
    CancellationToken,
    Command,
    Version,
    connect_via_proxy,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP GET through a SOCKS proxy", long_about = None)]
struct Args {
    /// Proxy address
    #[arg(short = 'x', long, default_value = "127.0.0.1:1080")]
    proxy: String,

    /// Target address, host:port
    #[arg(short, long, default_value = "example.com:80")]
    target: String,

    /// Request path
    #[arg(long, default_value = "/")]
    path: String,

    /// Use SOCKS4/4a instead of SOCKS5
    #[arg(long, action)]
    socks4: bool,

    /// SOCKS4 user id
    #[arg(long, default_value = "")]
    user_id: String,

    /// Username for SOCKS5 proxy
    #[arg(short, long)]
    username: Option<String>,

    /// Password for SOCKS5 proxy
    #[arg(short, long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let target = Address::try_from(args.target.as_str())?;

    let mut auth = AuthConfig::new().with_user_id(args.user_id);
    match (args.username, args.password) {
        (Some(u), Some(p)) => auth = auth.with_credentials(u, p),
        (None, None) => {}
        _ => bail!("must provide both username and password (or neither)"),
    }
    let version = if args.socks4 { Version::V4 } else { Version::V5 };

    // Ctrl-C aborts a stuck handshake
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling handshake");
            on_signal.cancel();
        }
    });

    let mut stream = TcpStream::connect(&args.proxy).await?;
    info!(proxy = %args.proxy, destination = %target, "connected to proxy");

    let host = match &target {
        Address::DomainName((domain, _)) => domain.clone(),
        other => other.to_string(),
    };
    let bound = connect_via_proxy(
        &mut stream,
        version,
        Command::Connect,
        target,
        &auth,
        &cancel,
    )
    .await?;
    info!(%bound, "tunnel established");

    let request = format!(
        "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
        args.path, host
    );
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    println!("{}", String::from_utf8_lossy(&response));

    Ok(())
}
