pub mod codec;
pub mod server;

// COMMAND LINE //

use clap::Parser;

/// Traditional port of the echo service.
pub const DEFAULT_PORT: u16 = 7;
pub const MAX_PORT: u16 = 10000;

#[derive(Parser)]
#[command(version, about = "Echoes back every line it receives", long_about = None)]
struct Cli {
    /// Port to listen on, 0 to 10000
    #[arg(allow_hyphen_values = true)]
    port: Option<String>,
}

/// Parses the command line and returns the port to listen on.
///
/// Exits the process if the port is invalid, before any socket is opened.
pub fn parse_port_arg() -> u16 {
    let cli = Cli::parse();
    match cli.port.as_deref() {
        None => {
            tracing::info!("Using a default port of {DEFAULT_PORT}");
            tracing::info!("Creating an echo server on port: {DEFAULT_PORT}");
            DEFAULT_PORT
        }
        Some(arg) => match parse_port(arg) {
            Ok(port) => {
                // as typed, so "007" stays "007"
                tracing::info!("Creating an echo server on port: {arg}");
                port
            }
            Err(err) => {
                tracing::error!("{err}");
                std::process::exit(1)
            }
        },
    }
}

/// Accepts any base-10 integer in `0..=MAX_PORT`, sign included.
pub fn parse_port(arg: &str) -> anyhow::Result<u16> {
    match arg.parse::<i64>() {
        Ok(port) if (0..=MAX_PORT as i64).contains(&port) => Ok(port as u16),
        _ => anyhow::bail!("Provided echo port of \"{arg}\" is not a valid integer"),
    }
}

// LOGGING //

use std::io;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    EnvFilter, Layer,
};

const LOG_TARGET: &str = "echo_server";

/// Logs plain message lines to stdout, one write per line.
pub fn stdout_logging() {
    let rust_log = std::env::var("RUST_LOG").ok();
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(log_directives(rust_log.as_deref())))
        .with(plain_layer(io::stdout));
    tracing::subscriber::set_global_default(subscriber)
            .expect("Unable to set a global subscriber");
}

/// Formats each event as its bare message: no time, level, target or colour.
pub fn plain_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::Layer::new()
        .without_time()
        .with_level(false)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .with_writer(writer)
}

/// Filter directives from `RUST_LOG`. It may raise this crate's verbosity but
/// never drops it below `info`, which carries the startup and connection lines.
pub fn log_directives(rust_log: Option<&str>) -> String {
    let rust_log = rust_log.unwrap_or("info");
    let mut crate_level = None;
    let mut global_level = None;
    for directive in rust_log.split(',').map(str::trim) {
        match directive.split_once('=') {
            Some((target, level)) if target.starts_with(LOG_TARGET) => {
                if let Ok(level) = level.parse::<LevelFilter>() {
                    crate_level = Some(level);
                }
            }
            Some(_) => {}
            None if directive.starts_with(LOG_TARGET) => crate_level = Some(LevelFilter::TRACE),
            None => {
                if let Ok(level) = directive.parse::<LevelFilter>() {
                    global_level = Some(level);
                }
            }
        }
    }
    // unmatched targets are off unless a bare level is given
    let effective = crate_level.or(global_level).unwrap_or(LevelFilter::OFF);
    if effective >= LevelFilter::INFO {
        rust_log.to_owned()
    } else {
        format!("{rust_log},{LOG_TARGET}=info")
    }
}

// MISC //

use std::net::SocketAddr;

pub fn connection_refused(tried: SocketAddr) -> String {
    let mut msg = format!("No echo server listening on {tried}\n");
    msg.push_str("Try running: cargo run --release --bin echo-server");
    if tried.port() != DEFAULT_PORT {
        msg.push_str(" -- ");
        msg.push_str(&tried.port().to_string());
    }
    msg
}
