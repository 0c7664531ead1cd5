use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::AddAssign;
use std::time::Instant;
use bytes::Bytes;
use clap::Parser;
use echo_server::{codec::LineCodec, connection_refused, stdout_logging, DEFAULT_PORT};
use futures::SinkExt;
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream,
};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

const DEFAULT_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

#[derive(Parser)]
#[command(about = "Hammers an echo server with concurrent clients", long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = DEFAULT_IP)]
    ip: IpAddr,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of concurrent connections
    #[arg(short, long, default_value_t = 100)]
    bots: usize,

    /// Lines sent by each connection
    #[arg(short, long, default_value_t = 100)]
    msgs: usize,
}

struct Bot {
    msgs: usize,
    sink: FramedWrite<OwnedWriteHalf, LineCodec>,
    stream: FramedRead<OwnedReadHalf, LineCodec>,
    stats: Stats,
}

#[derive(Default, Debug)]
struct Stats {
    sent_bytes: usize,
    got_bytes: usize,
    sent_msgs: usize,
    got_msgs: usize,
    mismatched: usize,
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Self) {
        self.sent_bytes += rhs.sent_bytes;
        self.sent_msgs += rhs.sent_msgs;
        self.got_bytes += rhs.got_bytes;
        self.got_msgs += rhs.got_msgs;
        self.mismatched += rhs.mismatched;
    }
}

impl Bot {
    async fn new(addr: SocketAddr, msgs: usize) -> anyhow::Result<Self> {
        let conn = TcpStream::connect(addr).await?;
        let (reader, writer) = conn.into_split();
        let sink = FramedWrite::new(writer, LineCodec::new());
        let stream = FramedRead::new(reader, LineCodec::new());
        Ok(Self {
            msgs,
            sink,
            stream,
            stats: Stats::default(),
        })
    }
    async fn echo(mut self) -> anyhow::Result<Stats> {
        for _ in 0..self.msgs {
            let line = random_line();
            self.sink.send(line.clone()).await?;
            self.stats.sent_bytes += line.len();
            self.stats.sent_msgs += 1;
            let Some(echoed) = self.stream.next().await else {
                anyhow::bail!("server closed the connection early");
            };
            let echoed = echoed?;
            self.stats.got_bytes += echoed.len();
            self.stats.got_msgs += 1;
            if echoed[..] != line[..] {
                self.stats.mismatched += 1;
            }
        }
        Ok(self.stats)
    }
}

// random printable words, sometimes with a crlf ending
fn random_line() -> Bytes {
    let words = fastrand::usize(1..=10);
    let mut line = String::with_capacity(words * 8);
    for i in 0..words {
        if i > 0 {
            line.push(' ');
        }
        let len = fastrand::usize(1..=12);
        line.extend(std::iter::repeat_with(fastrand::alphanumeric).take(len));
    }
    if fastrand::bool() {
        line.push('\r');
    }
    line.push('\n');
    Bytes::from(line)
}

// fails fast with a hint when nothing is listening yet
async fn ensure_listening(addr: SocketAddr) -> anyhow::Result<()> {
    match TcpStream::connect(addr).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::ConnectionRefused => {
            tracing::error!("{}", connection_refused(addr));
            std::process::exit(1)
        }
        Err(err) => Err(err.into()),
    }
}

async fn run_bots(addr: SocketAddr, bots: usize, msgs: usize) -> anyhow::Result<Stats> {
    let mut set = JoinSet::new();
    for _ in 0..bots {
        let bot = Bot::new(addr, msgs).await?;
        set.spawn(bot.echo());
    }
    let mut stats = Stats::default();
    let mut failed = 0;
    while let Some(outcome) = set.join_next().await {
        match outcome? {
            Ok(bot_stats) => stats += bot_stats,
            Err(err) => {
                failed += 1;
                tracing::error!("bot failed: {err}");
            }
        }
    }
    if failed > 0 {
        tracing::warn!("{failed} of {bots} bots did not finish");
    }
    Ok(stats)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let addr = SocketAddr::new(cli.ip, cli.port);
    stdout_logging();
    ensure_listening(addr).await?;

    tracing::info!("running {} bots with {} lines each", cli.bots, cli.msgs);
    let start = Instant::now();
    let stats = run_bots(addr, cli.bots, cli.msgs).await?;
    tracing::info!(
        "{} lines ({} bytes) sent, {} lines ({} bytes) echoed, {} mismatched in {:?}",
        stats.sent_msgs,
        stats.sent_bytes,
        stats.got_msgs,
        stats.got_bytes,
        stats.mismatched,
        start.elapsed(),
    );

    if stats.mismatched > 0 {
        std::process::exit(1)
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_server::server;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn test_random_line_shape() {
        let mut crlf = 0;
        for _ in 0..200 {
            let line = random_line();
            assert_eq!(line.last(), Some(&b'\n'));
            let body = line.strip_suffix(b"\r\n").unwrap_or_else(|| &line[..line.len() - 1]);
            if body.len() + 2 == line.len() {
                crlf += 1;
            }
            assert!(!body.is_empty());
            assert!(body.iter().all(|b| b.is_ascii_alphanumeric() || *b == b' '));
        }
        assert!(crlf > 0 && crlf < 200);
    }

    #[tokio::test]
    async fn test_bot_against_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server::serve(listener));

        let stats = Bot::new(addr, 50).await.unwrap().echo().await.unwrap();
        assert_eq!(stats.sent_msgs, 50);
        assert_eq!(stats.got_msgs, 50);
        assert_eq!(stats.sent_bytes, stats.got_bytes);
        assert_eq!(stats.mismatched, 0);

        let stats = run_bots(addr, 5, 10).await.unwrap();
        assert_eq!(stats.got_msgs, 50);
        assert_eq!(stats.mismatched, 0);
    }

    #[tokio::test]
    async fn test_bot_counts_mismatches() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // answers every line with the same wrong one
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = tcp.into_split();
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(_)) = lines.next_line().await {
                writer.write_all(b"nope\n").await.unwrap();
            }
        });

        let stats = Bot::new(addr, 5).await.unwrap().echo().await.unwrap();
        assert_eq!(stats.got_msgs, 5);
        assert_eq!(stats.got_bytes, 25);
        assert_eq!(stats.mismatched, 5);
    }

    #[tokio::test]
    async fn test_bot_reports_early_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            drop(tcp);
        });

        let err = Bot::new(addr, 3).await.unwrap().echo().await;
        assert!(err.is_err());
    }
}
