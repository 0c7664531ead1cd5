use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::LineCodec;

/// Binds the listening socket on all interfaces.
pub async fn bind(port: u16) -> io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port)).await
}

/// Accepts connections until accept fails, spawning one handler task per
/// connection. Only returns with the accept error.
pub async fn serve(listener: TcpListener) -> io::Result<()> {
    let mut idx: u64 = 0;
    loop {
        let (tcp, _) = listener.accept().await?;
        tokio::spawn(handle_connection(tcp, idx));
        idx = idx.wrapping_add(1);
    }
}

/// Echoes every complete line back to the peer, then closes the connection.
pub async fn handle_connection(mut tcp: TcpStream, idx: u64) {
    let local = display_addr(tcp.local_addr());
    let remote = display_addr(tcp.peer_addr());
    tracing::info!("{idx}: {local} <-> {remote}");
    if let Err(err) = echo_lines(&mut tcp).await {
        // eof and errors both just end the connection
        tracing::debug!("{idx}: {err}");
    }
    drop(tcp);
    tracing::info!("{idx}: closed");
}

async fn echo_lines(tcp: &mut TcpStream) -> io::Result<()> {
    let (reader, writer) = tcp.split();
    let mut stream = FramedRead::new(reader, LineCodec::new());
    let mut sink = FramedWrite::new(writer, LineCodec::new());
    while let Some(line) = stream.next().await {
        sink.send(line?).await?;
    }
    Ok(())
}

fn display_addr(addr: io::Result<SocketAddr>) -> String {
    match addr {
        Ok(addr) => addr.to_string(),
        Err(_) => "unknown".to_owned(),
    }
}
