use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::rc::Rc;
use std::time::Duration;

use osocks::HandshakeFrame;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::conn::{Connection, Phase, BUF_SIZE};
use crate::original_dst::{format_host_port, original_dst};
use crate::pool::Slot;
use crate::rand::RandomSource;
use crate::server_table::ServerTable;

/// Per-socket send/recv timeout, matching the original's hardcoded value.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum Teardown {
    /// Orderly close from one of the two peers; not logged as a problem.
    Eof,
    Io(io::Error),
    Timeout,
    Handshake(osocks::HandshakeError),
}

impl From<io::Error> for Teardown {
    fn from(e: io::Error) -> Self {
        Teardown::Io(e)
    }
}

/// Drives one accepted connection from original-destination lookup
/// through relay to teardown. Never returns an error: every failure is
/// logged and resolved by simply dropping the connection's resources.
pub async fn handle(
    local: TcpStream,
    servers: Rc<ServerTable>,
    rng: Rc<RefCell<RandomSource>>,
    slot: Slot,
) {
    if let Err(reason) = run(local, &servers, &rng, slot).await {
        match reason {
            Teardown::Eof => {}
            Teardown::Io(e) => warn!(error = %e, "connection reset"),
            Teardown::Timeout => warn!("connection timed out"),
            Teardown::Handshake(e) => warn!(error = %e, "handshake build failed"),
        }
    }
}

async fn run(
    local: TcpStream,
    servers: &ServerTable,
    rng: &Rc<RefCell<RandomSource>>,
    slot: Slot,
) -> Result<(), Teardown> {
    configure_socket(&local)?;

    let dest = original_dst(local.as_raw_fd())?;
    let (host, port) = format_host_port(dest);

    let server = {
        let mut guard = rng.borrow_mut();
        servers.choose(guard.rng_mut())
    };

    let (frame, cipher) = {
        let mut guard = rng.borrow_mut();
        HandshakeFrame::build(&host, &port, server.secret(), guard.rng_mut())
            .map_err(Teardown::Handshake)?
    };

    debug!(%host, %port, upstream = %server.address(), "redirecting connection");

    let remote_socket = match server.address() {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    let remote = with_timeout(remote_socket.connect(server.address())).await?;
    configure_socket(&remote)?;

    let mut conn = Connection::new(local, remote, cipher, slot);
    conn.phase = Phase::Handshaking;
    debug!(phase = ?conn.phase, %host, %port, "flushing handshake frame");
    flush_handshake(&mut conn, frame.as_bytes()).await?;

    conn.phase = Phase::Established;
    debug!(phase = ?conn.phase, %host, %port, "connection established, relaying");
    relay(&mut conn).await
}

/// Sends the handshake frame in a single write attempt, matching the
/// original's policy of tearing down rather than retrying a short send.
async fn flush_handshake(conn: &mut Connection, frame: &[u8]) -> Result<(), Teardown> {
    with_timeout(conn.remote.writable()).await?;
    match conn.remote.try_write(frame) {
        Ok(n) if n == frame.len() => Ok(()),
        Ok(_) => Err(Teardown::Io(io::Error::new(
            io::ErrorKind::WriteZero,
            "short handshake write",
        ))),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(Teardown::Io(io::Error::new(
            io::ErrorKind::WriteZero,
            "handshake write not immediately ready",
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Runs both directions concurrently until either one tears down; the
/// other direction's in-flight buffer, if any, is discarded, matching
/// the original's unconditional two-socket close on any failure.
async fn relay(conn: &mut Connection) -> Result<(), Teardown> {
    let mut tx_buf = [0u8; BUF_SIZE];
    let mut rx_buf = [0u8; BUF_SIZE];

    let tx = shuttle(&conn.local, &conn.remote, &mut tx_buf, &conn.cipher, Direction::Encrypt);
    let rx = shuttle(&conn.remote, &conn.local, &mut rx_buf, &conn.cipher, Direction::Decrypt);

    tokio::select! {
        r = tx => r,
        r = rx => r,
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// One direction's steady-state loop: read a chunk, cipher it in place,
/// then drain it to the destination socket before reading again. Never
/// issues a new read while a write from the previous read is still
/// outstanding.
async fn shuttle(
    src: &TcpStream,
    dst: &TcpStream,
    buf: &mut [u8],
    cipher: &Rc<RefCell<osocks::SessionCipher>>,
    direction: Direction,
) -> Result<(), Teardown> {
    loop {
        with_timeout(src.readable()).await?;
        let n = match src.try_read(buf) {
            Ok(0) => return Err(Teardown::Eof),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        };

        {
            let mut cipher = cipher.borrow_mut();
            match direction {
                Direction::Encrypt => cipher.encrypt_in_place(&mut buf[..n]),
                Direction::Decrypt => cipher.decrypt_in_place(&mut buf[..n]),
            }
        }

        let mut off = 0;
        while off < n {
            with_timeout(dst.writable()).await?;
            match dst.try_write(&buf[off..n]) {
                Ok(sent) => off += sent,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

async fn with_timeout<F, T>(fut: F) -> Result<T, Teardown>
where
    F: std::future::Future<Output = io::Result<T>>,
{
    match timeout(SOCKET_TIMEOUT, fut).await {
        Ok(result) => result.map_err(Teardown::Io),
        Err(_) => Err(Teardown::Timeout),
    }
}

/// Applies the per-socket timeout-adjacent settings the original sets on
/// every accepted and outbound socket: `TCP_NODELAY` is left at the
/// tokio default (already on), and keepalive is turned on so a silently
/// dropped peer is eventually discovered even while idle.
fn configure_socket(stream: &TcpStream) -> io::Result<()> {
    let sock = socket2::SockRef::from(stream);
    sock.set_keepalive(true)?;
    stream.set_nodelay(true)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn shuttle_forwards_one_chunk_then_reports_eof() {
        let (client_src, server_src) = loopback_pair().await;
        let (mut client_dst, server_dst) = loopback_pair().await;

        let key = [7u8; 64];
        let cipher = Rc::new(RefCell::new(osocks::SessionCipher::new(&key)));
        let mut buf = [0u8; BUF_SIZE];

        let mut client_src = client_src;
        client_src.write_all(b"hello").await.unwrap();
        drop(client_src);

        let result =
            shuttle(&server_src, &server_dst, &mut buf, &cipher, Direction::Encrypt).await;
        assert!(matches!(result, Err(Teardown::Eof)));

        let mut received = [0u8; 5];
        client_dst.read_exact(&mut received).await.unwrap();

        let mut verify = osocks::SessionCipher::new(&key);
        verify.decrypt_in_place(&mut received);
        assert_eq!(&received, b"hello");
    }

    #[tokio::test]
    async fn flush_handshake_rejects_a_short_write() {
        let (local_client, local_server) = loopback_pair().await;
        let (_remote_client, remote_server) = loopback_pair().await;

        let slot_pool = crate::pool::ConnectionPool::new(1);
        let slot = slot_pool.acquire().unwrap();
        let mut conn = Connection::new(
            local_server,
            remote_server,
            osocks::SessionCipher::new(&[1u8; 64]),
            slot,
        );

        // Nobody ever reads from `_remote_client`, so a frame far larger
        // than its kernel receive buffer cannot be flushed in one write.
        let oversized = vec![0u8; 16 * 1024 * 1024];
        let result = flush_handshake(&mut conn, &oversized).await;
        assert!(result.is_err());

        drop(local_client);
    }
}
