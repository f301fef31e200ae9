mod cli;
mod conn;
mod config;
mod error;
mod logging;
mod original_dst;
mod pool;
mod rand;
mod relay;
mod server_table;

use std::cell::RefCell;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::rc::Rc;

use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;
use socket2::{Domain, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::LocalSet;
use tracing::{error, info, warn};

use cli::Cli;
use config::Config;
use error::StartupError;
use pool::ConnectionPool;
use rand::RandomSource;
use server_table::ServerTable;

fn main() -> ExitCode {
    logging::init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to start async runtime");

    let local_set = LocalSet::new();
    match local_set.block_on(&runtime, run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "startup failed");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let cli = Cli::try_parse().map_err(|e| {
        // `-h`/`--help` and `--version` are not argument errors: let clap
        // print them and exit 0 itself rather than routing through the
        // exit-code table below.
        if matches!(e.kind(), ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion) {
            e.exit();
        }
        StartupError::Args(e.to_string())
    })?;

    let config = Config::load(&cli.config)?;
    let servers = Rc::new(ServerTable::build(&config).map_err(StartupError::ServerResolution)?);
    if servers.is_empty() {
        return Err(StartupError::ServerResolution(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no upstream servers resolved",
        )));
    }

    if pool::DEFAULT_CAPACITY == 0 {
        return Err(StartupError::PoolInit(
            "connection pool capacity must be nonzero".to_owned(),
        ));
    }
    let pool = ConnectionPool::new(pool::DEFAULT_CAPACITY);

    let rng = Rc::new(RefCell::new(RandomSource::new()));

    let listener = bind_listener(servers.redirect_addr()).map_err(StartupError::Listener)?;
    info!(
        address = %servers.redirect_addr(),
        servers = servers.len(),
        "ioredir listening"
    );

    let mut sigint = signal(SignalKind::interrupt()).map_err(StartupError::Listener)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(StartupError::Listener)?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => accept_one(stream, peer, &pool, &servers, &rng),
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            _ = sigint.recv() => {
                info!("received interrupt signal, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("received terminate signal, shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Hands an accepted socket a pool slot and spawns its relay task, or
/// logs and drops it if the pool is saturated.
fn accept_one(
    stream: TcpStream,
    peer: SocketAddr,
    pool: &ConnectionPool,
    servers: &Rc<ServerTable>,
    rng: &Rc<RefCell<RandomSource>>,
) {
    let slot = match pool.acquire() {
        Some(slot) => slot,
        None => {
            warn!(%peer, "out of memory");
            return;
        }
    };

    let servers = servers.clone();
    let rng = rng.clone();
    tokio::task::spawn_local(async move {
        relay::handle(stream, servers, rng, slot).await;
    });
}

fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}
