use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use osocks::server::ServerEntry;
use rand::RngCore;

use crate::config::Config;

/// The resolved, immutable set of upstream relays chosen at startup, plus
/// the redirect endpoint we listen on.
pub struct ServerTable {
    servers: Vec<ServerEntry>,
    redirect: SocketAddr,
}

impl ServerTable {
    pub fn build(config: &Config) -> io::Result<ServerTable> {
        let mut servers = Vec::with_capacity(config.server.len());
        for server in &config.server {
            let address = resolve_one(&server.address, server.port)?;
            // Presence is enforced by `Config::validate`.
            let secret = server.secret.as_deref().unwrap_or_default().as_bytes().to_vec();
            servers.push(ServerEntry::new(address, secret));
        }

        let redirect = resolve_one(&config.redir.address, config.redir.port)?;

        Ok(ServerTable { servers, redirect })
    }

    pub fn redirect_addr(&self) -> SocketAddr {
        self.redirect
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Draws a uniformly random index into the table using the supplied
    /// RNG, reducing a 32-bit draw modulo the server count. The modulo
    /// bias this introduces is negligible for the small server counts
    /// this tool is meant to run with, and is documented rather than
    /// corrected with rejection sampling.
    pub fn choose(&self, rng: &mut dyn RngCore) -> &ServerEntry {
        debug_assert!(!self.servers.is_empty());
        let index = (rng.next_u32() as usize) % self.servers.len();
        &self.servers[index]
    }
}

fn resolve_one(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}:{port}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn table_of(n: usize) -> ServerTable {
        let servers = (0..n)
            .map(|i| ServerEntry::new(format!("127.0.0.1:{}", 2000 + i).parse().unwrap(), vec![1]))
            .collect();
        ServerTable {
            servers,
            redirect: "127.0.0.1:1081".parse().unwrap(),
        }
    }

    #[test]
    fn choose_stays_in_bounds() {
        let table = table_of(3);
        let mut rng = StepRng::new(u32::MAX as u64, 1);
        for _ in 0..16 {
            let _ = table.choose(&mut rng);
        }
    }

    #[test]
    fn choose_picks_the_index_matching_modulo_reduction_of_the_draw() {
        let table = table_of(5);
        let mut rng = StepRng::new(7, 3);
        let expected_index = (7u32 % 5) as usize;

        let chosen = table.choose(&mut rng);

        assert_eq!(chosen.address(), table.servers[expected_index].address());
    }

    #[test]
    fn choose_is_reproducible_for_identical_rng_state() {
        let table = table_of(4);
        let mut rng_a = StepRng::new(11, 9);
        let mut rng_b = StepRng::new(11, 9);

        let a = table.choose(&mut rng_a);
        let b = table.choose(&mut rng_b);

        assert_eq!(a.address(), b.address());
    }
}
