use std::net::SocketAddr;

/// Maximum number of server entries a server table may hold, matching the
/// original tool's `MAX_SERVER` ceiling.
pub const MAX_SERVER: usize = 64;

/// Maximum length, in bytes, of a server's shared secret; longer secrets
/// are truncated at load time rather than rejected.
pub const MAX_SECRET_LEN: usize = 256;

/// One resolved upstream relay, immutable once the server table is built.
#[derive(Clone)]
pub struct ServerEntry {
    address: SocketAddr,
    secret: Vec<u8>,
}

impl ServerEntry {
    /// Builds an entry, silently truncating `secret` to [`MAX_SECRET_LEN`]
    /// bytes (matching the original's handling of oversized secrets).
    pub fn new(address: SocketAddr, mut secret: Vec<u8>) -> Self {
        secret.truncate(MAX_SECRET_LEN);
        ServerEntry { address, secret }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for ServerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret never appears in a Debug rendering, even redacted —
        // only its length is diagnostically useful.
        f.debug_struct("ServerEntry")
            .field("address", &self.address)
            .field("secret_len", &self.secret.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_longer_than_256_bytes_is_truncated() {
        let secret = vec![0x41u8; 300];
        let entry = ServerEntry::new("127.0.0.1:1205".parse().unwrap(), secret);
        assert_eq!(entry.secret().len(), MAX_SECRET_LEN);
    }
}
