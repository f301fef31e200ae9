use md5::{Digest, Md5};

/// Number of bytes in one MD5 digest.
pub const DIGEST_LEN: usize = 16;

/// Number of bytes in a derived session key (four chained digests).
pub const SESSION_KEY_LEN: usize = DIGEST_LEN * 4;

/// Derives the 64-byte osocks session key from the handshake IV and the
/// server's shared secret.
///
/// `k0 = md5(iv || secret)`, then each following digest folds in all the
/// digests produced so far: `k1 = md5(k0)`, `k2 = md5(k0 || k1)`,
/// `k3 = md5(k0 || k1 || k2)`. The session key is `k0 || k1 || k2 || k3`.
/// Identical `(iv, secret)` pairs always yield the identical key — the
/// chain has no hidden state.
pub fn derive_session_key(iv: &[u8], secret: &[u8]) -> [u8; SESSION_KEY_LEN] {
    let k0 = {
        let mut hasher = Md5::new();
        hasher.update(iv);
        hasher.update(secret);
        hasher.finalize()
    };
    let k1 = Md5::digest(&k0);
    let k2 = {
        let mut hasher = Md5::new();
        hasher.update(k0);
        hasher.update(k1);
        hasher.finalize()
    };
    let k3 = {
        let mut hasher = Md5::new();
        hasher.update(k0);
        hasher.update(k1);
        hasher.update(k2);
        hasher.finalize()
    };

    let mut key = [0u8; SESSION_KEY_LEN];
    key[0..16].copy_from_slice(&k0);
    key[16..32].copy_from_slice(&k1);
    key[32..48].copy_from_slice(&k2);
    key[48..64].copy_from_slice(&k3);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_identical_inputs() {
        let iv = [7u8; 236];
        let secret = b"a shared secret";

        let a = derive_session_key(&iv, secret);
        let b = derive_session_key(&iv, secret);
        assert_eq!(a, b);
    }

    #[test]
    fn sensitive_to_secret() {
        let iv = [3u8; 236];
        let a = derive_session_key(&iv, b"secret-a");
        let b = derive_session_key(&iv, b"secret-b");
        assert_ne!(a, b);
    }

    #[test]
    fn first_block_matches_direct_digest() {
        let iv = [1u8; 236];
        let secret = b"s";
        let key = derive_session_key(&iv, secret);

        let mut hasher = Md5::new();
        hasher.update(iv);
        hasher.update(secret);
        let k0 = hasher.finalize();

        assert_eq!(&key[0..16], k0.as_slice());
    }
}
