use rc4::{consts::U64, KeyInit, Rc4, StreamCipher as _};

use crate::keychain::SESSION_KEY_LEN;

/// The per-connection stream cipher session.
///
/// `SessionCipher` wraps a single RC4 keystream keyed once at handshake
/// time. Both directions of a connection share this one context: every
/// byte encrypted on the way out and every byte decrypted on the way in
/// consumes the next keystream byte, in whichever order those calls
/// actually happen. Because RC4 encryption and decryption are the same
/// XOR operation, `encrypt_in_place` and `decrypt_in_place` are aliases
/// of one another — the names exist only to document intent at the call
/// site. The keystream position advances monotonically and is never
/// rewound; this type holds no way to reset or clone it.
pub struct SessionCipher {
    inner: Rc4<U64>,
}

impl SessionCipher {
    /// Initializes a new session from a 64-byte derived key (see
    /// [`crate::keychain::derive_session_key`]).
    pub fn new(key: &[u8; SESSION_KEY_LEN]) -> Self {
        SessionCipher {
            // `new_from_slice` takes a bare slice rather than a
            // `GenericArray`, and the length is fixed by the key
            // schedule, so the only failure mode is unreachable.
            inner: Rc4::new_from_slice(key).expect("session key is always 64 bytes"),
        }
    }

    /// Encrypts `buf` in place, advancing the keystream by `buf.len()` bytes.
    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }

    /// Decrypts `buf` in place, advancing the keystream by `buf.len()` bytes.
    pub fn decrypt_in_place(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}
