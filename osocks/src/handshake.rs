use byteorder::{BigEndian, ByteOrder};
use rand::RngCore;
use thiserror::Error;

use crate::cipher::SessionCipher;
use crate::keychain::derive_session_key;

/// The magic value identifying a valid osocks handshake frame.
pub const MAGIC: u32 = 0x526f_6e61;

const MAGIC_LEN: usize = 4;
const HOST_LEN: usize = 257;
const PORT_LEN: usize = 15;
const IV_LEN: usize = 236;

const HOST_OFFSET: usize = MAGIC_LEN;
const PORT_OFFSET: usize = HOST_OFFSET + HOST_LEN;
const IV_OFFSET: usize = PORT_OFFSET + PORT_LEN;

/// Total size of a handshake frame on the wire.
pub const FRAME_LEN: usize = IV_OFFSET + IV_LEN;
/// Number of leading bytes (MAGIC + HOST + PORT) that are encrypted.
pub const PLAINTEXT_LEN: usize = IV_OFFSET;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("host string {len} bytes does not fit in the {HOST_LEN}-byte field (NUL included)")]
    HostTooLong { len: usize },
    #[error("port string {len} bytes does not fit in the {PORT_LEN}-byte field (NUL included)")]
    PortTooLong { len: usize },
    #[error("frame magic {found:#010x} does not match expected {MAGIC:#010x}")]
    BadMagic { found: u32 },
    #[error("host field is not valid UTF-8 / is not NUL-terminated")]
    MalformedHost,
    #[error("port field is not valid UTF-8 / is not NUL-terminated")]
    MalformedPort,
    #[error("failed to draw random IV padding: {0}")]
    Random(rand::Error),
}

/// The fixed 512-byte opening frame of an osocks connection.
///
/// Bytes `[0..276)` (MAGIC, HOST, PORT) are encrypted with the session
/// cipher derived from this frame's own trailing IV and the server's
/// shared secret; bytes `[276..512)` (the IV) stay in cleartext so the
/// peer can rederive the same key.
pub struct HandshakeFrame {
    bytes: [u8; FRAME_LEN],
}

impl HandshakeFrame {
    /// Builds and encrypts a handshake frame announcing `host`/`port` as
    /// the original destination, and returns the keyed session cipher
    /// that must be used (unmodified, in call order) for everything sent
    /// and received afterwards on this connection.
    ///
    /// `rng` supplies the 236 bytes of IV padding; the caller is
    /// responsible for it being a cryptographic source (see `ioredir`'s
    /// `rand` module for the process-wide instance used at the call
    /// site). The draw fails closed: a broken CSPRNG returns
    /// [`HandshakeError::Random`] rather than silently handshaking with
    /// a partially-filled, predictable IV (the original tool's
    /// `rand_bytes` ignored this failure mode).
    pub fn build(
        host: &str,
        port: &str,
        secret: &[u8],
        rng: &mut dyn RngCore,
    ) -> Result<(Self, SessionCipher), HandshakeError> {
        if host.len() + 1 > HOST_LEN {
            return Err(HandshakeError::HostTooLong { len: host.len() });
        }
        if port.len() + 1 > PORT_LEN {
            return Err(HandshakeError::PortTooLong { len: port.len() });
        }

        let mut bytes = [0u8; FRAME_LEN];

        rng.try_fill_bytes(&mut bytes[IV_OFFSET..])
            .map_err(HandshakeError::Random)?;

        let key = derive_session_key(&bytes[IV_OFFSET..], secret);
        let mut cipher = SessionCipher::new(&key);

        BigEndian::write_u32(&mut bytes[0..MAGIC_LEN], MAGIC);
        bytes[HOST_OFFSET..HOST_OFFSET + host.len()].copy_from_slice(host.as_bytes());
        bytes[PORT_OFFSET..PORT_OFFSET + port.len()].copy_from_slice(port.as_bytes());

        cipher.encrypt_in_place(&mut bytes[0..PLAINTEXT_LEN]);

        Ok((HandshakeFrame { bytes }, cipher))
    }

    /// The raw 512-byte wire representation, ready to send.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    /// Parses and decrypts a received frame, rederiving the session key
    /// from the cleartext IV and the caller-supplied shared secret.
    ///
    /// This is the peer's half of the protocol; `ioredir` itself never
    /// calls it on its hot path (it only builds frames), but it is kept
    /// here so the wire format has a testable, documented round trip and
    /// so anything implementing the osocks server side can reuse it.
    pub fn parse(bytes: &[u8; FRAME_LEN], secret: &[u8]) -> Result<ParsedHandshake, HandshakeError> {
        let iv = &bytes[IV_OFFSET..];
        let key = derive_session_key(iv, secret);
        let mut cipher = SessionCipher::new(&key);

        let mut plaintext = [0u8; PLAINTEXT_LEN];
        plaintext.copy_from_slice(&bytes[0..PLAINTEXT_LEN]);
        cipher.decrypt_in_place(&mut plaintext);

        let magic = BigEndian::read_u32(&plaintext[0..MAGIC_LEN]);
        if magic != MAGIC {
            return Err(HandshakeError::BadMagic { found: magic });
        }

        let host = nul_terminated_str(&plaintext[HOST_OFFSET..HOST_OFFSET + HOST_LEN])
            .ok_or(HandshakeError::MalformedHost)?
            .to_owned();
        let port = nul_terminated_str(&plaintext[PORT_OFFSET..PORT_OFFSET + PORT_LEN])
            .ok_or(HandshakeError::MalformedPort)?
            .to_owned();

        Ok(ParsedHandshake { host, port, cipher })
    }
}

/// The decoded contents of a handshake frame, plus the session cipher
/// ready to relay the bytes that follow.
pub struct ParsedHandshake {
    pub host: String,
    pub port: String,
    pub cipher: SessionCipher,
}

fn nul_terminated_str(field: &[u8]) -> Option<&str> {
    let end = field.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&field[..end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn round_trip_preserves_host_and_port() {
        let secret = b"correct horse battery staple";
        let mut rng = OsRng;
        let (frame, _send_cipher) =
            HandshakeFrame::build("10.0.0.5", "80", secret, &mut rng).unwrap();

        let parsed = HandshakeFrame::parse(frame.as_bytes(), secret).unwrap();
        assert_eq!(parsed.host, "10.0.0.5");
        assert_eq!(parsed.port, "80");
    }

    #[test]
    fn ipv6_host_round_trips() {
        let secret = b"s";
        let mut rng = OsRng;
        let (frame, _) =
            HandshakeFrame::build("2001:db8::1", "443", secret, &mut rng).unwrap();

        let parsed = HandshakeFrame::parse(frame.as_bytes(), secret).unwrap();
        assert_eq!(parsed.host, "2001:db8::1");
        assert_eq!(parsed.port, "443");
    }

    #[test]
    fn wrong_secret_fails_magic_check() {
        let mut rng = OsRng;
        let (frame, _) = HandshakeFrame::build("example", "1", b"right", &mut rng).unwrap();
        let err = HandshakeFrame::parse(frame.as_bytes(), b"wrong").unwrap_err();
        assert!(matches!(err, HandshakeError::BadMagic { .. }));
    }

    #[test]
    fn host_too_long_is_rejected() {
        let mut rng = OsRng;
        let host = "x".repeat(HOST_LEN);
        let err = HandshakeFrame::build(&host, "1", b"s", &mut rng).unwrap_err();
        assert!(matches!(err, HandshakeError::HostTooLong { .. }));
    }

    #[test]
    fn iv_region_stays_cleartext() {
        let mut rng = OsRng;
        let (frame, cipher) = HandshakeFrame::build("h", "1", b"s", &mut rng).unwrap();
        drop(cipher);
        // The derived key only depends on the cleartext IV + secret, so
        // re-deriving directly from the frame's own bytes must succeed.
        let key = derive_session_key(&frame.as_bytes()[IV_OFFSET..], b"s");
        let mut check = SessionCipher::new(&key);
        let mut plain = frame.as_bytes()[0..PLAINTEXT_LEN].to_vec();
        check.decrypt_in_place(&mut plain);
        assert_eq!(BigEndian::read_u32(&plain[0..4]), MAGIC);
    }
}
