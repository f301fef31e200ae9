#![forbid(unsafe_code)]

//! Wire format and crypto session for the osocks relay protocol.
//!
//! A connection speaks exactly one framing rule: the first 512 bytes sent
//! by the client are a [`handshake::HandshakeFrame`], after which both
//! sides exchange an arbitrary stream of bytes enciphered in place with
//! the [`cipher::SessionCipher`] derived during the handshake.

pub mod cipher;
pub mod handshake;
mod keychain;
pub mod server;

pub use cipher::SessionCipher;
pub use handshake::{HandshakeFrame, HandshakeError, ParsedHandshake};
pub use server::ServerEntry;
