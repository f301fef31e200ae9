use std::cell::RefCell;
use std::rc::Rc;

use osocks::SessionCipher;
use tokio::net::TcpStream;

use crate::pool::Slot;

/// Size of each directional buffer, matching the original's `BUF_SIZE`.
pub const BUF_SIZE: usize = 8192;

/// Where a connection is in its life, from acceptance through the
/// relay's steady state. Expressed here purely for logging/diagnostics:
/// the actual state machine lives in the control flow of
/// [`crate::relay::run`] — the async function's own position *is* the
/// state, so this tag never drives a branch on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Handshaking,
    Established,
}

/// The per-flow state: both sockets, the shared cipher session, and a
/// capacity token keeping it counted against the pool.
pub struct Connection {
    pub local: TcpStream,
    pub remote: TcpStream,
    pub cipher: Rc<RefCell<SessionCipher>>,
    pub phase: Phase,
    _slot: Slot,
}

impl Connection {
    pub fn new(local: TcpStream, remote: TcpStream, cipher: SessionCipher, slot: Slot) -> Self {
        Connection {
            local,
            remote,
            cipher: Rc::new(RefCell::new(cipher)),
            phase: Phase::Connecting,
            _slot: slot,
        }
    }
}
