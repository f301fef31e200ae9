use rand::rngs::OsRng;
use rand::RngCore;

/// The process-wide cryptographic random source, used for handshake IV
/// padding and upstream server selection.
///
/// The original tool's `rand_bytes` opened `/dev/urandom` once and then
/// ignored the return value of every subsequent `read`, silently
/// proceeding with a partially-filled (or entirely unfilled) buffer on
/// error. This wrapper exposes the OS CSPRNG through the plain
/// [`RngCore`] trait rather than hiding a fallible variant behind its
/// own method; the one call site that actually needs to fail closed —
/// [`osocks::HandshakeFrame::build`], filling the handshake IV — calls
/// `RngCore::try_fill_bytes` directly and propagates a real error
/// instead of letting `fill_bytes`'s built-in panic-on-failure take
/// down the whole process over one bad draw.
pub struct RandomSource {
    rng: OsRng,
}

impl RandomSource {
    pub fn new() -> Self {
        RandomSource { rng: OsRng }
    }

    pub fn rng_mut(&mut self) -> &mut dyn RngCore {
        &mut self.rng
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new()
    }
}
