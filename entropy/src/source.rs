//! Byte sources backed by random number generators.

use rand::{rngs::OsRng, CryptoRng, RngCore};
use std::io::{self, Read};

/// Adapts a [RngCore] into a byte source that a [CachedReader](crate::CachedReader) can fill
/// pages from.
///
/// Every read fills the whole buffer or fails with the generator's error.
#[derive(Clone, Debug, Default)]
pub struct Entropy<G>(G);

impl<G: RngCore> Entropy<G> {
    /// Wrap `rng`.
    pub const fn new(rng: G) -> Self {
        Self(rng)
    }

    /// Returns the wrapped generator.
    pub fn into_inner(self) -> G {
        self.0
    }
}

impl Entropy<OsRng> {
    /// Randomness from the operating system.
    pub const fn os() -> Self {
        Self(OsRng)
    }
}

impl<G: RngCore> Read for Entropy<G> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_fill_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }
}

/// Marker for sources whose output is suitable for cryptographic use.
pub trait Secure {}

impl<G: CryptoRng> Secure for Entropy<G> {}
