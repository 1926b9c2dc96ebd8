//! Serve small reads of random bytes from pages cached ahead of time.
//!
//! # Status
//!
//! `commonware-entropy` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.
//!
//! # Overview
//!
//! Reading from the operating system's randomness source costs a syscall (and often a lock) per
//! call. Callers that need many small reads, such as minting random UUIDs, can instead use a
//! [CachedReader]: it fills a large page from the source up front and hands out slices of it with
//! a single atomic fetch-and-add per call.
//!
//! # Design
//!
//! The reader owns two pages of equal size and a packed [cursor::Cursor] recording which page is
//! active and how many of its bytes have been reserved. A read reserves its range by advancing
//! the cursor and, if the range fits inside the active page, copies it out without taking any
//! lock. A reservation that runs past the end of the page is discarded: the caller takes the
//! refill lock, double-checks that the cursor is still exhausted, fills the inactive page from
//! the source, and points the cursor at the start of that page. Callers that were waiting on the
//! lock find the cursor healthy and retry their reservation against the new page.
//!
//! ```text
//!           reserve (fetch_add)                 refill (mutex)
//!   cursor ─────────────────────► [page 0] ──► fill [page 1] ──► cursor = (1, 0)
//!                                                                      │
//!   cursor ◄───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Duplicate Output
//!
//! Pages are recycled without any generation tag. If a caller reserves a range and is then
//! descheduled for long enough that the active page and the page after it are both consumed and
//! the slot is refilled, the caller copies out bytes that belong to the refilled page and that may
//! also be handed to another caller. The probability of this falls with the page size relative
//! to the read size and expected scheduling delay, so pages should be large (for UUIDs, hundreds
//! or thousands of payloads per page). The hazard is logical only: page bytes are accessed
//! atomically and the reader contains no `unsafe` code.
//!
//! # Example
//!
//! ```
//! use commonware_entropy::CachedReader;
//! use std::num::NonZeroUsize;
//!
//! let reader = CachedReader::for_uuids(NonZeroUsize::new(1000).unwrap()).unwrap();
//! let a = reader.uuid().unwrap();
//! let b = reader.uuid().unwrap();
//! assert_ne!(a, b);
//! ```

use std::{io, num::NonZeroUsize};
use thiserror::Error;

pub mod cursor;
mod metrics;
mod page;
mod reader;
pub use reader::CachedReader;
mod source;
pub use source::{Entropy, Secure};

const fn nz(value: usize) -> NonZeroUsize {
    match NonZeroUsize::new(value) {
        Some(value) => value,
        None => panic!("value must be non-zero"),
    }
}

/// Number of random bytes in a UUID.
pub const UUID_SIZE: NonZeroUsize = nz(16);

/// Default ceiling on the number of bytes served by a single read.
pub const DEFAULT_MAX: NonZeroUsize = UUID_SIZE;

/// Default number of payloads cached per page.
pub const DEFAULT_PAYLOADS: NonZeroUsize = nz(1024);

/// Largest chunk read from the source in one call while filling a page.
pub const STAGING_SIZE: usize = 4096;

/// Largest supported page size.
///
/// Offsets are tracked in the low 32 bits of the cursor. Capping pages at 2^31 bytes leaves at
/// least as much room again for reservations made past the end of an exhausted page while a
/// refill is in progress (the offset is reset whenever a refill completes or fails).
pub const MAX_PAGE_SIZE: usize = 1 << 31;

/// Errors that can occur when creating or reading from a [CachedReader].
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to fill initial page: {0}")]
    InitialFill(#[source] io::Error),
    #[error("failed to refill page: {0}")]
    Refill(#[source] io::Error),
    #[error("page size too large: {0}")]
    PageTooLarge(usize),
    #[error("max read exceeds page size: {0} > {1}")]
    MaxExceedsPage(usize, usize), // max, page size
    #[error("page size overflow: {0} payloads of {1} bytes")]
    PayloadOverflow(usize, usize), // payloads, payload size
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::InitialFill(err) | Error::Refill(err) => err,
            err => io::Error::new(io::ErrorKind::InvalidInput, err),
        }
    }
}

/// Configuration for a [CachedReader].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Size of each of the two pages, in bytes. Must not exceed [MAX_PAGE_SIZE].
    ///
    /// A reader holds two pages plus a staging buffer of at most [STAGING_SIZE] bytes that
    /// refills pass through (each refilled byte is copied once from staging into the page).
    pub page_size: NonZeroUsize,
    /// Maximum number of bytes served by a single read. Must not exceed `page_size` and should be
    /// many times smaller than it, since a read that straddles the end of a page discards the
    /// page's remaining bytes.
    pub max: NonZeroUsize,
}

impl Default for Config {
    /// Caches [DEFAULT_PAYLOADS] UUIDs worth of bytes per page.
    fn default() -> Self {
        Self {
            page_size: nz(DEFAULT_PAYLOADS.get() * UUID_SIZE.get()),
            max: UUID_SIZE,
        }
    }
}

impl Config {
    /// Caches `payloads` reads of `payload_size` bytes per page, capping reads at `payload_size`.
    pub fn for_payloads(
        payloads: NonZeroUsize,
        payload_size: NonZeroUsize,
    ) -> Result<Self, Error> {
        let page_size = payloads
            .checked_mul(payload_size)
            .ok_or(Error::PayloadOverflow(payloads.get(), payload_size.get()))?;
        Ok(Self {
            page_size,
            max: payload_size,
        })
    }

    /// Checks that the configuration can be used to build a [CachedReader].
    pub fn validate(&self) -> Result<(), Error> {
        if self.page_size.get() > MAX_PAGE_SIZE {
            return Err(Error::PageTooLarge(self.page_size.get()));
        }
        if self.max > self.page_size {
            return Err(Error::MaxExceedsPage(self.max.get(), self.page_size.get()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.max, UUID_SIZE);
        assert_eq!(cfg.page_size.get(), 16 * 1024);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_for_payloads() {
        let cfg = Config::for_payloads(nz(100), nz(32)).unwrap();
        assert_eq!(cfg.page_size.get(), 3200);
        assert_eq!(cfg.max.get(), 32);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_for_payloads_overflow() {
        let result = Config::for_payloads(nz(usize::MAX), nz(2));
        assert!(matches!(result, Err(Error::PayloadOverflow(usize::MAX, 2))));
    }

    #[test]
    fn test_validate() {
        let cfg = Config {
            page_size: nz(8),
            max: nz(9),
        };
        assert!(matches!(cfg.validate(), Err(Error::MaxExceedsPage(9, 8))));

        let cfg = Config {
            page_size: nz(8),
            max: nz(8),
        };
        cfg.validate().unwrap();
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_validate_page_too_large() {
        let cfg = Config {
            page_size: nz(MAX_PAGE_SIZE + 1),
            max: UUID_SIZE,
        };
        assert!(matches!(cfg.validate(), Err(Error::PageTooLarge(_))));
    }

    #[test]
    fn test_error_into_io() {
        let err: io::Error = Error::Refill(io::Error::new(io::ErrorKind::BrokenPipe, "gone")).into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let err: io::Error = Error::MaxExceedsPage(9, 8).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
