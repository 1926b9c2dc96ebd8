//! A packed atomic cursor identifying the active page and how much of it has been reserved.
//!
//! The cursor is a single [AtomicU64] laid out as `(page << 32) | offset`. Reservations are made
//! with a fetch-and-add on the whole word, so the offset is allowed to run past the end of the
//! page: an offset greater than the page size is how exhaustion is signalled. The page size is
//! capped at [MAX_PAGE_SIZE](crate::MAX_PAGE_SIZE) so that the offset has at least 2^31 bytes of
//! headroom before it could carry into the page bit. Every refill, successful or not, stores a
//! fresh offset, so the headroom only has to absorb the reservations made during one refill.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of low bits holding the offset.
const OFFSET_BITS: u32 = 32;

/// Mask selecting the offset from a packed value.
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

/// A decoded cursor value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    /// Index of the active page (0 or 1).
    pub page: usize,
    /// Number of bytes reserved from the active page, which may exceed the page size.
    pub offset: u64,
}

impl Position {
    /// Split a packed cursor value into its page and offset.
    pub const fn decode(value: u64) -> Self {
        Self {
            page: ((value >> OFFSET_BITS) & 1) as usize,
            offset: value & OFFSET_MASK,
        }
    }

    /// Pack a page and offset into a cursor value.
    pub const fn encode(page: usize, offset: u64) -> u64 {
        ((page as u64 & 1) << OFFSET_BITS) | (offset & OFFSET_MASK)
    }

    /// Index of the page that is not active.
    pub const fn other(&self) -> usize {
        self.page ^ 1
    }

    /// Returns true if reservations have run past the end of a page of `page_size` bytes.
    pub const fn exhausted(&self, page_size: u64) -> bool {
        self.offset > page_size
    }
}

/// Shared cursor over the two pages of a [CachedReader](crate::CachedReader).
#[derive(Debug)]
pub struct Cursor(AtomicU64);

impl Cursor {
    /// Returns a cursor positioned at the start of page 0.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Reserve `n` bytes, returning the position before the reservation.
    ///
    /// The reservation is made before anyone knows whether it fits in the active page. A caller
    /// whose reserved range ends past the page must discard it and try again after a refill.
    pub fn advance(&self, n: u64) -> Position {
        Position::decode(self.0.fetch_add(n, Ordering::AcqRel))
    }

    /// Returns the current position.
    pub fn load(&self) -> Position {
        Position::decode(self.0.load(Ordering::Acquire))
    }

    /// Point the cursor at the start of `page`.
    ///
    /// Must only be called once `page` has been fully written: the release store publishes the
    /// page contents to every reservation made against the new cursor.
    pub fn reset(&self, page: usize) {
        self.0.store(Position::encode(page, 0), Ordering::Release);
    }

    /// Leave `page` active but exhausted, one byte past its end.
    ///
    /// Used after a failed refill so that the offset accumulated by failing callers is
    /// discarded: without it, repeated failures would eventually carry the offset into the page
    /// bit and expose the inactive page.
    pub fn exhaust(&self, page: usize, page_size: u64) {
        self.0.store(Position::encode(page, page_size + 1), Ordering::Release);
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let value = Position::encode(1, 17);
        assert_eq!(value, (1 << 32) | 17);
        assert_eq!(Position::decode(value), Position { page: 1, offset: 17 });
        assert_eq!(Position::decode(17), Position { page: 0, offset: 17 });
    }

    #[test]
    fn test_advance_returns_previous() {
        let cursor = Cursor::new();
        assert_eq!(cursor.advance(5), Position { page: 0, offset: 0 });
        assert_eq!(cursor.advance(3), Position { page: 0, offset: 5 });
        assert_eq!(cursor.load(), Position { page: 0, offset: 8 });
    }

    #[test]
    fn test_offset_runs_past_page() {
        let cursor = Cursor::new();
        cursor.advance(16);
        let position = cursor.advance(8);
        assert!(!position.exhausted(16));
        assert!(cursor.load().exhausted(16));

        // Exhaustion never flips the page bit.
        assert_eq!(cursor.load().page, 0);
    }

    #[test]
    fn test_exhaust() {
        let cursor = Cursor::new();
        cursor.advance(1 << 20);
        cursor.exhaust(0, 16);
        assert_eq!(cursor.load(), Position { page: 0, offset: 17 });
        assert!(cursor.load().exhausted(16));
    }

    #[test]
    fn test_reset() {
        let cursor = Cursor::new();
        cursor.advance(100);
        let position = cursor.load();
        cursor.reset(position.other());
        assert_eq!(cursor.load(), Position { page: 1, offset: 0 });

        cursor.advance(7);
        cursor.reset(cursor.load().other());
        assert_eq!(cursor.load(), Position { page: 0, offset: 0 });
    }
}
