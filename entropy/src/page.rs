//! Fixed-size pages of cached bytes.
//!
//! A [Page] is written by the refill path while other threads may still be copying out of it
//! (see the race described in the crate documentation). Every byte is therefore an [AtomicU8]
//! accessed with relaxed ordering: a reader that loses the race observes stale or mixed bytes,
//! never undefined behavior. Ordering between a refill and subsequent readers is established by
//! the [Cursor](crate::cursor::Cursor), not by the page itself.

use std::sync::atomic::{AtomicU8, Ordering};
use zeroize::Zeroize;

/// A fixed-size buffer of cached bytes. Never resized after construction. Wiped on drop.
pub struct Page(Box<[AtomicU8]>);

impl Page {
    /// Returns a zeroed page of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self((0..size).map(|_| AtomicU8::new(0)).collect())
    }

    /// Size of the page in bytes.
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Copy `src` into the page starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics if `start + src.len()` exceeds the page.
    pub fn store(&self, start: usize, src: &[u8]) {
        let dst = &self.0[start..start + src.len()];
        for (slot, byte) in dst.iter().zip(src) {
            slot.store(*byte, Ordering::Relaxed);
        }
    }

    /// Copy the bytes starting at `start` into `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `start + dst.len()` exceeds the page.
    pub fn load(&self, start: usize, dst: &mut [u8]) {
        let src = &self.0[start..start + dst.len()];
        for (byte, slot) in dst.iter_mut().zip(src) {
            *byte = slot.load(Ordering::Relaxed);
        }
    }

    /// Overwrite the page with zeros using writes the compiler cannot elide.
    fn wipe(&mut self) {
        for slot in self.0.iter_mut() {
            slot.get_mut().zeroize();
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.wipe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_load() {
        let page = Page::new(8);
        assert_eq!(page.size(), 8);
        page.store(0, &[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut buf = [0u8; 3];
        page.load(2, &mut buf);
        assert_eq!(buf, [3, 4, 5]);

        let mut buf = [0u8; 8];
        page.load(0, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_store_at_offset() {
        let page = Page::new(6);
        page.store(0, &[1, 2, 3]);
        page.store(3, &[4, 5, 6]);

        let mut buf = [0u8; 6];
        page.load(0, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_wipe() {
        let mut page = Page::new(4);
        page.store(0, &[9; 4]);
        page.wipe();
        let mut buf = [1u8; 4];
        page.load(0, &mut buf);
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    #[should_panic]
    fn test_store_out_of_bounds() {
        Page::new(4).store(3, &[1, 2]);
    }

    #[test]
    #[should_panic]
    fn test_load_out_of_bounds() {
        let mut buf = [0u8; 4];
        Page::new(4).load(1, &mut buf);
    }
}
