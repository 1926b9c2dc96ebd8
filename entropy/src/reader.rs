//! A reader that serves small reads out of two pages cached from a byte source.

use crate::{
    cursor::{Cursor, Position},
    metrics::Metrics,
    page::Page,
    source::{Entropy, Secure},
    Config, Error, DEFAULT_MAX, STAGING_SIZE, UUID_SIZE,
};
use prometheus_client::registry::Registry;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use std::{
    io::{self, Read},
    num::NonZeroUsize,
    sync::{Mutex, PoisonError},
};
use tracing::{debug, trace, warn};
use uuid::Uuid;
use zeroize::Zeroize;

/// State only touched while refilling a page.
struct Refill<R> {
    source: R,

    /// Bytes read from the source are staged here, at most [STAGING_SIZE] at a time, before being
    /// published into the inactive page. Zeroized after every fill.
    scratch: Box<[u8]>,
}

impl<R: Read> Refill<R> {
    /// Fill all of `page` from the source, one staging chunk at a time.
    ///
    /// On error the page may be partially overwritten; callers must not make it active.
    fn fill(&mut self, page: &Page) -> io::Result<()> {
        let mut result = Ok(());
        let mut start = 0;
        while start < page.size() {
            let chunk = &mut self.scratch[..STAGING_SIZE.min(page.size() - start)];
            if let Err(err) = self.source.read_exact(chunk) {
                result = Err(err);
                break;
            }
            page.store(start, chunk);
            start += chunk.len();
        }
        self.scratch.zeroize();
        result
    }
}

/// Caches pages of bytes read from `R` and serves them to concurrent readers.
///
/// See the [crate] documentation for the design and for the duplicate-output hazard that comes
/// with it.
pub struct CachedReader<R> {
    max: usize,
    page_size: u64,
    pages: [Page; 2],
    cursor: Cursor,
    refill: Mutex<Refill<R>>,
    metrics: Metrics,
}

impl<R: Read> CachedReader<R> {
    /// Returns a reader that caches `page_size` bytes of `source` at a time.
    ///
    /// Reads are capped at [DEFAULT_MAX] bytes (or `page_size`, if smaller). The first page is
    /// filled before returning; if that fails, so does construction.
    pub fn new(source: R, page_size: NonZeroUsize) -> Result<Self, Error> {
        Self::with_config(
            source,
            Config {
                page_size,
                max: page_size.min(DEFAULT_MAX),
            },
        )
    }

    /// Returns a reader configured by `cfg`, filling the first page from `source`.
    pub fn with_config(source: R, cfg: Config) -> Result<Self, Error> {
        cfg.validate()?;
        let page_size = cfg.page_size.get();
        let pages = [Page::new(page_size), Page::new(page_size)];
        let mut refill = Refill {
            source,
            scratch: vec![0u8; STAGING_SIZE.min(page_size)].into_boxed_slice(),
        };
        refill.fill(&pages[0]).map_err(Error::InitialFill)?;
        debug!(page_size, max = cfg.max.get(), "filled initial page");

        Ok(Self {
            max: cfg.max.get(),
            page_size: page_size as u64,
            pages,
            cursor: Cursor::new(),
            refill: Mutex::new(refill),
            metrics: Metrics::default(),
        })
    }

    /// Fill `buf` with up to [max](Self::max) cached bytes, returning how many were written.
    ///
    /// The read is always served from a single page: a reservation that would run past the end of
    /// the active page is discarded (along with the bytes left in that page) and retried once the
    /// other page has been refilled. On success the returned length is `min(buf.len(), max)`.
    ///
    /// Fails only if a refill triggered by this call fails, in which case nothing is written and
    /// the next call will try the refill again.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = buf.len().min(self.max);
        if len == 0 {
            return Ok(0);
        }
        let buf = &mut buf[..len];
        let reserve = len as u64;
        loop {
            let Position { page, offset } = self.cursor.advance(reserve);
            if offset + reserve <= self.page_size {
                self.pages[page].load(offset as usize, buf);
                return Ok(len);
            }
            self.metrics.discarded.inc();
            self.refill()?;
        }
    }

    /// Like [read](Self::read), but a reservation that starts inside the active page is served up
    /// to the end of that page, so the result may be shorter than `min(buf.len(), max)`.
    ///
    /// No cached byte is skipped, which makes a sequence of partial reads a contiguous stream of
    /// the source's output. This is what the [Read] implementation uses.
    pub fn read_partial(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = buf.len().min(self.max);
        if len == 0 {
            return Ok(0);
        }
        let reserve = len as u64;
        loop {
            let Position { page, offset } = self.cursor.advance(reserve);
            if offset < self.page_size {
                let available = (self.page_size - offset).min(reserve) as usize;
                self.pages[page].load(offset as usize, &mut buf[..available]);
                return Ok(available);
            }
            self.metrics.discarded.inc();
            self.refill()?;
        }
    }

    /// Fill all of `buf`, splitting it into reads of at most [max](Self::max) bytes.
    pub fn fill(&self, buf: &mut [u8]) -> Result<(), Error> {
        for chunk in buf.chunks_mut(self.max) {
            self.read(chunk)?;
        }
        Ok(())
    }

    /// Mint a random (version 4) UUID from cached bytes.
    pub fn uuid(&self) -> Result<Uuid, Error> {
        let mut bytes = [0u8; UUID_SIZE.get()];
        self.fill(&mut bytes)?;
        Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Refill the page not referenced by the cursor and make it active.
    ///
    /// Only one caller reads from the source at a time. Callers that were waiting for the lock
    /// while another refilled find the cursor healthy and return without reading.
    fn refill(&self) -> Result<(), Error> {
        // A panic while holding the lock leaves the cursor exhausted and the scratch buffer
        // unused, so the state is still safe to reuse.
        let mut refill = self.refill.lock().unwrap_or_else(PoisonError::into_inner);
        let position = self.cursor.load();
        if !position.exhausted(self.page_size) {
            self.metrics.refill_skipped.inc();
            trace!(page = position.page, "page already refilled");
            return Ok(());
        }

        let next = position.other();
        if let Err(err) = refill.fill(&self.pages[next]) {
            // Stay exhausted so the next caller retries, but drop the offset accumulated by
            // callers that reserved while this refill was running.
            self.cursor.exhaust(position.page, self.page_size);
            self.metrics.refill_failures.inc();
            warn!(page = next, ?err, "failed to refill page");
            return Err(Error::Refill(err));
        }

        // Only swap once the page is complete.
        self.cursor.reset(next);
        self.metrics.refills.inc();
        debug!(page = next, "refilled page");
        Ok(())
    }
}

impl CachedReader<Entropy<OsRng>> {
    /// Returns a reader over operating system randomness that caches `payloads` reads of
    /// `payload_size` bytes per page and caps reads at `payload_size`.
    ///
    /// `payloads` should be large enough to make the duplicate-output hazard negligible (e.g.
    /// hundreds or thousands).
    pub fn for_payloads(
        payloads: NonZeroUsize,
        payload_size: NonZeroUsize,
    ) -> Result<Self, Error> {
        Self::with_config(Entropy::os(), Config::for_payloads(payloads, payload_size)?)
    }

    /// Returns a reader over operating system randomness that caches `count` UUIDs worth of bytes
    /// per page.
    pub fn for_uuids(count: NonZeroUsize) -> Result<Self, Error> {
        Self::for_payloads(count, UUID_SIZE)
    }
}

impl<R> CachedReader<R> {
    /// Maximum number of bytes served by a single read.
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Size of each page in bytes.
    pub const fn page_size(&self) -> usize {
        self.page_size as usize
    }

    /// Change the maximum number of bytes served by a single read.
    ///
    /// Requires exclusive access, so it cannot race with readers.
    pub fn set_max(&mut self, max: NonZeroUsize) -> Result<(), Error> {
        if max.get() > self.page_size() {
            return Err(Error::MaxExceedsPage(max.get(), self.page_size()));
        }
        self.max = max.get();
        Ok(())
    }

    /// Register the reader's metrics with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        self.metrics.register(registry);
    }
}

impl<R: Read> Read for &CachedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        CachedReader::read_partial(self, buf).map_err(io::Error::from)
    }
}

impl<R: Read> Read for CachedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_partial(buf).map_err(io::Error::from)
    }
}

impl<R: Read> RngCore for &CachedReader<R> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.fill_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.fill_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(err) = CachedReader::fill(self, dest) {
            panic!("failed to fill bytes: {err}");
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        CachedReader::fill(self, dest).map_err(rand::Error::new)
    }
}

impl<R: Read> RngCore for CachedReader<R> {
    fn next_u32(&mut self) -> u32 {
        (&*self).next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        (&*self).next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        (&*self).fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        (&*self).try_fill_bytes(dest)
    }
}

impl<R: Read + Secure> CryptoRng for &CachedReader<R> {}

impl<R: Read + Secure> CryptoRng for CachedReader<R> {}
