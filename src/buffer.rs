//! A growable byte buffer with separate readable and writable regions.
//!
//! [`LinearBuffer`] stages bytes for both directions of a handshake: encoders
//! write into a [`prepare`](LinearBuffer::prepare)d region and
//! [`commit`](LinearBuffer::commit) it, the stream reads the readable window
//! through [`data`](LinearBuffer::data) and removes what it has processed with
//! [`consume`](LinearBuffer::consume).
//!
//! ```text
//! +-----------------+------------------+------------------+
//! |    consumed     |     readable     |     writable     |
//! +-----------------+------------------+------------------+
//! 0               start               end            capacity
//! ```

use crate::error::SocksError;

/// Decides how far a [`LinearBuffer`] grows when it runs out of room.
///
/// This is the buffer's single allocation hook: every reallocation asks the
/// strategy for the new capacity.
pub trait GrowthStrategy {
    /// Returns the capacity to allocate.
    ///
    /// `required` is the minimum capacity that satisfies the pending request
    /// and is never larger than `max_size`. Values outside
    /// `required..=max_size` are clamped by the buffer.
    fn next_capacity(&self, current: usize, required: usize, max_size: usize) -> usize;
}

/// Doubles the capacity on every growth (amortized O(1) appends).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Doubling;

impl GrowthStrategy for Doubling {
    fn next_capacity(&self, current: usize, required: usize, max_size: usize) -> usize {
        if current < max_size / 2 {
            required.max(current * 2)
        } else {
            max_size
        }
    }
}

/// Allocates exactly what is required and nothing more.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Exact;

impl GrowthStrategy for Exact {
    fn next_capacity(&self, _current: usize, required: usize, _max_size: usize) -> usize {
        required
    }
}

/// A contiguous byte buffer split into consumed, readable and writable regions.
///
/// Invariant: `consumed + readable + writable == capacity`, and the capacity
/// never exceeds [`max_size`](LinearBuffer::max_size).
#[derive(Debug)]
pub struct LinearBuffer<G = Doubling> {
    storage: Vec<u8>,
    start: usize,
    end: usize,
    prepared: usize,
    max_size: usize,
    strategy: G,
}

impl LinearBuffer {
    /// Creates an empty, unbounded buffer. Nothing is allocated until the first
    /// [`prepare`](LinearBuffer::prepare).
    pub fn new() -> Self {
        Self::with_strategy(Doubling, usize::MAX)
    }

    /// Creates an unbounded buffer with `capacity` bytes preallocated.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Self::new();
        buf.storage = vec![0; capacity];
        buf
    }

    /// Creates an empty buffer that never grows beyond `max_size` bytes.
    pub fn with_max_size(max_size: usize) -> Self {
        Self::with_strategy(Doubling, max_size)
    }
}

impl Default for LinearBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GrowthStrategy> LinearBuffer<G> {
    /// Creates an empty buffer bounded by `max_size` using the given growth strategy.
    pub fn with_strategy(strategy: G, max_size: usize) -> Self {
        Self {
            storage: Vec::new(),
            start: 0,
            end: 0,
            prepared: 0,
            max_size,
            strategy,
        }
    }

    /// Number of readable bytes.
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    /// Whether the readable window is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Total allocated bytes.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Upper bound on [`capacity`](LinearBuffer::capacity).
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// The readable window.
    pub fn data(&self) -> &[u8] {
        &self.storage[self.start..self.end]
    }

    /// Returns a writable region of exactly `n` bytes directly after the
    /// readable window.
    ///
    /// The consumed prefix is reclaimed first; if that is not enough the
    /// buffer grows according to its [`GrowthStrategy`]. Bytes written to the
    /// region only become readable after [`commit`](LinearBuffer::commit).
    /// A later `prepare` invalidates any region handed out before.
    pub fn prepare(&mut self, n: usize) -> Result<&mut [u8], SocksError> {
        self.reserve(n)?;
        self.prepared = n;
        Ok(&mut self.storage[self.end..self.end + n])
    }

    /// Moves `n` bytes of the last prepared region into the readable window.
    ///
    /// `n` is clamped to the bytes outstanding from the last
    /// [`prepare`](LinearBuffer::prepare), after which nothing is outstanding.
    pub fn commit(&mut self, n: usize) {
        self.end += n.min(self.prepared);
        self.prepared = 0;
    }

    /// Removes `n` bytes from the front of the readable window (clamped to
    /// [`size`](LinearBuffer::size)).
    pub fn consume(&mut self, n: usize) {
        self.start += n.min(self.size());
        // A prepared region stays where it was handed out
        if self.start == self.end && self.prepared == 0 {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Copies `bytes` to the end of the readable window.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), SocksError> {
        self.prepare(bytes.len())?.copy_from_slice(bytes);
        self.commit(bytes.len());
        Ok(())
    }

    /// Ensures at least `n` writable bytes follow the readable window.
    pub fn reserve(&mut self, n: usize) -> Result<(), SocksError> {
        if self.storage.len() - self.end >= n {
            return Ok(());
        }

        let readable = self.size();
        let required = readable
            .checked_add(n)
            .filter(|required| *required <= self.max_size)
            .ok_or(SocksError::AllocationFailure {
                requested: readable.saturating_add(n),
                max_size: self.max_size,
            })?;

        if self.storage.len() >= required {
            // Enough room once the consumed prefix is gone
            self.storage.copy_within(self.start..self.end, 0);
        } else {
            let capacity = self
                .strategy
                .next_capacity(self.storage.len(), required, self.max_size)
                .clamp(required, self.max_size);
            let mut storage = Vec::new();
            if storage.try_reserve_exact(capacity).is_err() {
                // Fall back to the bare minimum before giving up
                storage
                    .try_reserve_exact(required)
                    .map_err(|_| SocksError::AllocationFailure {
                        requested: required,
                        max_size: self.max_size,
                    })?;
            }
            storage.extend_from_slice(self.data());
            storage.resize(storage.capacity().min(capacity), 0);
            self.storage = storage;
        }
        self.start = 0;
        self.end = readable;
        Ok(())
    }

    /// Drops all readable and prepared bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
        self.prepared = 0;
    }
}
