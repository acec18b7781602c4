//! Downlink ring buffer
//!
//! Received payload bytes are pushed in by the protocol engine whenever a
//! downlink shows up (in a notification or inside a command reply) and
//! pulled out by the application's `read`. Capacity is fixed at creation.

/// Default number of downlink bytes held between application reads
pub const DEFAULT_CAPACITY: usize = 256;

/// Fixed-capacity circular byte buffer
///
/// Besides the stored bytes it tracks an "available" count that a
/// vocabulary may announce before the bytes are physically copied in.
#[derive(Debug, Clone)]
pub struct DownlinkBuffer {
    storage: Box<[u8]>,
    head: usize,
    len: usize,
    available: usize,
}

impl DownlinkBuffer {
    /// Create an empty buffer
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of stored bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
            available: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of stored bytes
    pub fn size(&self) -> usize {
        self.len
    }

    /// Room left before the buffer is full
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store bytes at the tail
    ///
    /// # Arguments
    /// * `data` - Bytes to store
    /// * `allow_partial` - Store what fits when `data` exceeds [`free`](Self::free);
    ///   otherwise nothing is stored in that case
    ///
    /// # Returns
    /// Number of bytes stored
    pub fn put(&mut self, data: &[u8], allow_partial: bool) -> usize {
        let free = self.free();
        if data.len() > free && !allow_partial {
            return 0;
        }
        let count = data.len().min(free);
        let capacity = self.capacity();
        let mut tail = (self.head + self.len) % capacity.max(1);
        for &byte in &data[..count] {
            self.storage[tail] = byte;
            tail = (tail + 1) % capacity;
        }
        self.len += count;
        count
    }

    /// Move up to `n` bytes from the head into `buf`
    ///
    /// # Returns
    /// Number of bytes copied, bounded by `n`, `buf.len()` and [`size`](Self::size)
    pub fn get(&mut self, buf: &mut [u8], n: usize) -> usize {
        let count = n.min(buf.len()).min(self.len);
        let capacity = self.capacity();
        for slot in buf.iter_mut().take(count) {
            *slot = self.storage[self.head];
            self.head = (self.head + 1) % capacity;
        }
        self.len -= count;
        self.available = self.available.saturating_sub(count);
        count
    }

    /// Oldest stored byte, without removing it
    pub fn peek(&self) -> Option<u8> {
        (self.len > 0).then(|| self.storage[self.head])
    }

    /// Drop all stored bytes and the announced count
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.available = 0;
    }

    /// Bytes announced as available to the application
    pub fn available(&self) -> usize {
        self.available.max(self.len)
    }

    /// Record how many bytes the modem says are waiting
    pub fn announce(&mut self, count: usize) {
        self.available = count;
    }
}

impl Default for DownlinkBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
