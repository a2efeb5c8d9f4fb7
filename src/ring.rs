use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::error::Error;

/// Smallest power of two that is greater than or equal to `n`.
///
/// `n` is returned unchanged when it is already a power of two. Returns
/// `None` when the next power of two does not fit in `usize`.
fn round_up_pow2(n: usize) -> Option<usize> {
    if n.is_power_of_two() {
        return Some(n);
    }
    1usize.checked_shl(usize::BITS - n.leading_zeros())
}

struct RingInner {
    /// Physical storage, exactly `mask + 1` bytes.
    storage: Box<[UnsafeCell<u8>]>,
    /// `capacity - 1`; masking with it maps a logical offset to a physical
    /// one, valid because the capacity is a power of two.
    mask: usize,
    /// Nominal unit size the buffer was sized for.
    element_size: usize,
    /// Advanced only by the producer. Grows without bound; wrapping is
    /// harmless because only the difference to `read_index` is observed.
    write_index: CachePadded<AtomicUsize>,
    /// Advanced only by the consumer.
    read_index: CachePadded<AtomicUsize>,
}

// Safety: the producer touches only the bytes in [write_index, write_index
// + unused) and the consumer only [read_index, read_index + available);
// each index is published with Release after the copy and observed with
// Acquire, so the two roles never alias a byte.
unsafe impl Send for RingInner {}
unsafe impl Sync for RingInner {}

impl RingInner {
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Bytes currently stored: `write_index - read_index`, wrapped.
    fn available(&self) -> usize {
        let write = self.write_index.load(Ordering::Acquire);
        let read = self.read_index.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    fn data(&self) -> *mut u8 {
        self.storage.as_ptr() as *mut u8
    }

    /// Copy `src` into storage at logical offset `index`, splitting into
    /// two runs where the physical end of storage is crossed.
    ///
    /// # Safety
    /// Caller must hold the producer role and `src.len()` must not exceed
    /// the unused space observed before the call.
    unsafe fn copy_in(&self, index: usize, src: &[u8]) {
        let start = index & self.mask;
        let first = src.len().min(self.capacity() - start);
        ptr::copy_nonoverlapping(src.as_ptr(), self.data().add(start), first);
        ptr::copy_nonoverlapping(src.as_ptr().add(first), self.data(), src.len() - first);
    }

    /// Copy out of storage at logical offset `index`, split the same way.
    ///
    /// # Safety
    /// Caller must hold the consumer role and `dst.len()` must not exceed
    /// the available bytes observed before the call.
    unsafe fn copy_out(&self, index: usize, dst: &mut [u8]) {
        let start = index & self.mask;
        let first = dst.len().min(self.capacity() - start);
        ptr::copy_nonoverlapping(self.data().add(start), dst.as_mut_ptr(), first);
        ptr::copy_nonoverlapping(self.data(), dst.as_mut_ptr().add(first), dst.len() - first);
    }
}

/// Fixed-capacity circular byte buffer for exactly one producer and one
/// consumer.
///
/// The buffer owns a power-of-two byte region and two monotonically
/// increasing indices. It moves raw bytes only; framing, checksums and
/// blocking/backoff belong to the callers. Construct it, then [`split`]
/// it into its two capability handles.
///
/// [`split`]: RingBuffer::split
pub struct RingBuffer {
    inner: Arc<RingInner>,
}

impl RingBuffer {
    /// Create a buffer sized for `requested_elements` units of
    /// `element_size` bytes, rounding the byte capacity up to the next
    /// power of two.
    ///
    /// Fails with `InvalidArgument` if either argument is zero or the
    /// request does not fit in `usize`, and with `AllocationFailure` if
    /// storage cannot be obtained. No partial state is left behind on
    /// failure.
    pub fn with_capacity(requested_elements: usize, element_size: usize) -> Result<Self, Error> {
        if requested_elements == 0 || element_size == 0 {
            return Err(Error::InvalidArgument);
        }
        let requested = requested_elements
            .checked_mul(element_size)
            .ok_or(Error::InvalidArgument)?;
        let capacity = round_up_pow2(requested).ok_or(Error::InvalidArgument)?;

        let mut storage: Vec<UnsafeCell<u8>> = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| Error::AllocationFailure)?;
        storage.resize_with(capacity, || UnsafeCell::new(0));

        Ok(Self::from_parts(storage.into_boxed_slice(), element_size))
    }

    /// Build a buffer over a pre-existing storage region.
    ///
    /// The capacity is `region.len() / element_size` and must already be a
    /// power of two; no rounding is performed. When `element_size > 1`
    /// only the first `capacity` bytes of the region are used.
    pub fn from_storage(region: Vec<u8>, element_size: usize) -> Result<Self, Error> {
        if element_size == 0 {
            return Err(Error::InvalidArgument);
        }
        let capacity = region.len() / element_size;
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(Error::InvalidArgument);
        }
        let storage: Box<[UnsafeCell<u8>]> = region
            .into_iter()
            .take(capacity)
            .map(UnsafeCell::new)
            .collect();
        Ok(Self::from_parts(storage, element_size))
    }

    fn from_parts(storage: Box<[UnsafeCell<u8>]>, element_size: usize) -> Self {
        let mask = storage.len() - 1;
        Self {
            inner: Arc::new(RingInner {
                storage,
                mask,
                element_size,
                write_index: CachePadded::new(AtomicUsize::new(0)),
                read_index: CachePadded::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Byte capacity of the buffer (a power of two).
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// The nominal unit size the buffer was sized for.
    pub fn element_size(&self) -> usize {
        self.inner.element_size
    }

    /// Split the buffer into its write and read halves.
    ///
    /// Each half can move to its own thread. Neither handle is cloneable,
    /// so a second producer or consumer cannot be constructed. Storage is
    /// released when the last half is dropped.
    pub fn split(self) -> (Producer, Consumer) {
        let consumer = Consumer {
            inner: Arc::clone(&self.inner),
        };
        (Producer { inner: self.inner }, consumer)
    }
}

/// Write half of a split [`RingBuffer`]; the only handle that advances the
/// write index.
pub struct Producer {
    inner: Arc<RingInner>,
}

impl Producer {
    /// Append as many bytes of `src` as currently fit.
    ///
    /// Copies `min(src.len(), unused())` bytes and returns the count,
    /// which may be zero when the buffer is full. Never blocks. A caller
    /// that needs the whole slice delivered must retry with the unwritten
    /// remainder (`&src[n..]`); re-sending bytes the buffer already
    /// accepted duplicates them in the stream.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let write = self.inner.write_index.load(Ordering::Relaxed);
        let read = self.inner.read_index.load(Ordering::Acquire);
        let room = self.inner.capacity() - write.wrapping_sub(read);
        let len = src.len().min(room);
        if len == 0 {
            return 0;
        }
        unsafe { self.inner.copy_in(write, &src[..len]) };
        self.inner
            .write_index
            .store(write.wrapping_add(len), Ordering::Release);
        len
    }

    /// Bytes that can be written before the buffer is full.
    pub fn unused(&self) -> usize {
        self.inner.capacity() - self.inner.available()
    }

    /// True when no further byte can be accepted.
    pub fn is_full(&self) -> bool {
        self.inner.available() > self.inner.mask
    }

    /// Byte capacity of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

/// Read half of a split [`RingBuffer`]; the only handle that advances the
/// read index.
pub struct Consumer {
    inner: Arc<RingInner>,
}

impl Consumer {
    /// Remove up to `dst.len()` bytes from the buffer.
    ///
    /// Copies `min(dst.len(), available())` bytes into the front of `dst`
    /// and returns the count, which may be zero when the buffer is empty.
    /// Removed bytes are gone; never blocks.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let read = self.inner.read_index.load(Ordering::Relaxed);
        let write = self.inner.write_index.load(Ordering::Acquire);
        let len = dst.len().min(write.wrapping_sub(read));
        if len == 0 {
            return 0;
        }
        unsafe { self.inner.copy_out(read, &mut dst[..len]) };
        self.inner
            .read_index
            .store(read.wrapping_add(len), Ordering::Release);
        len
    }

    /// Copy up to `dst.len()` bytes without removing them.
    ///
    /// Identical data movement to [`read`] but the read index stays put,
    /// so repeated peeks of the same length yield the same bytes. Used to
    /// inspect the stream (e.g. scan for a sync marker) before deciding
    /// how much to actually remove.
    ///
    /// [`read`]: Consumer::read
    pub fn peek(&self, dst: &mut [u8]) -> usize {
        let read = self.inner.read_index.load(Ordering::Relaxed);
        let write = self.inner.write_index.load(Ordering::Acquire);
        let len = dst.len().min(write.wrapping_sub(read));
        if len == 0 {
            return 0;
        }
        unsafe { self.inner.copy_out(read, &mut dst[..len]) };
        len
    }

    /// Bytes currently stored and readable.
    pub fn available(&self) -> usize {
        self.inner.available()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.available() == 0
    }

    /// Byte capacity of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}
