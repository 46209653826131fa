//! Node storage maps.
//!
//! This module defines the [`MemoryMap`] trait which supplies and recycles
//! fixed-size typed node storage for the queue implementations. Decoupling
//! node storage from heap logic lets identical benchmarks compare
//! algorithms rather than allocators.
//!
//! A map is created from a table of block sizes, one per node kind; most
//! queues use a single kind, the strict Fibonacci heap uses four. Three
//! strategies share the trait:
//!
//! - [`NaiveMap`]: one system allocation per node. Baseline.
//! - [`LazyMap`]: per-kind doubling chunk vectors, grown on demand and
//!   retained across [`MemoryMap::clear`].
//! - [`EagerMap`]: one pre-allocated contiguous block per kind; exceeding
//!   its capacity is fatal.
//!
//! # Design
//!
//! Allocation goes through `&self`, arena style, so several queues that
//! will later meld can share one map through plain references. The maps use
//! interior mutability and are deliberately not `Sync`; callers are
//! single-threaded by contract.
//!
//! Every `alloc` returns zero-initialized storage. The queue engines rely
//! on null-initialized link fields, so blocks recycled through the free
//! stacks are rezeroed at allocation time, not at free time.

use core::cell::UnsafeCell;
use core::ptr;
use std::alloc::{alloc_zeroed, dealloc, Layout};

/// Alignment of every block handed out by a map.
///
/// Node structs hold raw pointers and 64-bit keys; 16 covers every scalar
/// key/item type the trace format supports.
pub const BLOCK_ALIGN: usize = 16;

/// A typed fixed-size node allocator.
///
/// # Safety contract
///
/// Pointers returned by [`alloc`](Self::alloc) stay valid until the map is
/// dropped, or until [`clear`](Self::clear) is followed by an `alloc` that
/// reuses the slot. `free` must only receive pointers obtained from the
/// same map and kind, exactly once.
pub trait MemoryMap {
    /// Allocate a zero-initialized block of the given kind.
    fn alloc(&self, kind: usize) -> *mut u8;

    /// Return a block to the map. The block is not rezeroed until it is
    /// handed out again.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `alloc(kind)` on this map and must
    /// not be used after this call.
    unsafe fn free(&self, kind: usize, ptr: *mut u8);

    /// Reset bookkeeping to empty without releasing backing storage.
    ///
    /// Replay drivers call this between runs so a replay does not measure
    /// first-touch allocation cost. All outstanding pointers become
    /// dangling; drop or clear the queues bound to this map first.
    fn clear(&self);
}

#[inline]
fn block_layout(bytes: usize) -> Layout {
    // Sizes come from size_of::<Node>() and are non-zero.
    Layout::from_size_align(bytes, BLOCK_ALIGN).expect("block layout overflow")
}

// =============================================================================
// Naive map
// =============================================================================

/// One system allocation per node.
///
/// The baseline strategy: `alloc` is `alloc_zeroed`, `free` is `dealloc`.
/// There is no bookkeeping, so [`MemoryMap::clear`] is a no-op; queues
/// release their nodes individually.
pub struct NaiveMap {
    sizes: Vec<usize>,
}

impl NaiveMap {
    /// Create a map for blocks of the given sizes, one per node kind.
    pub fn new(sizes: &[usize]) -> Self {
        Self {
            sizes: sizes.to_vec(),
        }
    }
}

impl MemoryMap for NaiveMap {
    fn alloc(&self, kind: usize) -> *mut u8 {
        let layout = block_layout(self.sizes[kind]);
        // SAFETY: layout has non-zero size
        let p = unsafe { alloc_zeroed(layout) };
        assert!(!p.is_null(), "naive map: allocation failed");
        p
    }

    unsafe fn free(&self, kind: usize, ptr: *mut u8) {
        dealloc(ptr, block_layout(self.sizes[kind]));
    }

    fn clear(&self) {}
}

// =============================================================================
// Lazy map
// =============================================================================

/// Per-kind geometric chunk pool.
///
/// Chunk *k* holds `1 << k` blocks and is allocated the first time the bump
/// cursor reaches it. The free list is a stack with the same doubling
/// geometry. Chunks, once allocated, are retained across `clear` and only
/// released on drop.
struct LazyPool {
    size: usize,
    /// Chunk k is `(1 << k) * size` bytes.
    chunks: Vec<*mut u8>,
    /// Bump cursor: next never-recycled slot is `chunks[chunk] + index * size`.
    chunk: usize,
    index: usize,
    /// Free stack chunks; chunk k holds up to `1 << k` returned pointers.
    free_chunks: Vec<Vec<*mut u8>>,
    free_chunk: usize,
    free_index: usize,
}

impl LazyPool {
    fn new(size: usize) -> Self {
        Self {
            size,
            chunks: Vec::new(),
            chunk: 0,
            index: 0,
            free_chunks: Vec::new(),
            free_chunk: 0,
            free_index: 0,
        }
    }

    fn bump(&mut self) -> *mut u8 {
        if !self.chunks.is_empty() && self.index == (1 << self.chunk) {
            self.chunk += 1;
            self.index = 0;
        }
        if self.chunk == self.chunks.len() {
            let blocks = 1usize << self.chunk;
            log::debug!(
                "lazy map: growing pool of {}-byte blocks to chunk {} ({} blocks)",
                self.size,
                self.chunk,
                blocks
            );
            // SAFETY: non-zero size
            let p = unsafe { alloc_zeroed(block_layout(blocks * self.size)) };
            assert!(!p.is_null(), "lazy map: chunk allocation failed");
            self.chunks.push(p);
        }
        // SAFETY: index < 1 << chunk, within the chunk allocation
        let p = unsafe { self.chunks[self.chunk].add(self.index * self.size) };
        self.index += 1;
        p
    }

    fn push_free(&mut self, ptr: *mut u8) {
        if !self.free_chunks.is_empty() && self.free_index == (1 << self.free_chunk) {
            self.free_chunk += 1;
            self.free_index = 0;
        }
        if self.free_chunk == self.free_chunks.len() {
            self.free_chunks.push(Vec::with_capacity(1 << self.free_chunk));
        }
        let chunk = &mut self.free_chunks[self.free_chunk];
        if chunk.len() == self.free_index {
            chunk.push(ptr);
        } else {
            chunk[self.free_index] = ptr;
        }
        self.free_index += 1;
    }

    fn pop_free(&mut self) -> Option<*mut u8> {
        if self.free_index == 0 {
            if self.free_chunk == 0 {
                return None;
            }
            self.free_chunk -= 1;
            self.free_index = 1 << self.free_chunk;
        }
        self.free_index -= 1;
        Some(self.free_chunks[self.free_chunk][self.free_index])
    }

    fn clear(&mut self) {
        self.chunk = 0;
        self.index = 0;
        self.free_chunk = 0;
        self.free_index = 0;
    }
}

impl Drop for LazyPool {
    fn drop(&mut self) {
        for (k, &chunk) in self.chunks.iter().enumerate() {
            // SAFETY: chunk k was allocated with this exact layout
            unsafe { dealloc(chunk, block_layout((1 << k) * self.size)) };
        }
    }
}

/// Doubling chunk pools, one per node kind.
pub struct LazyMap {
    pools: UnsafeCell<Vec<LazyPool>>,
}

impl LazyMap {
    /// Create a map for blocks of the given sizes, one per node kind.
    /// No storage is allocated until first use.
    pub fn new(sizes: &[usize]) -> Self {
        Self {
            pools: UnsafeCell::new(sizes.iter().map(|&s| LazyPool::new(s)).collect()),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn pools(&self) -> &mut Vec<LazyPool> {
        // SAFETY: single-threaded by contract; no reference escapes a call
        unsafe { &mut *self.pools.get() }
    }
}

impl MemoryMap for LazyMap {
    fn alloc(&self, kind: usize) -> *mut u8 {
        let pool = &mut self.pools()[kind];
        let p = match pool.pop_free() {
            Some(p) => p,
            None => pool.bump(),
        };
        // Rezero: recycled blocks and post-clear bump slots carry old data.
        // SAFETY: p points to a block of pool.size bytes
        unsafe { ptr::write_bytes(p, 0, pool.size) };
        p
    }

    unsafe fn free(&self, kind: usize, ptr: *mut u8) {
        self.pools()[kind].push_free(ptr);
    }

    fn clear(&self) {
        for pool in self.pools().iter_mut() {
            pool.clear();
        }
    }
}

// =============================================================================
// Eager map
// =============================================================================

struct EagerPool {
    size: usize,
    capacity: usize,
    block: *mut u8,
    bump: usize,
    free: Vec<*mut u8>,
}

impl Drop for EagerPool {
    fn drop(&mut self) {
        if self.capacity > 0 {
            // SAFETY: block was allocated with this exact layout
            unsafe { dealloc(self.block, block_layout(self.capacity * self.size)) };
        }
    }
}

/// Single pre-allocated contiguous block per kind.
///
/// All storage is committed up front, so allocation is a stack pop or a
/// cursor bump and never touches the system allocator. The capacity is a
/// hard limit: exceeding it aborts the benchmark with a diagnostic.
pub struct EagerMap {
    pools: UnsafeCell<Vec<EagerPool>>,
}

impl EagerMap {
    /// Create a map with `capacities[k]` blocks of `sizes[k]` bytes for
    /// each kind `k`.
    pub fn new(sizes: &[usize], capacities: &[usize]) -> Self {
        assert_eq!(sizes.len(), capacities.len());
        let pools = sizes
            .iter()
            .zip(capacities)
            .map(|(&size, &capacity)| {
                let block = if capacity == 0 {
                    ptr::null_mut()
                } else {
                    // SAFETY: non-zero size
                    let p = unsafe { alloc_zeroed(block_layout(capacity * size)) };
                    assert!(!p.is_null(), "eager map: block allocation failed");
                    p
                };
                EagerPool {
                    size,
                    capacity,
                    block,
                    bump: 0,
                    free: Vec::with_capacity(capacity),
                }
            })
            .collect();
        Self {
            pools: UnsafeCell::new(pools),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn pools(&self) -> &mut Vec<EagerPool> {
        // SAFETY: single-threaded by contract; no reference escapes a call
        unsafe { &mut *self.pools.get() }
    }
}

impl MemoryMap for EagerMap {
    fn alloc(&self, kind: usize) -> *mut u8 {
        let pool = &mut self.pools()[kind];
        let p = match pool.free.pop() {
            Some(p) => p,
            None => {
                assert!(
                    pool.bump < pool.capacity,
                    "eager map: capacity {} of kind {} exhausted",
                    pool.capacity,
                    kind
                );
                // SAFETY: bump < capacity, within the block allocation
                let p = unsafe { pool.block.add(pool.bump * pool.size) };
                pool.bump += 1;
                p
            }
        };
        // SAFETY: p points to a block of pool.size bytes
        unsafe { ptr::write_bytes(p, 0, pool.size) };
        p
    }

    unsafe fn free(&self, kind: usize, ptr: *mut u8) {
        self.pools()[kind].free.push(ptr);
    }

    fn clear(&self) {
        for pool in self.pools().iter_mut() {
            pool.bump = 0;
            pool.free.clear();
        }
    }
}
