//! Quake heap.
//!
//! A tournament forest of binary trees indexed by height. A non-root's
//! `left` child is a duplicate of the same element one height lower; the
//! `right` child is the element it beat. Joining two equal-height trees
//! clones the winner: the clone takes over the winner's old structure at
//! its height and the winner itself is promoted one height up, so the
//! handle returned by `insert` always addresses the element's topmost
//! copy.
//!
//! Deleting an element walks its left spine, freeing every duplicate and
//! registering each right subtree as a fresh root. After a deletion the
//! per-height copy counts are checked against the decay invariant
//! `nodes[i] <= alpha * nodes[i-1]`; on violation, every tree at or above
//! the first offending height is pruned one height at a time until the
//! forest is short again. Quake heaps meld by registering one forest's
//! roots into the other and summing the per-height counters.

use core::mem::size_of;
use core::mem::ManuallyDrop;
use core::ptr;

use crate::bits::ffs_u64;
use crate::mem::MemoryMap;
use crate::queue::{Item, Key, Meldable, PriorityQueue, MAX_RANK};

/// Decay ratio alpha = 3/4. The decay check and the pruning threshold
/// must agree with this exact constant.
const ALPHA_NUM: usize = 3;
const ALPHA_DEN: usize = 4;

/// A node of the quake heap: one copy of an element at one height.
#[repr(C)]
pub struct QuakeNode<K, V> {
    parent: *mut QuakeNode<K, V>,
    /// Duplicate of this element one height lower (null at height 0).
    left: *mut QuakeNode<K, V>,
    /// The element this copy beat, if any.
    right: *mut QuakeNode<K, V>,
    height: usize,
    key: K,
    item: V,
}

/// Quake heap.
pub struct QuakeHeap<'m, M: MemoryMap, K: Key, V: Item> {
    map: &'m M,
    roots: [*mut QuakeNode<K, V>; MAX_RANK],
    occupied: u64,
    /// Copy counts per height, for the decay check.
    nodes: [usize; MAX_RANK],
    minimum: *mut QuakeNode<K, V>,
    size: usize,
}

impl<'m, M: MemoryMap, K: Key, V: Item> QuakeHeap<'m, M, K, V> {
    /// Join two equal-height trees. The lesser-key root clones itself;
    /// the clone inherits its old structure and the root is promoted to
    /// height+1 over the clone and the loser. `b` wins ties.
    unsafe fn join(
        &mut self,
        a: *mut QuakeNode<K, V>,
        b: *mut QuakeNode<K, V>,
    ) -> *mut QuakeNode<K, V> {
        let (winner, loser) = if (*a).key < (*b).key { (a, b) } else { (b, a) };
        let clone: *mut QuakeNode<K, V> = self.map.alloc(0).cast();
        (*clone).key = (*winner).key;
        (*clone).item = (*winner).item;
        (*clone).height = (*winner).height;
        (*clone).left = (*winner).left;
        (*clone).right = (*winner).right;
        if !(*clone).left.is_null() {
            (*(*clone).left).parent = clone;
        }
        if !(*clone).right.is_null() {
            (*(*clone).right).parent = clone;
        }
        (*clone).parent = winner;
        (*loser).parent = winner;
        (*winner).left = clone;
        (*winner).right = loser;
        (*winner).height += 1;
        // The clone replaces the winner at its old height, so only the
        // new top copy changes the counts.
        self.nodes[(*winner).height] += 1;
        winner
    }

    /// Install a tree in the registry, cascading equal-height joins.
    unsafe fn register(&mut self, mut tree: *mut QuakeNode<K, V>) {
        loop {
            let h = (*tree).height;
            debug_assert!(h < MAX_RANK);
            if self.occupied & (1 << h) != 0 {
                let incumbent = self.roots[h];
                self.roots[h] = ptr::null_mut();
                self.occupied &= !(1 << h);
                tree = self.join(tree, incumbent);
            } else {
                self.roots[h] = tree;
                self.occupied |= 1 << h;
                return;
            }
        }
    }

    unsafe fn update_min(&mut self) {
        self.minimum = ptr::null_mut();
        let mut mask = self.occupied;
        while mask != 0 {
            let h = (ffs_u64(mask) - 1) as usize;
            mask &= mask - 1;
            let root = self.roots[h];
            if self.minimum.is_null() || (*root).key < (*self.minimum).key {
                self.minimum = root;
            }
        }
    }

    /// Free an element's duplicate chain from its topmost copy down,
    /// registering every beaten subtree as a fresh root.
    unsafe fn cut(&mut self, node: *mut QuakeNode<K, V>) {
        let mut cur = node;
        while !cur.is_null() {
            let left = (*cur).left;
            let right = (*cur).right;
            if !right.is_null() {
                (*right).parent = ptr::null_mut();
                self.register(right);
            }
            self.nodes[(*cur).height] -= 1;
            self.map.free(0, cur.cast());
            cur = left;
        }
    }

    /// Enforce the decay invariant after a deletion: find the first
    /// height whose copy count exceeds alpha times the count below, and
    /// prune every tree at or above it down past the threshold.
    unsafe fn fix_decay(&mut self) {
        let mut threshold = 0;
        for i in 1..MAX_RANK {
            if self.nodes[i] > (self.nodes[i - 1] * ALPHA_NUM) / ALPHA_DEN {
                threshold = i;
                break;
            }
        }
        if threshold == 0 {
            return;
        }
        log::debug!("quake heap: decay violated at height {threshold}, pruning");

        let mut work: Vec<*mut QuakeNode<K, V>> = Vec::new();
        let mut mask = self.occupied & !((1u64 << threshold) - 1);
        while mask != 0 {
            let h = (ffs_u64(mask) - 1) as usize;
            mask &= mask - 1;
            work.push(self.roots[h]);
            self.roots[h] = ptr::null_mut();
            self.occupied &= !(1 << h);
        }

        while let Some(r) = work.pop() {
            let mut r = r;
            while (*r).height >= threshold {
                // Slide the element down one height: free its duplicate,
                // adopt the duplicate's children, spin off the loser.
                let h = (*r).height;
                let dup = (*r).left;
                let loser = (*r).right;
                (*r).left = (*dup).left;
                (*r).right = (*dup).right;
                if !(*r).left.is_null() {
                    (*(*r).left).parent = r;
                }
                if !(*r).right.is_null() {
                    (*(*r).right).parent = r;
                }
                (*r).height = h - 1;
                self.nodes[h] -= 1;
                self.map.free(0, dup.cast());
                if !loser.is_null() {
                    (*loser).parent = ptr::null_mut();
                    work.push(loser);
                }
            }
            self.register(r);
        }
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item> PriorityQueue<'m, M, K, V> for QuakeHeap<'m, M, K, V> {
    type Handle = *mut QuakeNode<K, V>;

    fn node_sizes() -> Vec<usize> {
        vec![size_of::<QuakeNode<K, V>>()]
    }

    fn new(map: &'m M) -> Self {
        Self {
            map,
            roots: [ptr::null_mut(); MAX_RANK],
            occupied: 0,
            nodes: [0; MAX_RANK],
            minimum: ptr::null_mut(),
            size: 0,
        }
    }

    fn clear(&mut self) {
        let mut stack = Vec::new();
        let mut mask = self.occupied;
        while mask != 0 {
            let h = (ffs_u64(mask) - 1) as usize;
            mask &= mask - 1;
            stack.push(self.roots[h]);
        }
        while let Some(n) = stack.pop() {
            unsafe {
                if !(*n).left.is_null() {
                    stack.push((*n).left);
                }
                if !(*n).right.is_null() {
                    stack.push((*n).right);
                }
                self.map.free(0, n.cast());
            }
        }
        self.roots = [ptr::null_mut(); MAX_RANK];
        self.occupied = 0;
        self.nodes = [0; MAX_RANK];
        self.minimum = ptr::null_mut();
        self.size = 0;
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    #[inline]
    unsafe fn key(&self, node: Self::Handle) -> K {
        (*node).key
    }

    #[inline]
    unsafe fn item(&self, node: Self::Handle) -> V {
        (*node).item
    }

    fn insert(&mut self, item: V, key: K) -> Self::Handle {
        let node: *mut QuakeNode<K, V> = self.map.alloc(0).cast();
        // SAFETY: node is a fresh zeroed block, height 0
        unsafe {
            (*node).key = key;
            (*node).item = item;
            self.nodes[0] += 1;
            self.register(node);
            if self.minimum.is_null() || key < (*self.minimum).key {
                self.minimum = node;
            }
        }
        self.size += 1;
        node
    }

    #[inline]
    fn find_min(&self) -> Option<Self::Handle> {
        if self.minimum.is_null() {
            None
        } else {
            Some(self.minimum)
        }
    }

    fn delete_min(&mut self) -> Option<K> {
        if self.minimum.is_null() {
            return None;
        }
        // SAFETY: minimum is live
        Some(unsafe { self.delete(self.minimum) })
    }

    unsafe fn delete(&mut self, node: Self::Handle) -> K {
        let key = (*node).key;
        let parent = (*node).parent;
        if parent.is_null() {
            let h = (*node).height;
            self.roots[h] = ptr::null_mut();
            self.occupied &= !(1 << h);
        } else {
            // The topmost copy of an element is always a beaten child.
            (*parent).right = ptr::null_mut();
        }
        self.cut(node);
        self.size -= 1;
        self.update_min();
        self.fix_decay();
        key
    }

    unsafe fn decrease_key(&mut self, node: Self::Handle, key: K) {
        (*node).key = key;
        let parent = (*node).parent;
        if !parent.is_null() && key < (*parent).key {
            (*parent).right = ptr::null_mut();
            (*node).parent = ptr::null_mut();
            self.register(node);
        }
        if key < (*self.minimum).key {
            self.minimum = node;
        }
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item> Meldable<'m, M, K, V> for QuakeHeap<'m, M, K, V> {
    fn meld(mut a: Self, b: Self) -> Self {
        assert!(
            ptr::eq(a.map, b.map),
            "melded queues must share a memory map"
        );
        let b = ManuallyDrop::new(b);
        // SAFETY: b's trees are moved into a and b is never dropped
        unsafe {
            let mut mask = b.occupied;
            while mask != 0 {
                let h = (ffs_u64(mask) - 1) as usize;
                mask &= mask - 1;
                a.register(b.roots[h]);
            }
            for i in 0..MAX_RANK {
                a.nodes[i] += b.nodes[i];
            }
            a.size += b.size;
            if a.minimum.is_null()
                || (!b.minimum.is_null() && (*b.minimum).key < (*a.minimum).key)
            {
                a.minimum = b.minimum;
            }
        }
        a
    }
}

impl<M: MemoryMap, K: Key, V: Item> Drop for QuakeHeap<'_, M, K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}
