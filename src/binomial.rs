//! Binomial queue.
//!
//! A forest of perfect binomial trees, at most one per rank, indexed by a
//! `rank -> root` registry with a 64-bit occupancy bitmask. Trees use the
//! half-tree representation: `left` is the first child, `right` the next
//! sibling. A node is a root iff its parent is null.
//!
//! `insert` adds a rank-0 root and cascades equal-rank joins out of the
//! registry. `decrease_key` bubbles the node toward the root by structural
//! swaps that exchange tree positions (and therefore ranks) but never move
//! key/item payloads, keeping handles stable. `delete` lifts the node to
//! its root and removes it the way `delete_min` removes the minimum.

use core::mem::size_of;
use core::ptr;

use crate::bits::ffs_u64;
use crate::mem::MemoryMap;
use crate::queue::{Item, Key, PriorityQueue, MAX_RANK};

/// A node of the binomial queue in half-tree representation.
#[repr(C)]
pub struct BinomialNode<K, V> {
    parent: *mut BinomialNode<K, V>,
    /// First child.
    left: *mut BinomialNode<K, V>,
    /// Next sibling; null for roots (roots live in the registry).
    right: *mut BinomialNode<K, V>,
    rank: usize,
    key: K,
    item: V,
}

/// Binomial queue.
pub struct BinomialQueue<'m, M: MemoryMap, K: Key, V: Item> {
    map: &'m M,
    roots: [*mut BinomialNode<K, V>; MAX_RANK],
    occupied: u64,
    minimum: *mut BinomialNode<K, V>,
    size: usize,
}

impl<'m, M: MemoryMap, K: Key, V: Item> BinomialQueue<'m, M, K, V> {
    /// Join two trees of equal rank: the lesser-key root gains the other
    /// as its new first child. `b` is the incumbent and wins ties.
    unsafe fn join(
        a: *mut BinomialNode<K, V>,
        b: *mut BinomialNode<K, V>,
    ) -> *mut BinomialNode<K, V> {
        let (winner, loser) = if (*a).key < (*b).key { (a, b) } else { (b, a) };
        (*loser).parent = winner;
        (*loser).right = (*winner).left;
        (*winner).left = loser;
        (*winner).rank += 1;
        winner
    }

    /// Install a tree in the registry, cascading equal-rank joins.
    unsafe fn register(&mut self, mut tree: *mut BinomialNode<K, V>) {
        loop {
            let r = (*tree).rank;
            debug_assert!(r < MAX_RANK);
            if self.occupied & (1 << r) != 0 {
                let incumbent = self.roots[r];
                self.roots[r] = ptr::null_mut();
                self.occupied &= !(1 << r);
                tree = Self::join(tree, incumbent);
            } else {
                self.roots[r] = tree;
                self.occupied |= 1 << r;
                return;
            }
        }
    }

    /// Rescan the registry for the minimum root.
    unsafe fn update_min(&mut self) {
        self.minimum = ptr::null_mut();
        let mut mask = self.occupied;
        while mask != 0 {
            let r = (ffs_u64(mask) - 1) as usize;
            mask &= mask - 1;
            let root = self.roots[r];
            if self.minimum.is_null() || (*root).key < (*self.minimum).key {
                self.minimum = root;
            }
        }
    }

    /// Exchange `node` with its parent: the two trade places in the tree
    /// (and trade ranks); each keeps its own key and item.
    unsafe fn swap_with_parent(&mut self, node: *mut BinomialNode<K, V>) {
        let parent = (*node).parent;
        let grand = (*parent).parent;
        let parent_first = (*parent).left;
        let node_left = (*node).left;
        let node_right = (*node).right;
        let node_rank = (*node).rank;

        // Node takes the parent's place.
        (*node).parent = grand;
        (*node).right = (*parent).right;
        (*node).rank = (*parent).rank;
        (*parent).rank = node_rank;
        if grand.is_null() {
            self.roots[(*node).rank] = node;
        } else if (*grand).left == parent {
            (*grand).left = node;
        } else {
            let mut s = (*grand).left;
            while (*s).right != parent {
                s = (*s).right;
            }
            (*s).right = node;
        }

        // Parent takes the node's place.
        (*parent).parent = node;
        (*parent).right = node_right;
        (*parent).left = node_left;
        if parent_first == node {
            (*node).left = parent;
        } else {
            (*node).left = parent_first;
            let mut s = parent_first;
            while (*s).right != node {
                s = (*s).right;
            }
            (*s).right = parent;
        }

        // The exchanged nodes adopted each other's child lists.
        let mut c = (*node).left;
        while !c.is_null() {
            (*c).parent = node;
            c = (*c).right;
        }
        let mut c = (*parent).left;
        while !c.is_null() {
            (*c).parent = parent;
            c = (*c).right;
        }
    }

    /// Bubble `node` all the way to the root of its tree.
    unsafe fn lift_to_root(&mut self, node: *mut BinomialNode<K, V>) {
        while !(*node).parent.is_null() {
            self.swap_with_parent(node);
        }
    }

    /// Remove a registered root: its children become fresh roots.
    unsafe fn remove_root(&mut self, root: *mut BinomialNode<K, V>) {
        let r = (*root).rank;
        self.roots[r] = ptr::null_mut();
        self.occupied &= !(1 << r);
        let mut child = (*root).left;
        while !child.is_null() {
            let next = (*child).right;
            (*child).parent = ptr::null_mut();
            (*child).right = ptr::null_mut();
            self.register(child);
            child = next;
        }
        self.map.free(0, root.cast());
        self.size -= 1;
        self.update_min();
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item> PriorityQueue<'m, M, K, V> for BinomialQueue<'m, M, K, V> {
    type Handle = *mut BinomialNode<K, V>;

    fn node_sizes() -> Vec<usize> {
        vec![size_of::<BinomialNode<K, V>>()]
    }

    fn new(map: &'m M) -> Self {
        Self {
            map,
            roots: [ptr::null_mut(); MAX_RANK],
            occupied: 0,
            minimum: ptr::null_mut(),
            size: 0,
        }
    }

    fn clear(&mut self) {
        let mut stack = Vec::new();
        let mut mask = self.occupied;
        while mask != 0 {
            let r = (ffs_u64(mask) - 1) as usize;
            mask &= mask - 1;
            stack.push(self.roots[r]);
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
        let node: *mut BinomialNode<K, V> = self.map.alloc(0).cast();
        // SAFETY: node is a fresh zeroed block; links arrive null, rank 0
        unsafe {
            (*node).key = key;
            (*node).item = item;
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
        // SAFETY: minimum is a live registered root
        unsafe {
            let key = (*self.minimum).key;
            self.remove_root(self.minimum);
            Some(key)
        }
    }

    unsafe fn delete(&mut self, node: Self::Handle) -> K {
        let key = (*node).key;
        self.lift_to_root(node);
        self.remove_root(node);
        key
    }

    unsafe fn decrease_key(&mut self, node: Self::Handle, key: K) {
        (*node).key = key;
        while !(*node).parent.is_null() && (*node).key < (*(*node).parent).key {
            self.swap_with_parent(node);
        }
        if key < (*self.minimum).key {
            self.minimum = node;
        }
    }
}

impl<M: MemoryMap, K: Key, V: Item> Drop for BinomialQueue<'_, M, K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::LazyMap;

    type Heap<'m> = BinomialQueue<'m, LazyMap, u64, u32>;

    /// Check registry/bitmask agreement, binomial shape, heap order and
    /// the minimum pointer.
    fn validate(h: &Heap<'_>) {
        unsafe {
            let mut count = 0;
            let mut min: *mut BinomialNode<u64, u32> = ptr::null_mut();
            for r in 0..MAX_RANK {
                let occupied = h.occupied & (1 << r) != 0;
                assert_eq!(!h.roots[r].is_null(), occupied, "bitmask mismatch at {r}");
                if occupied {
                    let root = h.roots[r];
                    assert!((*root).parent.is_null());
                    assert!((*root).right.is_null());
                    assert_eq!((*root).rank, r, "registry slot disagrees with rank");
                    count += subtree_check(root);
                    if min.is_null() || (*root).key < (*min).key {
                        min = root;
                    }
                }
            }
            assert_eq!(count, h.size);
            if h.size > 0 {
                assert_eq!((*h.minimum).key, (*min).key, "stale minimum");
            } else {
                assert!(h.minimum.is_null());
            }
        }
    }

    /// Returns the subtree node count; checks shape and order throughout.
    unsafe fn subtree_check(node: *mut BinomialNode<u64, u32>) -> usize {
        let mut count = 1;
        let mut expected = (*node).rank;
        let mut c = (*node).left;
        while !c.is_null() {
            expected -= 1;
            assert_eq!((*c).rank, expected, "child ranks must descend by one");
            assert_eq!((*c).parent, node, "broken parent pointer");
            assert!(!((*c).key < (*node).key), "heap property violated");
            count += subtree_check(c);
            c = (*c).right;
        }
        assert_eq!(expected, 0, "short child list for rank");
        count
    }

    #[test]
    fn test_insert_find_delete_min() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = BinomialQueue::new(&map);
        h.insert(5, 5);
        h.insert(3, 3);
        h.insert(7, 7);
        validate(&h);
        unsafe {
            assert_eq!(h.key(h.find_min().unwrap()), 3);
        }
        assert_eq!(h.delete_min(), Some(3));
        validate(&h);
        unsafe {
            assert_eq!(h.key(h.find_min().unwrap()), 5);
        }
    }

    #[test]
    fn test_cascading_joins() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = BinomialQueue::new(&map);
        // 2^k - 1 inserts leave trees at every rank below k.
        for k in 0..15u64 {
            h.insert(k as u32, k);
            validate(&h);
        }
        assert_eq!(h.occupied, 0b1111);
    }

    #[test]
    fn test_sorted_drain() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = BinomialQueue::new(&map);
        let keys: Vec<u64> = (0..256).map(|i| (i * 6151 + 3) % 4093).collect();
        for &k in &keys {
            h.insert(k as u32, k);
        }
        validate(&h);
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        for &expect in &sorted {
            assert_eq!(h.delete_min(), Some(expect));
            validate(&h);
        }
        assert_eq!(h.delete_min(), None);
    }

    #[test]
    fn test_decrease_key_bubbles() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = BinomialQueue::new(&map);
        let handles: Vec<_> = (0..16u64).map(|k| h.insert(k as u32, k + 100)).collect();
        unsafe {
            // Deep node of the rank-4 tree to a new global minimum.
            h.decrease_key(handles[15], 1);
            validate(&h);
            assert_eq!(h.key(h.find_min().unwrap()), 1);
            assert_eq!(h.item(h.find_min().unwrap()), 15);
            // The swap must not have moved any payload.
            for (i, &n) in handles.iter().enumerate() {
                assert_eq!(h.item(n), i as u32);
            }
        }
    }

    #[test]
    fn test_arbitrary_delete() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = BinomialQueue::new(&map);
        let handles: Vec<_> = (0..32u64).map(|k| h.insert(k as u32, k)).collect();
        unsafe {
            assert_eq!(h.delete(handles[17]), 17);
            validate(&h);
            assert_eq!(h.delete(handles[0]), 0);
            validate(&h);
        }
        let mut out = Vec::new();
        while let Some(k) = h.delete_min() {
            out.push(k);
        }
        let expect: Vec<u64> = (1..32).filter(|&k| k != 17).collect();
        assert_eq!(out, expect);
    }

    #[test]
    fn test_clear_idempotent() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = BinomialQueue::new(&map);
        for k in 0..20u64 {
            h.insert(k as u32, k);
        }
        h.clear();
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.find_min(), None);
        h.insert(1, 1);
        assert_eq!(h.size(), 1);
    }
}
