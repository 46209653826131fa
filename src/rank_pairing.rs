//! Rank-pairing heap.
//!
//! A forest of half-trees: `left` is the first child, `right` the next
//! sibling, and for roots `right` threads a singly-linked circular root
//! list. Deletion severs the right spines of the removed node's subtrees
//! into fresh roots and runs a one-pass linking scan over a rank-indexed
//! registry: two equal-rank trees are joined at most once per scan, the
//! result going straight to the rebuilt root list.
//!
//! `decrease_key` detaches the node with its left subtree, promotes it to
//! a root, and repairs ranks up the old parent path with the type-1 rule
//! (equal child ranks u: u+1, otherwise max).

use core::mem::size_of;
use core::ptr;

use crate::bits::ffs_u64;
use crate::mem::MemoryMap;
use crate::queue::{Item, Key, PriorityQueue, MAX_RANK};

/// A node of the rank-pairing heap in half-tree representation.
#[repr(C)]
pub struct RankPairingNode<K, V> {
    parent: *mut RankPairingNode<K, V>,
    left: *mut RankPairingNode<K, V>,
    /// Next sibling; for roots, the next root on the circular list.
    right: *mut RankPairingNode<K, V>,
    rank: usize,
    key: K,
    item: V,
}

/// Rank-pairing heap.
pub struct RankPairingHeap<'m, M: MemoryMap, K: Key, V: Item> {
    map: &'m M,
    minimum: *mut RankPairingNode<K, V>,
    /// Scratch for the one-pass linking scan; empty between operations.
    registry: [*mut RankPairingNode<K, V>; MAX_RANK],
    occupied: u64,
    size: usize,
}

impl<'m, M: MemoryMap, K: Key, V: Item> RankPairingHeap<'m, M, K, V> {
    /// Rank of a possibly-absent subtree.
    #[inline]
    unsafe fn rank_of(n: *mut RankPairingNode<K, V>) -> isize {
        if n.is_null() {
            -1
        } else {
            (*n).rank as isize
        }
    }

    /// Join two equal-rank half-trees. The loser keeps its left subtree,
    /// gains the winner's old first child as its right subtree, and hangs
    /// under the winner. `b` wins ties.
    unsafe fn join(
        a: *mut RankPairingNode<K, V>,
        b: *mut RankPairingNode<K, V>,
    ) -> *mut RankPairingNode<K, V> {
        let (winner, loser) = if (*a).key < (*b).key { (a, b) } else { (b, a) };
        (*loser).right = (*winner).left;
        if !(*winner).left.is_null() {
            (*(*winner).left).parent = loser;
        }
        (*loser).parent = winner;
        (*winner).left = loser;
        (*winner).rank = (*loser).rank + 1;
        winner
    }

    /// Walk a right spine, turning every node into a fresh root pushed
    /// onto the `out` chain (threaded through `right`).
    unsafe fn sever_spine(
        mut spine: *mut RankPairingNode<K, V>,
        out: &mut *mut RankPairingNode<K, V>,
    ) {
        while !spine.is_null() {
            let next = (*spine).right;
            (*spine).parent = ptr::null_mut();
            (*spine).rank = (Self::rank_of((*spine).left) + 1) as usize;
            (*spine).right = *out;
            *out = spine;
            spine = next;
        }
    }

    /// Break the circular root list into a null-terminated chain hanging
    /// off `out`, excluding `skip`.
    unsafe fn collect_roots(
        &mut self,
        skip: *mut RankPairingNode<K, V>,
        out: &mut *mut RankPairingNode<K, V>,
    ) {
        if self.minimum.is_null() {
            return;
        }
        let start = self.minimum;
        let mut cur = start;
        loop {
            let next = (*cur).right;
            if cur != skip {
                (*cur).right = *out;
                *out = cur;
            }
            cur = next;
            if cur == start {
                break;
            }
        }
    }

    /// One-pass linking scan over a chain of roots, then rebuild the
    /// circular root list and the minimum pointer.
    unsafe fn relink(&mut self, chain: *mut RankPairingNode<K, V>) {
        let mut out: *mut RankPairingNode<K, V> = ptr::null_mut();
        let mut cur = chain;
        while !cur.is_null() {
            let next = (*cur).right;
            (*cur).right = ptr::null_mut();
            let r = (*cur).rank;
            debug_assert!(r < MAX_RANK);
            if self.occupied & (1 << r) == 0 {
                self.registry[r] = cur;
                self.occupied |= 1 << r;
            } else {
                let other = self.registry[r];
                self.registry[r] = ptr::null_mut();
                self.occupied &= !(1 << r);
                let winner = Self::join(cur, other);
                (*winner).right = out;
                out = winner;
            }
            cur = next;
        }
        while self.occupied != 0 {
            let r = (ffs_u64(self.occupied) - 1) as usize;
            self.occupied &= !(1 << r);
            let t = self.registry[r];
            self.registry[r] = ptr::null_mut();
            (*t).right = out;
            out = t;
        }

        if out.is_null() {
            self.minimum = ptr::null_mut();
            return;
        }
        let mut min = out;
        let mut tail = out;
        let mut cur = out;
        while !cur.is_null() {
            if (*cur).key < (*min).key {
                min = cur;
            }
            tail = cur;
            cur = (*cur).right;
        }
        (*tail).right = out;
        self.minimum = min;
    }

    /// Repair ranks up the parent path with the type-1 rule.
    unsafe fn propagate_ranks(&mut self, mut y: *mut RankPairingNode<K, V>) {
        while !y.is_null() {
            let u = Self::rank_of((*y).left);
            let v = Self::rank_of((*y).right);
            let k = if (*y).parent.is_null() {
                // Root rank is one more than its only child's.
                u + 1
            } else if u == v {
                u + 1
            } else {
                u.max(v)
            };
            let k = k.max(0) as usize;
            if (*y).parent.is_null() {
                (*y).rank = k;
                return;
            }
            if k >= (*y).rank {
                return;
            }
            (*y).rank = k;
            y = (*y).parent;
        }
    }

    /// Add a fresh root to the circular list.
    unsafe fn add_root(&mut self, n: *mut RankPairingNode<K, V>) {
        if self.minimum.is_null() {
            (*n).right = n;
            self.minimum = n;
        } else {
            (*n).right = (*self.minimum).right;
            (*self.minimum).right = n;
            if (*n).key < (*self.minimum).key {
                self.minimum = n;
            }
        }
    }

    /// Remove a root: its left child's right spine becomes fresh roots
    /// and everything is relinked in one pass.
    unsafe fn remove_root(&mut self, z: *mut RankPairingNode<K, V>) {
        let mut chain: *mut RankPairingNode<K, V> = ptr::null_mut();
        self.collect_roots(z, &mut chain);
        Self::sever_spine((*z).left, &mut chain);
        self.minimum = ptr::null_mut();
        self.map.free(0, z.cast());
        self.size -= 1;
        self.relink(chain);
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item> PriorityQueue<'m, M, K, V>
    for RankPairingHeap<'m, M, K, V>
{
    type Handle = *mut RankPairingNode<K, V>;

    fn node_sizes() -> Vec<usize> {
        vec![size_of::<RankPairingNode<K, V>>()]
    }

    fn new(map: &'m M) -> Self {
        Self {
            map,
            minimum: ptr::null_mut(),
            registry: [ptr::null_mut(); MAX_RANK],
            occupied: 0,
            size: 0,
        }
    }

    fn clear(&mut self) {
        let mut stack = Vec::new();
        if !self.minimum.is_null() {
            // SAFETY: the root list is a valid circular list
            unsafe {
                let start = self.minimum;
                let mut cur = start;
                loop {
                    let next = (*cur).right;
                    (*cur).right = ptr::null_mut();
                    stack.push(cur);
                    cur = next;
                    if cur == start {
                        break;
                    }
                }
            }
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
        let node: *mut RankPairingNode<K, V> = self.map.alloc(0).cast();
        // SAFETY: node is a fresh zeroed block, rank 0
        unsafe {
            (*node).key = key;
            (*node).item = item;
            self.add_root(node);
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
        // SAFETY: minimum is a live root
        unsafe {
            let z = self.minimum;
            let key = (*z).key;
            self.remove_root(z);
            Some(key)
        }
    }

    unsafe fn delete(&mut self, node: Self::Handle) -> K {
        let key = (*node).key;
        if (*node).parent.is_null() {
            self.remove_root(node);
            return key;
        }
        let p = (*node).parent;
        if (*p).left == node {
            (*p).left = ptr::null_mut();
        } else {
            (*p).right = ptr::null_mut();
        }
        self.propagate_ranks(p);
        let mut chain: *mut RankPairingNode<K, V> = ptr::null_mut();
        self.collect_roots(ptr::null_mut(), &mut chain);
        Self::sever_spine((*node).left, &mut chain);
        Self::sever_spine((*node).right, &mut chain);
        self.minimum = ptr::null_mut();
        self.map.free(0, node.cast());
        self.size -= 1;
        self.relink(chain);
        key
    }

    unsafe fn decrease_key(&mut self, node: Self::Handle, key: K) {
        (*node).key = key;
        if (*node).parent.is_null() {
            if key < (*self.minimum).key {
                self.minimum = node;
            }
            return;
        }
        let p = (*node).parent;
        let r = (*node).right;
        if (*p).left == node {
            (*p).left = r;
        } else {
            (*p).right = r;
        }
        if !r.is_null() {
            (*r).parent = p;
        }
        (*node).parent = ptr::null_mut();
        (*node).right = ptr::null_mut();
        (*node).rank = (Self::rank_of((*node).left) + 1) as usize;
        self.add_root(node);
        self.propagate_ranks(p);
    }
}

impl<M: MemoryMap, K: Key, V: Item> Drop for RankPairingHeap<'_, M, K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::LazyMap;

    type Heap<'m> = RankPairingHeap<'m, LazyMap, u64, u32>;

    fn validate(h: &Heap<'_>) {
        assert_eq!(h.occupied, 0, "registry must be empty between ops");
        if h.minimum.is_null() {
            assert_eq!(h.size, 0);
            return;
        }
        unsafe {
            let mut count = 0;
            let start = h.minimum;
            let mut cur = start;
            loop {
                assert!((*cur).parent.is_null());
                assert!(!((*cur).key < (*h.minimum).key), "stale minimum");
                // Root rank rule: one more than its only child.
                let expect = if (*cur).left.is_null() {
                    0
                } else {
                    (*(*cur).left).rank + 1
                };
                assert_eq!((*cur).rank, expect, "root rank rule violated");
                if !(*cur).left.is_null() {
                    count += order_check((*cur).left, (*cur).key, cur);
                }
                count += 1;
                cur = (*cur).right;
                if cur == start {
                    break;
                }
            }
            assert_eq!(count, h.size);
        }
    }

    /// Half-tree order: every node is >= the key of its nearest ancestor
    /// through a left edge (`bound`), which is its real parent.
    unsafe fn order_check(
        node: *mut RankPairingNode<u64, u32>,
        bound: u64,
        parent: *mut RankPairingNode<u64, u32>,
    ) -> usize {
        assert_eq!((*node).parent, parent, "broken parent pointer");
        assert!(!((*node).key < bound), "half-tree order violated");
        let mut count = 1;
        if !(*node).left.is_null() {
            count += order_check((*node).left, (*node).key, node);
        }
        if !(*node).right.is_null() {
            count += order_check((*node).right, bound, node);
        }
        count
    }

    #[test]
    fn test_insert_find_delete_min() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankPairingHeap::new(&map);
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
    fn test_sorted_drain() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankPairingHeap::new(&map);
        let keys: Vec<u64> = (0..300).map(|i| (i * 4409 + 11) % 9973).collect();
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
        assert!(h.is_empty());
    }

    #[test]
    fn test_decrease_key() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankPairingHeap::new(&map);
        let handles: Vec<_> = (0..64u64).map(|k| h.insert(k as u32, k + 50)).collect();
        assert_eq!(h.delete_min(), Some(50));
        unsafe {
            h.decrease_key(handles[40], 3);
            validate(&h);
            assert_eq!(h.key(h.find_min().unwrap()), 3);
            h.decrease_key(handles[63], 1);
            validate(&h);
            assert_eq!(h.key(h.find_min().unwrap()), 1);
            assert_eq!(h.item(h.find_min().unwrap()), 63);
        }
    }

    #[test]
    fn test_arbitrary_delete() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankPairingHeap::new(&map);
        let handles: Vec<_> = (0..40u64).map(|k| h.insert(k as u32, k)).collect();
        assert_eq!(h.delete_min(), Some(0));
        unsafe {
            assert_eq!(h.delete(handles[10]), 10);
            validate(&h);
            assert_eq!(h.delete(handles[39]), 39);
            validate(&h);
        }
        let mut out = Vec::new();
        while let Some(k) = h.delete_min() {
            out.push(k);
        }
        let expect: Vec<u64> = (1..39).filter(|&k| k != 10).collect();
        assert_eq!(out, expect);
    }

    #[test]
    fn test_clear() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankPairingHeap::new(&map);
        for k in 0..30u64 {
            h.insert(k as u32, k);
        }
        h.delete_min();
        h.clear();
        assert!(h.is_empty());
        h.insert(4, 4);
        assert_eq!(h.delete_min(), Some(4));
    }
}
