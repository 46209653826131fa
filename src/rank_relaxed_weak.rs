//! Rank-relaxed weak queue.
//!
//! A half-tree forest (first child in `left`, next sibling in `right`)
//! with two per-rank registries: one for roots, one for *marked* nodes.
//! A marked node is one whose key may undercut its parent's after a
//! decrease; ranks are "relaxed" in that structural surgery may leave a
//! node's rank field larger than its current child set justifies.
//!
//! Four invariants hold after every public operation:
//!
//! 1. no two roots of equal rank,
//! 2. no two marked nodes of equal rank,
//! 3. no marked node is a first child,
//! 4. no marked node has a marked parent.
//!
//! `decrease_key` marks the node and runs [`restore_invariants`]: a fixed
//! set of local transformations (rotating a marked first child into a
//! later sibling position, resolving parent/child and sibling mark
//! configurations by comparison, pairing two equal-rank marks through the
//! root registry where a rank join bumps the survivor's rank) applied
//! until the four invariants hold again. The minimum is tracked over
//! roots and marked nodes together.
//!
//! [`restore_invariants`]: RankRelaxedWeakQueue::restore_invariants

use core::mem::size_of;
use core::ptr;

use crate::bits::ffs_u64;
use crate::mem::MemoryMap;
use crate::queue::{Item, Key, PriorityQueue, MAX_RANK};

/// A node of the rank-relaxed weak queue.
#[repr(C)]
pub struct RankRelaxedWeakNode<K, V> {
    parent: *mut RankRelaxedWeakNode<K, V>,
    /// First child.
    left: *mut RankRelaxedWeakNode<K, V>,
    /// Next sibling; null for roots (roots live in the registry).
    right: *mut RankRelaxedWeakNode<K, V>,
    rank: usize,
    marked: bool,
    key: K,
    item: V,
}

/// Rank-relaxed weak queue.
pub struct RankRelaxedWeakQueue<'m, M: MemoryMap, K: Key, V: Item> {
    map: &'m M,
    roots: [*mut RankRelaxedWeakNode<K, V>; MAX_RANK],
    roots_occupied: u64,
    marks: [*mut RankRelaxedWeakNode<K, V>; MAX_RANK],
    marks_occupied: u64,
    minimum: *mut RankRelaxedWeakNode<K, V>,
    size: usize,
}

impl<'m, M: MemoryMap, K: Key, V: Item> RankRelaxedWeakQueue<'m, M, K, V> {
    /// Join two equal-rank trees: the lesser-key root gains the other as
    /// its new first child. `b` is the incumbent and wins ties.
    unsafe fn join(
        a: *mut RankRelaxedWeakNode<K, V>,
        b: *mut RankRelaxedWeakNode<K, V>,
    ) -> *mut RankRelaxedWeakNode<K, V> {
        let (winner, loser) = if (*a).key < (*b).key { (a, b) } else { (b, a) };
        (*loser).parent = winner;
        (*loser).right = (*winner).left;
        (*winner).left = loser;
        (*winner).rank += 1;
        winner
    }

    /// Install a tree in the root registry, cascading equal-rank joins.
    unsafe fn register(&mut self, mut tree: *mut RankRelaxedWeakNode<K, V>) {
        loop {
            let r = (*tree).rank;
            debug_assert!(r < MAX_RANK);
            if self.roots_occupied & (1 << r) != 0 {
                let incumbent = self.roots[r];
                self.roots[r] = ptr::null_mut();
                self.roots_occupied &= !(1 << r);
                tree = Self::join(tree, incumbent);
            } else {
                self.roots[r] = tree;
                self.roots_occupied |= 1 << r;
                return;
            }
        }
    }

    /// Drop a node's mark, if any, clearing its registry slot.
    unsafe fn unmark(&mut self, node: *mut RankRelaxedWeakNode<K, V>) {
        if !(*node).marked {
            return;
        }
        let r = (*node).rank;
        debug_assert_eq!(self.marks[r], node);
        self.marks[r] = ptr::null_mut();
        self.marks_occupied &= !(1 << r);
        (*node).marked = false;
    }

    /// Unlink `x` from its parent's child list. If the removal promotes a
    /// marked sibling into the first-child position, the offender is
    /// rotated away or cut loose so invariant 3 survives.
    unsafe fn unlink_child(&mut self, x: *mut RankRelaxedWeakNode<K, V>) {
        let p = (*x).parent;
        if (*p).left == x {
            (*p).left = (*x).right;
        } else {
            let mut s = (*p).left;
            while (*s).right != x {
                s = (*s).right;
            }
            (*s).right = (*x).right;
        }
        (*x).parent = ptr::null_mut();
        (*x).right = ptr::null_mut();

        loop {
            let first = (*p).left;
            if first.is_null() || !(*first).marked {
                return;
            }
            let sibling = (*first).right;
            if !sibling.is_null() && !(*sibling).marked {
                Self::rotate_first(p);
                return;
            }
            // Lone or mark-shadowed first child: root it instead.
            self.cut_to_root(first);
        }
    }

    /// Cleaning rotation: swap the first child with its next sibling so
    /// a mark sits in a later position. Subtrees travel with each node.
    unsafe fn rotate_first(p: *mut RankRelaxedWeakNode<K, V>) {
        let first = (*p).left;
        let second = (*first).right;
        (*first).right = (*second).right;
        (*second).right = first;
        (*p).left = second;
    }

    /// Detach `x` (with its subtree) and hand it to the root registry,
    /// resolving its mark.
    unsafe fn cut_to_root(&mut self, x: *mut RankRelaxedWeakNode<K, V>) {
        self.unmark(x);
        self.unlink_child(x);
        self.register(x);
    }

    /// Re-establish the four invariants after `x` was marked.
    unsafe fn restore_invariants(&mut self, x: *mut RankRelaxedWeakNode<K, V>) {
        let p = (*x).parent;
        if p.is_null() || !((*x).key < (*p).key) {
            // Roots carry no mark; a verified child needs none.
            self.unmark(x);
            return;
        }

        if (*p).left == x {
            let sibling = (*x).right;
            if sibling.is_null() || (*sibling).marked {
                // No clean position to rotate into.
                self.cut_to_root(x);
                return;
            }
            Self::rotate_first(p);
        }

        if (*(*x).parent).marked {
            // Marked parent: rooting the child settles both invariant 4
            // and the child's own violation.
            self.cut_to_root(x);
            return;
        }

        // A marked child of x would sit under a marked parent once x's
        // mark lands; verify it away or root it.
        let mut c = (*x).left;
        while !c.is_null() {
            let next = (*c).right;
            if (*c).marked {
                if !((*c).key < (*x).key) {
                    self.unmark(c);
                } else {
                    self.cut_to_root(c);
                }
            }
            c = next;
        }

        let r = (*x).rank;
        if (*x).marked {
            // Already registered at this rank.
            debug_assert_eq!(self.marks[r], x);
            return;
        }
        if self.marks_occupied & (1 << r) == 0 {
            self.marks[r] = x;
            self.marks_occupied |= 1 << r;
            (*x).marked = true;
            return;
        }
        // Pair transformation: two marks of equal rank meet in the root
        // registry, where the rank join compares them and bumps the
        // survivor one rank up.
        let y = self.marks[r];
        self.cut_to_root(y);
        self.cut_to_root(x);
    }

    unsafe fn update_min(&mut self) {
        self.minimum = ptr::null_mut();
        let mut mask = self.roots_occupied;
        while mask != 0 {
            let r = (ffs_u64(mask) - 1) as usize;
            mask &= mask - 1;
            let n = self.roots[r];
            if self.minimum.is_null() || (*n).key < (*self.minimum).key {
                self.minimum = n;
            }
        }
        let mut mask = self.marks_occupied;
        while mask != 0 {
            let r = (ffs_u64(mask) - 1) as usize;
            mask &= mask - 1;
            let n = self.marks[r];
            if self.minimum.is_null() || (*n).key < (*self.minimum).key {
                self.minimum = n;
            }
        }
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item> PriorityQueue<'m, M, K, V>
    for RankRelaxedWeakQueue<'m, M, K, V>
{
    type Handle = *mut RankRelaxedWeakNode<K, V>;

    fn node_sizes() -> Vec<usize> {
        vec![size_of::<RankRelaxedWeakNode<K, V>>()]
    }

    fn new(map: &'m M) -> Self {
        Self {
            map,
            roots: [ptr::null_mut(); MAX_RANK],
            roots_occupied: 0,
            marks: [ptr::null_mut(); MAX_RANK],
            marks_occupied: 0,
            minimum: ptr::null_mut(),
            size: 0,
        }
    }

    fn clear(&mut self) {
        let mut stack = Vec::new();
        let mut mask = self.roots_occupied;
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
        self.roots_occupied = 0;
        self.marks = [ptr::null_mut(); MAX_RANK];
        self.marks_occupied = 0;
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
        let node: *mut RankRelaxedWeakNode<K, V> = self.map.alloc(0).cast();
        // SAFETY: node is a fresh zeroed block, rank 0, unmarked
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
        // SAFETY: minimum is live
        Some(unsafe { self.delete(self.minimum) })
    }

    unsafe fn delete(&mut self, node: Self::Handle) -> K {
        let key = (*node).key;
        self.unmark(node);
        if (*node).parent.is_null() {
            let r = (*node).rank;
            debug_assert_eq!(self.roots[r], node);
            self.roots[r] = ptr::null_mut();
            self.roots_occupied &= !(1 << r);
        } else {
            self.unlink_child(node);
        }
        // The severed child chain re-enters the forest as fresh roots.
        let mut c = (*node).left;
        while !c.is_null() {
            let next = (*c).right;
            (*c).parent = ptr::null_mut();
            (*c).right = ptr::null_mut();
            self.unmark(c);
            self.register(c);
            c = next;
        }
        self.map.free(0, node.cast());
        self.size -= 1;
        self.update_min();
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
        self.restore_invariants(node);
        if key < (*self.minimum).key {
            self.minimum = node;
        }
    }
}

impl<M: MemoryMap, K: Key, V: Item> Drop for RankRelaxedWeakQueue<'_, M, K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::LazyMap;

    type Heap<'m> = RankRelaxedWeakQueue<'m, LazyMap, u64, u32>;

    fn validate(h: &Heap<'_>) {
        unsafe {
            let mut count = 0;
            let mut marked_seen = 0;
            for r in 0..MAX_RANK {
                assert_eq!(
                    !h.roots[r].is_null(),
                    h.roots_occupied & (1 << r) != 0,
                    "root bitmask mismatch at {r}"
                );
                assert_eq!(
                    !h.marks[r].is_null(),
                    h.marks_occupied & (1 << r) != 0,
                    "mark bitmask mismatch at {r}"
                );
                if !h.marks[r].is_null() {
                    let m = h.marks[r];
                    assert!((*m).marked);
                    assert_eq!((*m).rank, r, "mark slot disagrees with rank");
                }
                if !h.roots[r].is_null() {
                    let root = h.roots[r];
                    assert!((*root).parent.is_null());
                    assert!(!(*root).marked, "roots carry no mark");
                    assert_eq!((*root).rank, r);
                    count += subtree_check(h, root, &mut marked_seen);
                }
            }
            assert_eq!(count, h.size);
            assert_eq!(
                marked_seen,
                h.marks_occupied.count_ones() as usize,
                "marked nodes must all be registered"
            );
            if h.size > 0 {
                assert!(!h.minimum.is_null());
            } else {
                assert!(h.minimum.is_null());
            }
        }
    }

    unsafe fn subtree_check(
        h: &Heap<'_>,
        node: *mut RankRelaxedWeakNode<u64, u32>,
        marked_seen: &mut usize,
    ) -> usize {
        let mut count = 1;
        let mut c = (*node).left;
        let mut first = true;
        while !c.is_null() {
            assert_eq!((*c).parent, node, "broken parent pointer");
            if (*c).marked {
                *marked_seen += 1;
                assert!(!first, "no marked node is a first child");
                assert!(!(*node).marked, "no marked node has a marked parent");
                assert_eq!(h.marks[(*c).rank], c, "mark missing from registry");
            } else {
                assert!(!((*c).key < (*node).key), "unmarked child out of order");
            }
            count += subtree_check(h, c, marked_seen);
            first = false;
            c = (*c).right;
        }
        count
    }

    fn drain_sorted(h: &mut Heap<'_>) -> Vec<u64> {
        let mut out = Vec::new();
        while let Some(k) = h.delete_min() {
            out.push(k);
            validate(h);
        }
        out
    }

    #[test]
    fn test_insert_find_delete_min() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankRelaxedWeakQueue::new(&map);
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
        let mut h: Heap<'_> = RankRelaxedWeakQueue::new(&map);
        let keys: Vec<u64> = (0..256).map(|i| (i * 7001 + 17) % 8191).collect();
        for &k in &keys {
            h.insert(k as u32, k);
        }
        validate(&h);
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(drain_sorted(&mut h), sorted);
    }

    #[test]
    fn test_decrease_key_marks() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankRelaxedWeakQueue::new(&map);
        let handles: Vec<_> = (0..32u64).map(|k| h.insert(k as u32, k * 10 + 100)).collect();
        unsafe {
            // Deep decreases that stay above the parent leave no mark;
            // undercutting ones must restructure or mark.
            h.decrease_key(handles[31], 105);
            validate(&h);
            h.decrease_key(handles[30], 3);
            validate(&h);
            assert_eq!(h.key(h.find_min().unwrap()), 3);
            h.decrease_key(handles[29], 2);
            validate(&h);
            h.decrease_key(handles[28], 1);
            validate(&h);
            assert_eq!(h.key(h.find_min().unwrap()), 1);
        }
        assert_eq!(h.delete_min(), Some(1));
        validate(&h);
        assert_eq!(h.delete_min(), Some(2));
        assert_eq!(h.delete_min(), Some(3));
    }

    #[test]
    fn test_equal_rank_marks_pair_off() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankRelaxedWeakQueue::new(&map);
        let handles: Vec<_> = (0..64u64).map(|k| h.insert(k as u32, k + 1000)).collect();
        unsafe {
            // Many undercutting decreases force repeated mark collisions.
            for (i, &n) in handles.iter().enumerate().rev() {
                h.decrease_key(n, i as u64);
                validate(&h);
            }
        }
        let out = drain_sorted(&mut h);
        assert_eq!(out, (0..64).collect::<Vec<u64>>());
    }

    #[test]
    fn test_arbitrary_delete() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankRelaxedWeakQueue::new(&map);
        let handles: Vec<_> = (0..48u64).map(|k| h.insert(k as u32, k)).collect();
        unsafe {
            assert_eq!(h.delete(handles[25]), 25);
            validate(&h);
            assert_eq!(h.delete(handles[0]), 0);
            validate(&h);
            h.decrease_key(handles[40], 4);
            validate(&h);
            assert_eq!(h.delete(handles[40]), 4);
            validate(&h);
        }
        let expect: Vec<u64> = (1..48).filter(|&k| k != 25 && k != 40).collect();
        assert_eq!(drain_sorted(&mut h), expect);
    }

    #[test]
    fn test_clear() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = RankRelaxedWeakQueue::new(&map);
        for k in 0..40u64 {
            h.insert(k as u32, k);
        }
        h.delete_min();
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.find_min(), None);
        h.insert(6, 6);
        assert_eq!(h.delete_min(), Some(6));
    }
}
