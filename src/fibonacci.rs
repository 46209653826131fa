//! Fibonacci heap.
//!
//! Roots live on a circular doubly-linked list, as does every child list.
//! `decrease_key` cuts the violating node onto the root list and cascades
//! cuts upward, each non-root losing at most one child before being cut
//! itself. `delete_min` splices the old minimum's children into the root
//! list in O(1) and then consolidates: equal-rank roots are linked through
//! a rank-indexed registry until all root ranks are distinct.

use core::mem::size_of;
use core::ptr;

use crate::mem::MemoryMap;
use crate::queue::{Item, Key, PriorityQueue, MAX_RANK};

/// A node of the Fibonacci heap. Sibling links are circular and doubly
/// linked in both the root list and every child list.
#[repr(C)]
pub struct FibonacciNode<K, V> {
    parent: *mut FibonacciNode<K, V>,
    first_child: *mut FibonacciNode<K, V>,
    next_sibling: *mut FibonacciNode<K, V>,
    prev_sibling: *mut FibonacciNode<K, V>,
    rank: usize,
    marked: bool,
    key: K,
    item: V,
}

/// Fibonacci heap.
pub struct FibonacciHeap<'m, M: MemoryMap, K: Key, V: Item> {
    map: &'m M,
    minimum: *mut FibonacciNode<K, V>,
    size: usize,
}

impl<'m, M: MemoryMap, K: Key, V: Item> FibonacciHeap<'m, M, K, V> {
    /// Make `n` a singleton circular list.
    #[inline]
    unsafe fn self_loop(n: *mut FibonacciNode<K, V>) {
        (*n).next_sibling = n;
        (*n).prev_sibling = n;
    }

    /// Splice two circular lists in O(1); returns the head whose key is
    /// lesser (ties keep `a`).
    unsafe fn append_lists(
        a: *mut FibonacciNode<K, V>,
        b: *mut FibonacciNode<K, V>,
    ) -> *mut FibonacciNode<K, V> {
        if a.is_null() {
            return b;
        }
        if b.is_null() {
            return a;
        }
        let a_prev = (*a).prev_sibling;
        let b_prev = (*b).prev_sibling;
        (*a_prev).next_sibling = b;
        (*b).prev_sibling = a_prev;
        (*b_prev).next_sibling = a;
        (*a).prev_sibling = b_prev;
        if (*b).key < (*a).key {
            b
        } else {
            a
        }
    }

    /// Unlink `n` from its circular list (does not touch head pointers).
    #[inline]
    unsafe fn list_remove(n: *mut FibonacciNode<K, V>) {
        (*(*n).prev_sibling).next_sibling = (*n).next_sibling;
        (*(*n).next_sibling).prev_sibling = (*n).prev_sibling;
    }

    /// Link two equal-rank roots: the lesser key becomes the parent, the
    /// loser's mark is cleared, the winner's rank grows. `b` wins ties.
    unsafe fn link(
        a: *mut FibonacciNode<K, V>,
        b: *mut FibonacciNode<K, V>,
    ) -> *mut FibonacciNode<K, V> {
        let (winner, loser) = if (*a).key < (*b).key { (a, b) } else { (b, a) };
        (*loser).parent = winner;
        (*loser).marked = false;
        Self::self_loop(loser);
        (*winner).first_child = Self::append_lists((*winner).first_child, loser);
        (*winner).rank += 1;
        winner
    }

    /// Move `n` (a child) onto the root list.
    unsafe fn cut(&mut self, n: *mut FibonacciNode<K, V>) {
        let p = (*n).parent;
        if (*p).first_child == n {
            (*p).first_child = if (*n).next_sibling == n {
                ptr::null_mut()
            } else {
                (*n).next_sibling
            };
        }
        Self::list_remove(n);
        (*p).rank -= 1;
        (*n).parent = ptr::null_mut();
        (*n).marked = false;
        Self::self_loop(n);
        Self::append_lists(self.minimum, n);
    }

    /// Walk up from `p`, marking the first unmarked ancestor and cutting
    /// every marked one on the way.
    unsafe fn cascading_cut(&mut self, mut p: *mut FibonacciNode<K, V>) {
        while !(*p).parent.is_null() {
            if !(*p).marked {
                (*p).marked = true;
                return;
            }
            let next = (*p).parent;
            self.cut(p);
            p = next;
        }
    }

    /// Link equal-rank roots until ranks are unique, then rebuild the
    /// root list in rank order and locate the new minimum.
    unsafe fn consolidate(&mut self, start: *mut FibonacciNode<K, V>) {
        let mut registry: [*mut FibonacciNode<K, V>; MAX_RANK] = [ptr::null_mut(); MAX_RANK];

        let mut roots = Vec::new();
        let mut cur = start;
        loop {
            roots.push(cur);
            cur = (*cur).next_sibling;
            if cur == start {
                break;
            }
        }

        for mut t in roots {
            Self::self_loop(t);
            loop {
                let r = (*t).rank;
                debug_assert!(r < MAX_RANK);
                if registry[r].is_null() {
                    registry[r] = t;
                    break;
                }
                let other = registry[r];
                registry[r] = ptr::null_mut();
                t = Self::link(t, other);
            }
        }

        self.minimum = ptr::null_mut();
        for slot in registry {
            if slot.is_null() {
                continue;
            }
            if self.minimum.is_null() {
                self.minimum = slot;
            } else {
                // Append at the tail, keeping the rebuilt list in rank
                // order; the head only moves when a lesser key shows up.
                let min = self.minimum;
                (*slot).next_sibling = min;
                (*slot).prev_sibling = (*min).prev_sibling;
                (*(*min).prev_sibling).next_sibling = slot;
                (*min).prev_sibling = slot;
                if (*slot).key < (*min).key {
                    self.minimum = slot;
                }
            }
        }
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item> PriorityQueue<'m, M, K, V> for FibonacciHeap<'m, M, K, V> {
    type Handle = *mut FibonacciNode<K, V>;

    fn node_sizes() -> Vec<usize> {
        vec![size_of::<FibonacciNode<K, V>>()]
    }

    fn new(map: &'m M) -> Self {
        Self {
            map,
            minimum: ptr::null_mut(),
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
                    stack.push(cur);
                    cur = (*cur).next_sibling;
                    if cur == start {
                        break;
                    }
                }
            }
        }
        while let Some(n) = stack.pop() {
            unsafe {
                let child = (*n).first_child;
                if !child.is_null() {
                    let mut c = child;
                    loop {
                        stack.push(c);
                        c = (*c).next_sibling;
                        if c == child {
                            break;
                        }
                    }
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
        let node: *mut FibonacciNode<K, V> = self.map.alloc(0).cast();
        // SAFETY: node is a fresh zeroed block
        unsafe {
            (*node).key = key;
            (*node).item = item;
            Self::self_loop(node);
            if self.minimum.is_null() {
                self.minimum = node;
            } else {
                Self::append_lists(self.minimum, node);
                if key < (*self.minimum).key {
                    self.minimum = node;
                }
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
        unsafe {
            let z = self.minimum;
            let key = (*z).key;

            let child = (*z).first_child;
            if !child.is_null() {
                let mut c = child;
                loop {
                    (*c).parent = ptr::null_mut();
                    c = (*c).next_sibling;
                    if c == child {
                        break;
                    }
                }
                (*z).first_child = ptr::null_mut();
                Self::append_lists(z, child);
            }

            let next = (*z).next_sibling;
            Self::list_remove(z);
            if next == z {
                self.minimum = ptr::null_mut();
            } else {
                self.consolidate(next);
            }

            self.map.free(0, z.cast());
            self.size -= 1;
            Some(key)
        }
    }

    unsafe fn delete(&mut self, node: Self::Handle) -> K {
        let p = (*node).parent;
        if !p.is_null() {
            self.cut(node);
            self.cascading_cut(p);
        }
        self.minimum = node;
        self.delete_min().expect("queue held a live node")
    }

    unsafe fn decrease_key(&mut self, node: Self::Handle, key: K) {
        (*node).key = key;
        let p = (*node).parent;
        if !p.is_null() && (*node).key < (*p).key {
            self.cut(node);
            self.cascading_cut(p);
        }
        if (*node).parent.is_null() && key < (*self.minimum).key {
            self.minimum = node;
        }
    }
}

impl<M: MemoryMap, K: Key, V: Item> Drop for FibonacciHeap<'_, M, K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}
