//! Pairing heap.
//!
//! A single multiary tree. Siblings form a doubly-linked list whose head's
//! `prev` points at the parent, giving an O(1) "am I the first child"
//! test. `delete_min` collapses the root's child list with the two-pass
//! method; the collapse is iterative so the stack stays bounded on
//! worst-case workloads.

use core::mem::size_of;
use core::ptr;

use crate::mem::MemoryMap;
use crate::queue::{Item, Key, PriorityQueue};

/// A node of the pairing heap.
///
/// `prev_sibling` of a first child points to the parent; for any other
/// node it points to the preceding sibling. Roots have both sibling links
/// null.
#[repr(C)]
pub struct PairingNode<K, V> {
    first_child: *mut PairingNode<K, V>,
    next_sibling: *mut PairingNode<K, V>,
    prev_sibling: *mut PairingNode<K, V>,
    key: K,
    item: V,
}

/// Pairing heap.
pub struct PairingHeap<'m, M: MemoryMap, K: Key, V: Item> {
    map: &'m M,
    root: *mut PairingNode<K, V>,
    size: usize,
}

impl<'m, M: MemoryMap, K: Key, V: Item> PairingHeap<'m, M, K, V> {
    /// Merge two trees; the greater-key root becomes the new first child
    /// of the other. Equal keys keep `a` on top.
    unsafe fn merge(
        a: *mut PairingNode<K, V>,
        b: *mut PairingNode<K, V>,
    ) -> *mut PairingNode<K, V> {
        if a.is_null() {
            return b;
        }
        if b.is_null() {
            return a;
        }
        let (winner, loser) = if (*b).key < (*a).key { (b, a) } else { (a, b) };
        (*loser).next_sibling = (*winner).first_child;
        if !(*winner).first_child.is_null() {
            (*(*winner).first_child).prev_sibling = loser;
        }
        (*loser).prev_sibling = winner;
        (*winner).first_child = loser;
        winner
    }

    /// Two-pass collapse of a sibling list into a single tree.
    ///
    /// Left to right, consecutive pairs are merged onto a temporary stack
    /// threaded through `prev_sibling`; right to left, the stack is folded
    /// into one tree. Iterative by construction.
    unsafe fn collapse(list: *mut PairingNode<K, V>) -> *mut PairingNode<K, V> {
        if list.is_null() {
            return ptr::null_mut();
        }

        let mut stack: *mut PairingNode<K, V> = ptr::null_mut();
        let mut cur = list;
        while !cur.is_null() {
            let a = cur;
            let b = (*a).next_sibling;
            if b.is_null() {
                (*a).next_sibling = ptr::null_mut();
                (*a).prev_sibling = stack;
                stack = a;
                break;
            }
            cur = (*b).next_sibling;
            (*a).next_sibling = ptr::null_mut();
            (*a).prev_sibling = ptr::null_mut();
            (*b).next_sibling = ptr::null_mut();
            (*b).prev_sibling = ptr::null_mut();
            let merged = Self::merge(a, b);
            (*merged).prev_sibling = stack;
            stack = merged;
        }

        let mut result: *mut PairingNode<K, V> = ptr::null_mut();
        let mut cur = stack;
        while !cur.is_null() {
            let below = (*cur).prev_sibling;
            (*cur).prev_sibling = ptr::null_mut();
            result = Self::merge(result, cur);
            cur = below;
        }
        result
    }

    /// Unlink `node` (with its subtree) from its sibling list.
    unsafe fn cut(&mut self, node: *mut PairingNode<K, V>) {
        let prev = (*node).prev_sibling;
        let next = (*node).next_sibling;
        if !prev.is_null() {
            if (*prev).first_child == node {
                // prev is the parent
                (*prev).first_child = next;
            } else {
                (*prev).next_sibling = next;
            }
        }
        if !next.is_null() {
            (*next).prev_sibling = prev;
        }
        (*node).prev_sibling = ptr::null_mut();
        (*node).next_sibling = ptr::null_mut();
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item> PriorityQueue<'m, M, K, V> for PairingHeap<'m, M, K, V> {
    type Handle = *mut PairingNode<K, V>;

    fn node_sizes() -> Vec<usize> {
        vec![size_of::<PairingNode<K, V>>()]
    }

    fn new(map: &'m M) -> Self {
        Self {
            map,
            root: ptr::null_mut(),
            size: 0,
        }
    }

    fn clear(&mut self) {
        let mut stack = Vec::new();
        if !self.root.is_null() {
            stack.push(self.root);
        }
        while let Some(n) = stack.pop() {
            unsafe {
                if !(*n).first_child.is_null() {
                    stack.push((*n).first_child);
                }
                if !(*n).next_sibling.is_null() {
                    stack.push((*n).next_sibling);
                }
                self.map.free(0, n.cast());
            }
        }
        self.root = ptr::null_mut();
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
        let node: *mut PairingNode<K, V> = self.map.alloc(0).cast();
        // SAFETY: node is a fresh zeroed block; links arrive null
        unsafe {
            (*node).key = key;
            (*node).item = item;
            self.root = Self::merge(self.root, node);
        }
        self.size += 1;
        node
    }

    #[inline]
    fn find_min(&self) -> Option<Self::Handle> {
        if self.root.is_null() {
            None
        } else {
            Some(self.root)
        }
    }

    fn delete_min(&mut self) -> Option<K> {
        if self.root.is_null() {
            return None;
        }
        // SAFETY: root is live
        Some(unsafe { self.delete(self.root) })
    }

    unsafe fn delete(&mut self, node: Self::Handle) -> K {
        let key = (*node).key;
        if node == self.root {
            self.root = Self::collapse((*node).first_child);
        } else {
            self.cut(node);
            let sub = Self::collapse((*node).first_child);
            self.root = Self::merge(self.root, sub);
        }
        self.map.free(0, node.cast());
        self.size -= 1;
        key
    }

    unsafe fn decrease_key(&mut self, node: Self::Handle, key: K) {
        (*node).key = key;
        if node == self.root {
            return;
        }
        self.cut(node);
        self.root = Self::merge(self.root, node);
    }
}

impl<M: MemoryMap, K: Key, V: Item> Drop for PairingHeap<'_, M, K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}
