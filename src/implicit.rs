//! Implicit d-ary heap.
//!
//! The classic array heap: a contiguous level-order array with branching
//! factor `D`. The array stores node *pointers* rather than elements, and
//! each node records its current slot, so restructuring moves pointers
//! around while the nodes themselves never relocate and handles stay
//! stable.
//!
//! Sift operations hold the moving node in a register and write it only at
//! its final slot, a single-sided push sequence instead of a swap at every
//! step.

use core::mem::size_of;

use crate::mem::MemoryMap;
use crate::queue::{Item, Key, PriorityQueue};

/// A node of the implicit heap. Its position lives in the heap's array;
/// the node itself only knows its current index.
#[repr(C)]
pub struct ImplicitNode<K, V> {
    index: usize,
    key: K,
    item: V,
}

/// Implicit d-ary heap with branching factor `D` (2, 4, 8 or 16).
pub struct ImplicitHeap<'m, M: MemoryMap, K: Key, V: Item, const D: usize> {
    map: &'m M,
    nodes: Vec<*mut ImplicitNode<K, V>>,
}

impl<'m, M: MemoryMap, K: Key, V: Item, const D: usize> ImplicitHeap<'m, M, K, V, D> {
    /// Place `node` at slot `i` and walk it up while it beats its parent.
    unsafe fn sift_up(&mut self, mut i: usize, node: *mut ImplicitNode<K, V>) {
        while i > 0 {
            let parent = (i - 1) / D;
            let p = self.nodes[parent];
            if (*node).key < (*p).key {
                self.nodes[i] = p;
                (*p).index = i;
                i = parent;
            } else {
                break;
            }
        }
        self.nodes[i] = node;
        (*node).index = i;
    }

    /// Place `node` at slot `i` and walk it down below any smaller child.
    unsafe fn sift_down(&mut self, mut i: usize, node: *mut ImplicitNode<K, V>) {
        let len = self.nodes.len();
        loop {
            let first = i * D + 1;
            if first >= len {
                break;
            }
            let last = (first + D).min(len);
            let mut min = first;
            for c in (first + 1)..last {
                if (*self.nodes[c]).key < (*self.nodes[min]).key {
                    min = c;
                }
            }
            let m = self.nodes[min];
            if (*m).key < (*node).key {
                self.nodes[i] = m;
                (*m).index = i;
                i = min;
            } else {
                break;
            }
        }
        self.nodes[i] = node;
        (*node).index = i;
    }

    /// Remove the node at slot `i`, refill the hole with the last node and
    /// restore order in whichever direction it violates.
    unsafe fn remove_at(&mut self, i: usize) -> K {
        let node = self.nodes[i];
        let key = (*node).key;
        let last = self.nodes.pop().expect("remove from empty heap");
        if last != node {
            // The replacement may belong above or below the hole.
            self.sift_up(i, last);
            if (*last).index == i {
                self.sift_down(i, last);
            }
        }
        self.map.free(0, node.cast());
        key
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item, const D: usize> PriorityQueue<'m, M, K, V>
    for ImplicitHeap<'m, M, K, V, D>
{
    type Handle = *mut ImplicitNode<K, V>;

    fn node_sizes() -> Vec<usize> {
        vec![size_of::<ImplicitNode<K, V>>()]
    }

    fn new(map: &'m M) -> Self {
        Self {
            map,
            nodes: Vec::new(),
        }
    }

    fn clear(&mut self) {
        for &node in &self.nodes {
            // SAFETY: every slot holds a live node from kind 0
            unsafe { self.map.free(0, node.cast()) };
        }
        self.nodes.clear();
    }

    #[inline]
    fn size(&self) -> usize {
        self.nodes.len()
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
        let node: *mut ImplicitNode<K, V> = self.map.alloc(0).cast();
        let i = self.nodes.len();
        // SAFETY: node is a fresh zeroed block of the right size
        unsafe {
            (*node).key = key;
            (*node).item = item;
            self.nodes.push(node);
            self.sift_up(i, node);
        }
        node
    }

    #[inline]
    fn find_min(&self) -> Option<Self::Handle> {
        self.nodes.first().copied()
    }

    fn delete_min(&mut self) -> Option<K> {
        if self.nodes.is_empty() {
            return None;
        }
        // SAFETY: slot 0 is live
        Some(unsafe { self.remove_at(0) })
    }

    unsafe fn delete(&mut self, node: Self::Handle) -> K {
        self.remove_at((*node).index)
    }

    unsafe fn decrease_key(&mut self, node: Self::Handle, key: K) {
        (*node).key = key;
        self.sift_up((*node).index, node);
    }
}

impl<M: MemoryMap, K: Key, V: Item, const D: usize> Drop for ImplicitHeap<'_, M, K, V, D> {
    fn drop(&mut self) {
        self.clear();
    }
}
