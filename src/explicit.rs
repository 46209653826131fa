//! Explicit d-ary heap.
//!
//! The same algorithm as the implicit array heap, but pointer-linked:
//! every node carries its parent and a fixed `children[D]` array. The
//! position of the n-th node of the complete tree is recovered by walking
//! the base-D digits of n from the root, so insertion and removal still
//! know where the "last" slot is without keeping an array.
//!
//! Restructuring swaps whole nodes (never key/item contents), so handles
//! stay stable. The swap distinguishes the parent-child, disconnected and
//! same-node cases and patches back-pointers in the surrounding subtrees.

use core::mem::size_of;
use core::ptr;

use crate::mem::MemoryMap;
use crate::queue::{Item, Key, PriorityQueue};

/// A node of the explicit heap.
#[repr(C)]
pub struct ExplicitNode<K, V, const D: usize> {
    parent: *mut ExplicitNode<K, V, D>,
    children: [*mut ExplicitNode<K, V, D>; D],
    key: K,
    item: V,
}

/// Explicit d-ary heap with branching factor `D` (2, 4, 8 or 16).
pub struct ExplicitHeap<'m, M: MemoryMap, K: Key, V: Item, const D: usize> {
    map: &'m M,
    root: *mut ExplicitNode<K, V, D>,
    size: usize,
}

impl<'m, M: MemoryMap, K: Key, V: Item, const D: usize> ExplicitHeap<'m, M, K, V, D> {
    /// Node at 0-based level-order position `n`.
    ///
    /// The path from the root is the base-D digit string of `n` (offset by
    /// the 1-per-level bias of the complete-tree numbering), read from the
    /// most significant digit.
    unsafe fn node_at(&self, mut n: usize) -> *mut ExplicitNode<K, V, D> {
        let shift = D.trailing_zeros();
        let mask = D - 1;
        let mut digits = [0usize; 64];
        let mut depth = 0;
        while n > 0 {
            n -= 1;
            digits[depth] = n & mask;
            n >>= shift;
            depth += 1;
        }
        let mut cur = self.root;
        for d in (0..depth).rev() {
            cur = (*cur).children[digits[d]];
        }
        cur
    }

    unsafe fn slot_of(parent: *mut ExplicitNode<K, V, D>, child: *mut ExplicitNode<K, V, D>) -> usize {
        for s in 0..D {
            if (*parent).children[s] == child {
                return s;
            }
        }
        unreachable!("child not present in parent");
    }

    /// Exchange the tree positions of two nodes.
    unsafe fn swap(&mut self, a: *mut ExplicitNode<K, V, D>, b: *mut ExplicitNode<K, V, D>) {
        if a == b {
            return;
        }
        if (*a).parent == b {
            self.swap_connected(b, a);
        } else if (*b).parent == a {
            self.swap_connected(a, b);
        } else {
            self.swap_disconnected(a, b);
        }
        if self.root == a {
            self.root = b;
        } else if self.root == b {
            self.root = a;
        }
    }

    unsafe fn swap_connected(
        &mut self,
        parent: *mut ExplicitNode<K, V, D>,
        child: *mut ExplicitNode<K, V, D>,
    ) {
        let grand = (*parent).parent;
        let child_slot = Self::slot_of(parent, child);
        let parent_children = (*parent).children;
        let child_children = (*child).children;

        (*child).parent = grand;
        if !grand.is_null() {
            let parent_slot = Self::slot_of(grand, parent);
            (*grand).children[parent_slot] = child;
        }
        (*child).children = parent_children;
        (*child).children[child_slot] = parent;

        (*parent).parent = child;
        (*parent).children = child_children;

        for &c in &(*child).children {
            if !c.is_null() && c != parent {
                (*c).parent = child;
            }
        }
        for &c in &(*parent).children {
            if !c.is_null() {
                (*c).parent = parent;
            }
        }
    }

    unsafe fn swap_disconnected(
        &mut self,
        a: *mut ExplicitNode<K, V, D>,
        b: *mut ExplicitNode<K, V, D>,
    ) {
        let a_parent = (*a).parent;
        let b_parent = (*b).parent;
        if !a_parent.is_null() {
            (*a_parent).children[Self::slot_of(a_parent, a)] = b;
        }
        if !b_parent.is_null() {
            (*b_parent).children[Self::slot_of(b_parent, b)] = a;
        }
        (*a).parent = b_parent;
        (*b).parent = a_parent;

        let a_children = (*a).children;
        (*a).children = (*b).children;
        (*b).children = a_children;

        for &c in &(*a).children {
            if !c.is_null() {
                (*c).parent = a;
            }
        }
        for &c in &(*b).children {
            if !c.is_null() {
                (*c).parent = b;
            }
        }
    }

    unsafe fn sift_up(&mut self, node: *mut ExplicitNode<K, V, D>) {
        loop {
            let p = (*node).parent;
            if p.is_null() || !((*node).key < (*p).key) {
                break;
            }
            self.swap(p, node);
        }
    }

    unsafe fn sift_down(&mut self, node: *mut ExplicitNode<K, V, D>) {
        loop {
            let mut min: *mut ExplicitNode<K, V, D> = ptr::null_mut();
            for &c in &(*node).children {
                if !c.is_null() && (min.is_null() || (*c).key < (*min).key) {
                    min = c;
                }
            }
            if min.is_null() || !((*min).key < (*node).key) {
                break;
            }
            self.swap(node, min);
        }
    }

    /// Unlink a leaf from its parent.
    unsafe fn detach_leaf(&mut self, node: *mut ExplicitNode<K, V, D>) {
        let p = (*node).parent;
        if p.is_null() {
            self.root = ptr::null_mut();
        } else {
            (*p).children[Self::slot_of(p, node)] = ptr::null_mut();
        }
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item, const D: usize> PriorityQueue<'m, M, K, V>
    for ExplicitHeap<'m, M, K, V, D>
{
    type Handle = *mut ExplicitNode<K, V, D>;

    fn node_sizes() -> Vec<usize> {
        vec![size_of::<ExplicitNode<K, V, D>>()]
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
                for &c in &(*n).children {
                    if !c.is_null() {
                        stack.push(c);
                    }
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
        let node: *mut ExplicitNode<K, V, D> = self.map.alloc(0).cast();
        let pos = self.size;
        // SAFETY: node is a fresh zeroed block; links arrive null
        unsafe {
            (*node).key = key;
            (*node).item = item;
            if pos == 0 {
                self.root = node;
            } else {
                let parent = self.node_at((pos - 1) / D);
                (*parent).children[(pos - 1) % D] = node;
                (*node).parent = parent;
            }
            self.size += 1;
            self.sift_up(node);
        }
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
        let last = self.node_at(self.size - 1);
        if last == node {
            self.detach_leaf(node);
        } else {
            self.swap(node, last);
            self.detach_leaf(node);
            let p = (*last).parent;
            if !p.is_null() && (*last).key < (*p).key {
                self.sift_up(last);
            } else {
                self.sift_down(last);
            }
        }
        self.map.free(0, node.cast());
        self.size -= 1;
        key
    }

    unsafe fn decrease_key(&mut self, node: Self::Handle, key: K) {
        (*node).key = key;
        self.sift_up(node);
    }
}

impl<M: MemoryMap, K: Key, V: Item, const D: usize> Drop for ExplicitHeap<'_, M, K, V, D> {
    fn drop(&mut self) {
        self.clear();
    }
}
