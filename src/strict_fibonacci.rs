//! Strict Fibonacci heap.
//!
//! A single heap-ordered tree with three auxiliary structures that keep
//! every operation worst-case bounded:
//!
//! - **Q**, a FIFO of all non-root nodes, consumed two at a time during
//!   `delete_min` to spread restructuring work;
//! - one shared, reference-counted **active record** per heap, whose flag
//!   turns an entire heap passive in O(1) during meld;
//! - a doubly-linked list of reference-counted **rank records**, each
//!   tracking the head and tail of its block in the two **fix lists**
//!   (ROOT for active roots, LOSS for active nodes with positive loss).
//!
//! Fix nodes of equal rank stay contiguous, and a rank's block is moved
//! to the front of its fix list whenever it becomes transformable (two
//! members, or a single loss-list member with loss above one), so each
//! reduction finds its candidates in O(1).
//!
//! Every public operation runs a bounded tail of reductions (active-root,
//! root-degree, loss) and then drains one entry from the lazy
//! garbage-collection list of fix nodes retired by meld.

use core::mem::size_of;
use core::mem::ManuallyDrop;
use core::ptr;

use crate::mem::MemoryMap;
use crate::queue::{Item, Key, Meldable, PriorityQueue};

/// Node kinds. `Root` means active root; `Loss` means active with
/// positive loss. Either way the active-record flag decides whether the
/// kind still counts.
const PASSIVE: u32 = 0;
const ACTIVE: u32 = 1;
const ACTIVE_ROOT: u32 = 2;
const ACTIVE_LOSS: u32 = 3;

/// Fix-list indices.
const ROOT_LIST: usize = 0;
const LOSS_LIST: usize = 1;

/// Memory-map kinds.
const NODE_KIND: usize = 0;
const FIX_KIND: usize = 1;
const ACTIVE_KIND: usize = 2;
const RANK_KIND: usize = 3;

/// Shared by every active node of one heap; clearing `flag` turns the
/// whole heap passive at once.
#[repr(C)]
struct ActiveRecord {
    flag: u32,
    refs: u32,
}

/// One record per live rank value, threaded in rank order.
#[repr(C)]
struct RankRecord<K, V> {
    inc: *mut RankRecord<K, V>,
    dec: *mut RankRecord<K, V>,
    /// Head of this rank's block per fix list.
    head: [*mut FixNode<K, V>; 2],
    /// Tail of this rank's block per fix list.
    tail: [*mut FixNode<K, V>; 2],
    transformable: [bool; 2],
    value: u32,
    refs: u32,
}

/// Membership token on a fix list, pointing back at its node and rank.
#[repr(C)]
struct FixNode<K, V> {
    prev: *mut FixNode<K, V>,
    next: *mut FixNode<K, V>,
    node: *mut StrictFibonacciNode<K, V>,
    rank: *mut RankRecord<K, V>,
}

/// A node of the strict Fibonacci heap.
#[repr(C)]
pub struct StrictFibonacciNode<K, V> {
    parent: *mut StrictFibonacciNode<K, V>,
    /// Sibling ring, doubly linked and circular.
    left: *mut StrictFibonacciNode<K, V>,
    right: *mut StrictFibonacciNode<K, V>,
    /// Leftmost child; active children sit left of passive ones.
    left_child: *mut StrictFibonacciNode<K, V>,
    q_prev: *mut StrictFibonacciNode<K, V>,
    q_next: *mut StrictFibonacciNode<K, V>,
    kind: u32,
    loss: u32,
    active: *mut ActiveRecord,
    rank: *mut RankRecord<K, V>,
    fix: *mut FixNode<K, V>,
    key: K,
    item: V,
}

/// Strict Fibonacci heap.
pub struct StrictFibonacciHeap<'m, M: MemoryMap, K: Key, V: Item> {
    map: &'m M,
    root: *mut StrictFibonacciNode<K, V>,
    /// Front of Q.
    q_head: *mut StrictFibonacciNode<K, V>,
    /// Front of each fix list (circular; transformable blocks first).
    fix: [*mut FixNode<K, V>; 2],
    active: *mut ActiveRecord,
    /// Rank-record list head (rank 0).
    ranks: *mut RankRecord<K, V>,
    /// Retired fix nodes, drained one per public operation.
    garbage: *mut FixNode<K, V>,
    size: usize,
}

impl<'m, M: MemoryMap, K: Key, V: Item> StrictFibonacciHeap<'m, M, K, V> {
    // -------------------------------------------------------------------
    // Record bookkeeping
    // -------------------------------------------------------------------

    unsafe fn active_record(&mut self) -> *mut ActiveRecord {
        if self.active.is_null() {
            let rec: *mut ActiveRecord = self.map.alloc(ACTIVE_KIND).cast();
            (*rec).flag = 1;
            (*rec).refs = 1; // the heap's own reference
            self.active = rec;
        }
        self.active
    }

    unsafe fn retain_active(rec: *mut ActiveRecord) -> *mut ActiveRecord {
        (*rec).refs += 1;
        rec
    }

    unsafe fn release_active(&mut self, rec: *mut ActiveRecord) {
        (*rec).refs -= 1;
        if (*rec).refs == 0 {
            self.map.free(ACTIVE_KIND, rec.cast());
        }
    }

    /// Rank record for value 0, created on demand.
    unsafe fn rank_zero(&mut self) -> *mut RankRecord<K, V> {
        if self.ranks.is_null() {
            let rec: *mut RankRecord<K, V> = self.map.alloc(RANK_KIND).cast();
            (*rec).value = 0;
            self.ranks = rec;
        }
        self.ranks
    }

    /// Rank record one above `rec`, created on demand.
    unsafe fn rank_above(&mut self, rec: *mut RankRecord<K, V>) -> *mut RankRecord<K, V> {
        if (*rec).inc.is_null() {
            let up: *mut RankRecord<K, V> = self.map.alloc(RANK_KIND).cast();
            (*up).value = (*rec).value + 1;
            (*up).dec = rec;
            (*rec).inc = up;
        }
        (*rec).inc
    }

    unsafe fn retain_rank(rec: *mut RankRecord<K, V>) -> *mut RankRecord<K, V> {
        (*rec).refs += 1;
        rec
    }

    unsafe fn release_rank(&mut self, rec: *mut RankRecord<K, V>) {
        (*rec).refs -= 1;
        // Only list tails are freed directly; a cleared tail cascades
        // down through any unreferenced records below it.
        let mut rec = rec;
        while !rec.is_null() && (*rec).refs == 0 && (*rec).inc.is_null() {
            let dec = (*rec).dec;
            if dec.is_null() {
                if self.ranks == rec {
                    self.ranks = ptr::null_mut();
                }
            } else {
                (*dec).inc = ptr::null_mut();
            }
            self.map.free(RANK_KIND, rec.cast());
            rec = dec;
        }
    }

    #[inline]
    unsafe fn is_active(n: *mut StrictFibonacciNode<K, V>) -> bool {
        !(*n).active.is_null() && (*(*n).active).flag != 0
    }

    #[inline]
    unsafe fn is_active_root(n: *mut StrictFibonacciNode<K, V>) -> bool {
        Self::is_active(n) && (*n).kind == ACTIVE_ROOT
    }

    /// Lazily settle a node whose heap went passive through meld.
    unsafe fn normalize(&mut self, n: *mut StrictFibonacciNode<K, V>) {
        if !(*n).active.is_null() && (*(*n).active).flag == 0 {
            let rec = (*n).active;
            (*n).active = ptr::null_mut();
            self.release_active(rec);
            if !(*n).rank.is_null() {
                let r = (*n).rank;
                (*n).rank = ptr::null_mut();
                self.release_rank(r);
            }
            (*n).kind = PASSIVE;
            (*n).loss = 0;
            // Any fix node is on the garbage list and will be drained.
            (*n).fix = ptr::null_mut();
        }
    }

    // -------------------------------------------------------------------
    // Fix lists
    // -------------------------------------------------------------------

    unsafe fn rank_transformable(rec: *mut RankRecord<K, V>, list: usize) -> bool {
        let head = (*rec).head[list];
        if head.is_null() {
            return false;
        }
        if head != (*rec).tail[list] {
            return true;
        }
        list == LOSS_LIST && (*(*head).node).loss > 1
    }

    /// Unlink a fix node from its circular list.
    unsafe fn fix_unlink(&mut self, list: usize, f: *mut FixNode<K, V>) {
        if (*f).next == f {
            self.fix[list] = ptr::null_mut();
        } else {
            (*(*f).prev).next = (*f).next;
            (*(*f).next).prev = (*f).prev;
            if self.fix[list] == f {
                self.fix[list] = (*f).next;
            }
        }
        (*f).prev = f;
        (*f).next = f;
    }

    /// Insert fix node `f` directly before `at` in the circular list.
    unsafe fn fix_insert_before(&mut self, list: usize, f: *mut FixNode<K, V>, at: *mut FixNode<K, V>) {
        if at.is_null() {
            self.fix[list] = f;
            (*f).prev = f;
            (*f).next = f;
            return;
        }
        (*f).prev = (*at).prev;
        (*f).next = at;
        (*(*at).prev).next = f;
        (*at).prev = f;
    }

    /// Move a rank's whole block to the front of the list.
    unsafe fn fix_promote(&mut self, list: usize, rec: *mut RankRecord<K, V>) {
        let head = (*rec).head[list];
        let tail = (*rec).tail[list];
        let front = self.fix[list];
        if front == head {
            return;
        }
        // Detach the block.
        (*(*head).prev).next = (*tail).next;
        (*(*tail).next).prev = (*head).prev;
        // Splice before the current front.
        (*head).prev = (*front).prev;
        (*tail).next = front;
        (*(*front).prev).next = head;
        (*front).prev = head;
        self.fix[list] = head;
    }

    /// Recompute a rank's transformability and keep its block at the
    /// front iff it can fire.
    unsafe fn fix_retune(&mut self, list: usize, rec: *mut RankRecord<K, V>) {
        let now = Self::rank_transformable(rec, list);
        (*rec).transformable[list] = now;
        if now {
            self.fix_promote(list, rec);
        } else if !(*rec).head[list].is_null() && self.fix[list] == (*rec).head[list] {
            // Demote a dead block off the front so live ones surface.
            let next = (*(*rec).tail[list]).next;
            if next != (*rec).head[list] {
                self.fix[list] = next;
            }
        }
    }

    /// Put `n` on a fix list under its current rank record.
    unsafe fn fix_attach(&mut self, list: usize, n: *mut StrictFibonacciNode<K, V>) {
        debug_assert!((*n).fix.is_null());
        let rec = (*n).rank;
        let f: *mut FixNode<K, V> = self.map.alloc(FIX_KIND).cast();
        (*f).node = n;
        (*f).rank = Self::retain_rank(rec);
        (*f).prev = f;
        (*f).next = f;
        if (*rec).head[list].is_null() {
            // New block; inserting before the front of a circular list
            // parks it at the back, away from the transformable blocks.
            let front = self.fix[list];
            self.fix_insert_before(list, f, front);
            (*rec).head[list] = f;
            (*rec).tail[list] = f;
        } else {
            self.fix_insert_before(list, f, (*rec).head[list]);
            if self.fix[list] == (*rec).head[list] {
                self.fix[list] = f;
            }
            (*rec).head[list] = f;
        }
        (*n).fix = f;
        self.fix_retune(list, rec);
    }

    /// Take `n` off a fix list.
    unsafe fn fix_detach(&mut self, list: usize, n: *mut StrictFibonacciNode<K, V>) {
        let f = (*n).fix;
        debug_assert!(!f.is_null());
        let rec = (*f).rank;
        if (*rec).head[list] == f {
            (*rec).head[list] = if (*rec).tail[list] == f {
                ptr::null_mut()
            } else {
                (*f).next
            };
        }
        if (*rec).tail[list] == f {
            (*rec).tail[list] = if (*rec).head[list].is_null() {
                ptr::null_mut()
            } else {
                (*f).prev
            };
        }
        self.fix_unlink(list, f);
        (*n).fix = ptr::null_mut();
        self.map.free(FIX_KIND, f.cast());
        self.fix_retune(list, rec);
        self.release_rank(rec);
    }

    /// Move an active node to a new rank record, updating any fix-list
    /// membership.
    unsafe fn set_rank(
        &mut self,
        n: *mut StrictFibonacciNode<K, V>,
        rec: *mut RankRecord<K, V>,
        list: usize,
    ) {
        let on_fix = !(*n).fix.is_null();
        if on_fix {
            self.fix_detach(list, n);
        }
        let old = (*n).rank;
        (*n).rank = Self::retain_rank(rec);
        if !old.is_null() {
            self.release_rank(old);
        }
        if on_fix {
            self.fix_attach(list, n);
        }
    }

    // -------------------------------------------------------------------
    // Q
    // -------------------------------------------------------------------

    unsafe fn enqueue(&mut self, n: *mut StrictFibonacciNode<K, V>) {
        if self.q_head.is_null() {
            (*n).q_next = n;
            (*n).q_prev = n;
            self.q_head = n;
        } else {
            let head = self.q_head;
            (*n).q_next = head;
            (*n).q_prev = (*head).q_prev;
            (*(*head).q_prev).q_next = n;
            (*head).q_prev = n;
        }
    }

    unsafe fn dequeue_node(&mut self, n: *mut StrictFibonacciNode<K, V>) {
        if (*n).q_next == n {
            self.q_head = ptr::null_mut();
        } else {
            (*(*n).q_prev).q_next = (*n).q_next;
            (*(*n).q_next).q_prev = (*n).q_prev;
            if self.q_head == n {
                self.q_head = (*n).q_next;
            }
        }
        (*n).q_next = ptr::null_mut();
        (*n).q_prev = ptr::null_mut();
    }

    // -------------------------------------------------------------------
    // Tree surgery
    // -------------------------------------------------------------------

    /// Detach `n` from its parent's child ring.
    unsafe fn cut(&mut self, n: *mut StrictFibonacciNode<K, V>) {
        let p = (*n).parent;
        debug_assert!(!p.is_null());
        if (*n).right == n {
            (*p).left_child = ptr::null_mut();
        } else {
            (*(*n).left).right = (*n).right;
            (*(*n).right).left = (*n).left;
            if (*p).left_child == n {
                (*p).left_child = (*n).right;
            }
        }
        (*n).parent = ptr::null_mut();
        (*n).left = n;
        (*n).right = n;
    }

    /// Link `n` under `p`: active children enter at the left end,
    /// passive ones at the right end.
    unsafe fn link(&mut self, n: *mut StrictFibonacciNode<K, V>, p: *mut StrictFibonacciNode<K, V>) {
        self.normalize(n);
        (*n).parent = p;
        let first = (*p).left_child;
        if first.is_null() {
            (*n).left = n;
            (*n).right = n;
            (*p).left_child = n;
            return;
        }
        (*n).right = first;
        (*n).left = (*first).left;
        (*(*first).left).right = n;
        (*first).left = n;
        if Self::is_active(n) {
            (*p).left_child = n;
        }
    }

    /// Demote an active node to passive, detaching every auxiliary
    /// reference. Its active children become active roots.
    unsafe fn make_passive(&mut self, n: *mut StrictFibonacciNode<K, V>) {
        self.normalize(n);
        if !Self::is_active(n) {
            return;
        }
        match (*n).kind {
            ACTIVE_ROOT => self.fix_detach(ROOT_LIST, n),
            ACTIVE_LOSS => self.fix_detach(LOSS_LIST, n),
            _ => {}
        }
        (*n).kind = PASSIVE;
        (*n).loss = 0;
        let rec = (*n).active;
        (*n).active = ptr::null_mut();
        self.release_active(rec);
        let r = (*n).rank;
        (*n).rank = ptr::null_mut();
        if !r.is_null() {
            self.release_rank(r);
        }

        // Former active children lose their active parent.
        let first = (*n).left_child;
        if !first.is_null() {
            let mut c = first;
            loop {
                let next = (*c).right;
                self.normalize(c);
                if Self::is_active(c) && (*c).kind != ACTIVE_ROOT {
                    self.convert_to_active_root(c);
                }
                c = next;
                if c == first {
                    break;
                }
            }
        }
    }

    /// Turn a plain active (or loss) node into an active root.
    unsafe fn convert_to_active_root(&mut self, n: *mut StrictFibonacciNode<K, V>) {
        if (*n).kind == ACTIVE_LOSS {
            self.fix_detach(LOSS_LIST, n);
        }
        (*n).loss = 0;
        (*n).kind = ACTIVE_ROOT;
        self.fix_attach(ROOT_LIST, n);
    }

    /// Record a lost child on an active non-root node.
    unsafe fn add_loss(&mut self, n: *mut StrictFibonacciNode<K, V>) {
        self.normalize(n);
        if !Self::is_active(n) || (*n).kind == ACTIVE_ROOT {
            return;
        }
        (*n).loss += 1;
        if (*n).kind != ACTIVE_LOSS {
            (*n).kind = ACTIVE_LOSS;
            self.fix_attach(LOSS_LIST, n);
        } else {
            // Loss grew; the rank block may have become transformable.
            self.fix_retune(LOSS_LIST, (*(*n).fix).rank);
        }
    }

    /// The root's rightmost child, if passive; used after an active-root
    /// reduction.
    unsafe fn shed_rightmost_passive(&mut self, w: *mut StrictFibonacciNode<K, V>) {
        let first = (*w).left_child;
        if first.is_null() {
            return;
        }
        let last = (*first).left;
        self.normalize(last);
        if !Self::is_active(last) {
            self.cut(last);
            self.link(last, self.root);
        }
    }

    // -------------------------------------------------------------------
    // Reductions
    // -------------------------------------------------------------------

    /// Whether `a` lies on `b`'s parent path.
    unsafe fn is_above(
        a: *mut StrictFibonacciNode<K, V>,
        b: *mut StrictFibonacciNode<K, V>,
    ) -> bool {
        let mut cur = (*b).parent;
        while !cur.is_null() {
            if cur == a {
                return true;
            }
            cur = (*cur).parent;
        }
        false
    }

    unsafe fn active_root_reduction(&mut self) -> bool {
        let front = self.fix[ROOT_LIST];
        if front.is_null() {
            return false;
        }
        let rec = (*front).rank;
        if !Self::rank_transformable(rec, ROOT_LIST) {
            return false;
        }
        let f1 = (*rec).head[ROOT_LIST];
        let f2 = (*f1).next;
        let (x, y) = ((*f1).node, (*f2).node);
        let (w, l) = if (*y).key < (*x).key { (y, x) } else { (x, y) };
        if Self::is_above(l, w) {
            // Linking would fold the winner's subtree into itself.
            return false;
        }

        // The loser hangs under the winner and stops being a root.
        self.cut(l);
        self.fix_detach(ROOT_LIST, l);
        (*l).kind = ACTIVE;
        self.link(l, w);

        let up = self.rank_above((*w).rank);
        self.set_rank(w, up, ROOT_LIST);
        self.shed_rightmost_passive(w);
        true
    }

    unsafe fn root_degree_reduction(&mut self) -> bool {
        if self.root.is_null() {
            return false;
        }
        let first = (*self.root).left_child;
        if first.is_null() {
            return false;
        }
        // The three rightmost children, all of which must be passive.
        let c = (*first).left;
        let b = (*c).left;
        let a = (*b).left;
        if c == b || b == a || a == c {
            return false;
        }
        for &n in &[a, b, c] {
            self.normalize(n);
            if Self::is_active(n) {
                return false;
            }
        }
        // Order the three by key: grand <= parent <= child.
        let mut v = [a, b, c];
        if (*v[1]).key < (*v[0]).key {
            v.swap(0, 1);
        }
        if (*v[2]).key < (*v[1]).key {
            v.swap(1, 2);
            if (*v[1]).key < (*v[0]).key {
                v.swap(0, 1);
            }
        }
        let [grand, parent, child] = v;

        self.cut(child);
        self.cut(parent);
        self.cut(grand);

        // Convert the upper two to active before relinking so the child
        // rings keep active nodes on the left.
        let rec = self.active_record();
        (*parent).active = Self::retain_active(rec);
        (*parent).kind = ACTIVE;
        (*parent).loss = 0;
        let r0 = self.rank_zero();
        (*parent).rank = Self::retain_rank(r0);

        let rec = self.active_record();
        (*grand).active = Self::retain_active(rec);
        (*grand).kind = ACTIVE;
        (*grand).loss = 0;
        let r0 = self.rank_zero();
        let r1 = self.rank_above(r0);
        (*grand).rank = Self::retain_rank(r1);

        self.link(child, parent);
        self.link(parent, grand);
        self.link(grand, self.root);
        // An active child of the passive root is an active root; any
        // active roots the promoted nodes already held stop being roots
        // now that their parent is active.
        self.convert_to_active_root(grand);
        self.demote_active_root_children(parent);
        self.demote_active_root_children(grand);
        true
    }

    unsafe fn demote_active_root_children(&mut self, p: *mut StrictFibonacciNode<K, V>) {
        let first = (*p).left_child;
        if first.is_null() {
            return;
        }
        let mut c = first;
        loop {
            if Self::is_active(c) && (*c).kind == ACTIVE_ROOT {
                self.fix_detach(ROOT_LIST, c);
                (*c).kind = ACTIVE;
            }
            c = (*c).right;
            if c == first {
                break;
            }
        }
    }

    unsafe fn loss_reduction(&mut self) -> bool {
        let front = self.fix[LOSS_LIST];
        if front.is_null() {
            return false;
        }
        let rec = (*front).rank;
        if !Self::rank_transformable(rec, LOSS_LIST) {
            return false;
        }
        let f1 = (*rec).head[LOSS_LIST];
        let x = (*f1).node;
        if (*x).loss > 1 {
            // One-node reduction: hoist under the root.
            let p = (*x).parent;
            self.cut(x);
            (*x).loss = 0;
            self.link(x, self.root);
            self.convert_to_active_root(x);
            self.add_loss(p);
            return true;
        }
        // Two-node reduction: both have loss one and equal rank.
        let f2 = (*f1).next;
        let y = (*f2).node;
        let (w, l) = if (*y).key < (*x).key { (y, x) } else { (x, y) };
        if Self::is_above(l, w) {
            return false;
        }
        let pl = (*l).parent;
        self.cut(l);
        (*l).loss = 0;
        self.fix_detach(LOSS_LIST, l);
        (*l).kind = ACTIVE;
        (*w).loss = 0;
        self.fix_detach(LOSS_LIST, w);
        (*w).kind = ACTIVE;
        self.link(l, w);
        let up = self.rank_above((*w).rank);
        self.set_rank(w, up, LOSS_LIST);
        self.add_loss(pl);
        true
    }

    /// Reduction tail shared by insert and meld.
    unsafe fn post_meld_reduce(&mut self) {
        self.loss_reduction();
        if !self.active_root_reduction() {
            self.root_degree_reduction();
        }
        self.garbage_collect();
    }

    unsafe fn post_decrease_reduce(&mut self) {
        self.loss_reduction();
        for _ in 0..6 {
            if !self.active_root_reduction() {
                break;
            }
        }
        for _ in 0..4 {
            if !self.root_degree_reduction() {
                break;
            }
        }
        self.garbage_collect();
    }

    unsafe fn post_delete_reduce(&mut self) {
        loop {
            if self.active_root_reduction() {
                continue;
            }
            if self.root_degree_reduction() {
                continue;
            }
            break;
        }
        self.garbage_collect();
    }

    /// Drain at most one retired fix node.
    unsafe fn garbage_collect(&mut self) {
        let f = self.garbage;
        if f.is_null() {
            return;
        }
        self.garbage = (*f).next;
        if self.garbage == f {
            self.garbage = ptr::null_mut();
        }
        log::trace!("strict fibonacci heap: draining one retired fix node");
        let n = (*f).node;
        if !n.is_null() && (*n).fix == f {
            (*n).fix = ptr::null_mut();
        }
        let rec = (*f).rank;
        if !rec.is_null() {
            self.release_rank(rec);
        }
        self.map.free(FIX_KIND, f.cast());
    }

    /// Push a whole circular fix list onto the garbage chain.
    unsafe fn retire_fix_list(&mut self, head: *mut FixNode<K, V>) {
        if head.is_null() {
            return;
        }
        // Break the circle into a null-terminated chain via next.
        let mut cur = head;
        loop {
            let next = (*cur).next;
            (*cur).next = if next == head { self.garbage } else { next };
            if next == head {
                break;
            }
            cur = next;
        }
        self.garbage = head;
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item> PriorityQueue<'m, M, K, V>
    for StrictFibonacciHeap<'m, M, K, V>
{
    type Handle = *mut StrictFibonacciNode<K, V>;

    fn node_sizes() -> Vec<usize> {
        vec![
            size_of::<StrictFibonacciNode<K, V>>(),
            size_of::<FixNode<K, V>>(),
            size_of::<ActiveRecord>(),
            size_of::<RankRecord<K, V>>(),
        ]
    }

    fn new(map: &'m M) -> Self {
        Self {
            map,
            root: ptr::null_mut(),
            q_head: ptr::null_mut(),
            fix: [ptr::null_mut(); 2],
            active: ptr::null_mut(),
            ranks: ptr::null_mut(),
            garbage: ptr::null_mut(),
            size: 0,
        }
    }

    fn clear(&mut self) {
        unsafe {
            // Free the tree.
            let mut stack = Vec::new();
            if !self.root.is_null() {
                stack.push(self.root);
            }
            while let Some(n) = stack.pop() {
                let first = (*n).left_child;
                if !first.is_null() {
                    let mut c = first;
                    loop {
                        stack.push(c);
                        c = (*c).right;
                        if c == first {
                            break;
                        }
                    }
                }
                if !(*n).active.is_null() {
                    let rec = (*n).active;
                    self.release_active(rec);
                }
                if !(*n).rank.is_null() {
                    let rec = (*n).rank;
                    self.release_rank(rec);
                }
                self.map.free(NODE_KIND, n.cast());
            }
            // Free fix lists and the garbage chain.
            for list in 0..2 {
                let head = self.fix[list];
                self.fix[list] = ptr::null_mut();
                if !head.is_null() {
                    let mut cur = head;
                    loop {
                        let next = (*cur).next;
                        let rec = (*cur).rank;
                        if !rec.is_null() {
                            (*rec).head = [ptr::null_mut(); 2];
                            (*rec).tail = [ptr::null_mut(); 2];
                            self.release_rank(rec);
                        }
                        self.map.free(FIX_KIND, cur.cast());
                        if next == head {
                            break;
                        }
                        cur = next;
                    }
                }
            }
            let mut g = self.garbage;
            self.garbage = ptr::null_mut();
            while !g.is_null() {
                let next = (*g).next;
                if !(*g).rank.is_null() {
                    self.release_rank((*g).rank);
                }
                self.map.free(FIX_KIND, g.cast());
                g = next;
            }
            // Free surviving rank records.
            let mut r = self.ranks;
            self.ranks = ptr::null_mut();
            while !r.is_null() {
                let next = (*r).inc;
                self.map.free(RANK_KIND, r.cast());
                r = next;
            }
            if !self.active.is_null() {
                let rec = self.active;
                self.active = ptr::null_mut();
                self.release_active(rec);
            }
        }
        self.root = ptr::null_mut();
        self.q_head = ptr::null_mut();
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
        let node: *mut StrictFibonacciNode<K, V> = self.map.alloc(NODE_KIND).cast();
        // SAFETY: node is a fresh zeroed block; a zeroed node is passive
        unsafe {
            (*node).key = key;
            (*node).item = item;
            (*node).left = node;
            (*node).right = node;
            if self.root.is_null() {
                self.root = node;
            } else if key < (*self.root).key {
                let old = self.root;
                self.root = node;
                self.link(old, node);
                self.enqueue(old);
            } else {
                self.link(node, self.root);
                self.enqueue(node);
            }
            self.size += 1;
            self.post_meld_reduce();
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
        unsafe {
            let old = self.root;
            let key = (*old).key;

            if (*old).left_child.is_null() {
                self.map.free(NODE_KIND, old.cast());
                self.root = ptr::null_mut();
                self.size -= 1;
                self.garbage_collect();
                return Some(key);
            }

            // Scan the children for the new root.
            let first = (*old).left_child;
            let mut min = first;
            let mut c = (*first).right;
            while c != first {
                if (*c).key < (*min).key {
                    min = c;
                }
                c = (*c).right;
            }

            self.dequeue_node(min);
            self.cut(min);
            self.make_passive(min);

            // Hand the old root's remaining children to the new root.
            while !(*old).left_child.is_null() {
                let c = (*old).left_child;
                self.cut(c);
                self.link(c, min);
                self.normalize(c);
                if Self::is_active(c) && (*c).kind != ACTIVE_ROOT {
                    // Its parent is now the passive root.
                    self.convert_to_active_root(c);
                }
            }
            self.root = min;
            self.map.free(NODE_KIND, old.cast());
            self.size -= 1;

            // Consume two nodes from Q, surfacing up to two leftmost
            // passive children of each.
            let mut kids = Vec::new();
            for _ in 0..2 {
                let n = self.q_head;
                if n.is_null() {
                    break;
                }
                // Advancing the head cycles n to the back of Q.
                self.q_head = (*n).q_next;
                kids.clear();
                let first = (*n).left_child;
                if !first.is_null() {
                    let mut c = first;
                    loop {
                        kids.push(c);
                        c = (*c).right;
                        if c == first {
                            break;
                        }
                    }
                }
                let mut moved = 0;
                for &c in &kids {
                    self.normalize(c);
                    if !Self::is_active(c) {
                        self.cut(c);
                        self.link(c, self.root);
                        self.add_loss(n);
                        moved += 1;
                        if moved == 2 {
                            break;
                        }
                    }
                }
            }

            self.post_delete_reduce();
            Some(key)
        }
    }

    unsafe fn delete(&mut self, node: Self::Handle) -> K {
        let key = (*node).key;
        if node == self.root {
            self.delete_min().expect("queue held a live node");
            return key;
        }
        // Pull the node up to the root position, then remove it the way
        // delete_min removes the minimum.
        self.normalize(node);
        let was_active = Self::is_active(node);
        let p = (*node).parent;
        self.cut(node);
        self.make_passive(node);
        if was_active {
            self.add_loss(p);
        }
        self.dequeue_node(node);

        let old_root = self.root;
        self.root = node;
        self.link(old_root, node);
        self.enqueue(old_root);
        self.delete_min().expect("queue held a live node");
        key
    }

    unsafe fn decrease_key(&mut self, node: Self::Handle, key: K) {
        (*node).key = key;
        if node == self.root {
            self.garbage_collect();
            return;
        }
        self.normalize(node);
        let p = (*node).parent;
        if !(key < (*self.root).key) && !((*node).key < (*p).key) {
            // Still in order where it sits.
            self.garbage_collect();
            return;
        }
        self.cut(node);
        if Self::is_active(node) && Self::is_active(p) && (*p).kind != ACTIVE_ROOT {
            self.add_loss(p);
        }
        if key < (*self.root).key {
            // The node takes over the root position.
            let old = self.root;
            self.dequeue_node(node);
            self.make_passive(node);
            self.root = node;
            self.link(old, node);
            self.enqueue(old);
        } else {
            self.link(node, self.root);
            if Self::is_active(node) && (*node).kind != ACTIVE_ROOT {
                self.convert_to_active_root(node);
            }
        }
        self.post_decrease_reduce();
    }
}

impl<'m, M: MemoryMap, K: Key, V: Item> Meldable<'m, M, K, V> for StrictFibonacciHeap<'m, M, K, V> {
    fn meld(a: Self, b: Self) -> Self {
        assert!(
            ptr::eq(a.map, b.map),
            "melded queues must share a memory map"
        );
        // The smaller heap goes passive wholesale.
        let (mut big, small) = if a.size >= b.size { (a, b) } else { (b, a) };
        let mut small = ManuallyDrop::new(small);
        // SAFETY: small's nodes are absorbed into big; small never drops
        unsafe {
            if !small.active.is_null() {
                (*small.active).flag = 0;
                let rec = small.active;
                small.active = ptr::null_mut();
                big.release_active(rec);
            }
            // Retire the passive heap's fix machinery.
            let fix0 = small.fix[ROOT_LIST];
            let fix1 = small.fix[LOSS_LIST];
            small.fix = [ptr::null_mut(); 2];
            big.retire_fix_list(fix0);
            big.retire_fix_list(fix1);
            let mut g = small.garbage;
            small.garbage = ptr::null_mut();
            while !g.is_null() {
                let next = (*g).next;
                (*g).next = big.garbage;
                big.garbage = g;
                g = next;
            }
            // Rank records of the passive heap die as their refs drain;
            // hand the chain's ownership over by forgetting the head
            // (records free individually through release_rank).
            small.ranks = ptr::null_mut();

            // Splice Qs.
            if big.q_head.is_null() {
                big.q_head = small.q_head;
            } else if !small.q_head.is_null() {
                let bh = big.q_head;
                let sh = small.q_head;
                let bt = (*bh).q_prev;
                let st = (*sh).q_prev;
                (*bt).q_next = sh;
                (*sh).q_prev = bt;
                (*st).q_next = bh;
                (*bh).q_prev = st;
            }

            // Link the roots; the loser joins Q.
            if big.root.is_null() {
                big.root = small.root;
            } else if !small.root.is_null() {
                let (w, l) = if (*small.root).key < (*big.root).key {
                    (small.root, big.root)
                } else {
                    (big.root, small.root)
                };
                big.root = w;
                big.link(l, w);
                big.enqueue(l);
            }
            big.size += small.size;
            big.post_meld_reduce();
        }
        big
    }
}

impl<M: MemoryMap, K: Key, V: Item> Drop for StrictFibonacciHeap<'_, M, K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::LazyMap;

    type Heap<'m> = StrictFibonacciHeap<'m, LazyMap, u64, u32>;

    fn validate(h: &Heap<'_>) {
        unsafe {
            if h.root.is_null() {
                assert_eq!(h.size, 0);
                return;
            }
            assert!((*h.root).parent.is_null());
            let mut count = 0;
            let mut stack = vec![h.root];
            while let Some(n) = stack.pop() {
                count += 1;
                let first = (*n).left_child;
                if first.is_null() {
                    continue;
                }
                let mut c = first;
                loop {
                    assert_eq!((*c).parent, n, "broken parent pointer");
                    assert_eq!((*(*c).right).left, c, "broken sibling ring");
                    // Transient violations settle before the op returns.
                    assert!(!((*c).key < (*n).key), "heap property violated");
                    stack.push(c);
                    c = (*c).right;
                    if c == first {
                        break;
                    }
                }
            }
            assert_eq!(count, h.size, "node count out of sync");

            // Fix-list sanity: ROOT entries are active roots, LOSS
            // entries carry positive loss, and transformability matches
            // the head/tail predicate.
            for list in 0..2 {
                let head = h.fix[list];
                if head.is_null() {
                    continue;
                }
                let mut f = head;
                loop {
                    let n = (*f).node;
                    assert_eq!((*n).fix, f, "fix back-reference broken");
                    assert!(
                        StrictFibonacciHeap::<LazyMap, u64, u32>::is_active(n),
                        "fix node for a passive node"
                    );
                    if list == ROOT_LIST {
                        assert_eq!((*n).kind, ACTIVE_ROOT);
                        assert_eq!((*n).loss, 0);
                    } else {
                        assert_eq!((*n).kind, ACTIVE_LOSS);
                        assert!((*n).loss > 0);
                    }
                    let rec = (*f).rank;
                    assert_eq!(
                        (*rec).transformable[list],
                        (*rec).head[list] != (*rec).tail[list]
                            || (list == LOSS_LIST
                                && (*(*(*rec).head[list]).node).loss > 1),
                        "transformable flag out of sync"
                    );
                    f = (*f).next;
                    if f == head {
                        break;
                    }
                }
            }
        }
    }

    fn drain(h: &mut Heap<'_>) -> Vec<u64> {
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
        let mut h: Heap<'_> = StrictFibonacciHeap::new(&map);
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
        let mut h: Heap<'_> = StrictFibonacciHeap::new(&map);
        let keys: Vec<u64> = (0..300).map(|i| (i * 8837 + 3) % 9001).collect();
        for &k in &keys {
            h.insert(k as u32, k);
            validate(&h);
        }
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(drain(&mut h), sorted);
    }

    #[test]
    fn test_decrease_key() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = StrictFibonacciHeap::new(&map);
        let handles: Vec<_> = (0..64u64).map(|k| h.insert(k as u32, k + 100)).collect();
        assert_eq!(h.delete_min(), Some(100));
        validate(&h);
        unsafe {
            h.decrease_key(handles[50], 7);
            validate(&h);
            assert_eq!(h.key(h.find_min().unwrap()), 7);
            h.decrease_key(handles[63], 1);
            validate(&h);
            assert_eq!(h.key(h.find_min().unwrap()), 1);
            assert_eq!(h.item(h.find_min().unwrap()), 63);
        }
        assert_eq!(h.delete_min(), Some(1));
        validate(&h);
        assert_eq!(h.delete_min(), Some(7));
    }

    #[test]
    fn test_repeated_decreases_build_loss() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = StrictFibonacciHeap::new(&map);
        let handles: Vec<_> = (0..128u64).map(|k| h.insert(k as u32, k + 1000)).collect();
        for _ in 0..8 {
            h.delete_min();
            validate(&h);
        }
        unsafe {
            for (i, &n) in handles.iter().enumerate().skip(64) {
                h.decrease_key(n, i as u64);
                validate(&h);
            }
        }
        let out = drain(&mut h);
        let mut expect: Vec<u64> = (64..128).collect();
        expect.extend((1008..1064).map(|k| k as u64));
        assert_eq!(out, expect);
    }

    #[test]
    fn test_arbitrary_delete() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = StrictFibonacciHeap::new(&map);
        let handles: Vec<_> = (0..48u64).map(|k| h.insert(k as u32, k)).collect();
        assert_eq!(h.delete_min(), Some(0));
        unsafe {
            assert_eq!(h.delete(handles[30]), 30);
            validate(&h);
            assert_eq!(h.delete(handles[1]), 1);
            validate(&h);
        }
        let expect: Vec<u64> = (2..48).filter(|&k| k != 30).collect();
        assert_eq!(drain(&mut h), expect);
    }

    #[test]
    fn test_meld() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut a: Heap<'_> = StrictFibonacciHeap::new(&map);
        let mut b: Heap<'_> = StrictFibonacciHeap::new(&map);
        for k in 0..30u64 {
            a.insert(k as u32, k * 2);
        }
        for k in 0..10u64 {
            b.insert(k as u32, k * 2 + 1);
        }
        let mut merged = StrictFibonacciHeap::meld(a, b);
        validate(&merged);
        assert_eq!(merged.size(), 40);
        let out = drain(&mut merged);
        let mut expect: Vec<u64> = (0..30).map(|k| k * 2).collect();
        expect.extend((0..10).map(|k| k * 2 + 1));
        expect.sort_unstable();
        assert_eq!(out, expect);
    }

    #[test]
    fn test_meld_then_operate() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut a: Heap<'_> = StrictFibonacciHeap::new(&map);
        let mut b: Heap<'_> = StrictFibonacciHeap::new(&map);
        let mut probes = Vec::new();
        for k in 0..20u64 {
            a.insert(k as u32, k + 100);
            probes.push(b.insert(k as u32, k + 200));
        }
        let mut merged = StrictFibonacciHeap::meld(a, b);
        validate(&merged);
        unsafe {
            // Handles from the absorbed (passive) heap stay valid.
            merged.decrease_key(probes[10], 5);
            validate(&merged);
            assert_eq!(merged.key(merged.find_min().unwrap()), 5);
            assert_eq!(merged.delete(probes[3]), 203);
            validate(&merged);
        }
        assert_eq!(merged.delete_min(), Some(5));
        validate(&merged);
        assert_eq!(merged.size(), 37);
    }

    #[test]
    fn test_clear() {
        let map = LazyMap::new(&Heap::node_sizes());
        let mut h: Heap<'_> = StrictFibonacciHeap::new(&map);
        for k in 0..50u64 {
            h.insert(k as u32, k);
        }
        for _ in 0..10 {
            h.delete_min();
        }
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.find_min(), None);
        h.insert(4, 4);
        assert_eq!(h.delete_min(), Some(4));
    }
}
