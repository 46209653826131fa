//! # Heap Kit
//!
//! A benchmarking library of mutable addressable priority queues with a
//! unified operational contract, supporting reproducible head-to-head
//! comparison of heap algorithms on identical workloads.
//!
//! All queues implement the same trait, consume the same external node
//! allocator, and can replay the same recorded workload, so measured
//! differences come from the algorithms and not from memory management or
//! driver plumbing.
//!
//! ## Module Organization
//!
//! ### Foundation
//! - [`bits`] - Word-level helpers for registry bitmasks
//! - [`mem`] - Node storage maps (naive, lazy, eager)
//! - [`queue`] - The [`PriorityQueue`](queue::PriorityQueue) and
//!   [`Meldable`](queue::Meldable) traits
//!
//! ### Queue Implementations
//! - [`implicit`] - Implicit d-ary heap over a contiguous array
//! - [`explicit`] - Pointer-linked d-ary heap
//! - [`binomial`] - Binomial queue with a per-rank root registry
//! - [`fibonacci`] - Fibonacci heap with cascading cuts
//! - [`pairing`] - Pairing heap with iterative two-pass collapse
//! - [`quake`] - Quake heap (tournament trees with decay pruning)
//! - [`rank_pairing`] - Rank-pairing heap (half-tree forest)
//! - [`rank_relaxed_weak`] - Rank-relaxed weak queue (root and mark
//!   registries)
//! - [`strict_fibonacci`] - Strict Fibonacci heap (worst-case bounds via
//!   fix lists and bounded reductions)
//! - [`violation`] - Violation heap (two roots per rank, triple joins)
//!
//! ### Trace I/O
//! - [`trace`] - Binary operation-trace reader and writer
//!
//! ## Build-time selection
//!
//! Cargo features pick which queue and which allocator the [`Pq`] and
//! [`DefaultMap`] aliases resolve to, mirroring a build-flag selected
//! benchmark binary. Every implementation is always compiled and usable
//! directly; the features only steer the aliases.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// =============================================================================
// Foundation
// =============================================================================

/// Word-level helpers for registry bitmasks.
pub mod bits;

/// Node storage maps.
pub mod mem;

/// The common priority-queue contract.
pub mod queue;

// =============================================================================
// Queue implementations
// =============================================================================

/// Implicit d-ary heap over a contiguous array.
pub mod implicit;

/// Pointer-linked d-ary heap.
pub mod explicit;

/// Binomial queue.
pub mod binomial;

/// Fibonacci heap.
pub mod fibonacci;

/// Pairing heap.
pub mod pairing;

/// Quake heap.
pub mod quake;

/// Rank-pairing heap.
pub mod rank_pairing;

/// Rank-relaxed weak queue.
pub mod rank_relaxed_weak;

/// Strict Fibonacci heap.
pub mod strict_fibonacci;

/// Violation heap.
pub mod violation;

// =============================================================================
// Trace I/O
// =============================================================================

/// Binary operation-trace reader and writer.
pub mod trace;

pub use queue::{ItemType, KeyType, Meldable, PriorityQueue, MAX_RANK};

cfg_if::cfg_if! {
    if #[cfg(feature = "alloc-naive")] {
        /// The build-selected node map.
        pub type DefaultMap = mem::NaiveMap;
    } else if #[cfg(feature = "alloc-eager")] {
        /// The build-selected node map.
        pub type DefaultMap = mem::EagerMap;
    } else {
        /// The build-selected node map.
        pub type DefaultMap = mem::LazyMap;
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "pq-explicit-2")] {
        /// The build-selected queue.
        pub type Pq<'m> = explicit::ExplicitHeap<'m, DefaultMap, KeyType, ItemType, 2>;
    } else if #[cfg(feature = "pq-explicit-4")] {
        /// The build-selected queue.
        pub type Pq<'m> = explicit::ExplicitHeap<'m, DefaultMap, KeyType, ItemType, 4>;
    } else if #[cfg(feature = "pq-explicit-8")] {
        /// The build-selected queue.
        pub type Pq<'m> = explicit::ExplicitHeap<'m, DefaultMap, KeyType, ItemType, 8>;
    } else if #[cfg(feature = "pq-explicit-16")] {
        /// The build-selected queue.
        pub type Pq<'m> = explicit::ExplicitHeap<'m, DefaultMap, KeyType, ItemType, 16>;
    } else if #[cfg(feature = "pq-fibonacci")] {
        /// The build-selected queue.
        pub type Pq<'m> = fibonacci::FibonacciHeap<'m, DefaultMap, KeyType, ItemType>;
    } else if #[cfg(feature = "pq-implicit-2")] {
        /// The build-selected queue.
        pub type Pq<'m> = implicit::ImplicitHeap<'m, DefaultMap, KeyType, ItemType, 2>;
    } else if #[cfg(feature = "pq-implicit-4")] {
        /// The build-selected queue.
        pub type Pq<'m> = implicit::ImplicitHeap<'m, DefaultMap, KeyType, ItemType, 4>;
    } else if #[cfg(feature = "pq-implicit-8")] {
        /// The build-selected queue.
        pub type Pq<'m> = implicit::ImplicitHeap<'m, DefaultMap, KeyType, ItemType, 8>;
    } else if #[cfg(feature = "pq-implicit-16")] {
        /// The build-selected queue.
        pub type Pq<'m> = implicit::ImplicitHeap<'m, DefaultMap, KeyType, ItemType, 16>;
    } else if #[cfg(feature = "pq-pairing")] {
        /// The build-selected queue.
        pub type Pq<'m> = pairing::PairingHeap<'m, DefaultMap, KeyType, ItemType>;
    } else if #[cfg(feature = "pq-quake")] {
        /// The build-selected queue.
        pub type Pq<'m> = quake::QuakeHeap<'m, DefaultMap, KeyType, ItemType>;
    } else if #[cfg(feature = "pq-rank-pairing")] {
        /// The build-selected queue.
        pub type Pq<'m> = rank_pairing::RankPairingHeap<'m, DefaultMap, KeyType, ItemType>;
    } else if #[cfg(feature = "pq-rank-relaxed-weak")] {
        /// The build-selected queue.
        pub type Pq<'m> = rank_relaxed_weak::RankRelaxedWeakQueue<'m, DefaultMap, KeyType, ItemType>;
    } else if #[cfg(feature = "pq-strict-fibonacci")] {
        /// The build-selected queue.
        pub type Pq<'m> = strict_fibonacci::StrictFibonacciHeap<'m, DefaultMap, KeyType, ItemType>;
    } else if #[cfg(feature = "pq-violation")] {
        /// The build-selected queue.
        pub type Pq<'m> = violation::ViolationHeap<'m, DefaultMap, KeyType, ItemType>;
    } else {
        /// The build-selected queue.
        pub type Pq<'m> = binomial::BinomialQueue<'m, DefaultMap, KeyType, ItemType>;
    }
}

/// Node handle of the build-selected queue.
pub type PqNode<'m> = <Pq<'m> as PriorityQueue<'m, DefaultMap, KeyType, ItemType>>::Handle;
