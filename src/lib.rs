#![no_std]

//! A boundary-tag heap allocator.
//!
//! Memory is drawn from a contiguous, monotonically-growing data segment (the
//! classic `sbrk` model) in page-granular chunks. Each chunk is bracketed by
//! zero-payload *fencepost* blocks, and every block carries a two-word header:
//! its payload size with the state packed into the low bits, and the payload
//! size of its physical left neighbour. That boundary tag makes both
//! neighbours reachable in O(1), so freed blocks coalesce eagerly and
//! adjacent chunks are stitched together by dissolving the fencepost pair
//! between them.
//!
//! Free blocks are tracked on a doubly-linked list threaded through their own
//! payloads, searched first-fit (or best-fit with the `best_fit` feature).
//!
//! The crate exposes three layers:
//!
//! - [`RawHeap`](heap/struct.RawHeap.html): the single-threaded core over any
//!   [`SegmentSource`](segment/trait.SegmentSource.html);
//! - [`GenericAllocator`](heap/struct.GenericAllocator.html): a spin-locked,
//!   lazily-initialized wrapper suitable for a `static`;
//! - [`UnixAllocator`](heap/struct.UnixAllocator.html) (feature `use_libc`):
//!   the real thing over `sbrk`, implementing `GlobalAlloc`.
//!
//! For poking at the heap there are [`ToySegment`](segment/struct.ToySegment.html),
//! an in-memory segment for tests, and the debug walkers
//! [`dump_heap`](heap/struct.RawHeap.html#method.dump_heap) and
//! [`dump_free_list`](heap/struct.RawHeap.html#method.dump_free_list).

pub mod freelist;
pub mod header;
pub mod heap;
pub mod segment;

#[cfg(feature = "use_libc")]
pub use heap::UnixAllocator;
pub use heap::{GenericAllocator, RawHeap, Stats, Validity, ARENA_SIZE};
#[cfg(feature = "use_libc")]
pub use segment::SbrkSegment;
pub use segment::{SegmentSource, ToySegment};
