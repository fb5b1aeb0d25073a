//! The heap proper: block management, arena growth, and the public
//! allocation surface.
//!
//! ## Types
//!
//! ### [`RawHeap`](struct.RawHeap.html)
//!
//! A `RawHeap` is the single-threaded core. It owns a
//! [`SegmentSource`](../segment/trait.SegmentSource.html), the free list, and
//! the bookkeeping pointers (original break, newest right fencepost, expected
//! break). Not thread-safe on its own.
//!
//! ### [`GenericAllocator`](struct.GenericAllocator.html)
//!
//! Wraps a `RawHeap` in a spin lock with one-time lazy initialization, so it
//! can live in a `static`. Every public operation takes the lock for its full
//! duration.
//!
//! ### [`UnixAllocator`](struct.UnixAllocator.html)
//!
//! A `GenericAllocator` over the real data segment, implementing
//! `core::alloc::GlobalAlloc` (feature `use_libc`).

use core::cmp;
use core::fmt;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU8, Ordering};

use spin::{Mutex, MutexGuard};

use crate::freelist::FreeList;
use crate::header::{Block, BlockState, ALIGNMENT, HEADER_SIZE, MIN_PAYLOAD, SPLIT_THRESHOLD};
use crate::segment::SegmentSource;
#[cfg(feature = "use_libc")]
use crate::segment::SbrkSegment;

#[cfg(feature = "use_libc")]
use core::alloc::{GlobalAlloc, Layout};

/// Granularity of segment growth. Chunk sizes are rounded up to a multiple
/// of this.
pub const ARENA_SIZE: usize = 4096;

// Round up value to the nearest multiple of increment
fn round_up(value: usize, increment: usize) -> usize {
    if value == 0 {
        return 0;
    }
    increment * ((value - 1) / increment + 1)
}

fn out_of_memory<T>() -> Option<T> {
    #[cfg(feature = "use_libc")]
    errno::set_errno(errno::Errno(libc::ENOMEM));
    None
}

/// Counts of invariant violations found by [`RawHeap::stats`]. All zeroes
/// means the heap is coherent.
#[derive(Default, Debug)]
pub struct Validity {
    /// Blocks whose right neighbour's boundary tag disagrees with their size.
    pub broken_back_links: usize,
    /// Pairs of physically adjacent blocks that are both free.
    pub adjacent_free_pairs: usize,
    /// Blocks in the free state that the free list does not contain.
    pub stray_free_blocks: usize,
    /// Free-list members whose state is not free.
    pub listed_busy_blocks: usize,
    /// Blocks with a payload that is misaligned, undersized, or not a
    /// multiple of the alignment.
    pub misaligned_blocks: usize,
    /// Difference between the free-list length and the number of free blocks
    /// found by the physical walk.
    pub list_length_skew: usize,
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        self.broken_back_links == 0
            && self.adjacent_free_pairs == 0
            && self.stray_free_blocks == 0
            && self.listed_busy_blocks == 0
            && self.misaligned_blocks == 0
            && self.list_length_skew == 0
    }
}

impl From<Validity> for bool {
    fn from(v: Validity) -> bool {
        v.is_valid()
    }
}

#[derive(Default, Debug)]
pub struct Stats {
    /// Non-fencepost blocks in the heap.
    pub blocks: usize,
    pub free_blocks: usize,
    /// Total free payload bytes.
    pub free_bytes: usize,
    pub fenceposts: usize,
}

/// Iterator over every physical block between two header addresses.
pub struct HeapBlocks<'heap> {
    cur: *const u8,
    end: *const u8,
    _heap: PhantomData<&'heap ()>,
}

impl<'heap> Iterator for HeapBlocks<'heap> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.cur >= self.end {
            return None;
        }
        let block = unsafe { Block::from_header_ptr(NonNull::new_unchecked(self.cur as *mut u8)) };
        self.cur = unsafe { self.cur.add(HEADER_SIZE + block.size()) };
        Some(block)
    }
}

/// A heap of boundary-tagged blocks grown from a [`SegmentSource`].
///
/// Chunks obtained from the source are bracketed by zero-payload fencepost
/// blocks; physically adjacent chunks are stitched together by dissolving the
/// fencepost pair between them. Freed blocks coalesce eagerly with free
/// physical neighbours, so no two adjacent free blocks ever exist between
/// operations.
///
/// The heap hands out raw pointers into memory it manages, and the free list
/// threads through that same memory, so a `RawHeap` must not be moved once
/// the first allocation has been made. (This only matters for in-memory
/// sources like [`ToySegment`](../segment/struct.ToySegment.html); the real
/// segment does not live inside the struct.)
pub struct RawHeap<S> {
    pub source: S,
    free: FreeList,
    /// The break as it was before we ever grew the segment. Origin for
    /// walker offsets.
    heap_start: Option<NonNull<u8>>,
    /// Right fencepost of the most recently created chunk.
    last_fencepost: Option<Block>,
    /// Where the break should be if nobody else has moved it.
    expected_break: Option<NonNull<u8>>,
}

// The bookkeeping pointers only ever refer to memory owned by the heap, so
// the heap is as sendable as its source.
unsafe impl<S: Send> Send for RawHeap<S> {}

impl<S: SegmentSource + Default> Default for RawHeap<S> {
    fn default() -> Self {
        RawHeap::new(S::default())
    }
}

impl<S: SegmentSource> RawHeap<S> {
    pub fn new(source: S) -> Self {
        RawHeap {
            source,
            free: FreeList::new(),
            heap_start: None,
            last_fencepost: None,
            expected_break: None,
        }
    }

    /// The original segment break, once the first allocation has recorded it.
    pub fn heap_start(&self) -> Option<NonNull<u8>> {
        self.heap_start
    }

    pub fn free_list(&self) -> &FreeList {
        &self.free
    }

    /// Walk every physical block from the original break to the expected
    /// break. Empty if nothing has been allocated yet.
    pub fn heap_blocks(&self) -> HeapBlocks<'_> {
        let (cur, end) = match (self.heap_start, self.expected_break) {
            (Some(start), Some(end)) => (start.as_ptr() as *const u8, end.as_ptr() as *const u8),
            _ => (ptr::null(), ptr::null()),
        };
        HeapBlocks {
            cur,
            end,
            _heap: PhantomData,
        }
    }

    /// One-time startup: record the original break and check its alignment.
    ///
    /// Panics if the break is not 8-aligned; nothing the allocator could do
    /// would make the block arithmetic sound from a misaligned origin.
    fn init(&mut self) -> Option<()> {
        if self.heap_start.is_some() {
            return Some(());
        }
        let start = unsafe { self.source.extend(0)? };
        if start.as_ptr() as usize % ALIGNMENT != 0 {
            panic!("segment break {:p} is not {}-byte aligned", start, ALIGNMENT);
        }
        self.heap_start = Some(start);
        self.expected_break = Some(start);
        log::debug!("heap initialized, break at {:p}", start);
        Some(())
    }

    /// Request a fresh chunk big enough for a `size`-byte interior block plus
    /// two fenceposts, and lay it out. The interior block is returned free
    /// but not yet on the free list.
    unsafe fn create_chunk(&mut self, size: usize) -> Option<Block> {
        let total = round_up(size + 3 * HEADER_SIZE, ARENA_SIZE);

        // Somebody else moving the break invalidates our picture of where
        // chunks sit; refuse to grow until it is back where we left it.
        let expected = self.expected_break?;
        let current = self.source.extend(0)?;
        if current != expected {
            log::debug!(
                "segment break moved externally ({:p}, expected {:p}); refusing to grow",
                current,
                expected
            );
            return None;
        }

        let base = self.source.extend(total)?;
        if base.as_ptr() as usize % ALIGNMENT != 0 {
            return None;
        }
        self.expected_break = NonNull::new(base.as_ptr().add(total));
        log::debug!("grew segment by {} bytes at {:p}", total, base);

        let interior_size = total - 3 * HEADER_SIZE;

        let mut left_fence = Block::from_header_ptr(base);
        left_fence.set_size_and_state(0, BlockState::Fencepost);
        left_fence.set_prev_size(0);

        let mut interior = left_fence.right();
        interior.set_size_and_state(interior_size, BlockState::Free);
        interior.set_prev_size(0);

        let mut right_fence = interior.right();
        right_fence.set_size_and_state(0, BlockState::Fencepost);
        right_fence.set_prev_size(interior_size);

        Some(interior)
    }

    /// Try to stitch a fresh chunk onto the chunk created before it. Succeeds
    /// only if the two are physically adjacent, in which case the fencepost
    /// pair between them is dissolved and the combined block (including the
    /// previous chunk's tail block if it was free) is head-inserted.
    unsafe fn try_stitch(&mut self, interior: Block) -> bool {
        let last_fence = match self.last_fencepost {
            None => return false,
            Some(fence) => fence,
        };

        let left_fence = interior.left();
        let prev_right_fence = left_fence.left();
        if prev_right_fence != last_fence {
            return false;
        }

        let mut size = interior.size();
        let prev_tail = prev_right_fence.left();

        let mut merged;
        if prev_tail.state() == BlockState::Free {
            // The union starts at the tail and swallows it along with both
            // fenceposts. Pull it off the list so the merged block can be
            // re-inserted at the head.
            merged = prev_tail;
            size += prev_tail.size() + 3 * HEADER_SIZE;
            self.free.remove(merged);
        } else {
            // Only the fencepost pair is dissolved.
            merged = prev_right_fence;
            size += 2 * HEADER_SIZE;
            merged.set_prev_size(prev_tail.size());
        }

        merged.set_size_and_state(size, BlockState::Free);
        let mut right_fence = merged.right();
        right_fence.set_prev_size(size);
        self.last_fencepost = Some(right_fence);
        self.free.insert(merged);

        log::debug!("stitched chunk, merged free block of {} bytes", size);
        true
    }

    /// Grow the heap enough to satisfy a `size`-byte request and put the new
    /// space on the free list.
    unsafe fn grow(&mut self, size: usize) -> Option<()> {
        let interior = self.create_chunk(size)?;
        if !self.try_stitch(interior) {
            self.last_fencepost = Some(interior.right());
            self.free.insert(interior);
        }
        Some(())
    }

    /// Shrink `block` (free, already off the list) to `size` bytes and carve
    /// the rest into a new free block to its right.
    unsafe fn split(&mut self, mut block: Block, size: usize) {
        let old_size = block.size();
        block.set_size(size);

        let mut remainder = block.right();
        let remainder_size = old_size - size - HEADER_SIZE;
        remainder.set_size_and_state(remainder_size, BlockState::Free);
        remainder.set_prev_size(size);
        self.free.insert(remainder);

        let mut after = remainder.right();
        after.set_prev_size(remainder_size);
    }

    /// Merge a block that is becoming free with whichever physical
    /// neighbours are free, and make sure the result is on the free list.
    unsafe fn coalesce(&mut self, mut block: Block) {
        let left = block.left();
        let right = block.right();

        match (
            left.state() == BlockState::Free,
            right.state() == BlockState::Free,
        ) {
            (true, true) => {
                // Both sides fold into the left block, which keeps its list
                // position; only the right one comes off the list.
                let size = left.size() + block.size() + right.size() + 2 * HEADER_SIZE;
                self.free.remove(right);
                let mut merged = left;
                merged.set_size_and_state(size, BlockState::Free);
                let mut after = merged.right();
                after.set_prev_size(size);
            }
            (true, false) => {
                let size = left.size() + block.size() + HEADER_SIZE;
                let mut merged = left;
                merged.set_size_and_state(size, BlockState::Free);
                let mut after = merged.right();
                after.set_prev_size(size);
            }
            (false, true) => {
                // The block absorbs its right neighbour and takes over its
                // exact position on the list.
                let size = block.size() + right.size() + HEADER_SIZE;
                block.set_size_and_state(size, BlockState::Free);
                self.free.replace(right, block);
                let mut after = block.right();
                after.set_prev_size(size);
            }
            (false, false) => {
                block.set_state(BlockState::Free);
                self.free.insert(block);
            }
        }
    }

    /// Allocate `size` bytes of 8-aligned, uninitialized memory.
    ///
    /// Returns `None` on `size == 0`, on requests above `isize::MAX`, and
    /// when the segment cannot grow (out of memory, or the break was moved by
    /// someone else); the out-of-memory error code is set on the failure
    /// paths.
    ///
    /// # Safety
    ///
    /// The returned memory is owned by the caller until passed back to
    /// [`deallocate`](#method.deallocate); the heap must not be moved while
    /// any allocation is live.
    pub unsafe fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        if size > isize::MAX as usize {
            return out_of_memory();
        }
        if self.init().is_none() {
            return out_of_memory();
        }

        let size = round_up(cmp::max(size, MIN_PAYLOAD), ALIGNMENT);

        let mut block = match self.free.find(size) {
            Some(block) => block,
            None => {
                if self.grow(size).is_none() {
                    return out_of_memory();
                }
                match self.free.find(size) {
                    Some(block) => block,
                    None => return out_of_memory(),
                }
            }
        };

        self.free.remove(block);
        if block.size() - size >= SPLIT_THRESHOLD {
            self.split(block, size);
        }
        block.set_state(BlockState::Allocated);

        log::trace!("allocated {} bytes at {:p}", block.size(), block.payload());
        Some(block.payload())
    }

    /// Return a payload pointer to the heap. Null is a no-op.
    ///
    /// Panics if the block is already free.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer obtained from this heap's allocate,
    /// zeroed-allocate, or reallocate, not freed since.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8) {
        let ptr = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => return,
        };
        let block = Block::from_payload(ptr);
        if block.state() == BlockState::Free {
            panic!("double free detected at {:p}", ptr);
        }
        log::trace!("freeing {:p} ({} bytes)", ptr, block.size());
        self.coalesce(block);
    }

    /// Allocate `count * elem_size` bytes with every byte zeroed.
    ///
    /// Returns `None` if either argument is zero or their product overflows.
    ///
    /// # Safety
    ///
    /// Same contract as [`allocate`](#method.allocate).
    pub unsafe fn allocate_zeroed(&mut self, count: usize, elem_size: usize) -> Option<NonNull<u8>> {
        if count == 0 || elem_size == 0 {
            return None;
        }
        if usize::MAX / count < elem_size {
            return None;
        }
        let ptr = self.allocate(count * elem_size)?;
        // Zero the whole payload, which may be larger than what was asked
        // for once the size is normalised.
        let block = Block::from_payload(ptr);
        ptr::write_bytes(ptr.as_ptr(), 0, block.size());
        Some(ptr)
    }

    /// Resize an allocation, moving it. `reallocate(null, n)` allocates;
    /// `reallocate(p, 0)` frees and returns `None`. Otherwise the contents up
    /// to the smaller of the two payload sizes are preserved. On failure the
    /// original block is left untouched.
    ///
    /// # Safety
    ///
    /// Same contract as [`allocate`](#method.allocate) and
    /// [`deallocate`](#method.deallocate).
    pub unsafe fn reallocate(&mut self, ptr: *mut u8, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            self.deallocate(ptr);
            return None;
        }
        let old = match NonNull::new(ptr) {
            Some(old) => old,
            None => return self.allocate(size),
        };

        let old_size = Block::from_payload(old).size();
        let new = self.allocate(size)?;
        ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), cmp::min(old_size, size));
        self.deallocate(ptr);
        Some(new)
    }

    fn offset_of(&self, addr: *mut u8) -> usize {
        let start = self
            .heap_start
            .map_or(addr as usize, |start| start.as_ptr() as usize);
        addr as usize - start
    }

    fn dump_block(&self, out: &mut dyn fmt::Write, block: Block) -> fmt::Result {
        writeln!(out, "[{}]", block.state())?;
        writeln!(out, "  address:   {}", self.offset_of(block.addr()))?;
        writeln!(out, "  size:      {}", block.size())?;
        writeln!(out, "  prev_size: {}", block.prev_size())?;
        if block.state() == BlockState::Free {
            match block.prev_free() {
                None => writeln!(out, "  prev:      NULL")?,
                Some(prev) => writeln!(out, "  prev:      {}", self.offset_of(prev.addr()))?,
            }
            match block.next_free() {
                None => writeln!(out, "  next:      NULL")?,
                Some(next) => writeln!(out, "  next:      {}", self.offset_of(next.addr()))?,
            }
        }
        Ok(())
    }

    /// Print every physical block between `start` and `end` (header
    /// addresses), defaulting to the whole heap. Read-only.
    pub fn dump_heap(
        &self,
        out: &mut dyn fmt::Write,
        start: Option<NonNull<u8>>,
        end: Option<NonNull<u8>>,
    ) -> fmt::Result {
        let start = start.or(self.heap_start);
        let end = end.or(self.expected_break);
        let (start, end) = match (start, end) {
            (Some(start), Some(end)) => (start, end),
            _ => return Ok(()),
        };

        let walker = HeapBlocks {
            cur: start.as_ptr() as *const u8,
            end: end.as_ptr() as *const u8,
            _heap: PhantomData,
        };
        let mut first = true;
        for block in walker {
            if !first {
                writeln!(out, "-----------------")?;
            }
            first = false;
            self.dump_block(out, block)?;
        }
        Ok(())
    }

    /// Print the free list head to tail. Read-only.
    pub fn dump_free_list(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mut first = true;
        for block in self.free.iter() {
            if !first {
                writeln!(out, "-----------------")?;
            }
            first = false;
            self.dump_block(out, block)?;
        }
        Ok(())
    }

    /// Walk the heap and the free list and report invariant violations plus
    /// occupancy statistics.
    pub fn stats(&self) -> (Validity, Stats) {
        let mut validity = Validity::default();
        let mut stats = Stats::default();

        let end = self
            .expected_break
            .map_or(ptr::null(), |b| b.as_ptr() as *const u8);
        let mut prev_was_free = false;

        for block in self.heap_blocks() {
            if block.state() == BlockState::Fencepost {
                stats.fenceposts += 1;
                prev_was_free = false;
            } else {
                stats.blocks += 1;
                if block.size() % ALIGNMENT != 0
                    || block.size() < MIN_PAYLOAD
                    || block.payload().as_ptr() as usize % ALIGNMENT != 0
                {
                    validity.misaligned_blocks += 1;
                }
                if block.state() == BlockState::Free {
                    stats.free_blocks += 1;
                    stats.free_bytes += block.size();
                    if prev_was_free {
                        validity.adjacent_free_pairs += 1;
                    }
                    if !self.free.contains(block) {
                        validity.stray_free_blocks += 1;
                    }
                    prev_was_free = true;
                } else {
                    prev_was_free = false;
                }
            }

            let right = unsafe { block.right() };
            if (right.addr() as *const u8) < end && right.prev_size() != block.size() {
                validity.broken_back_links += 1;
            }
        }

        let mut listed = 0;
        for block in self.free.iter() {
            listed += 1;
            if block.state() != BlockState::Free {
                validity.listed_busy_blocks += 1;
            }
        }
        validity.list_length_skew = if listed > stats.free_blocks {
            listed - stats.free_blocks
        } else {
            stats.free_blocks - listed
        };

        (validity, stats)
    }
}

/// A thread-safe allocator: a spin lock around a [`RawHeap`], with one-time
/// initialization on first use so it can be constructed in a `const`
/// context.
pub struct GenericAllocator<S> {
    // Values:
    // - 0: Untouched
    // - 1: Initialization in progress
    // - 2: Initialized
    init: AtomicU8,
    raw: MaybeUninit<Mutex<RawHeap<S>>>,
}

impl<S: SegmentSource + Default> Default for GenericAllocator<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> GenericAllocator<S> {
    pub const fn new() -> Self {
        GenericAllocator {
            init: AtomicU8::new(0),
            raw: MaybeUninit::uninit(),
        }
    }
}

impl<S: SegmentSource + Default> GenericAllocator<S> {
    /// Lock and return the underlying heap, initializing it on first use.
    ///
    /// # Safety
    ///
    /// Allocation from any other thread blocks while the returned guard is
    /// held.
    pub unsafe fn get_raw(&self) -> MutexGuard<'_, RawHeap<S>> {
        // - If initialization hasn't started (0), claim it (1), build the
        //   heap, and publish (2).
        // - If another thread is mid-initialization (1), spin until it
        //   publishes.
        // - Once published (2), just lock.
        //
        // SeqCst everywhere: this is a once-per-process path, not worth
        // shaving orderings on.
        let state = self
            .init
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst);

        match state {
            Err(2) => {}
            Ok(0) => {
                let raw_loc: *const Mutex<RawHeap<S>> = self.raw.as_ptr();
                let raw_mut = raw_loc as *mut Mutex<RawHeap<S>>;
                raw_mut.write(Mutex::new(RawHeap::default()));
                let mx: &mut Mutex<RawHeap<S>> = raw_mut.as_mut().unwrap();

                self.init.store(2, Ordering::SeqCst);
                return mx.lock();
            }
            Err(1) => loop {
                core::hint::spin_loop();
                match self.init.load(Ordering::SeqCst) {
                    1 => continue,
                    2 => break,
                    state => panic!("unexpected init state {}", state),
                }
            },
            Ok(v) => panic!("unexpected init state {}", v),
            Err(v) => panic!("unexpected init state {}", v),
        }

        let ptr = self.raw.as_ptr().as_ref().unwrap();
        ptr.lock()
    }

    /// See [`RawHeap::allocate`].
    ///
    /// # Safety
    ///
    /// Same contract as [`RawHeap::allocate`].
    pub unsafe fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.get_raw().allocate(size)
    }

    /// See [`RawHeap::deallocate`].
    ///
    /// # Safety
    ///
    /// Same contract as [`RawHeap::deallocate`].
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        self.get_raw().deallocate(ptr)
    }

    /// See [`RawHeap::allocate_zeroed`].
    ///
    /// # Safety
    ///
    /// Same contract as [`RawHeap::allocate_zeroed`].
    pub unsafe fn allocate_zeroed(&self, count: usize, elem_size: usize) -> Option<NonNull<u8>> {
        self.get_raw().allocate_zeroed(count, elem_size)
    }

    /// See [`RawHeap::reallocate`].
    ///
    /// # Safety
    ///
    /// Same contract as [`RawHeap::reallocate`].
    pub unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> Option<NonNull<u8>> {
        self.get_raw().reallocate(ptr, size)
    }

    pub fn stats(&self) -> (Validity, Stats) {
        unsafe { self.get_raw().stats() }
    }
}

/// The allocator over the real data segment. Usable as the global allocator:
///
/// ```rust,ignore
/// #[global_allocator]
/// static ALLOCATOR: UnixAllocator = UnixAllocator::new();
/// ```
#[cfg(feature = "use_libc")]
#[derive(Default)]
pub struct UnixAllocator {
    alloc: GenericAllocator<SbrkSegment>,
}

#[cfg(feature = "use_libc")]
impl UnixAllocator {
    pub const fn new() -> Self {
        UnixAllocator {
            alloc: GenericAllocator::new(),
        }
    }

    pub fn stats(&self) -> (Validity, Stats) {
        self.alloc.stats()
    }
}

// Payloads are 8-aligned and no more; layouts wanting stricter alignment are
// refused rather than handed misaligned memory.
#[cfg(feature = "use_libc")]
unsafe impl GlobalAlloc for UnixAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        self.alloc
            .allocate(layout.size())
            .map_or(ptr::null_mut(), |p| p.as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.alloc.deallocate(ptr)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        self.alloc
            .reallocate(ptr, new_size)
            .map_or(ptr::null_mut(), |p| p.as_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::ToySegment;

    use test_log::test;

    #[test]
    fn alloc_free_and_reuse() {
        let mut heap = RawHeap::new(ToySegment::default());

        let (a, b, c) = unsafe {
            (
                heap.allocate(64).unwrap(),
                heap.allocate(64).unwrap(),
                heap.allocate(64).unwrap(),
            )
        };

        // Splitting carves consecutive blocks off the front of the chunk.
        assert_eq!(
            b.as_ptr() as usize,
            a.as_ptr() as usize + 64 + HEADER_SIZE
        );
        assert_eq!(
            c.as_ptr() as usize,
            b.as_ptr() as usize + 64 + HEADER_SIZE
        );

        let (validity, stats) = heap.stats();
        assert!(validity.is_valid(), "{:?}", validity);
        // Three allocated blocks plus the tail remainder.
        assert_eq!(stats.blocks, 4);
        assert_eq!(stats.free_blocks, 1);

        unsafe { heap.deallocate(b.as_ptr()) };
        let (validity, stats) = heap.stats();
        assert!(validity.is_valid(), "{:?}", validity);
        assert_eq!(stats.free_blocks, 2);
        log::info!("after free: {}", heap.free_list());

        // The freed block is found again by a matching request.
        let again = unsafe { heap.allocate(64).unwrap() };
        assert_eq!(again, b);

        let (validity, _) = heap.stats();
        assert!(validity.is_valid(), "{:?}", validity);
    }

    #[test]
    fn freeing_everything_leaves_one_block() {
        let mut heap = RawHeap::new(ToySegment::default());

        let pointers: [NonNull<u8>; 5] = unsafe {
            [
                heap.allocate(16).unwrap(),
                heap.allocate(200).unwrap(),
                heap.allocate(8).unwrap(),
                heap.allocate(1024).unwrap(),
                heap.allocate(48).unwrap(),
            ]
        };

        // Free in an order that exercises every coalescing case.
        for &ix in &[1usize, 3, 2, 0, 4] {
            unsafe { heap.deallocate(pointers[ix].as_ptr()) };
            let (validity, _) = heap.stats();
            assert!(validity.is_valid(), "{:?}", validity);
        }

        let (_, stats) = heap.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.fenceposts, 2);
        assert_eq!(stats.free_bytes, heap.source.used() - 3 * HEADER_SIZE);
    }

    #[test]
    fn zero_sized_requests_fail() {
        let mut heap = RawHeap::new(ToySegment::default());
        unsafe {
            assert!(heap.allocate(0).is_none());
            assert!(heap.allocate_zeroed(0, 8).is_none());
            assert!(heap.allocate_zeroed(8, 0).is_none());
        }
        assert_eq!(heap.source.used(), 0);
    }
}
