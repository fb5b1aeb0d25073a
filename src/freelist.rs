//! The process-wide list of free blocks.
//!
//! The list is doubly linked through the payloads of its members, so tracking
//! a free block costs no memory beyond the block itself. No ordering is
//! maintained, by address or by size: blocks are pushed at the head and the
//! search is a linear scan.

use core::fmt;

use crate::header::Block;

/// A doubly-linked list of free blocks, addressed by its head.
///
/// Invariants:
///
/// - every member has state [`Free`](crate::header::BlockState::Free), and
///   every free block in the heap is a member;
/// - the head's `prev` link is null, the tail's `next` link is null.
#[derive(Default)]
pub struct FreeList {
    head: Option<Block>,
}

pub struct FreeListIter {
    next: Option<Block>,
}

impl Iterator for FreeListIter {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.next.take()?;
        self.next = block.next_free();
        Some(block)
    }
}

impl FreeList {
    pub const fn new() -> FreeList {
        FreeList { head: None }
    }

    pub fn head(&self) -> Option<Block> {
        self.head
    }

    pub fn iter(&self) -> FreeListIter {
        FreeListIter { next: self.head }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn contains(&self, block: Block) -> bool {
        self.iter().any(|b| b == block)
    }

    /// Push `block` at the head of the list.
    pub fn insert(&mut self, mut block: Block) {
        block.set_prev_free(None);
        block.set_next_free(self.head);
        if let Some(mut head) = self.head {
            head.set_prev_free(Some(block));
        }
        self.head = Some(block);
    }

    /// Unlink `block` using its own links. `block` must be a member.
    pub fn remove(&mut self, block: Block) {
        if let Some(mut prev) = block.prev_free() {
            prev.set_next_free(block.next_free());
        }
        if let Some(mut next) = block.next_free() {
            next.set_prev_free(block.prev_free());
        }
        if self.head == Some(block) {
            self.head = block.next_free();
        }
    }

    /// Put `new` in the exact list position `old` occupied.
    ///
    /// Used when a freed block absorbs its free right neighbour: the merged
    /// block inherits the neighbour's links in place instead of being
    /// re-inserted at the head, which keeps the rest of the list order (and
    /// therefore first-fit outcomes) undisturbed.
    pub fn replace(&mut self, old: Block, mut new: Block) {
        new.set_prev_free(old.prev_free());
        new.set_next_free(old.next_free());
        if let Some(mut prev) = new.prev_free() {
            prev.set_next_free(Some(new));
        }
        if let Some(mut next) = new.next_free() {
            next.set_prev_free(Some(new));
        }
        if self.head == Some(old) {
            self.head = Some(new);
        }
    }

    /// Scan for a block with payload at least `size`: the first such block
    /// encountered.
    #[cfg(not(feature = "best_fit"))]
    pub fn find(&self, size: usize) -> Option<Block> {
        self.iter().find(|block| block.size() >= size)
    }

    /// Scan the whole list for the smallest block with payload at least
    /// `size`; ties go to the block encountered first.
    #[cfg(feature = "best_fit")]
    pub fn find(&self, size: usize) -> Option<Block> {
        let mut best: Option<Block> = None;
        for block in self.iter() {
            if block.size() < size {
                continue;
            }
            match best {
                Some(b) if b.size() <= block.size() => {}
                _ => best = Some(block),
            }
        }
        best
    }
}

impl fmt::Display for FreeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FreeList(")?;
        let mut first = true;
        for block in self.iter() {
            if !first {
                write!(f, ", ")?;
            } else {
                first = false;
            }
            write!(f, "Block({:p}, {})", block.addr(), block.size())?;
        }
        write!(f, ")")
    }
}
