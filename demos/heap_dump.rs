//! Walks a toy heap through a few operations and prints the physical block
//! layout and the free list after each step.

use boundary_alloc::{RawHeap, ToySegment};

fn show(title: &str, heap: &RawHeap<ToySegment>) {
    let mut out = String::new();
    heap.dump_heap(&mut out, None, None).unwrap();
    println!("=== {} ===\n{}", title, out);

    let mut free = String::new();
    heap.dump_free_list(&mut free).unwrap();
    println!("--- free list ---\n{}", free);
}

fn main() {
    env_logger::init();
    let mut heap = RawHeap::new(ToySegment::default());

    unsafe {
        let a = heap.allocate(24).unwrap();
        let b = heap.allocate(100).unwrap();
        let c = heap.allocate(24).unwrap();
        show("three allocations", &heap);

        heap.deallocate(b.as_ptr());
        show("middle freed", &heap);

        heap.deallocate(a.as_ptr());
        show("left block freed and coalesced", &heap);

        heap.deallocate(c.as_ptr());
        show("everything freed", &heap);
    }
}
