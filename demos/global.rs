//! Uses the allocator as the global allocator, churns through a pile of
//! objects, and checks heap validity along the way.

use boundary_alloc::UnixAllocator;

#[global_allocator]
static ALLOCATOR: UnixAllocator = UnixAllocator::new();

fn main() {
    env_logger::init();
    println!("Hello from the boundary-tag heap!");

    let s: String = "abc".to_owned();
    println!("Got a string: {}", s);

    let mut v = vec![0u64, 1, 2, 3];
    for n in 10..2048 {
        v.push(n);
    }
    println!("Got a vec of {} elements", v.len());

    let mut kept: Vec<Vec<u8>> = Vec::new();
    for round in 0..64 {
        for size in &[24usize, 100, 900, 3000] {
            kept.push(vec![round as u8; *size]);
        }
        // Drop every other object to create holes for coalescing.
        let mut ix = 0;
        kept.retain(|_| {
            ix += 1;
            ix % 2 == 0
        });

        let (validity, stats) = ALLOCATOR.stats();
        assert!(validity.is_valid(), "{:?}", validity);
        if round % 16 == 0 {
            println!("round {:2}: {:?}", round, stats);
        }
    }

    drop(kept);
    drop(v);
    let (validity, stats) = ALLOCATOR.stats();
    println!("final: {:?}", stats);
    assert!(validity.is_valid());
}
