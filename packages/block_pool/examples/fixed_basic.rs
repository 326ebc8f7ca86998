//! Basic usage example for `FixedPool`.
//!
//! This example fills a pool to capacity, shows that it refuses further allocations and then
//! reuses a freed slot.

use block_pool::FixedPool;

fn main() {
    let mut pool = FixedPool::<u32>::new(3);

    println!("Created FixedPool with capacity: {}", pool.capacity());

    // SAFETY: The pool outlives every handle taken from it.
    let first = unsafe { pool.new_object(0xdeadbeef) }.unwrap();
    // SAFETY: The pool outlives every handle taken from it.
    let second = unsafe { pool.new_object(0xcafebabe) }.unwrap();
    // SAFETY: The pool outlives every handle taken from it.
    let third = unsafe { pool.new_object(0xfeedface) }.unwrap();

    println!("Inserted 3 items, pool is full: {}", pool.is_full());

    // SAFETY: The pool outlives every handle taken from it.
    if unsafe { pool.new_object(0xbaadf00d) }.is_none() {
        println!("Fourth allocation was refused");
    }

    let second_addr = second.ptr();
    pool.delete_object(second);

    // SAFETY: The pool outlives every handle taken from it.
    let fourth = unsafe { pool.new_object(0xbaadf00d) }.unwrap();
    println!(
        "Fourth item reused the freed slot: {}",
        fourth.ptr() == second_addr
    );

    let mut values = Vec::new();
    // SAFETY: No handle is being used to access the objects while we read them.
    pool.for_each(|ptr| values.push(unsafe { ptr.read() }));

    for value in &values {
        println!("Live value: {value:#x}");
    }

    println!("Stats: {:?}", pool.stats());

    pool.delete_object(first);
    pool.delete_object(third);
    pool.delete_object(fourth);

    println!("Pool is empty: {}", pool.is_empty());
}
