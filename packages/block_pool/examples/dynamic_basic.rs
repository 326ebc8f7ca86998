//! Basic usage example for `DynamicPool`.
//!
//! This example grows a pool across several blocks, frees everything and shows that the blocks
//! are kept for reuse.

use block_pool::DynamicPool;

#[derive(Debug)]
struct Connection {
    id: usize,
    peer: String,
}

fn main() {
    let mut pool = DynamicPool::<Connection>::new(4);

    println!(
        "Created DynamicPool with {} entries per block",
        pool.entries_per_block()
    );

    let connections: Vec<_> = (0..10)
        .map(|id| {
            // SAFETY: Every handle is returned to the pool before the pool is dropped.
            let connection = unsafe {
                pool.new_object_with(|| Connection {
                    id,
                    peer: format!("10.0.0.{id}:443"),
                })
            };

            connection.unwrap()
        })
        .collect();

    let stats = pool.stats();
    println!(
        "Allocated {} connections across {} blocks",
        stats.allocation_count(),
        stats.block_count()
    );

    for connection in &connections {
        println!("Connection {} to {}", connection.id, connection.peer);
    }

    for connection in connections {
        let Connection { id, peer } = pool.take_object(connection);
        println!("Closed connection {id} to {peer}");
    }

    let stats = pool.stats();
    println!(
        "After cleanup: {} live connections, {} blocks retained (capacity {})",
        stats.allocation_count(),
        stats.block_count(),
        pool.capacity()
    );
}
