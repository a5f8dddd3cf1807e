use std::collections::hash_map::RandomState;

use clap::Parser;
use economic_table::EconomicMap;
use economic_table::equivalence::Equality;

#[derive(Parser, Debug)]
struct Args {
    /// Number of entries to insert.
    #[arg(short = 'n', long = "entries", default_value_t = 1000)]
    entries: usize,

    /// Remove every `remove_every`-th entry after filling, 0 to keep all.
    #[arg(short = 'r', long = "remove_every", default_value_t = 0)]
    remove_every: usize,

    /// Preallocate room for all entries up front.
    #[arg(short = 'p', long = "preallocate")]
    preallocate: bool,
}

fn main() {
    let args = Args::parse();

    let strategy = Equality::with_hasher(RandomState::new());
    let mut map = if args.preallocate {
        println!("Creating EconomicMap with capacity: {}", args.entries);
        EconomicMap::with_capacity(strategy, args.entries)
    } else {
        println!("Creating empty EconomicMap");
        EconomicMap::new(strategy)
    };

    println!("Filling map with {} u64 keys...", args.entries);
    let mut capacities = Vec::new();
    for i in 0..args.entries as u64 {
        map.put(i, i * 2);
        if capacities.last() != Some(&map.capacity()) {
            capacities.push(map.capacity());
        }
    }
    println!("Capacity steps: {:?}", capacities);

    if args.remove_every > 0 {
        let mut removed = 0;
        for i in (0..args.entries as u64).step_by(args.remove_every) {
            if map.remove_key(&i).is_some() {
                removed += 1;
            }
        }
        println!("Removed {} entries", removed);
    }

    println!(
        "Final occupancy: {:.2}%",
        (map.len() as f64 / map.capacity().max(1) as f64) * 100.0
    );
    map.stats().print();
}
