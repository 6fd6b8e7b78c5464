use memtrack::TrackingAllocator;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::new(&memtrack::TRACKER);

#[memtrack::measure]
fn build_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("customer {i}")).collect()
}

#[memtrack::measure]
fn no_allocations(values: &[u64]) -> u64 {
    values.iter().sum()
}

#[memtrack::main]
fn main() {
    let names = build_names(10);
    let total = no_allocations(&[1, 2, 3]);
    println!("built {} names, total {total}", names.len());
}
