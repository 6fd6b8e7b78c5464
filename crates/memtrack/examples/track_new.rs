use memtrack::TrackingAllocator;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::new(&memtrack::TRACKER);

#[repr(align(64))]
struct Aligned([u8; 64]);

#[memtrack::main(trace)]
fn main() {
    let s = String::from("string value with 26 chars");
    let boxed = Box::new(String::from("an initial value with even 35 chars"));
    let aligned = Box::new(Aligned([0; 64]));
    let names: Box<[String]> = vec![
        "7 chars".to_string(),
        "x".to_string(),
        "or 11 chars".to_string(),
        "a string value with 28 chars".to_string(),
    ]
    .into_boxed_slice();

    println!("{} {} {} {}", s.len(), boxed.len(), aligned.0.len(), names.len());
}
