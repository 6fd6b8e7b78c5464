use memtrack::collections::{ResourceString, ResourceVec};
use memtrack::resource::{null_resource, MonotonicBuffer};

fn main() {
    let mut buf = [0u8; 200_000];
    let pool = MonotonicBuffer::with_buffer(&mut buf, null_resource());
    let mut coll = ResourceVec::new_in(&pool);

    for i in 0.. {
        let stored = ResourceString::from_str_in(&format!("Customer{i}"), &pool)
            .and_then(|name| coll.try_push((i, name)));
        if let Err(err) = stored {
            eprintln!("allocation failed: {err}");
            break;
        }
    }

    println!("size: {}", coll.len());
}
