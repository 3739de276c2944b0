use std::cell::Cell;
use std::time::Duration;

thread_local! {
    static BUILD_TIME_NS: Cell<u64> = const { Cell::new(0) };
    static COMPUTE_TIME_NS: Cell<u64> = const { Cell::new(0) };
}

fn add(cell: &'static std::thread::LocalKey<Cell<u64>>, duration: Duration) {
    let nanos = duration.as_nanos();
    let nanos = nanos.min(u128::from(u64::MAX)) as u64;
    cell.with(|cell| {
        let current = cell.get();
        cell.set(current.saturating_add(nanos));
    });
}

fn take(cell: &'static std::thread::LocalKey<Cell<u64>>) -> Duration {
    cell.with(|cell| {
        let nanos = cell.get();
        cell.set(0);
        Duration::from_nanos(nanos)
    })
}

/// Accumulates time spent compiling builders into graphs on this thread.
pub fn add_build_time(duration: Duration) {
    add(&BUILD_TIME_NS, duration);
}

/// Returns and resets this thread's accumulated build time.
pub fn take_build_time() -> Duration {
    take(&BUILD_TIME_NS)
}

/// Accumulates time spent inside compute calls on this thread.
pub fn add_compute_time(duration: Duration) {
    add(&COMPUTE_TIME_NS, duration);
}

/// Returns and resets this thread's accumulated compute time.
pub fn take_compute_time() -> Duration {
    take(&COMPUTE_TIME_NS)
}
