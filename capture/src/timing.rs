use std::time::{Duration, Instant};

/// A value together with the wall-clock time it took to produce.
#[derive(Debug)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    pub fn measure(f: impl FnOnce() -> T) -> Self {
        let started = Instant::now();
        let value = f();
        Self {
            value,
            elapsed: started.elapsed(),
        }
    }
}
