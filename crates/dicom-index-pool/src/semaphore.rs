//! Counting semaphore.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// A counting semaphore over `parking_lot` primitives.
///
/// # Example
///
/// ```rust
/// use dicom_index_pool::Semaphore;
///
/// let semaphore = Semaphore::new(1);
/// assert!(semaphore.try_acquire());
/// assert!(!semaphore.try_acquire());
/// semaphore.release(1);
/// assert_eq!(semaphore.available(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    released: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with `permits` available permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            released: Condvar::new(),
        }
    }

    /// Takes one permit if one is available, without blocking.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            false
        }
    }

    /// Takes one permit, waiting at most `timeout` for one to be released.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            self.released.wait_for(&mut permits, timeout);
        }
        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            false
        }
    }

    /// Returns `count` permits.
    pub fn release(&self, count: usize) {
        let mut permits = self.permits.lock();
        *permits += count;
        for _ in 0..count {
            self.released.notify_one();
        }
    }

    /// Number of permits currently available.
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_try_acquire_counts_down() {
        let semaphore = Semaphore::new(2);
        assert!(semaphore.try_acquire());
        assert!(semaphore.try_acquire());
        assert!(!semaphore.try_acquire());
        assert_eq!(semaphore.available(), 0);
    }

    #[test]
    fn test_release_restores_permits() {
        let semaphore = Semaphore::new(0);
        semaphore.release(3);
        assert_eq!(semaphore.available(), 3);
    }

    #[test]
    fn test_acquire_timeout_expires() {
        let semaphore = Semaphore::new(0);
        assert!(!semaphore.acquire_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_acquire_timeout_wakes_on_release() {
        let semaphore = Arc::new(Semaphore::new(0));
        let releaser = {
            let semaphore = Arc::clone(&semaphore);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                semaphore.release(1);
            })
        };

        assert!(semaphore.acquire_timeout(Duration::from_secs(5)));
        releaser.join().unwrap();
        assert_eq!(semaphore.available(), 0);
    }
}
