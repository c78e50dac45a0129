use std::sync::{Mutex, MutexGuard};

/// Single-slot cell holding only the most recent value. Producers never block
/// on the consumer; an unread value is simply replaced.
#[derive(Debug)]
pub struct LatestSlot<T> {
    inner: Mutex<SlotState<T>>,
}

#[derive(Debug)]
struct SlotState<T> {
    value: Option<T>,
    published: u64,
}

impl<T> Default for SlotState<T> {
    fn default() -> Self {
        Self {
            value: None,
            published: 0,
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotState::default()),
        }
    }

    pub fn publish(&self, value: T) {
        let mut state = self.lock();
        state.value = Some(value);
        state.published += 1;
    }

    /// Takes the pending value, if one arrived since the last take.
    pub fn take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Total number of values ever published.
    pub fn published(&self) -> u64 {
        self.lock().published
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        // A panicking producer cannot leave the slot half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn newest_value_wins() {
        let slot = LatestSlot::new();
        slot.publish(1);
        slot.publish(2);
        assert_eq!(slot.take(), Some(2));
        assert_eq!(slot.take(), None);
        assert_eq!(slot.published(), 2);
    }

    #[test]
    fn producer_on_other_thread_does_not_block() {
        let slot = Arc::new(LatestSlot::new());
        let producer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    slot.publish(i);
                }
            })
        };
        producer.join().unwrap();
        assert_eq!(slot.take(), Some(999));
    }
}
