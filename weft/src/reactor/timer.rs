use std::collections::BTreeMap;
use std::task::Waker;
use std::time::Instant;

/// Identifies a pending timer within its reactor.
///
/// Keys order by deadline, ties broken by insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerKey {
    deadline: Instant,
    seq: u64,
}

impl TimerKey {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Pending timers ordered by deadline.
///
/// Each entry owns the waker to invoke when its deadline passes. Removing an
/// entry, because it fired or was cancelled, drops that waker.
pub(crate) struct Timers {
    entries: BTreeMap<TimerKey, Waker>,
    next_seq: u64,
}

impl Timers {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Inserts a timer and returns its key along with whether it became
    /// the earliest pending deadline.
    pub(crate) fn insert(&mut self, deadline: Instant, waker: Waker) -> (TimerKey, bool) {
        let key = self.next_key(deadline);
        let earliest = self
            .next_deadline()
            .is_none_or(|current| deadline < current);

        self.entries.insert(key, waker);
        (key, earliest)
    }

    /// Key for a timer that will never be stored.
    pub(crate) fn next_key(&mut self, deadline: Instant) -> TimerKey {
        let seq = self.next_seq;
        self.next_seq += 1;

        TimerKey { deadline, seq }
    }

    /// Replaces the waker of a pending timer. Returns `false` if the timer
    /// already fired or was cancelled.
    pub(crate) fn reset_waker(&mut self, key: TimerKey, waker: &Waker) -> bool {
        match self.entries.get_mut(&key) {
            Some(current) => {
                if !current.will_wake(waker) {
                    *current = waker.clone();
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel(&mut self, key: TimerKey) -> Option<Waker> {
        self.entries.remove(&key)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.first_key_value().map(|(key, _)| key.deadline)
    }

    /// Removes every timer whose deadline is at or before `now` and collects
    /// their wakers, earliest first.
    pub(crate) fn expire(&mut self, now: Instant, wakers: &mut Vec<Waker>) -> usize {
        let mut fired = 0;

        while let Some(entry) = self.entries.first_entry() {
            if entry.key().deadline > now {
                break;
            }
            wakers.push(entry.remove());
            fired += 1;
        }

        fired
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Removes every timer, returning their wakers.
    pub(crate) fn clear(&mut self) -> Vec<Waker> {
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;
    use std::time::Duration;

    struct Counter(AtomicUsize);

    impl Wake for Counter {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter() -> (Arc<Counter>, Waker) {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        (counter, waker)
    }

    #[test]
    fn test_expire_in_deadline_order() {
        let mut timers = Timers::new();
        let now = Instant::now();
        let (_, waker) = counter();

        let (late, _) = timers.insert(now + Duration::from_millis(20), waker.clone());
        let (early, earliest) = timers.insert(now + Duration::from_millis(10), waker.clone());
        assert!(earliest);

        let (_, earliest) = timers.insert(now + Duration::from_millis(30), waker);
        assert!(!earliest);
        assert_eq!(timers.next_deadline(), Some(early.deadline()));

        let mut wakers = Vec::new();
        assert_eq!(timers.expire(now + Duration::from_millis(25), &mut wakers), 2);
        assert_eq!(wakers.len(), 2);
        assert_eq!(timers.len(), 1);
        assert!(!timers.reset_waker(late, &wakers[0]));
    }

    #[test]
    fn test_same_deadline_keeps_both() {
        let mut timers = Timers::new();
        let deadline = Instant::now();
        let (_, waker) = counter();

        let (a, _) = timers.insert(deadline, waker.clone());
        let (b, _) = timers.insert(deadline, waker);

        assert_ne!(a, b);
        assert_eq!(timers.len(), 2);
    }

    #[test]
    fn test_cancel_drops_waker() {
        let mut timers = Timers::new();
        let (count, waker) = counter();
        let (key, _) = timers.insert(Instant::now(), waker);

        assert!(timers.cancel(key).is_some());
        assert!(timers.cancel(key).is_none());
        assert_eq!(timers.len(), 0);

        let mut wakers = Vec::new();
        timers.expire(Instant::now(), &mut wakers);
        assert!(wakers.is_empty());
        assert_eq!(count.0.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&count), 1);
    }

    #[test]
    fn test_reset_waker_replaces_entry() {
        let mut timers = Timers::new();
        let (first, waker) = counter();
        let (second, other) = counter();
        let (key, _) = timers.insert(Instant::now(), waker);

        assert!(timers.reset_waker(key, &other));

        let mut wakers = Vec::new();
        timers.expire(Instant::now(), &mut wakers);
        wakers.into_iter().for_each(Waker::wake);

        assert_eq!(first.0.load(Ordering::SeqCst), 0);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }
}
