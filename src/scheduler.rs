use std::collections::{BTreeMap, HashMap};

/// Handle for a scheduled callback, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Deferred, cancellable actions on the pipeline's clock.
///
/// Nothing runs on its own: the owner calls [`Scheduler::poll`] with the
/// current time (once per frame or tick) and executes whatever came due.
/// Actions due at the same instant come back in the order they were scheduled.
pub struct Scheduler<A> {
    queue: BTreeMap<(u64, u64), A>,
    due_by_id: HashMap<u64, u64>,
    next_seq: u64,
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            due_by_id: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule_at(&mut self, due_ms: u64, action: A) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((due_ms, seq), action);
        self.due_by_id.insert(seq, due_ms);
        TimerId(seq)
    }

    pub fn schedule_in(&mut self, now_ms: u64, delay_ms: u64, action: A) -> TimerId {
        self.schedule_at(now_ms.saturating_add(delay_ms), action)
    }

    /// Cancel one callback. Returns the action if it was still pending.
    pub fn cancel(&mut self, id: TimerId) -> Option<A> {
        let due = self.due_by_id.remove(&id.0)?;
        self.queue.remove(&(due, id.0))
    }

    /// Cancel every pending callback matching `pred`. Returns how many.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&A) -> bool) -> usize {
        let doomed: Vec<(u64, u64)> = self
            .queue
            .iter()
            .filter(|(_, a)| pred(a))
            .map(|(k, _)| *k)
            .collect();
        for key in &doomed {
            self.queue.remove(key);
            self.due_by_id.remove(&key.1);
        }
        doomed.len()
    }

    pub fn cancel_all(&mut self) -> usize {
        let n = self.queue.len();
        self.queue.clear();
        self.due_by_id.clear();
        n
    }

    /// Remove and return every action due at or before `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> Vec<A> {
        let due = match now_ms.checked_add(1) {
            Some(bound) => {
                let later = self.queue.split_off(&(bound, 0));
                std::mem::replace(&mut self.queue, later)
            }
            None => std::mem::take(&mut self.queue),
        };
        due.into_iter()
            .map(|((_, seq), action)| {
                self.due_by_id.remove(&seq);
                action
            })
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due, _)| *due)
    }
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}
