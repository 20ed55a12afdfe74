//! Cooperative timers on the output-graph clock.
//!
//! The session drains due timers between render blocks. A handle that has
//! been cancelled is gone from the queue, so it can never fire later.

/// Identifies one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Pending<T> {
    id: u64,
    due: f64,
    task: T,
}

#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    pending: Vec<Pending<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        TimerQueue {
            next_id: 0,
            pending: Vec::new(),
        }
    }

    /// Arm `task` to fire once the clock reaches `due` seconds.
    pub fn set_timeout(&mut self, due: f64, task: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(Pending { id, due, task });
        TimerHandle(id)
    }

    /// Disarm a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.pending.iter().position(|p| p.id == handle.0) {
            Some(idx) => {
                self.pending.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Remove and return the earliest timer due at `now`. Ties fire in the
    /// order they were armed.
    pub fn pop_due(&mut self, now: f64) -> Option<(TimerHandle, T)> {
        let idx = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= now)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
            .map(|(idx, _)| idx)?;
        let p = self.pending.swap_remove(idx);
        Some((TimerHandle(p.id), p.task))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
