use std::collections::VecDeque;

use tokio::sync::oneshot;

/// Advisory lock over the command channel.
///
/// Purely cooperative: holding the lock does not stop anyone from submitting
/// commands. Callers that opt in serialize multi-command exchanges by
/// acquiring before the first command and releasing after the last.
#[derive(Debug, Default)]
pub(crate) struct LockQueue {
    held: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl LockQueue {
    /// Grant the lock immediately when free, otherwise queue the waiter.
    /// Waiters are woken strictly in acquisition order.
    pub fn acquire(&mut self, waiter: oneshot::Sender<()>) {
        if self.held {
            self.waiters.push_back(waiter);
        } else {
            self.held = true;
            let _ = waiter.send(());
        }
    }

    /// Release one acquisition, waking the next waiter in line. Waiters
    /// whose callers gave up are skipped.
    pub fn release(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
        }
        self.held = false;
    }

    /// Whether any acquisition is outstanding.
    pub fn locked(&self) -> bool {
        self.held
    }

    /// Wake every waiter and reset. Used on teardown.
    pub fn release_all(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
        self.held = false;
    }
}
