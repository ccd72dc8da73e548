//! Single-slot handle for the idle flush timer.

use tokio::task::JoinHandle;

/// Holds at most one armed timer task.
///
/// Each arming gets a new generation number so a timer task that has
/// already fired can release its own slot without touching a newer timer.
#[derive(Debug, Default)]
pub struct FlushTimer {
    armed: Option<(u64, JoinHandle<()>)>,
    generation: u64,
}

impl FlushTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Reserves the next generation number for a timer about to be spawned.
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Stores the task for `generation`, aborting anything previously armed.
    pub fn arm(&mut self, generation: u64, handle: JoinHandle<()>) {
        self.cancel();
        self.armed = Some((generation, handle));
    }

    /// Aborts the armed timer. Idempotent.
    pub fn cancel(&mut self) {
        if let Some((_, handle)) = self.armed.take() {
            handle.abort();
        }
    }

    /// Called by a timer task that has fired: clears the slot without
    /// aborting, but only if the slot still belongs to `generation`.
    ///
    /// Returns whether the slot was released.
    pub fn release(&mut self, generation: u64) -> bool {
        match self.armed {
            Some((current, _)) if current == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
