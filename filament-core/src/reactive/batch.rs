//! Batch Gate
//!
//! A [`Batch`] groups any number of imperative mutations behind one
//! downstream notification. Work runs inside [`Batch::run`] (or one of the
//! async variants); when it completes, the gate's internal counter cell is
//! bumped exactly once. Computed cells that depend on the gate re-evaluate
//! on that bump only.
//!
//! Cells written inside the batch still notify their own listeners as usual.

use std::future::Future;
use std::rc::Rc;

use tracing::trace;

use super::computed::Dependency;
use super::observable::Observable;
use super::subscriber::Subscription;

/// A gate that turns a run of mutations into a single trigger.
#[derive(Clone)]
pub struct Batch {
    counter: Observable<u64>,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            counter: Observable::new(0),
        }
    }

    /// Completed batches so far.
    pub fn completed(&self) -> u64 {
        self.counter.get()
    }

    /// The counter cell bumped after each batch.
    pub fn observable(&self) -> &Observable<u64> {
        &self.counter
    }

    fn complete(&self) {
        self.counter.update(|count| count + 1);
        trace!(batches = self.counter.get(), "batch completed");
    }

    /// Run `work`, then trigger once.
    pub fn run<R>(&self, work: impl FnOnce() -> R) -> R {
        let result = work();
        self.complete();
        result
    }

    /// Await `work`, then trigger once.
    pub async fn run_async<R>(&self, work: impl Future<Output = R>) -> R {
        let result = work.await;
        self.complete();
        result
    }

    /// Await a fallible `work`. Triggers on `Ok`; an `Err` is handed back to
    /// the caller and nothing is triggered.
    pub async fn try_run_async<R, E>(
        &self,
        work: impl Future<Output = Result<R, E>>,
    ) -> Result<R, E> {
        let result = work.await?;
        self.complete();
        Ok(result)
    }

    /// Wrap `work` in a reusable closure that runs inside this batch.
    pub fn wrap<A, R, F>(&self, work: F) -> impl Fn(A) -> R
    where
        F: Fn(A) -> R,
    {
        let gate = self.clone();
        move |args| gate.run(|| work(args))
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl Dependency for Batch {
    fn watch(&self, notify: Rc<dyn Fn()>) -> Subscription {
        self.counter.watch(notify)
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("completed", &self.completed())
            .finish()
    }
}
