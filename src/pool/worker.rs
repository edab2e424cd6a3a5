use std::panic::{AssertUnwindSafe, catch_unwind};

use rayon::prelude::*;

use crate::foundation::error::TileslideResult;

/// Result of one item: the value, or a printable failure.
pub(crate) type ItemResult<R> = Result<R, String>;

/// Run `f` on one item, turning both errors and panics into a failure message.
pub(crate) fn run_item<T, R, F>(item: &T, f: &F) -> ItemResult<R>
where
    F: Fn(&T) -> TileslideResult<R>,
{
    match catch_unwind(AssertUnwindSafe(|| f(item))) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

/// CPU-bound batch on the rayon pool. Output order matches `items`.
pub(crate) fn run_on_pool<T, R, F>(pool: &rayon::ThreadPool, items: &[T], f: &F) -> Vec<ItemResult<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> TileslideResult<R> + Sync,
{
    pool.install(|| items.par_iter().map(|item| run_item(item, f)).collect())
}

/// IO-bound batch on scoped OS threads, item `i` going to worker `i % workers`.
/// Output order matches `items`.
pub(crate) fn run_on_threads<T, R, F>(workers: usize, items: &[T], f: &F) -> Vec<ItemResult<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> TileslideResult<R> + Sync,
{
    let workers = workers.clamp(1, items.len().max(1));
    if workers == 1 {
        return items.iter().map(|item| run_item(item, f)).collect();
    }

    let mut slots: Vec<Option<ItemResult<R>>> = (0..items.len()).map(|_| None).collect();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|k| {
                scope.spawn(move || {
                    items
                        .iter()
                        .enumerate()
                        .skip(k)
                        .step_by(workers)
                        .map(|(idx, item)| (idx, run_item(item, f)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            // Items already catch their own panics; a failed join only loses bookkeeping.
            if let Ok(done) = handle.join() {
                for (idx, res) in done {
                    slots[idx] = Some(res);
                }
            }
        }
    });

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err("worker thread exited early".to_string())))
        .collect()
}
