//! # cancellable_loops
//!
//! A Rayon-parallel map over independent work items that can be stopped early through a
//! shared abort flag.
//!
//! The loop keeps the order of the input: the returned vector has one slot per item,
//! holding `Some(result)` for items that ran and `None` for items that were skipped
//! because the flag was already set when their turn came. An item that has started is
//! never interrupted.
//!
//! ## Example
//!
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use cancellable_loops::par_map_cancellable;
//!
//! let abort_flag = AtomicBool::new(false);
//! let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
//!
//! let results = pool.install(|| {
//!     par_map_cancellable(vec![1, 2, 3, 4, 5, 6], &abort_flag, |i| {
//!         if i == 3 {
//!             abort_flag.store(true, Ordering::Relaxed);
//!         }
//!         i * 10
//!     })
//! });
//!
//! assert_eq!(results, vec![Some(10), Some(20), Some(30), None, None, None]);
//! ```

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Applies `func` to every item on the current Rayon pool until `abort_flag` is set.
///
/// Items that were already picked up by a worker when the flag is raised still run to
/// completion, so with several threads a few results may appear after the item that
/// triggered the abort.
///
/// # Arguments
///
/// * `iter` - The work items
/// * `abort_flag` - Checked before each item; once `true`, remaining items are skipped
/// * `func` - The work to perform on one item
///
/// # Returns
///
/// One entry per input item, in input order, `None` where the item was skipped.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::AtomicBool;
/// use cancellable_loops::par_map_cancellable;
///
/// let abort_flag = AtomicBool::new(false);
/// let squares = par_map_cancellable(vec![1, 2, 3, 4], &abort_flag, |i| i * i);
///
/// assert_eq!(squares, vec![Some(1), Some(4), Some(9), Some(16)]);
/// ```
pub fn par_map_cancellable<I, F, R>(iter: I, abort_flag: &AtomicBool, func: F) -> Vec<Option<R>>
where
    I: IntoParallelIterator,
    I::Iter: IndexedParallelIterator,
    F: Fn(I::Item) -> R + Sync + Send,
    R: Send,
{
    iter.into_par_iter()
        .map(|item| {
            if abort_flag.load(Ordering::Relaxed) {
                None
            } else {
                Some(func(item))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_thread_pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
    }

    #[test]
    fn parallel_map_keeps_input_order() {
        let abort_flag = AtomicBool::new(false);
        let input: Vec<usize> = (0..200).collect();
        let results = par_map_cancellable(input, &abort_flag, |i| i * 2);
        assert_eq!(results.len(), 200);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(*r, Some(i * 2));
        }
    }

    #[test]
    fn parallel_map_with_preset_flag_runs_nothing() {
        let abort_flag = AtomicBool::new(true);
        let results = par_map_cancellable(vec![1, 2, 3], &abort_flag, |i| i);
        assert!(results.iter().all(Option::is_none));
    }

    #[test]
    fn single_worker_skips_everything_after_abort() {
        let abort_flag = AtomicBool::new(false);
        let results = single_thread_pool().install(|| {
            par_map_cancellable(vec![0, 1, 2, 3, 4], &abort_flag, |i| {
                if i == 1 {
                    abort_flag.store(true, Ordering::Relaxed);
                }
                i
            })
        });
        assert_eq!(results, vec![Some(0), Some(1), None, None, None]);
    }

    #[test]
    fn slices_are_mapped_by_reference() {
        let abort_flag = AtomicBool::new(false);
        let words = ["a", "bb", "ccc"];
        let results = par_map_cancellable(&words[..], &abort_flag, |s| s.len());
        assert_eq!(results, vec![Some(1), Some(2), Some(3)]);
    }
}
