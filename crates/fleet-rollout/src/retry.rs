//! Sequential pass and partition-and-retry combinators.
//!
//! Both are generic over the per-item operation. The operation decides
//! whether the pass continues by returning [`ControlFlow::Continue`] or
//! stops it with [`ControlFlow::Break`]; either way its output is kept.

use std::future::Future;
use std::ops::ControlFlow;

/// Result of a sequential pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequential<I, T> {
    /// Items the operation ran on, in order, with their outputs.
    pub done: Vec<(I, T)>,
    /// Items never reached because the pass stopped early.
    pub remaining: Vec<I>,
    pub halted: bool,
}

/// Run `op` over `items` one at a time, stopping at the first `Break`.
pub async fn run_sequential<I, T, F, Fut>(items: Vec<I>, mut op: F) -> Sequential<I, T>
where
    I: Clone,
    F: FnMut(I) -> Fut,
    Fut: Future<Output = ControlFlow<T, T>>,
{
    let mut done = Vec::with_capacity(items.len());
    let mut halted = false;
    let mut items = items.into_iter();

    for item in items.by_ref() {
        match op(item.clone()).await {
            ControlFlow::Continue(out) => done.push((item, out)),
            ControlFlow::Break(out) => {
                done.push((item, out));
                halted = true;
                break;
            }
        }
    }

    Sequential {
        done,
        remaining: items.collect(),
        halted,
    }
}

/// Result of a retry pass, merged back over the previous results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<I, T> {
    /// Every previous entry, in the original order. Retried entries carry
    /// their new output; the rest are unchanged.
    pub results: Vec<(I, T)>,
    /// How many entries the operation actually ran on.
    pub retried: usize,
    pub halted: bool,
}

/// Re-run `op` on the entries whose previous output matches `needs_retry`,
/// sequentially and once each, then merge the new outputs in place.
///
/// Entries that were not selected, or not reached because the pass halted,
/// keep their previous output.
pub async fn partition_and_retry<I, T, P, F, Fut>(
    previous: Vec<(I, T)>,
    mut needs_retry: P,
    op: F,
) -> Retried<I, T>
where
    I: Clone,
    P: FnMut(&T) -> bool,
    F: FnMut(I) -> Fut,
    Fut: Future<Output = ControlFlow<T, T>>,
{
    let slots: Vec<usize> = previous
        .iter()
        .enumerate()
        .filter(|(_, (_, out))| needs_retry(out))
        .map(|(i, _)| i)
        .collect();
    let items = slots.iter().map(|&i| previous[i].0.clone()).collect();

    let pass = run_sequential(items, op).await;
    let retried = pass.done.len();

    let mut results = previous;
    for (slot, (_, out)) in slots.into_iter().zip(pass.done) {
        results[slot].1 = out;
    }

    Retried {
        results,
        retried,
        halted: pass.halted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_stops_at_break() {
        let pass = run_sequential(vec![1, 2, 3, 4], |n| async move {
            if n == 2 {
                ControlFlow::Break(n * 10)
            } else {
                ControlFlow::Continue(n * 10)
            }
        })
        .await;

        assert_eq!(pass.done, vec![(1, 10), (2, 20)]);
        assert_eq!(pass.remaining, vec![3, 4]);
        assert!(pass.halted);
    }

    #[tokio::test]
    async fn sequential_runs_everything_without_break() {
        let pass = run_sequential(vec!["a", "b"], |s| async move {
            ControlFlow::<usize, usize>::Continue(s.len())
        })
        .await;
        assert_eq!(pass.done.len(), 2);
        assert!(pass.remaining.is_empty());
        assert!(!pass.halted);
    }

    #[tokio::test]
    async fn retry_only_touches_selected_entries() {
        let previous = vec![("a", false), ("b", true), ("c", false), ("d", true)];
        let mut seen = Vec::new();
        let retried = partition_and_retry(
            previous,
            |ok| !ok,
            |name| {
                seen.push(name);
                async move { ControlFlow::Continue(name == "a") }
            },
        )
        .await;

        assert_eq!(seen, vec!["a", "c"]);
        assert_eq!(retried.retried, 2);
        assert_eq!(
            retried.results,
            vec![("a", true), ("b", true), ("c", false), ("d", true)]
        );
    }

    #[tokio::test]
    async fn halted_retry_keeps_unreached_outputs() {
        let previous = vec![(1, "failed"), (2, "failed"), (3, "failed")];
        let retried = partition_and_retry(
            previous,
            |s| *s == "failed",
            |_| async { ControlFlow::Break("interrupted") },
        )
        .await;

        assert!(retried.halted);
        assert_eq!(retried.retried, 1);
        assert_eq!(
            retried.results,
            vec![(1, "interrupted"), (2, "failed"), (3, "failed")]
        );
    }
}
