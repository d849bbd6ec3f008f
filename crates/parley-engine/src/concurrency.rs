//! The two composition primitives the stage graphs are built from.
//!
//! [`fan_out`] launches every unit before awaiting any of them and collects results
//! into an ordered slot array. [`fold`] runs strictly one step at a time.
//! Neither spawns: dropping the returned future drops every in-flight unit with it.

use std::future::Future;

use futures::future::join_all;

use crate::error::PipelineError;

/// Run one unit per item concurrently and wait for all of them.
///
/// Slot `i` holds the result of item `i`. Every unit runs to completion even if a
/// sibling fails; the stage then fails with the lowest-indexed error.
pub async fn fan_out<I, T, F, Fut>(items: I, mut unit: F) -> Result<Vec<T>, PipelineError>
where
    I: IntoIterator,
    F: FnMut(usize, I::Item) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let pending: Vec<Fut> = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| unit(idx, item))
        .collect();

    let mut slots: Vec<Option<T>> = Vec::with_capacity(pending.len());
    slots.resize_with(pending.len(), || None);

    let mut first_error = None;
    let mut failures = 0usize;
    for (idx, outcome) in join_all(pending).await.into_iter().enumerate() {
        match outcome {
            Ok(value) => slots[idx] = Some(value),
            Err(e) => {
                failures += 1;
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_error {
        tracing::warn!(failures, total = slots.len(), error = %e, "fan-out unit failed");
        return Err(e);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.ok_or_else(|| PipelineError::Internal(format!("fan-out slot {idx} left empty")))
        })
        .collect()
}

/// Thread an accumulator through `step` for each item, in order.
pub async fn fold<I, A, F, Fut>(items: I, init: A, mut step: F) -> Result<A, PipelineError>
where
    I: IntoIterator,
    F: FnMut(A, usize, I::Item) -> Fut,
    Fut: Future<Output = Result<A, PipelineError>>,
{
    let mut acc = init;
    for (idx, item) in items.into_iter().enumerate() {
        acc = step(acc, idx, item).await?;
    }
    Ok(acc)
}
