//! Budgeted chunk planning.
//!
//! [`plan_chunks`] walks an item slice from a start offset and yields maximal
//! contiguous chunks whose summed weight stays within the budget. The plan is
//! lazy: a chunk is only cut when the caller asks for it, so a pipeline can
//! submit, retrieve and checkpoint one chunk before the next is formed.
//! Boundaries depend only on the input order, weights and budget, so starting
//! at a chunk's `next_offset` reproduces the rest of an uninterrupted plan.

use serde::Deserialize;

use crate::error::PipelineError;

/// What to do with an item that alone weighs more than the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Stop the plan with [`PipelineError::BudgetExceededBySingleItem`].
    #[default]
    Reject,
    /// Emit the item as a chunk of its own, over budget.
    Isolate,
}

/// A contiguous run of items, `start..=end` in the parent sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a, T> {
    pub items: &'a [T],
    pub start: usize,
    pub end: usize,
    pub weight: usize,
}

impl<T> Chunk<'_, T> {
    /// Offset of the first item after this chunk; the value to resume from.
    pub fn next_offset(&self) -> usize {
        self.end + 1
    }
}

/// Lazy sequence of chunks. Fused after the first error.
pub struct ChunkPlan<'a, T, W> {
    items: &'a [T],
    cursor: usize,
    budget: usize,
    weight: W,
    policy: OversizePolicy,
    failed: bool,
}

pub fn plan_chunks<T, W>(
    items: &[T],
    start: usize,
    budget: usize,
    weight: W,
    policy: OversizePolicy,
) -> ChunkPlan<'_, T, W>
where
    W: FnMut(&T) -> usize,
{
    ChunkPlan {
        items,
        cursor: start,
        budget,
        weight,
        policy,
        failed: false,
    }
}

impl<'a, T, W> Iterator for ChunkPlan<'a, T, W>
where
    W: FnMut(&T) -> usize,
{
    type Item = Result<Chunk<'a, T>, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.items.len() {
            return None;
        }

        let start = self.cursor;
        let mut end = start;
        let mut total = 0usize;
        while end < self.items.len() {
            let w = (self.weight)(&self.items[end]);
            if total + w > self.budget {
                break;
            }
            total += w;
            end += 1;
        }

        if end == start {
            let weight = (self.weight)(&self.items[start]);
            match self.policy {
                OversizePolicy::Reject => {
                    self.failed = true;
                    return Some(Err(PipelineError::BudgetExceededBySingleItem {
                        offset: start,
                        weight,
                        budget: self.budget,
                    }));
                }
                OversizePolicy::Isolate => {
                    tracing::warn!(
                        offset = start,
                        weight,
                        budget = self.budget,
                        "item exceeds the chunk budget; submitting it alone"
                    );
                    end = start + 1;
                    total = weight;
                }
            }
        }

        self.cursor = end;
        Some(Ok(Chunk {
            items: &self.items[start..end],
            start,
            end: end - 1,
            weight: total,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights<W: FnMut(&usize) -> usize>(plan: ChunkPlan<'_, usize, W>) -> Vec<Vec<usize>> {
        plan.map(|c| c.unwrap().items.to_vec()).collect()
    }

    fn identity(w: &usize) -> usize {
        *w
    }

    #[test]
    fn three_forties_under_ninety() {
        let items = [40, 40, 40];
        let mut plan = plan_chunks(&items, 0, 90, identity, OversizePolicy::Reject);

        let first = plan.next().unwrap().unwrap();
        assert_eq!((first.start, first.end, first.weight), (0, 1, 80));
        assert_eq!(first.next_offset(), 2);

        let second = plan.next().unwrap().unwrap();
        assert_eq!((second.start, second.end, second.weight), (2, 2, 40));

        assert!(plan.next().is_none());
    }

    #[test]
    fn resume_from_checkpoint_yields_remaining_chunk() {
        let items = [40, 40, 40];
        let chunks = weights(plan_chunks(&items, 2, 90, identity, OversizePolicy::Reject));
        assert_eq!(chunks, vec![vec![40]]);
    }

    #[test]
    fn resume_reproduces_uninterrupted_boundaries() {
        let items = [10, 30, 25, 5, 60, 20, 20, 45, 1, 50];
        let full: Vec<(usize, usize)> = plan_chunks(&items, 0, 60, identity, OversizePolicy::Reject)
            .map(|c| c.map(|c| (c.start, c.end)).unwrap())
            .collect();

        let (_, second_end) = full[1];
        let resumed: Vec<(usize, usize)> =
            plan_chunks(&items, second_end + 1, 60, identity, OversizePolicy::Reject)
                .map(|c| c.map(|c| (c.start, c.end)).unwrap())
                .collect();
        assert_eq!(resumed, full[2..].to_vec());
    }

    #[test]
    fn chunks_concatenate_to_input_within_budget() {
        let items: Vec<usize> = (0..50).map(|n| (n * 37) % 23 + 1).collect();
        let mut rebuilt = Vec::new();
        for chunk in plan_chunks(&items, 0, 40, identity, OversizePolicy::Reject) {
            let chunk = chunk.unwrap();
            assert!(chunk.weight <= 40);
            assert!(!chunk.items.is_empty());
            assert_eq!(chunk.weight, chunk.items.iter().sum::<usize>());
            rebuilt.extend_from_slice(chunk.items);
        }
        assert_eq!(rebuilt, items);
    }

    #[test]
    fn item_that_exactly_fits_is_a_chunk() {
        let items = [90, 10];
        let chunks = weights(plan_chunks(&items, 0, 90, identity, OversizePolicy::Reject));
        assert_eq!(chunks, vec![vec![90], vec![10]]);
    }

    #[test]
    fn oversized_item_is_rejected() {
        let items = [40, 120, 40];
        let mut plan = plan_chunks(&items, 0, 90, identity, OversizePolicy::Reject);
        assert_eq!(plan.next().unwrap().unwrap().items, &[40]);
        match plan.next().unwrap() {
            Err(PipelineError::BudgetExceededBySingleItem {
                offset,
                weight,
                budget,
            }) => assert_eq!((offset, weight, budget), (1, 120, 90)),
            other => panic!("expected BudgetExceededBySingleItem, got {other:?}"),
        }
        assert!(plan.next().is_none());
    }

    #[test]
    fn oversized_item_is_isolated() {
        let items = [40, 120, 40];
        let chunks: Vec<Chunk<'_, usize>> =
            plan_chunks(&items, 0, 90, identity, OversizePolicy::Isolate)
                .map(Result::unwrap)
                .collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[1].start, chunks[1].end, chunks[1].weight), (1, 1, 120));
        assert_eq!(chunks[2].items, &[40]);
    }

    #[test]
    fn start_past_end_is_empty() {
        let items = [1, 2, 3];
        assert!(
            plan_chunks(&items, 3, 10, identity, OversizePolicy::Reject)
                .next()
                .is_none()
        );
        assert!(
            plan_chunks(&items, 7, 10, identity, OversizePolicy::Reject)
                .next()
                .is_none()
        );
    }

    #[test]
    fn empty_input_has_no_chunks() {
        let items: [usize; 0] = [];
        assert!(
            plan_chunks(&items, 0, 10, identity, OversizePolicy::Reject)
                .next()
                .is_none()
        );
    }
}
