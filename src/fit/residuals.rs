//! Global residual vector assembly.
//!
//! The residual vector concatenates, in dataset order then point order, the
//! normalized residuals `(calculated − observed) / error` of every active point.
//! Each dataset owns a fixed slice of the vector, so the evaluation order (parallel,
//! forward, reverse) never changes which residual lands at which index.

use rayon::prelude::*;

use crate::data::{DatasetCollection, DatasetId};
use crate::domain::EvaluationOrder;

#[derive(Debug, Clone, PartialEq)]
pub struct ResidualLayout {
    datasets: Vec<DatasetId>,
    offsets: Vec<usize>,
    len: usize,
}

impl ResidualLayout {
    pub fn new(collection: &DatasetCollection, datasets: &[DatasetId]) -> Self {
        let mut offsets = Vec::with_capacity(datasets.len());
        let mut len = 0;
        for &id in datasets {
            offsets.push(len);
            len += collection.get(id).len();
        }
        Self {
            datasets: datasets.to_vec(),
            offsets,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn datasets(&self) -> &[DatasetId] {
        &self.datasets
    }

    /// Start of each dataset's block, in layout order.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Fill `out` (length [`Self::len`]) from a full value table.
    pub fn evaluate(
        &self,
        collection: &DatasetCollection,
        table: &[f64],
        order: EvaluationOrder,
        out: &mut [f64],
    ) {
        let mut blocks = self.split(collection, out);
        match order {
            EvaluationOrder::Parallel => {
                blocks.par_iter_mut().for_each(|(id, block)| {
                    collection.get(*id).residuals_into(table, block);
                });
            }
            EvaluationOrder::Forward => {
                for (id, block) in blocks.iter_mut() {
                    collection.get(*id).residuals_into(table, block);
                }
            }
            EvaluationOrder::Reverse => {
                for (id, block) in blocks.iter_mut().rev() {
                    collection.get(*id).residuals_into(table, block);
                }
            }
        }
    }

    /// Convenience wrapper allocating the output vector.
    pub fn residuals(
        &self,
        collection: &DatasetCollection,
        table: &[f64],
        order: EvaluationOrder,
    ) -> Vec<f64> {
        let mut out = vec![0.0; self.len];
        self.evaluate(collection, table, order, &mut out);
        out
    }

    fn split<'o>(
        &self,
        collection: &DatasetCollection,
        out: &'o mut [f64],
    ) -> Vec<(DatasetId, &'o mut [f64])> {
        let mut blocks = Vec::with_capacity(self.datasets.len());
        let mut rest = out;
        for &id in &self.datasets {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(collection.get(id).len());
            blocks.push((id, head));
            rest = tail;
        }
        blocks
    }
}

/// `Σ r²`.
pub fn chi_square(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}
