use std::collections::BTreeSet;

use tracing::info;

use crate::data::{DatasetCollection, DatasetId};
use crate::domain::GroupId;
use crate::error::FitError;
use crate::params::{ParamId, wildcard_match};

/// Exclusion and inclusion group patterns (wildcards allowed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionFilter {
    exclude: Vec<String>,
    include: Vec<String>,
}

impl SelectionFilter {
    pub fn new(exclude: Vec<String>, include: Vec<String>) -> Self {
        let norm = |v: Vec<String>| v.into_iter().map(|g| g.trim().to_uppercase()).collect();
        Self {
            exclude: norm(exclude),
            include: norm(include),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exclude.is_empty() && self.include.is_empty()
    }

    pub fn excludes(&self, group: &GroupId) -> bool {
        self.exclude.iter().any(|p| wildcard_match(p, group.as_str()))
    }

    /// Whether the include list lets this group through (an empty list does).
    pub fn includes(&self, group: &GroupId) -> bool {
        self.include.is_empty() || self.include.iter().any(|p| wildcard_match(p, group.as_str()))
    }

    /// Reject a group that is both included and excluded within one run.
    pub fn validate(&self, collection: &DatasetCollection) -> Result<(), FitError> {
        if let Some(p) = self.exclude.iter().find(|p| self.include.contains(p)) {
            return Err(FitError::Configuration {
                message: format!("group '{p}' is both included (+r) and excluded (-r)"),
            });
        }
        if self.include.is_empty() {
            return Ok(());
        }
        for group in collection.by_group().keys() {
            let included = self.include.iter().any(|p| wildcard_match(p, group.as_str()));
            if included && self.excludes(group) {
                return Err(FitError::Configuration {
                    message: format!("group '{group}' is both included (+r) and excluded (-r)"),
                });
            }
        }
        Ok(())
    }

    /// Validate, then narrow the full collection.
    pub fn apply(&self, collection: &DatasetCollection) -> Result<ActiveSet, FitError> {
        self.validate(collection)?;
        let active = ActiveSet::all(collection).refine(self, collection);
        info!(
            datasets = active.datasets.len(),
            points = active.n_points,
            parameters = active.params.len(),
            "selection applied"
        );
        Ok(active)
    }
}

/// Datasets, points and parameters that take part in a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSet {
    datasets: Vec<DatasetId>,
    params: BTreeSet<ParamId>,
    n_points: usize,
}

impl ActiveSet {
    /// Every dataset of the collection.
    pub fn all(collection: &DatasetCollection) -> Self {
        Self::from_datasets(collection, collection.ids())
    }

    /// Active set over the given datasets, in the given order.
    pub fn from_datasets(collection: &DatasetCollection, datasets: Vec<DatasetId>) -> Self {
        let datasets: Vec<DatasetId> = datasets
            .into_iter()
            .filter(|&id| !collection.get(id).is_empty())
            .collect();
        let params = datasets
            .iter()
            .flat_map(|&id| collection.get(id).bindings.iter().copied())
            .collect();
        let n_points = datasets.iter().map(|&id| collection.get(id).len()).sum();
        Self {
            datasets,
            params,
            n_points,
        }
    }

    /// Narrow by a further filter: exclusion first, then inclusion. Never adds.
    pub fn refine(&self, filter: &SelectionFilter, collection: &DatasetCollection) -> Self {
        let kept = self
            .datasets
            .iter()
            .copied()
            .filter(|&id| {
                let group = &collection.get(id).group;
                !filter.excludes(group) && filter.includes(group)
            })
            .collect();
        Self::from_datasets(collection, kept)
    }

    pub fn datasets(&self) -> &[DatasetId] {
        &self.datasets
    }

    pub fn params(&self) -> &BTreeSet<ParamId> {
        &self.params
    }

    pub fn contains_param(&self, id: ParamId) -> bool {
        self.params.contains(&id)
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

#[cfg(test)]
impl SelectionFilter {
    pub(crate) fn excluding(groups: &[&str]) -> Self {
        Self::new(groups.iter().map(|g| g.to_string()).collect(), Vec::new())
    }

    pub(crate) fn including(groups: &[&str]) -> Self {
        Self::new(Vec::new(), groups.iter().map(|g| g.to_string()).collect())
    }
}
