//! Independent clusters.
//!
//! Two datasets belong to the same cluster when they share a free parameter,
//! directly or through other datasets. Clusters have disjoint free sets, so they can
//! be minimized separately (and in parallel) before the global pass.

use std::collections::HashMap;

use crate::data::{DatasetCollection, DatasetId};
use crate::params::ParamId;

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub datasets: Vec<DatasetId>,
    pub free: Vec<ParamId>,
}

/// Partition the datasets by shared free parameters.
///
/// Datasets that reference no free parameter belong to no cluster. Clusters come out
/// in order of their first dataset; free parameters keep the order of `free`.
pub fn independent_clusters(
    collection: &DatasetCollection,
    datasets: &[DatasetId],
    free: &[ParamId],
) -> Vec<Cluster> {
    let position: HashMap<ParamId, usize> = free.iter().enumerate().map(|(k, &id)| (id, k)).collect();

    let mut parent: Vec<usize> = (0..datasets.len()).collect();
    let mut owner: HashMap<ParamId, usize> = HashMap::new();
    let mut has_free = vec![false; datasets.len()];

    for (i, &id) in datasets.iter().enumerate() {
        for p in &collection.get(id).bindings {
            if !position.contains_key(p) {
                continue;
            }
            has_free[i] = true;
            match owner.get(p) {
                Some(&j) => union(&mut parent, i, j),
                None => {
                    owner.insert(*p, i);
                }
            }
        }
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    for (i, &id) in datasets.iter().enumerate() {
        if !has_free[i] {
            continue;
        }
        let root = find(&mut parent, i);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            clusters.push(Cluster {
                datasets: Vec::new(),
                free: Vec::new(),
            });
            clusters.len() - 1
        });
        clusters[slot].datasets.push(id);
    }

    for (&p, &i) in &owner {
        let root = find(&mut parent, i);
        if let Some(&slot) = slot_of_root.get(&root) {
            clusters[slot].free.push(p);
        }
    }
    for cluster in &mut clusters {
        cluster.free.sort_by_key(|p| position[p]);
    }
    clusters
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}
