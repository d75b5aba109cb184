//! Dataset collection.
//!
//! Loading an experiment descriptor builds the model function once, creates one
//! dataset per `[[data]]` block and registers the sharing classes each dataset binds
//! to. Datasets from different descriptors are never merged point-wise; they only
//! meet through shared parameters.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::data::{Dataset, DatasetId, ExperimentDescriptor};
use crate::domain::{Bounds, GroupId};
use crate::error::FitError;
use crate::models::{ModelCatalog, ModelContext};
use crate::params::{ParamDescriptor, ParameterRegistry};

#[derive(Debug, Clone, Default)]
pub struct DatasetCollection {
    datasets: Vec<Dataset>,
    identities: HashMap<String, DatasetId>,
}

impl DatasetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every data block of a descriptor.
    ///
    /// Fails without modifying the collection when a block duplicates an existing
    /// (group, model, conditions) identity.
    pub fn load(
        &mut self,
        desc: &ExperimentDescriptor,
        catalog: &ModelCatalog,
        registry: &mut ParameterRegistry,
    ) -> Result<Vec<DatasetId>, FitError> {
        let origin = desc.path.display().to_string();
        let entry = catalog.get(&desc.model, &origin)?;
        let ctx = ModelContext {
            key: entry.key.clone(),
            origin: origin.clone(),
            conditions: desc.conditions.clone(),
            kinetics: desc.kinetics.clone(),
            constants: desc.constants.clone(),
        };
        let model = entry.build(&ctx)?;

        let mut staged: Vec<Dataset> = Vec::with_capacity(desc.blocks.len());
        let mut staged_ids: HashMap<String, String> = HashMap::new();
        for block in &desc.blocks {
            for (i, p) in block.points.iter().enumerate() {
                model.check_x(p.x).map_err(|m| {
                    FitError::parse(origin.clone(), format!("group '{}', point {}: {m}", block.group, i + 1))
                })?;
            }

            let dataset = Dataset {
                name: format!("{}/{}", desc.name, block.group),
                experiment: desc.name.clone(),
                origin: desc.path.clone(),
                group: block.group.clone(),
                model_key: entry.key.clone(),
                kinetics: desc.kinetics.clone(),
                conditions: desc.conditions.clone(),
                constants: desc.constants.clone(),
                model: model.clone(),
                bindings: Vec::new(),
                points: block.points.clone(),
            };

            let identity = dataset.identity();
            let first = self
                .identities
                .get(&identity)
                .map(|id| self.datasets[id.index()].origin.display().to_string())
                .or_else(|| staged_ids.get(&identity).cloned());
            if let Some(first) = first {
                return Err(FitError::DuplicateDataset {
                    group: block.group.to_string(),
                    model: entry.key.clone(),
                    first,
                    second: origin,
                });
            }
            staged_ids.insert(identity, origin.clone());
            staged.push(dataset);
        }

        let default_origin = format!("{} ({origin})", entry.key);
        let mut ids = Vec::with_capacity(staged.len());
        for mut dataset in staged {
            dataset.bindings = model
                .slots()
                .iter()
                .map(|slot| {
                    registry.register(
                        ParamDescriptor::model_default(
                            slot.param_name(&dataset.group, &dataset.conditions),
                            default_origin.clone(),
                        )
                        .with_value(slot.default)
                        .with_bounds(Bounds {
                            min: slot.min,
                            max: slot.max,
                        })
                        .with_fixed(slot.fixed),
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;

            let id = DatasetId(self.datasets.len());
            debug!(dataset = %dataset.name, points = dataset.len(), "loaded dataset");
            self.identities.insert(dataset.identity(), id);
            self.datasets.push(dataset);
            ids.push(id);
        }

        info!(
            path = %origin,
            model = %entry.key,
            datasets = ids.len(),
            "loaded experiment"
        );
        Ok(ids)
    }

    pub fn get(&self, id: DatasetId) -> &Dataset {
        &self.datasets[id.index()]
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Datasets in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (DatasetId, &Dataset)> {
        self.datasets.iter().enumerate().map(|(i, d)| (DatasetId(i), d))
    }

    pub fn ids(&self) -> Vec<DatasetId> {
        (0..self.datasets.len()).map(DatasetId).collect()
    }

    pub fn total_points(&self) -> usize {
        self.datasets.iter().map(Dataset::len).sum()
    }

    pub fn by_group(&self) -> BTreeMap<GroupId, Vec<DatasetId>> {
        let mut groups: BTreeMap<GroupId, Vec<DatasetId>> = BTreeMap::new();
        for (id, d) in self.iter() {
            groups.entry(d.group.clone()).or_default().push(id);
        }
        groups
    }

    /// Apply model point filters (e.g. the CEST on-resonance filter) at the
    /// registry's current values. Returns the number of points removed.
    pub fn apply_point_filters(&mut self, registry: &ParameterRegistry) -> usize {
        let snapshot = registry.snapshot();
        let mut removed = 0;
        for dataset in &mut self.datasets {
            let n = dataset.filter_points(snapshot.as_slice());
            if n > 0 {
                debug!(dataset = %dataset.name, removed = n, "filtered points");
            }
            removed += n;
        }
        if removed > 0 {
            info!(removed, "point filters applied");
        }
        removed
    }
}
