//! Write simulated profiles.
//!
//! For every experiment descriptor `<stem>.toml` we write `<output>/<stem>.toml`
//! with its data blocks pointing at `<output>/<stem>/<group>.csv`, so the output
//! directory can be fitted again as is.

use std::path::Path;

use tracing::info;

use crate::data::{DatasetCollection, ExperimentDescriptor, SimulatedDataset};
use crate::domain::GroupId;
use crate::error::AppError;
use crate::io::{create_dir, output_error};

pub fn write_profiles(
    root: &Path,
    descriptors: &[ExperimentDescriptor],
    collection: &DatasetCollection,
    simulated: &[SimulatedDataset],
) -> Result<(), AppError> {
    create_dir(root)?;

    for desc in descriptors {
        let stem = desc
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| desc.name.clone());
        let data_dir = root.join(&stem);
        create_dir(&data_dir)?;

        let mut files: Vec<(GroupId, String)> = Vec::new();
        for sim in simulated {
            let dataset = collection.get(sim.dataset);
            if dataset.origin != desc.path {
                continue;
            }
            let file_name = format!("{}.csv", dataset.group);
            let path = data_dir.join(&file_name);
            let mut writer = csv::Writer::from_path(&path).map_err(|e| output_error(&path, e))?;
            for point in &sim.points {
                writer.serialize(point).map_err(|e| output_error(&path, e))?;
            }
            writer.flush().map_err(|e| output_error(&path, e))?;
            files.push((dataset.group.clone(), format!("{stem}/{file_name}")));
        }

        let toml_path = root.join(format!("{stem}.toml"));
        let text = desc.to_toml_with_files(&files)?;
        std::fs::write(&toml_path, text).map_err(|e| output_error(&toml_path, e))?;
        info!(path = %toml_path.display(), datasets = files.len(), "simulated experiment written");
    }
    Ok(())
}
