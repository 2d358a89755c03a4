use crate::core::feature::GraphSnapshot;
use crate::io::IoError;
use std::{fs::File, io::BufWriter, io::Write, path::Path};
use tracing::info;

/// Writes a [`GraphSnapshot`] as pretty JSON:
/// `{"poses": [[x, y, yaw], ...], "features": [{"id", "kind", "visualization_data", "observations"}]}`.
pub struct SnapshotWriter;

impl SnapshotWriter {
    pub fn write<P: AsRef<Path>>(snapshot: &GraphSnapshot, path: P) -> Result<(), IoError> {
        let path_ref = path.as_ref();
        let file = File::create(path_ref).map_err(|e| {
            IoError::FileCreationFailed {
                path: path_ref.display().to_string(),
                reason: e.to_string(),
            }
            .log()
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot)
            .map_err(|e| IoError::from(e).log_with_source("Failed to write snapshot"))?;
        writeln!(writer)
            .and_then(|_| writer.flush())
            .map_err(|e| IoError::Io(e).log_with_source("Failed to flush snapshot file"))?;

        info!(
            "wrote snapshot with {} poses and {} features to {:?}",
            snapshot.poses.len(),
            snapshot.features.len(),
            path_ref
        );
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<GraphSnapshot, IoError> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|e| {
            IoError::Io(e).log_with_source(format!("Failed to open snapshot file: {:?}", path_ref))
        })?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| IoError::from(e).log())
    }
}
