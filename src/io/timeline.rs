use crate::core::event::Timeline;
use crate::io::IoError;
use std::{fs::File, io::BufWriter, io::Write, path::Path};
use tracing::info;

/// JSON timeline reader and writer.
///
/// A timeline file is an array of frames, each an array of events tagged by `"type"`:
///
/// ```json
/// [
///   [{"type": "init", "pose": [0.0, 0.0, 0.0]}],
///   [{"type": "control", "command": [1.0, 0.0], "alpha": [0.1, 0.01, 0.1, 0.01, 0.1, 0.01]},
///    {"type": "point", "id": 3, "measurement": [2.0, 1.0], "Q": [0.1, 0.0, 0.0, 0.1]}]
/// ]
/// ```
pub struct TimelineLoader;

impl TimelineLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Timeline, IoError> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|e| {
            IoError::Io(e).log_with_source(format!("Failed to open timeline file: {:?}", path_ref))
        })?;
        // SAFETY: the map is read-only and dropped before returning.
        let mmap = unsafe {
            memmap2::Mmap::map(&file).map_err(|e| {
                IoError::Io(e)
                    .log_with_source(format!("Failed to memory-map timeline file: {:?}", path_ref))
            })?
        };
        let content = std::str::from_utf8(&mmap).map_err(|e| {
            IoError::Parse {
                line: 0,
                column: 0,
                message: format!("Invalid UTF-8: {e}"),
            }
            .log()
        })?;

        let timeline = Self::parse_content(content)?;
        info!(
            "loaded timeline {:?}: {} frames, {} events",
            path_ref,
            timeline.len(),
            timeline.num_events()
        );
        Ok(timeline)
    }

    pub fn parse_content(content: &str) -> Result<Timeline, IoError> {
        serde_json::from_str(content).map_err(|e| IoError::from(e).log())
    }

    pub fn write<P: AsRef<Path>>(timeline: &Timeline, path: P) -> Result<(), IoError> {
        let path_ref = path.as_ref();
        let file = File::create(path_ref).map_err(|e| {
            IoError::FileCreationFailed {
                path: path_ref.display().to_string(),
                reason: e.to_string(),
            }
            .log()
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, timeline)
            .map_err(|e| IoError::from(e).log_with_source("Failed to write timeline"))?;
        writer
            .flush()
            .map_err(|e| IoError::Io(e).log_with_source("Failed to flush timeline file"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{Event, LandmarkId};
    use std::io::Write;
    use tempfile::NamedTempFile;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_load_mixed_events() -> TestResult {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            r#"[
                [{{"type": "init", "pose": [1.0, 2.0, 0.5]}}],
                [{{"type": "control", "command": [1.0, 0.1], "alpha": [0.1, 0.0, 0.0, 0.1, 0.0, 0.0]}},
                 {{"type": "observation", "id": "door", "measurement": [2.0, 1.0], "Q": [0.1, 0.0, 0.0, 0.1]}},
                 {{"type": "gps", "fix": [1.0, 2.0]}}]
            ]"#
        )?;

        let timeline = TimelineLoader::load(file.path())?;
        assert_eq!(timeline.len(), 2);
        let second = &timeline.frames()[1];
        assert_eq!(second[0].kind(), "control");
        assert!(matches!(
            &second[1],
            Event::Point { id, .. } if *id == LandmarkId::from("door")
        ));
        assert_eq!(second[2], Event::Unknown);
        Ok(())
    }

    #[test]
    fn test_write_then_load() -> TestResult {
        let timeline = Timeline::new(vec![
            vec![
                Event::init(0.0, 0.0, 0.0),
                Event::point(4u64, [1.0, 0.0], [1.0, 0.0, 0.0, 1.0]),
            ],
            vec![Event::control(0.5, 0.0, [0.1; 6])],
        ]);
        let file = NamedTempFile::new()?;
        TimelineLoader::write(&timeline, file.path())?;
        assert_eq!(TimelineLoader::load(file.path())?, timeline);
        Ok(())
    }

    #[test]
    fn test_malformed_file_reports_line() -> TestResult {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[")?;
        writeln!(file, "  [{{\"type\": \"control\", \"command\": [1.0]}}]")?;
        writeln!(file, "]")?;

        let result = TimelineLoader::load(file.path());
        assert!(matches!(result, Err(IoError::Parse { line: 2, .. })));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let result = TimelineLoader::load("/nonexistent/timeline.json");
        assert!(matches!(result, Err(IoError::Io(_))));
    }
}
