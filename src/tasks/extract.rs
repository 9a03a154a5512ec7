use super::{Task, TaskContext, TaskError, TaskOutput};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;

/// Archive backend used by [`ExtractTask`].
///
/// Returns the folder the archive's top-level build directory ended up in.
#[cfg_attr(test, mockall::automock)]
pub trait Extractor: Send + Sync {
    fn extract(
        &self,
        archive: &Utf8Path,
        destination: &Utf8Path,
        ctx: &TaskContext,
    ) -> Result<Utf8PathBuf, TaskError>;
}

/// Unpack a downloaded archive into the library
pub struct ExtractTask {
    archive: Utf8PathBuf,
    destination: Utf8PathBuf,
    extractor: Arc<dyn Extractor>,
}

impl ExtractTask {
    pub fn new(
        archive: impl Into<Utf8PathBuf>,
        destination: impl Into<Utf8PathBuf>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            archive: archive.into(),
            destination: destination.into(),
            extractor,
        }
    }
}

impl Task for ExtractTask {
    fn name(&self) -> String {
        format!("Extract {}", self.archive)
    }

    fn run(&mut self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        ctx.check_stopped()?;

        if !self.archive.exists() {
            return Err(TaskError::Extract(format!("archive not found: {}", self.archive)));
        }

        ctx.message(format!("Extracting {} to {}", self.archive, self.destination));
        let folder = self.extractor.extract(&self.archive, &self.destination, ctx)?;

        tracing::info!("Extracted {} into {}", self.archive, folder);
        Ok(TaskOutput::Extracted(folder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskId;
    use tempfile::TempDir;

    #[test]
    fn test_extract_reports_folder() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let archive = root.join("blender-4.2.0.zip");
        std::fs::write(&archive, b"PK").unwrap();

        let expected = root.join("stable/blender-4.2.0");
        let returned = expected.clone();
        let mut extractor = MockExtractor::new();
        extractor
            .expect_extract()
            .times(1)
            .returning(move |_, _, _| Ok(returned.clone()));

        let mut task = ExtractTask::new(&archive, root.join("stable"), Arc::new(extractor));
        let (ctx, _rx, _stop) = TaskContext::standalone(TaskId(1));

        assert_eq!(task.run(&ctx).unwrap(), TaskOutput::Extracted(expected));
    }

    #[test]
    fn test_missing_archive_fails_without_extracting() {
        let mut extractor = MockExtractor::new();
        extractor.expect_extract().never();

        let mut task = ExtractTask::new(
            "/nonexistent/blender.zip",
            "/nonexistent/stable",
            Arc::new(extractor),
        );
        let (ctx, _rx, _stop) = TaskContext::standalone(TaskId(1));

        assert!(matches!(task.run(&ctx), Err(TaskError::Extract(_))));
    }
}
