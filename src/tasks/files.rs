use super::{Task, TaskContext, TaskError, TaskOutput};
use crate::models::BuildInfo;
use crate::services::library;
use camino::Utf8PathBuf;
use std::fs;

/// Rename (move) a build folder inside the library
pub struct RenameTask {
    from: Utf8PathBuf,
    to: Utf8PathBuf,
}

impl RenameTask {
    pub fn new(from: impl Into<Utf8PathBuf>, to: impl Into<Utf8PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Task for RenameTask {
    fn name(&self) -> String {
        format!("Rename {}", self.from)
    }

    fn run(&mut self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        ctx.check_stopped()?;

        if self.to.exists() {
            return Err(TaskError::Other(format!("{} already exists", self.to)));
        }

        ctx.message(format!("Renaming {} to {}", self.from, self.to));
        fs::rename(&self.from, &self.to).map_err(|e| TaskError::io(&self.from, e))?;

        tracing::info!("Renamed {} to {}", self.from, self.to);
        Ok(TaskOutput::Renamed(self.to.clone()))
    }
}

/// Delete a build folder (or a stray file such as a leftover archive)
pub struct RemoveTask {
    path: Utf8PathBuf,
}

impl RemoveTask {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Task for RemoveTask {
    fn name(&self) -> String {
        format!("Remove {}", self.path)
    }

    fn run(&mut self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        ctx.check_stopped()?;
        ctx.message(format!("Removing {}", self.path));

        let result = if self.path.is_dir() {
            fs::remove_dir_all(&self.path)
        } else {
            fs::remove_file(&self.path)
        };
        result.map_err(|e| TaskError::io(&self.path, e))?;

        tracing::info!("Removed {}", self.path);
        Ok(TaskOutput::Removed(self.path.clone()))
    }
}

/// Persist a build's `.blinfo` record into its folder
pub struct WriteBuildInfoTask {
    info: BuildInfo,
}

impl WriteBuildInfoTask {
    pub fn new(info: BuildInfo) -> Self {
        Self { info }
    }
}

impl Task for WriteBuildInfoTask {
    fn name(&self) -> String {
        format!("Write build info {}", self.info.display_name())
    }

    fn run(&mut self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        ctx.check_stopped()?;
        let path = library::write_build_info(&self.info.folder, &self.info)?;
        ctx.message(format!("Wrote {}", path));
        Ok(TaskOutput::Written(path))
    }
}
