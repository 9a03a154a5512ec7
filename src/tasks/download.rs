use super::{Task, TaskContext, TaskError, TaskOutput};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Network client used by [`DownloadTask`].
///
/// Implementations write the body at `url` to `destination` and give up with
/// [`TaskError::Timeout`] when `timeout` elapses without progress.
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
        timeout: Duration,
        ctx: &TaskContext,
    ) -> Result<u64, TaskError>;
}

/// Download a build archive to a file
pub struct DownloadTask {
    url: String,
    destination: Utf8PathBuf,
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
    retry_timeout: Duration,
}

impl DownloadTask {
    pub fn new(
        url: impl Into<String>,
        destination: impl Into<Utf8PathBuf>,
        fetcher: Arc<dyn Fetcher>,
        timeout: Duration,
        retry_timeout: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            fetcher,
            timeout,
            retry_timeout,
        }
    }
}

impl Task for DownloadTask {
    fn name(&self) -> String {
        format!("Download {}", self.url)
    }

    fn run(&mut self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        ctx.check_stopped()?;
        ctx.message(format!("Downloading {}", self.url));

        let bytes = match self
            .fetcher
            .fetch(&self.url, &self.destination, self.timeout, ctx)
        {
            // One retry with the relaxed timeout, then the error stands
            Err(TaskError::Timeout(elapsed)) => {
                tracing::warn!(
                    "Download of {} timed out after {:?}, retrying with {:?}",
                    self.url,
                    elapsed,
                    self.retry_timeout
                );
                ctx.check_stopped()?;
                ctx.message("Connection timed out, retrying");
                self.fetcher
                    .fetch(&self.url, &self.destination, self.retry_timeout, ctx)?
            }
            other => other?,
        };

        tracing::info!("Downloaded {} ({} bytes) to {}", self.url, bytes, self.destination);
        Ok(TaskOutput::Downloaded(self.destination.clone()))
    }
}
