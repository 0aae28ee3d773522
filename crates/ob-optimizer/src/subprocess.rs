//! Launching the external optimizer and collecting its exit status.

use ob_types::SubprocessError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

use crate::settings::SubprocessSettings;

/// One invocation of the optimizer binary against a working directory.
#[derive(Debug, Clone)]
pub struct OptimizerProcess {
    executable: PathBuf,
    root_dir: PathBuf,
}

impl OptimizerProcess {
    pub fn new(executable: impl Into<PathBuf>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            root_dir: root_dir.into(),
        }
    }

    pub fn program(&self) -> String {
        self.executable.display().to_string()
    }

    /// Write `settings`, run the optimizer with the working directory as its
    /// only argument and wait for it to exit. Output is buffered and copied
    /// to our own stdout/stderr once the process is gone.
    pub async fn run(&self, settings: &SubprocessSettings) -> Result<(), SubprocessError> {
        let path = settings.write(&self.root_dir)?;
        debug!(path = %path.display(), "optimizer settings written");

        let program = self.program();
        info!(%program, root_dir = %self.root_dir.display(), "executing command");

        let output = Command::new(&self.executable)
            .arg(&self.root_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SubprocessError::Spawn {
                program: program.clone(),
                source,
            })?;

        forward("stdout", &output.stdout, &mut tokio::io::stdout()).await?;
        forward("stderr", &output.stderr, &mut tokio::io::stderr()).await?;

        if !output.status.success() {
            return Err(SubprocessError::Exit {
                program,
                status: output.status,
            });
        }
        Ok(())
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

async fn forward<W>(label: &str, buf: &[u8], writer: &mut W) -> Result<(), SubprocessError>
where
    W: AsyncWrite + Unpin,
{
    if buf.is_empty() {
        return Ok(());
    }
    info!(bytes = buf.len(), "subprocess {}", label);
    writer.write_all(buf).await.map_err(SubprocessError::Output)?;
    writer.flush().await.map_err(SubprocessError::Output)
}
