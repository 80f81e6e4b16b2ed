use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::Result;
use crate::store::OutputSink;

/// Writes command results as JSON files into one directory
///
/// # Directory Structure
/// ```text
/// data/
/// ├── fetch.users.20240309070501.json
/// ├── search.messages.20240309070502.json
/// └── alice@contoso.com.d3590ed6-...-aad2292ab01c.20240309070503.json
/// ```
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if needed
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        // Results carry live credentials
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&dir, perms)?;
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl OutputSink for DirectorySink {
    async fn write_json(&self, name: &str, data: &Value) -> Result<String> {
        let path = self.dir.join(name);
        write_json_atomic(&path, data).await?;
        Ok(path.display().to_string())
    }
}

/// Write pretty JSON through a temp file and rename, owner-only on Unix
pub async fn write_json_atomic(path: &Path, data: &Value) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;

    let temp_path = path.with_extension("tmp");
    let mut file = create_private(&temp_path).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    debug!("Wrote {}", path.display());
    Ok(())
}

/// Open `path` for writing, truncated, readable by the owner only on Unix.
///
/// A leftover file from an earlier run is narrowed to owner-only before
/// anything is written to it.
async fn create_private(path: &Path) -> Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let file = options.open(path).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }

    Ok(file)
}
