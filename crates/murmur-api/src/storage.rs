use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Directory holding in-flight voice uploads.
///
/// Each upload lives at `{dir}/{uuid}-{sanitized name}` for the duration of a
/// single request. The per-request UUID keeps concurrent uploads that share a
/// filename apart.
pub struct UploadDir {
    dir: PathBuf,
}

impl UploadDir {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Write `data` to a fresh transient file. The returned guard deletes the
    /// file when it goes out of scope, including when the write itself fails.
    pub async fn store(&self, sanitized_name: &str, data: &[u8]) -> Result<TransientFile> {
        let path = self
            .dir
            .join(format!("{}-{}", Uuid::new_v4(), sanitized_name));
        let guard = TransientFile::new(path);

        let mut file = fs::File::create(guard.path()).await?;
        file.write_all(data).await?;
        file.flush().await?;

        debug!("Stored {} bytes at {}", data.len(), guard.path().display());
        Ok(guard)
    }

    /// Names of the files currently in the directory.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Remove uploads left behind by a previous process that died mid-request.
    /// Only names shaped like the ones [`UploadDir::store`] writes are touched.
    /// Returns how many were removed.
    pub async fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.list_files().await? {
            if !is_upload_name(&name) {
                debug!("Sweep skipping foreign file {}", name);
                continue;
            }
            let path = self.dir.join(&name);
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not remove leftover upload {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

/// `{uuid}-{name}` with a non-empty name.
fn is_upload_name(name: &str) -> bool {
    match (name.get(..36), name.get(36..)) {
        (Some(id), Some(rest)) => {
            Uuid::parse_str(id).is_ok() && rest.len() > 1 && rest.starts_with('-')
        }
        _ => false,
    }
}

/// A request-scoped upload file, deleted on drop.
pub struct TransientFile {
    path: PathBuf,
    removed: bool,
}

impl TransientFile {
    fn new(path: PathBuf) -> Self {
        Self { path, removed: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. Failures are logged; the caller's outcome stands.
    pub async fn remove(mut self) {
        self.removed = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => debug!("Deleted transient upload {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Transient upload {} already gone", self.path.display());
            }
            Err(e) => warn!("Failed to delete transient upload {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Deleted transient upload {} on drop", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete transient upload {}: {}", self.path.display(), e),
        }
    }
}

/// Reduce a client-supplied filename to a safe basename: directory parts are
/// dropped and only ASCII letters, digits, `.`, `-` and `_` survive. Never
/// returns an empty string or a name starting with `.`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("");

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    let cleaned = cleaned.trim_start_matches(|c| c == '.' || c == '_');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
