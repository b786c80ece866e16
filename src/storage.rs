use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use tracing::warn;

use crate::errors::ServiceError;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "wav", "ogg", "m4a"];

/// Where an uploaded asset lives under the public root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    UserImage,
    ProductImage,
    Sound,
}

impl AssetKind {
    fn subdir(self) -> &'static str {
        match self {
            AssetKind::UserImage => "images/users",
            AssetKind::ProductImage => "images/products",
            AssetKind::Sound => "sounds",
        }
    }

    fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            AssetKind::UserImage | AssetKind::ProductImage => &IMAGE_EXTENSIONS,
            AssetKind::Sound => &AUDIO_EXTENSIONS,
        }
    }

    fn rejection_message(self) -> &'static str {
        match self {
            AssetKind::UserImage | AssetKind::ProductImage => {
                "Only png, jpg or jpeg images are accepted"
            }
            AssetKind::Sound => "Only mp3, wav, ogg or m4a audio files are accepted",
        }
    }
}

/// Filesystem store for uploaded assets, rooted at the configured public
/// directory. Saved filenames are server-generated; deletion is best-effort
/// and never fails the record mutation that triggered it.
#[derive(Clone, Debug)]
pub struct AssetStorage {
    root: PathBuf,
}

impl AssetStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory served under /public.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the asset subdirectories if they do not exist yet.
    pub async fn ensure_directories(&self) -> std::io::Result<()> {
        for kind in [AssetKind::UserImage, AssetKind::ProductImage, AssetKind::Sound] {
            tokio::fs::create_dir_all(self.root.join(kind.subdir())).await?;
        }
        Ok(())
    }

    /// Persists an uploaded file and returns the generated filename.
    ///
    /// The original filename only contributes its extension, which must be
    /// one of the accepted ones for the asset kind.
    pub async fn save(
        &self,
        kind: AssetKind,
        original_name: &str,
        data: &[u8],
    ) -> Result<String, ServiceError> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or_else(|| ServiceError::ValidationError(kind.rejection_message().to_string()))?;

        if !kind.allowed_extensions().contains(&extension.as_str()) {
            return Err(ServiceError::ValidationError(
                kind.rejection_message().to_string(),
            ));
        }

        let filename = generate_filename(&extension);
        let path = self.root.join(kind.subdir()).join(&filename);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ServiceError::StorageError(e.to_string()))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| ServiceError::StorageError(e.to_string()))?;

        Ok(filename)
    }

    /// Removes a stored asset. Failures are logged and swallowed; a missing
    /// file counts as already deleted.
    pub async fn delete(&self, kind: AssetKind, filename: &str) {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            warn!(filename, "Refusing to delete asset with a path-like name");
            return;
        }

        let path = self.root.join(kind.subdir()).join(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(filename, error = %e, "Failed to delete asset file");
            }
        }
    }
}

fn generate_filename(extension: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let salt: u32 = rand::thread_rng().gen_range(0..1000);
    format!("{}{}.{}", millis, salt, extension)
}
