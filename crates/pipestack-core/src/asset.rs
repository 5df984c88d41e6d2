//! Local directory assets used to seed resources.

use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::reference::Reference;
use crate::{Error, Result};

/// Bootstrap qualifier used in the staging bucket name.
pub const DEFAULT_QUALIFIER: &str = "hnb659fds";

/// A directory packaged as a zip object in the bootstrap staging bucket.
///
/// The fingerprint covers relative file paths and contents only, so the same
/// tree checked out in two places produces the same object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryAsset {
    fingerprint: String,
}

impl DirectoryAsset {
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::AssetNotFound(path.to_path_buf()));
        }

        let fingerprint = fingerprint_directory(path)?;
        tracing::debug!(path = %path.display(), %fingerprint, "Fingerprinted directory asset");

        Ok(Self { fingerprint })
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn object_key(&self) -> String {
        format!("{}.zip", self.fingerprint)
    }

    /// `cdk-<qualifier>-assets-<account>-<region>`.
    pub fn staging_bucket(account: Reference, region: Reference) -> Reference {
        Reference::concat([
            Reference::literal(format!("cdk-{}-assets-", DEFAULT_QUALIFIER)),
            account,
            Reference::literal("-"),
            region,
        ])
    }
}

fn fingerprint_directory(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        hasher.update(relative.join("/").as_bytes());
        hasher.update([0u8]);
        hasher.update(std::fs::read(entry.path())?);
        hasher.update([0u8]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_fingerprint_is_location_independent() {
        let files = [("buildspec.yml", "version: 0.2\n"), ("src/App.java", "class App {}\n")];
        let a = DirectoryAsset::from_directory(seed(&files).path()).unwrap();
        let b = DirectoryAsset::from_directory(seed(&files).path()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.object_key(), format!("{}.zip", a.fingerprint()));
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = DirectoryAsset::from_directory(seed(&[("pom.xml", "<project/>")]).path()).unwrap();
        let b = DirectoryAsset::from_directory(seed(&[("pom.xml", "<project></project>")]).path())
            .unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("java-project");
        assert!(matches!(
            DirectoryAsset::from_directory(&missing),
            Err(Error::AssetNotFound(p)) if p == missing
        ));
    }

    #[test]
    fn test_staging_bucket_name() {
        let bucket = DirectoryAsset::staging_bucket(
            Reference::literal("123456789012"),
            Reference::literal("eu-west-1"),
        );
        assert_eq!(bucket.to_string(), "cdk-hnb659fds-assets-123456789012-eu-west-1");
    }
}
