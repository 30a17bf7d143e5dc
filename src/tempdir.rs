// GNU AGPL v3 License

use anyhow::{anyhow, Result};
use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Generate a random number from the system RNG.
async fn random_number() -> Result<u64> {
    tokio::task::spawn_blocking(|| {
        let mut number = 0u64;
        let number_bytes = bytemuck::bytes_of_mut(&mut number);
        getrandom::getrandom(number_bytes)?;
        anyhow::Ok(number)
    })
    .await?
}

/// Remove a leftover directory, from a runtime if there is one.
fn remove_dir_later(path: PathBuf) {
    let remove = move || {
        std::fs::remove_dir_all(&path).ok();
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(remove);
        }
        Err(_) => remove(),
    }
}

/// A scratch directory that is removed when dropped.
pub(crate) struct TempDir {
    path: PathBuf,
    deleted: bool,
}

impl TempDir {
    pub(crate) async fn new() -> Result<Self> {
        let temp_dir = env::temp_dir().join(format!("quietcut-{:016x}", random_number().await?));
        fs::create_dir_all(&temp_dir).await?;

        tracing::debug!("Created scratch directory {}", temp_dir.display());

        Ok(Self {
            path: temp_dir,
            deleted: false,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the temporary directory.
    pub(crate) async fn delete(mut self) -> Result<()> {
        self.deleted = true;
        fs::remove_dir_all(self.path()).await?;
        Ok(())
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if !self.deleted {
            remove_dir_later(self.path.clone());
        }
    }
}

/// A hidden file beside its destination, moved into place only on success.
///
/// The extension is kept so tools that infer a format from it still work.
pub(crate) struct PartialFile {
    path: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl PartialFile {
    pub(crate) async fn new(destination: &Path) -> Result<Self> {
        let file_name = destination
            .file_name()
            .ok_or_else(|| anyhow!("{} is not a file path", destination.display()))?;

        let mut name = OsString::from(".");
        name.push(file_name);
        name.push(format!(".{:08x}.part", random_number().await? as u32));
        if let Some(ext) = destination.extension() {
            name.push(".");
            name.push(ext);
        }

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        Ok(Self {
            path: destination.with_file_name(name),
            destination: destination.to_path_buf(),
            committed: false,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the finished file to its destination.
    pub(crate) async fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.path, &self.destination).await?;
        self.committed = true;
        Ok(self.destination.clone())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        // removed before returning, the process may exit right after
        if !self.committed && self.path.exists() {
            tracing::debug!("Removing unfinished {}", self.path.display());
            std::fs::remove_file(&self.path).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tempdir_is_deleted() {
        let dir = TempDir::new().await.unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());

        dir.delete().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn partial_file_keeps_extension() {
        let dir = TempDir::new().await.unwrap();
        let partial = PartialFile::new(&dir.path().join("remix.mp4")).await.unwrap();

        let name = partial.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".remix.mp4."));
        assert!(name.ends_with(".part.mp4"));
        assert_eq!(partial.path().parent(), Some(dir.path()));

        dir.delete().await.unwrap();
    }

    #[tokio::test]
    async fn committed_file_lands_at_destination() {
        let dir = TempDir::new().await.unwrap();
        let destination = dir.path().join("out").join("remix.webm");
        let partial = PartialFile::new(&destination).await.unwrap();
        fs::write(partial.path(), b"video").await.unwrap();

        let landed = partial.commit().await.unwrap();
        assert_eq!(landed, destination);
        assert_eq!(fs::read(&destination).await.unwrap(), b"video");

        dir.delete().await.unwrap();
    }

    #[test]
    fn dropped_file_is_gone_inside_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let dir = TempDir::new().await.unwrap();
            let partial = PartialFile::new(&dir.path().join("remix.webm")).await.unwrap();
            fs::write(partial.path(), b"half").await.unwrap();

            let path = partial.path().to_path_buf();
            drop(partial);
            assert!(!path.exists());

            dir.delete().await.unwrap();
        });
    }

    #[test]
    fn dropped_file_is_removed() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (dir, partial) = runtime.block_on(async {
            let dir = TempDir::new().await.unwrap();
            let partial = PartialFile::new(&dir.path().join("remix.mp4")).await.unwrap();
            fs::write(partial.path(), b"half").await.unwrap();
            (dir, partial)
        });
        drop(runtime);

        // outside of a runtime the removal happens immediately
        let partial_path = partial.path().to_path_buf();
        drop(partial);
        assert!(!partial_path.exists());

        let dir_path = dir.path().to_path_buf();
        drop(dir);
        assert!(!dir_path.exists());
    }
}
