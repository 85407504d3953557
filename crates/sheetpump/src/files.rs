//! Storage disks and temporary files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::{FilesystemConfig, TemporaryFilesConfig};
use crate::error::{Error, Result};

/// A named storage backend
pub trait Disk: Send + Sync {
    /// Copy a local file to `name` on this disk
    fn put_from_local(&self, local: &Path, name: &str) -> Result<()>;

    /// Copy `name` from this disk to a local path
    fn get_to_local(&self, name: &str, local: &Path) -> Result<()>;

    fn exists(&self, name: &str) -> bool;

    fn delete(&self, name: &str) -> Result<()>;
}

/// Disk backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }
}

impl Disk for LocalDisk {
    fn put_from_local(&self, local: &Path, name: &str) -> Result<()> {
        let target = self.path(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(local, &target)?;
        Ok(())
    }

    fn get_to_local(&self, name: &str, local: &Path) -> Result<()> {
        let source = self.path(name);
        if !source.exists() {
            return Err(Error::Storage(format!("{} does not exist", source.display())));
        }
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, local)?;
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Registry of named disks
#[derive(Clone)]
pub struct Filesystem {
    disks: HashMap<String, Arc<dyn Disk>>,
    default_disk: String,
}

impl Filesystem {
    pub fn new(default_disk: impl Into<String>) -> Self {
        Self {
            disks: HashMap::new(),
            default_disk: default_disk.into(),
        }
    }

    pub fn from_config(config: &FilesystemConfig) -> Self {
        let mut filesystem = Self::new(config.default_disk.clone());
        for (name, root) in &config.disks {
            filesystem.add_disk(name.clone(), Arc::new(LocalDisk::new(root)));
        }
        filesystem
    }

    pub fn add_disk(&mut self, name: impl Into<String>, disk: Arc<dyn Disk>) {
        self.disks.insert(name.into(), disk);
    }

    /// Look up a disk; `None` selects the default disk
    pub fn disk(&self, name: Option<&str>) -> Result<Arc<dyn Disk>> {
        let name = name.unwrap_or(&self.default_disk);
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("disk [{}] is not configured", name)))
    }
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.disks.keys().collect();
        names.sort();
        f.debug_struct("Filesystem")
            .field("disks", &names)
            .field("default_disk", &self.default_disk)
            .finish()
    }
}

/// A working copy of an import source or an export result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemporaryFile {
    Local {
        path: PathBuf,
    },
    /// Lives on a disk; `local` is where it is materialised on this machine
    Remote {
        disk: String,
        name: String,
        local: PathBuf,
    },
}

impl TemporaryFile {
    pub fn local_path(&self) -> &Path {
        match self {
            TemporaryFile::Local { path } => path,
            TemporaryFile::Remote { local, .. } => local,
        }
    }

    pub fn put(&self, contents: impl AsRef<[u8]>) -> Result<()> {
        fs::write(self.local_path(), contents)?;
        Ok(())
    }

    /// Make the file available locally for one reader.
    ///
    /// Remote files are fetched again on every call, each time into a fresh
    /// path next to `local` that is removed when the returned copy drops.
    pub fn sync(&self, filesystem: &Filesystem) -> Result<LocalCopy> {
        match self {
            TemporaryFile::Local { path } => Ok(LocalCopy {
                path: path.clone(),
                owned: false,
            }),
            TemporaryFile::Remote { disk, name, local } => {
                let extension = local.extension().and_then(|e| e.to_str()).unwrap_or("tmp");
                let path = local.with_file_name(TemporaryFileFactory::file_name(extension));
                filesystem.disk(Some(disk.as_str()))?.get_to_local(name, &path)?;
                tracing::debug!(disk = %disk, name = %name, path = %path.display(), "synced remote temporary file");
                Ok(LocalCopy { path, owned: true })
            }
        }
    }

    /// Remove the local copy and, for remote files, the stored copy
    pub fn delete(&self, filesystem: &Filesystem) -> Result<()> {
        let local = self.local_path();
        if local.exists() {
            fs::remove_file(local)?;
        }
        if let TemporaryFile::Remote { disk, name, .. } = self {
            filesystem.disk(Some(disk.as_str()))?.delete(name)?;
        }
        Ok(())
    }
}

/// A local path to read a [`TemporaryFile`] from.
///
/// Copies fetched from a remote disk belong to one caller and are deleted on
/// drop; local temporary files are left alone.
#[derive(Debug)]
pub struct LocalCopy {
    path: PathBuf,
    owned: bool,
}

impl LocalCopy {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRef<Path> for LocalCopy {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl Drop for LocalCopy {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "could not remove synced copy");
            }
        }
    }
}

/// Creates uniquely named temporary files
#[derive(Debug, Clone)]
pub struct TemporaryFileFactory {
    local_path: PathBuf,
    remote_disk: Option<String>,
}

impl TemporaryFileFactory {
    pub fn new(local_path: impl Into<PathBuf>, remote_disk: Option<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_disk,
        }
    }

    pub fn from_config(config: &TemporaryFilesConfig) -> Self {
        Self::new(config.local_path(), config.remote_disk.clone())
    }

    fn file_name(extension: &str) -> String {
        format!("sheetpump-{}.{}", Uuid::new_v4(), extension)
    }

    pub fn make_local(&self, extension: &str) -> Result<TemporaryFile> {
        fs::create_dir_all(&self.local_path)?;
        Ok(TemporaryFile::Local {
            path: self.local_path.join(Self::file_name(extension)),
        })
    }

    /// Copy `source` into a fresh temporary file, mirrored to the remote disk
    /// when one is configured
    pub fn copy_from(&self, source: &Path, filesystem: &Filesystem) -> Result<TemporaryFile> {
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("tmp");
        let local = self.make_local(extension)?;
        fs::copy(source, local.local_path())?;

        match &self.remote_disk {
            None => Ok(local),
            Some(disk) => {
                let name = Self::file_name(extension);
                filesystem
                    .disk(Some(disk.as_str()))?
                    .put_from_local(local.local_path(), &name)?;
                Ok(TemporaryFile::Remote {
                    disk: disk.clone(),
                    name,
                    local: local.local_path().to_path_buf(),
                })
            }
        }
    }
}
