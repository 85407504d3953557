use super::Job;
use crate::context::Context;
use crate::error::Result;
use crate::files::TemporaryFile;

/// Moves a written export from its temporary file onto a disk
#[derive(Debug, Clone)]
pub struct StoreQueuedExport {
    file: TemporaryFile,
    disk: Option<String>,
    path: String,
    context: Context,
}

impl StoreQueuedExport {
    pub fn new(file: TemporaryFile, disk: Option<String>, path: impl Into<String>, context: Context) -> Self {
        Self {
            file,
            disk,
            path: path.into(),
            context,
        }
    }
}

impl Job for StoreQueuedExport {
    fn handle(&self) -> Result<()> {
        let filesystem = &self.context.filesystem;
        let local = self.file.sync(filesystem)?;

        filesystem
            .disk(self.disk.as_deref())?
            .put_from_local(local.path(), &self.path)?;
        tracing::info!(disk = ?self.disk, path = %self.path, "stored export");
        drop(local);

        self.file.delete(filesystem)
    }

    fn name(&self) -> String {
        format!("store-export[{}]", self.path)
    }
}
