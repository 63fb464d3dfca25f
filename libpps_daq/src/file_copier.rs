use std::path::{Path, PathBuf};

use super::error::FileCopierError;

/// Receiver of the burst files once they are closed.
pub trait FileConsumer {
    type Error: std::fmt::Display;
    /// Deliver a closed file. Returns where the file can be found afterwards.
    fn transmit(&mut self, path: &Path) -> Result<PathBuf, Self::Error>;
}

/// No consumer configured: files stay where they were written
impl<C: FileConsumer> FileConsumer for Option<C> {
    type Error = C::Error;
    fn transmit(&mut self, path: &Path) -> Result<PathBuf, Self::Error> {
        match self {
            Some(consumer) => consumer.transmit(path),
            None => Ok(path.to_path_buf()),
        }
    }
}

/// FileCopier copies closed burst files from the local output to the transfer directory
/// (typically a mount of the analysis storage).
#[derive(Debug, Clone)]
pub struct FileCopier {
    destination: PathBuf,
    delete_source: bool,
    files_copied: u64,
    bytes_copied: u64,
}

impl FileCopier {
    /// Create a new FileCopier.
    ///
    /// If `delete_source` is set, the local file is removed once the copy succeeded.
    pub fn new(destination: &Path, delete_source: bool) -> Self {
        Self {
            destination: destination.to_path_buf(),
            delete_source,
            files_copied: 0,
            bytes_copied: 0,
        }
    }

    pub fn get_destination(&self) -> &Path {
        &self.destination
    }

    pub fn get_files_copied(&self) -> u64 {
        self.files_copied
    }

    /// Get total copy size of files.
    pub fn get_total_data_size(&self) -> u64 {
        self.bytes_copied
    }
}

impl FileConsumer for FileCopier {
    type Error = FileCopierError;
    fn transmit(&mut self, path: &Path) -> Result<PathBuf, FileCopierError> {
        let file_name = match path.file_name() {
            Some(name) if path.exists() => name,
            _ => return Err(FileCopierError::BadFilePath(path.to_path_buf())),
        };
        std::fs::create_dir_all(&self.destination)?;
        let destination = self.destination.join(file_name);
        let size = std::fs::copy(path, &destination)?;
        if self.delete_source {
            std::fs::remove_file(path)?;
        }
        self.files_copied += 1;
        self.bytes_copied += size;
        log::info!(
            "Copied {} in {}",
            file_name.to_string_lossy(),
            human_bytes::human_bytes(size as f64),
        );
        Ok(destination)
    }
}
