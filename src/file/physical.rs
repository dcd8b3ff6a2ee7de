//! Physical file backend for memory-mapped I/O.
//!
//! The precheck only needs the PE headers, but the input files handed to a job can be
//! several megabytes. Mapping the file lets goblin read the headers without copying the whole
//! binary into memory first.

use super::Backend;
use crate::{
    Error::{Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A file backend that uses memory-mapped I/O for access to files on disk.
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Option<Mmap>,
}

impl Physical {
    /// Create a new physical file backend by memory-mapping the specified file.
    ///
    /// Zero-length files cannot be mapped on every platform, so they produce a backend
    /// without a mapping which reports a length of zero.
    ///
    /// # Arguments
    /// * `path` - Path to the PE file on disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or
    /// [`crate::Error::Error`] if memory mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        if file.metadata()?.len() == 0 {
            return Ok(Physical { data: None });
        }

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: Some(mmap) })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        match &self.data {
            Some(mmap) => mmap.as_ref(),
            None => &[],
        }
    }

    fn len(&self) -> usize {
        self.data().len()
    }
}
