//! PE container precheck.
//!
//! Before any deobfuscator is started, the input has to be confirmed as a .NET assembly. The
//! wrapped tools all fail in their own ways on native binaries, and running three external
//! processes to find that out is wasteful. This module parses the PE headers only, so broken
//! import, export or relocation directories do not keep a .NET sample out of the pipeline.
//!
//! # Data Sources
//!
//! The module supports multiple data sources through the [`crate::file::Backend`] trait:
//! - **Physical files** - Memory-mapped files for efficient disk access
//! - **Memory buffers** - In-memory PE data, mostly useful for tests and fuzzing
//!
//! # Outcomes
//!
//! - The container does not parse at all: [`crate::Error::GoblinErr`] (or
//!   [`crate::Error::Empty`] / [`crate::Error::Malformed`] for inputs goblin never sees). The
//!   caller must surface this as an error and not run the pipeline.
//! - The container parses but has no CLR runtime header: [`File::is_dotnet`] is `false` and
//!   the caller opts out.
//! - Otherwise the file is handed to the pipeline.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotnet_deob::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("sample.exe"))?;
//! if let Some((rva, size)) = file.clr() {
//!     println!("CLR header at RVA 0x{:x}, size: {} bytes", rva, size);
//! }
//! # Ok::<(), dotnet_deob::Error>(())
//! ```

mod memory;
mod physical;

use std::path::Path;

use crate::{
    Error::{Empty, GoblinErr},
    Result,
};
use goblin::pe::{header::Header, optional_header::MAGIC_64};
use memory::Memory;
use physical::Physical;

/// Index of the CLR runtime header in the optional header's data directory table.
pub const CLR_RUNTIME_HEADER_INDEX: usize = 14;

/// Backend trait for file data sources.
///
/// This trait abstracts over the source of PE data, allowing for both in-memory and on-disk
/// representations. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns the full data of the file.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data.
    fn len(&self) -> usize;
}

/// A parsed PE container, reduced to what the precheck needs.
pub struct File {
    /// Backend providing the raw bytes
    data: Box<dyn Backend>,
    /// CLR runtime header directory as `(rva, size)`, if present and non-zero
    clr: Option<(u32, u32)>,
    /// Whether the optional header uses the PE32+ layout
    is_pe64: bool,
}

impl File {
    /// Loads and inspects a PE file from disk.
    ///
    /// # Arguments
    ///
    /// * `file` - Path to the file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is empty, or is not a valid PE container.
    /// A valid PE without .NET metadata is *not* an error, see [`File::is_dotnet`].
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Loads and inspects a PE file from a memory buffer.
    ///
    /// # Arguments
    ///
    /// * `data` - The bytes of the PE file.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty or the data is not a valid PE container.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        if data.len() < 2 || &data.data()[0..2] != b"MZ" {
            return Err(malformed_error!("File does not start with a DOS header"));
        }

        let header = Header::parse(data.data()).map_err(GoblinErr)?;
        let (clr, is_pe64) = match header.optional_header {
            Some(optional_header) => {
                let clr = match optional_header.data_directories.get_clr_runtime_header() {
                    Some(directory) if directory.virtual_address != 0 => {
                        Some((directory.virtual_address, directory.size))
                    }
                    _ => None,
                };
                (clr, optional_header.standard_fields.magic == MAGIC_64)
            }
            None => (None, false),
        };

        Ok(File {
            data: Box::new(data),
            clr,
            is_pe64,
        })
    }

    /// Returns the total size of the loaded file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the loaded file has no data.
    ///
    /// Loading rejects empty input, so this is `false` for every constructed [`File`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Returns the raw bytes of the file.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Returns the CLR runtime header location as `(rva, size)`.
    ///
    /// `None` if the optional header is missing, declares fewer than 15 data directories, or
    /// the CLR directory has a zero virtual address.
    #[must_use]
    pub fn clr(&self) -> Option<(u32, u32)> {
        self.clr
    }

    /// Returns `true` if the file carries a .NET metadata directory.
    #[must_use]
    pub fn is_dotnet(&self) -> bool {
        self.clr.is_some()
    }

    /// Returns `true` for PE32+ images.
    #[must_use]
    pub fn is_pe64(&self) -> bool {
        self.is_pe64
    }
}

/// Hand-built PE images for the unit and integration tests.
#[doc(hidden)]
pub mod testing {
    /// Offset of the data directory table in images from [`build_pe32`].
    pub const DATA_DIRECTORIES_OFFSET: usize = 0x44 + 20 + 96;

    /// Builds a minimal PE32 image with a single `.text` section.
    ///
    /// When `clr` is set, the CLR runtime header directory points at that `(rva, size)`.
    pub fn build_pe32(clr: Option<(u32, u32)>) -> Vec<u8> {
        let mut image = vec![0u8; 0x400];

        // DOS header
        image[0..2].copy_from_slice(b"MZ");
        image[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());

        // PE signature + COFF header
        image[0x40..0x44].copy_from_slice(b"PE\0\0");
        let coff = 0x44;
        image[coff..coff + 2].copy_from_slice(&0x014Cu16.to_le_bytes());
        image[coff + 2..coff + 4].copy_from_slice(&1u16.to_le_bytes());
        image[coff + 16..coff + 18].copy_from_slice(&224u16.to_le_bytes());
        image[coff + 18..coff + 20].copy_from_slice(&0x0102u16.to_le_bytes());

        // Optional header (PE32)
        let opt = coff + 20;
        image[opt..opt + 2].copy_from_slice(&0x010Bu16.to_le_bytes());
        image[opt + 4..opt + 8].copy_from_slice(&0x200u32.to_le_bytes());
        image[opt + 20..opt + 24].copy_from_slice(&0x1000u32.to_le_bytes());
        image[opt + 28..opt + 32].copy_from_slice(&0x0040_0000u32.to_le_bytes());
        image[opt + 32..opt + 36].copy_from_slice(&0x1000u32.to_le_bytes());
        image[opt + 36..opt + 40].copy_from_slice(&0x200u32.to_le_bytes());
        image[opt + 40..opt + 42].copy_from_slice(&4u16.to_le_bytes());
        image[opt + 48..opt + 50].copy_from_slice(&4u16.to_le_bytes());
        image[opt + 56..opt + 60].copy_from_slice(&0x2000u32.to_le_bytes());
        image[opt + 60..opt + 64].copy_from_slice(&0x200u32.to_le_bytes());
        image[opt + 68..opt + 70].copy_from_slice(&3u16.to_le_bytes());
        image[opt + 72..opt + 76].copy_from_slice(&0x0010_0000u32.to_le_bytes());
        image[opt + 76..opt + 80].copy_from_slice(&0x1000u32.to_le_bytes());
        image[opt + 80..opt + 84].copy_from_slice(&0x0010_0000u32.to_le_bytes());
        image[opt + 84..opt + 88].copy_from_slice(&0x1000u32.to_le_bytes());
        image[opt + 92..opt + 96].copy_from_slice(&16u32.to_le_bytes());

        if let Some((rva, size)) = clr {
            set_data_directory(&mut image, super::CLR_RUNTIME_HEADER_INDEX, rva, size);
        }

        // Section table
        let section = opt + 224;
        image[section..section + 8].copy_from_slice(b".text\0\0\0");
        image[section + 8..section + 12].copy_from_slice(&0x200u32.to_le_bytes());
        image[section + 12..section + 16].copy_from_slice(&0x1000u32.to_le_bytes());
        image[section + 16..section + 20].copy_from_slice(&0x200u32.to_le_bytes());
        image[section + 20..section + 24].copy_from_slice(&0x200u32.to_le_bytes());
        image[section + 36..section + 40].copy_from_slice(&0x6000_0020u32.to_le_bytes());

        image
    }

    /// Overwrites data directory `index` of an image from [`build_pe32`].
    pub fn set_data_directory(image: &mut [u8], index: usize, rva: u32, size: u32) {
        let entry = DATA_DIRECTORIES_OFFSET + index * 8;
        image[entry..entry + 4].copy_from_slice(&rva.to_le_bytes());
        image[entry + 4..entry + 8].copy_from_slice(&size.to_le_bytes());
    }
}
