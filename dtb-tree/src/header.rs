//! FDT header parsing.
//!
//! The 40-byte header at the start of every device tree blob records the
//! layout of the blob's blocks. All fields are big-endian on the wire and
//! converted to host order when parsed.

use crate::{FDT_MAGIC, FdtError, data::Cursor};

/// Size of the on-wire header in bytes.
pub const HEADER_SIZE: usize = 40;

/// The fixed header describing a blob's layout.
///
/// Field names follow the device tree specification so they can be read
/// side by side with it.
#[derive(Debug, Clone)]
pub struct Header {
    /// Must equal [`FDT_MAGIC`]
    pub magic: u32,
    /// Size of the whole blob in bytes
    pub totalsize: u32,
    /// Where the structure block starts, relative to the blob base
    pub off_dt_struct: u32,
    /// Where the strings block starts, relative to the blob base
    pub off_dt_strings: u32,
    /// Where the memory reservation block starts, relative to the blob base
    pub off_mem_rsvmap: u32,
    /// Format version of this blob
    pub version: u32,
    /// Oldest format version this blob stays compatible with
    pub last_comp_version: u32,
    /// Physical id of the CPU the system boots on
    pub boot_cpuid_phys: u32,
    /// Strings block length in bytes
    pub size_dt_strings: u32,
    /// Structure block length in bytes
    pub size_dt_struct: u32,
}

impl Header {
    /// Read a header from the beginning of a byte slice.
    ///
    /// # Errors
    ///
    /// Returns `FdtError::Truncated` if the slice is too small to contain
    /// a complete header, or `FdtError::BadMagic` if the magic number
    /// doesn't match the expected value.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FdtError> {
        if data.len() < HEADER_SIZE {
            return Err(FdtError::Truncated { offset: data.len() });
        }

        let mut cursor = Cursor::new(data);
        let mut field = || {
            // The length check above guarantees ten u32 reads succeed.
            cursor.take_u32().unwrap_or_default()
        };

        let magic = field();
        if magic != FDT_MAGIC {
            return Err(FdtError::BadMagic(magic));
        }

        Ok(Header {
            magic,
            totalsize: field(),
            off_dt_struct: field(),
            off_dt_strings: field(),
            off_mem_rsvmap: field(),
            version: field(),
            last_comp_version: field(),
            boot_cpuid_phys: field(),
            size_dt_strings: field(),
            size_dt_struct: field(),
        })
    }
}

/// Returns the total blob size a device tree blob reports in its header.
///
/// This is self-contained and usable before any tree is built, for example
/// to learn how many bytes to copy out of a firmware-provided region.
/// Returns 0 if the slice is too small or the magic number is wrong.
pub fn total_size(data: &[u8]) -> usize {
    match Header::from_bytes(data) {
        Ok(header) => header.totalsize as usize,
        Err(_) => 0,
    }
}
