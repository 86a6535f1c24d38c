//! Shared types and constants.
//!
//! The wire-level vocabulary of the format lives here: the header magic,
//! the structure-block markers, phandles, memory reservations, the
//! grouped cell shapes used by the decoders and writers, and the error
//! type every fallible operation returns.

use core::{ffi::FromBytesUntilNulError, fmt};

/// Value of the first header field of every device tree blob.
///
/// Readers check this before trusting any other field; a buffer that
/// does not start with it is not an FDT.
pub const FDT_MAGIC: u32 = 0xd00dfeed;

/// The FDT version written into emitted headers.
pub const FDT_VERSION: u32 = 17;

/// The last-compatible version written into emitted headers.
///
/// The device tree specification fixes this field at 16.
pub const FDT_LAST_COMP_VERSION: u32 = 16;

/// One entry of the memory reservation block.
///
/// Reservations describe physical ranges the OS must leave alone. This
/// crate carries them through parse and emit untouched; what they mean
/// is the caller's business.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryReservation {
    /// Physical start address of the range
    pub address: u64,
    /// Range length in bytes
    pub size: u64,
}

/// Marker values of the structure block.
///
/// Every entry of the structure block opens with a 32-bit big-endian
/// marker cell saying what follows: a node start, a node end, a property
/// record, padding, or the end of the whole block.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token {
    /// Opens a node; the padded node name follows (FDT_BEGIN_NODE)
    BeginNode,
    /// Closes the innermost open node (FDT_END_NODE)
    EndNode,
    /// Starts a property record (FDT_PROP)
    Prop,
    /// Padding cell with no meaning (FDT_NOP)
    Nop,
    /// Ends the structure block (FDT_END)
    End,
    /// A cell value the format does not define
    Unknown(u32),
}

impl Token {
    /// Decodes a marker from its on-wire cell value.
    pub fn from_cell(cell: u32) -> Self {
        match cell {
            0x1 => Token::BeginNode,
            0x2 => Token::EndNode,
            0x3 => Token::Prop,
            0x4 => Token::Nop,
            0x9 => Token::End,
            other => Token::Unknown(other),
        }
    }

    /// Returns the on-wire cell value of this marker.
    pub fn cell(self) -> u32 {
        match self {
            Token::BeginNode => 0x1,
            Token::EndNode => 0x2,
            Token::Prop => 0x3,
            Token::Nop => 0x4,
            Token::End => 0x9,
            Token::Unknown(other) => other,
        }
    }
}

/// A node reference handle.
///
/// A node that wants to be referenced from elsewhere in the tree carries
/// its handle in a `phandle` (or legacy `linux,phandle`) property;
/// consumers name it by that value in properties such as
/// `interrupt-parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Phandle(u32);

impl Phandle {
    /// Returns the numeric handle value.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for Phandle {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Phandle> for u32 {
    fn from(handle: Phandle) -> Self {
        handle.0
    }
}

impl fmt::Display for Phandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A two-field group of cells.
///
/// With the default field type this is a decoded value (for example one
/// `reg` entry as address/size); instantiated over `usize` it describes a
/// layout, giving the number of cells each field occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pair<T = u64> {
    pub a: T,
    pub b: T,
}

/// A three-field group of cells. See [`Pair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Triplet<T = u64> {
    pub a: T,
    pub b: T,
    pub c: T,
}

/// A four-field group of cells. See [`Pair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quad<T = u64> {
    pub a: T,
    pub b: T,
    pub c: T,
    pub d: T,
}

/// What went wrong, for every fallible operation in the crate.
///
/// Lookups that merely find nothing are `Option::None`, not errors; this
/// enum covers malformed input, exhausted capacity, invalid edits and
/// finalizer misuse.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FdtError {
    /// The blob does not start with the FDT magic value
    #[error("bad magic value {0:#x}, expected {FDT_MAGIC:#x}")]
    BadMagic(u32),
    /// The input ended in the middle of a header, marker or payload
    #[error("input truncated at byte offset {offset}")]
    Truncated {
        /// How far into the data the cursor was when bytes ran out
        offset: usize,
    },
    /// The structure block ended before a node's terminating tag
    #[error("node missing terminating tag")]
    UnterminatedNode,
    /// The arena ran out of cells for nodes or properties
    #[error("not enough arena capacity")]
    NoMemory,
    /// A sibling or property with the same name already exists
    #[error("duplicate sibling or property name")]
    DuplicateName,
    /// Root nodes have no parent, so they cannot gain siblings
    #[error("cannot create a sibling of a root node")]
    SiblingOfRoot,
    /// The output buffer handed to the finalizer is not cell-aligned
    #[error("output buffer is not 4-byte aligned")]
    MisalignedBuffer,
    /// The output buffer cannot hold the serialized blob
    #[error("output buffer too small, {needed} bytes needed")]
    OutputTooSmall {
        /// The size the buffer would need to be
        needed: usize,
    },
    /// The edit API was handed an id that resolves to nothing
    #[error("no such node or property")]
    NotFound,
    /// String data stopped without a NUL terminator
    #[error("string data is missing a nul terminator")]
    MissingNul,
    /// Name or string data is not valid UTF-8
    #[error("string data is not valid UTF-8")]
    InvalidUtf8,
}

impl From<core::str::Utf8Error> for FdtError {
    fn from(_: core::str::Utf8Error) -> Self {
        FdtError::InvalidUtf8
    }
}

impl From<FromBytesUntilNulError> for FdtError {
    fn from(_: FromBytesUntilNulError) -> Self {
        FdtError::MissingNul
    }
}
