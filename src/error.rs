use crate::vint::VInt64;

/// Error types for this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error, from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid variable-length integer encoding: either the leading byte is
    /// zero, or the marker bit implies a width greater than 8 bytes.
    #[error("Invalid variable-length integer encoding")]
    InvalidVInt,

    /// Attempted to read past the end of the buffer.
    #[error("Attempted to read past the end of the buffer")]
    OutOfBounds,

    /// Attempted to read past the end of the buffer during element body decoding.
    #[error("Element body over decode, ID: {0}")]
    OverDecode(VInt64),

    /// Not all bytes were consumed in an element body.
    #[error("Short read: not all bytes were consumed")]
    ShortRead,

    /// Not all bytes were consumed in an element body during element body decoding.
    #[error("Element body under decode, ID: {0}")]
    UnderDecode(VInt64),

    /// Probed for a tag and found a different one. Recoverable: callers
    /// probing for one of several possible roots may catch this locally.
    #[error("Expected tag {expected}, found {found}")]
    NoMatch {
        /// Tag the caller expected.
        expected: VInt64,
        /// Tag actually observed.
        found: VInt64,
    },

    /// Missing required element.
    #[error("Missing element, ID: {0}")]
    MissingElement(VInt64),

    /// Duplicate element in a master element's singleton slot.
    #[error("Duplicate element {id} in master element {parent}")]
    DuplicateElement {
        /// The duplicate element ID.
        id: VInt64,
        /// The parent master element ID.
        parent: VInt64,
    },

    /// Unrecognized child tag under a schema with `allow_unknown = false`.
    #[error("Unrecognized element {id} in master element {parent}")]
    UnrecognizedElement {
        /// The unrecognized child tag.
        id: VInt64,
        /// The parent master element ID.
        parent: VInt64,
    },

    /// Element body size is unknown (and the caller does not support that).
    #[error("Element body size is unknown, ID: {0}")]
    ElementBodySizeUnknown(VInt64),

    /// `encode()` produced a length other than `encoded_size()`.
    #[error("Encode produced {actual} bytes, expected {expected}")]
    EncodeSizeMismatch {
        /// Length actually produced.
        actual: usize,
        /// Length `encoded_size()` promised.
        expected: usize,
    },

    /// A requested mutation on an in-file master element violates a layout
    /// invariant (overlap, 1-byte gap, out-of-range offset, size-width
    /// overflow).
    #[error("layout violation in element {parent} at offset {offset}: {reason}")]
    Write {
        /// The master element the mutation targeted.
        parent: VInt64,
        /// The offset the mutation targeted.
        offset: u64,
        /// Human-readable reason.
        reason: String,
    },

    /// A resize would truncate a child or produce a 1-byte gap.
    #[error("cannot resize element {parent} to {new_size}: {reason}")]
    Resize {
        /// The master element being resized.
        parent: VInt64,
        /// The requested new size.
        new_size: u64,
        /// Human-readable reason.
        reason: String,
    },
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
