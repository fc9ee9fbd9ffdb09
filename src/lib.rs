#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

/// Error types for this crate.
mod error;
mod functional;
pub use error::*;

/// I/O utilities.
pub mod io;

/// The variable-length integer codec and element header protocol.
mod vint;

/// Concrete value-element kinds: integers, floats, text, binary, dates.
mod leaf;

/// Schema-driven master elements held entirely in memory.
mod master;

/// Supplementary elements shared by every schema: `Void` and `Crc32`.
mod supplement;

/// The `Element` trait and its blanket decode/encode/read plumbing.
mod element;

/// The in-file master-element manager: addressable mutable children
/// backed by a seekable file.
pub mod file;

/// A `Document`: a header element plus a body root bound to an open file.
mod document;

/// A prelude for common types and traits.
pub mod prelude {
    pub use crate::document::*;
    pub use crate::element::*;
    pub use crate::file::*;
    pub use crate::leaf::*;
    pub use crate::master::*;
    pub use crate::supplement::*;
    pub use crate::vint::*;
}
