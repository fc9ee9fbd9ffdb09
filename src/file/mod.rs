//! The in-file master-element manager: addressable, mutable children of a
//! master element living directly inside an open, seekable file.
//!
//! Every mutating operation here edits the file in place — by writing a
//! header, shifting bytes in block-sized chunks, or calling `fallocate()`
//! to insert, remove, or sparsify a byte range — rather than rewriting the
//! whole container. Children are addressed by their byte offset within
//! their parent's payload; reading one back for the first time hydrates it
//! (a sub-master recurses into another [`InFileMaster`], anything else
//! comes back as a raw tag-and-payload pair) and caches a weak handle so a
//! second read of the same offset, while the first is still alive, reuses
//! it instead of re-scanning the file.
//!
//! A single lock, shared by every element descended from the same root,
//! serializes the operations that mutate layout. It is reentrant: a
//! cascading size update that walks from a child up through its ancestors
//! re-enters the same lock on the same thread without deadlocking.

mod alloc;
mod critical;
mod manager;

pub use manager::{Child, ChildFactory, ChildIter, InFileMaster, NoMasterChildren};
