use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use parking_lot::ReentrantMutex;

use crate::element::Element;
use crate::functional::Encode;
use crate::supplement::Void;
use crate::vint::{scan_file, Header, ReadFrom, VInt64};
use crate::Error;

use super::alloc;
use super::critical::NoInterrupt;

type SharedFile = Arc<ReentrantMutex<RefCell<File>>>;

/// Tells the manager which child tags should be hydrated as another
/// in-file master element (recursing into a nested [`InFileMaster`])
/// rather than read back as an opaque value. Supplied by the caller,
/// since the core has no notion of an application schema.
pub trait ChildFactory: Send + Sync {
    /// Whether a child with this tag is itself a master element.
    fn is_master(&self, tag: VInt64) -> bool;
}

/// A [`ChildFactory`] for trees with no nested master children: every
/// child hydrates as a leaf value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMasterChildren;

impl ChildFactory for NoMasterChildren {
    fn is_master(&self, _tag: VInt64) -> bool {
        false
    }
}

/// A hydrated child: either a nested manager bound to the same file, or a
/// leaf's raw tag and payload for the caller to decode with whatever
/// [`Element`](crate::element::Element) type fits.
pub enum Child {
    /// A child that is itself a master element.
    Master(InFileMaster),
    /// A non-master child, read back verbatim.
    Leaf {
        /// The child's tag.
        tag: VInt64,
        /// The child's raw payload bytes.
        payload: Vec<u8>,
    },
}

impl std::fmt::Debug for Child {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Child::Master(m) => f.debug_tuple("Master").field(&m.tag()).finish(),
            Child::Leaf { tag, payload } => f
                .debug_struct("Leaf")
                .field("tag", tag)
                .field("len", &payload.len())
                .finish(),
        }
    }
}

struct ChildSlot {
    tag: VInt64,
    /// Width in bytes of this child's own `(tag, size)` header, needed to
    /// translate a prospective new size into an end offset without
    /// re-reading the file.
    header_len: u64,
    end_offset: u64,
    master: Option<Weak<Inner>>,
}

struct Inner {
    file: SharedFile,
    parent: Option<InFileMaster>,
    tag: VInt64,
    /// Mutable because a cascading insert/collapse/move on an ancestor
    /// shifts this element's position within it.
    offset_in_parent: AtomicU64,
    /// Only meaningful when `parent` is `None`.
    root_header_offset: u64,
    size_vint_width: usize,
    data_size: AtomicU64,
    children: Mutex<BTreeMap<u64, ChildSlot>>,
    block_size: u64,
    factory: Arc<dyn ChildFactory>,
}

/// A master element whose children live directly in an open file and are
/// addressed, added, removed, moved, and resized in place.
///
/// Cloning an `InFileMaster` is cheap: it is a handle (`Arc`) onto shared
/// state, not a copy of it. Every element descended from the same root
/// shares one file handle and one reentrant lock, acquired for the
/// duration of every mutating call.
#[derive(Clone)]
pub struct InFileMaster(Arc<Inner>);

impl std::fmt::Debug for InFileMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFileMaster")
            .field("tag", &self.0.tag)
            .field("offset_in_parent", &self.0.offset_in_parent.load(Ordering::SeqCst))
            .field("data_size", &self.data_size())
            .finish()
    }
}

fn write_err(tag: VInt64, offset: u64, reason: impl Into<String>) -> Error {
    Error::Write {
        parent: tag,
        offset,
        reason: reason.into(),
    }
}

fn resize_err(tag: VInt64, new_size: u64, reason: impl Into<String>) -> Error {
    Error::Resize {
        parent: tag,
        new_size,
        reason: reason.into(),
    }
}

fn last_child_before(children: &BTreeMap<u64, ChildSlot>, x: u64) -> Option<u64> {
    children.range(..x).next_back().map(|(&k, _)| k)
}

fn first_child_at_or_after(children: &BTreeMap<u64, ChildSlot>, x: u64) -> Option<u64> {
    children.range(x..).next().map(|(&k, _)| k)
}

fn first_child_strictly_after(children: &BTreeMap<u64, ChildSlot>, x: u64) -> Option<u64> {
    children
        .range((Bound::Excluded(x), Bound::Unbounded))
        .next()
        .map(|(&k, _)| k)
}

/// The smallest `k` in `1..=8` such that `gap - 1 - k < 128^k - 1`, the
/// width of the size vint a `Void` filler spanning `gap` bytes needs so
/// its payload (`gap - 1 - k` bytes) plus its one-byte tag plus that size
/// vint exactly fill the gap.
fn void_size_vint_width(gap: u64) -> crate::Result<usize> {
    for k in 1..=8u64 {
        let max_payload = (1u128 << (7 * k)) - 1;
        if (gap as i128) - 1 - (k as i128) < max_payload as i128 {
            return Ok(k as usize);
        }
    }
    Err(write_err(Void::ID, 0, format!("gap of {gap} bytes has no representable void width")))
}

/// Write a `Void` filler spanning exactly `gap` bytes at `absolute_offset`
/// in `file`. A `gap` of 0 is a no-op; a `gap` of 1 is a layout violation
/// (no element, not even `Void`, fits in one byte without a marker-bit
/// vint). The payload itself is never zeroed: on a sparse file, seeking
/// past it is enough, and unwritten regions read back as the last bytes
/// whatever wrote the file there left behind.
fn write_void(file: &mut File, owner_tag: VInt64, absolute_offset: u64, gap: u64) -> crate::Result<()> {
    if gap == 0 {
        return Ok(());
    }
    if gap == 1 {
        return Err(write_err(owner_tag, absolute_offset, "a gap of exactly one byte cannot be filled"));
    }
    let k = void_size_vint_width(gap)?;
    let payload_len = gap - 1 - k as u64;
    file.seek(SeekFrom::Start(absolute_offset))?;
    file.write_all(&[0xEC])?;
    file.write_all(&VInt64::encode_fixed_width(payload_len, k)?)?;
    file.seek(SeekFrom::Current(payload_len as i64))?;
    Ok(())
}

impl InFileMaster {
    /// Allocate a brand new master element at `header_offset` in `file`:
    /// write its `(tag, size)` header with a size vint fixed at
    /// `size_vint_width` bytes, and void-fill `initial_size` bytes of
    /// payload after it.
    pub fn create_root(
        mut file: File,
        header_offset: u64,
        tag: VInt64,
        size_vint_width: usize,
        initial_size: u64,
        factory: Arc<dyn ChildFactory>,
    ) -> crate::Result<Self> {
        if VInt64::encode_size(initial_size) > size_vint_width {
            return Err(write_err(
                tag,
                header_offset,
                format!("initial size {initial_size} does not fit a {size_vint_width}-byte size vint"),
            ));
        }

        let block_size = alloc::block_size(&file)?;

        let mut header_bytes = Vec::new();
        tag.encode(&mut header_bytes)?;
        header_bytes.extend(VInt64::encode_fixed_width(initial_size, size_vint_width)?);

        file.seek(SeekFrom::Start(header_offset))?;
        file.write_all(&header_bytes)?;
        let data_offset = header_offset + header_bytes.len() as u64;
        if initial_size > 0 {
            write_void(&mut file, tag, data_offset, initial_size)?;
        }
        file.set_len(data_offset + initial_size)?;
        file.flush()?;

        Ok(InFileMaster(Arc::new(Inner {
            file: Arc::new(ReentrantMutex::new(RefCell::new(file))),
            parent: None,
            tag,
            offset_in_parent: AtomicU64::new(0),
            root_header_offset: header_offset,
            size_vint_width,
            data_size: AtomicU64::new(initial_size),
            children: Mutex::new(BTreeMap::new()),
            block_size,
            factory,
        })))
    }

    /// Open an existing master element at `header_offset` in `file` and
    /// scan its children. If `expected_tag` is given, a mismatch is
    /// reported as [`Error::NoMatch`] rather than a generic decode error.
    pub fn open_root(
        mut file: File,
        header_offset: u64,
        expected_tag: Option<VInt64>,
        factory: Arc<dyn ChildFactory>,
    ) -> crate::Result<Self> {
        let block_size = alloc::block_size(&file)?;
        file.seek(SeekFrom::Start(header_offset))?;
        let (_, header) = Header::read_head(&mut file, expected_tag)?;
        if header.size.is_unknown {
            return Err(Error::ElementBodySizeUnknown(header.id));
        }
        let after_tag = header_offset + VInt64::encode_size(header.id.value) as u64;
        let size_vint_width = (file.stream_position()? - after_tag) as usize;

        let root = InFileMaster(Arc::new(Inner {
            file: Arc::new(ReentrantMutex::new(RefCell::new(file))),
            parent: None,
            tag: header.id,
            offset_in_parent: AtomicU64::new(0),
            root_header_offset: header_offset,
            size_vint_width,
            data_size: AtomicU64::new(*header.size),
            children: Mutex::new(BTreeMap::new()),
            block_size,
            factory,
        }));
        root.scan()?;
        Ok(root)
    }

    /// This element's tag.
    pub fn tag(&self) -> VInt64 {
        self.0.tag
    }

    /// This element's declared payload size.
    pub fn data_size(&self) -> u64 {
        self.0.data_size.load(Ordering::SeqCst)
    }

    /// This element's offset within its parent's payload (0 for a root).
    pub fn offset_in_parent(&self) -> u64 {
        self.0.offset_in_parent.load(Ordering::SeqCst)
    }

    fn header_offset(&self) -> u64 {
        match &self.0.parent {
            Some(parent) => parent.data_offset() + self.offset_in_parent(),
            None => self.0.root_header_offset,
        }
    }

    /// Absolute file offset of the first payload byte.
    pub fn data_offset(&self) -> u64 {
        self.header_offset() + VInt64::encode_size(self.0.tag.value) as u64 + self.0.size_vint_width as u64
    }

    fn with_file<R>(&self, f: impl FnOnce(&mut File) -> crate::Result<R>) -> crate::Result<R> {
        let guard = self.0.file.lock();
        let mut file = guard.borrow_mut();
        f(&mut *file)
    }

    /// Rebuild the child index from the file, discarding any cached
    /// hydrated handles. `Void` fillers are skipped; everything else is
    /// indexed by its start offset.
    pub fn scan(&self) -> crate::Result<()> {
        let data_size = self.data_size();
        let data_offset = self.data_offset();
        let mut new_children = BTreeMap::new();
        self.with_file(|file| {
            file.seek(SeekFrom::Start(data_offset))?;
            for scanned in scan_file(file, Some(data_size)) {
                let scanned = scanned?;
                if scanned.tag == Void::ID {
                    continue;
                }
                new_children.insert(
                    scanned.offset,
                    ChildSlot {
                        tag: scanned.tag,
                        header_len: scanned.data_offset() - scanned.offset,
                        end_offset: scanned.data_offset() + scanned.payload_size,
                        master: None,
                    },
                );
            }
            Ok(())
        })?;
        *self.0.children.lock().unwrap() = new_children;
        Ok(())
    }

    /// Offset of the first child, or `None` if this element has none.
    pub fn start_of_first_child(&self) -> Option<u64> {
        self.0.children.lock().unwrap().keys().next().copied()
    }

    /// End offset of the last child, or `0` if this element has none.
    pub fn end_of_last_child(&self) -> u64 {
        self.0
            .children
            .lock()
            .unwrap()
            .values()
            .next_back()
            .map(|s| s.end_offset)
            .unwrap_or(0)
    }

    /// First child offset strictly after `offset`.
    pub fn next_child(&self, offset: u64) -> Option<u64> {
        first_child_strictly_after(&self.0.children.lock().unwrap(), offset)
    }

    /// Last child offset strictly before `offset`.
    pub fn prev_child(&self, offset: u64) -> Option<u64> {
        last_child_before(&self.0.children.lock().unwrap(), offset)
    }

    /// Return the child registered at `offset`, hydrating it (and caching
    /// a weak handle, for a sub-master) if this is the first time it has
    /// been requested since the index was last rebuilt.
    pub fn get_child(&self, offset: u64) -> crate::Result<Child> {
        if let Some(master) = {
            let children = self.0.children.lock().unwrap();
            let slot = children
                .get(&offset)
                .ok_or_else(|| write_err(self.0.tag, offset, "no child registered at this offset"))?;
            slot.master.as_ref().and_then(Weak::upgrade)
        } {
            return Ok(Child::Master(InFileMaster(master)));
        }

        let tag = {
            let children = self.0.children.lock().unwrap();
            children[&offset].tag
        };

        if self.0.factory.is_master(tag) {
            let data_offset = self.data_offset();
            let (header, size_vint_width) = self.with_file(|file| {
                file.seek(SeekFrom::Start(data_offset + offset))?;
                let after_tag_pos = data_offset + offset + VInt64::encode_size(tag.value) as u64;
                let header = Header::read_from(file)?;
                let size_vint_width = (file.stream_position()? - after_tag_pos) as usize;
                Ok((header, size_vint_width))
            })?;
            if header.size.is_unknown {
                return Err(Error::ElementBodySizeUnknown(header.id));
            }

            let child = InFileMaster(Arc::new(Inner {
                file: self.0.file.clone(),
                parent: Some(self.clone()),
                tag: header.id,
                offset_in_parent: AtomicU64::new(offset),
                root_header_offset: 0,
                size_vint_width,
                data_size: AtomicU64::new(*header.size),
                children: Mutex::new(BTreeMap::new()),
                block_size: self.0.block_size,
                factory: self.0.factory.clone(),
            }));
            child.scan()?;

            let mut children = self.0.children.lock().unwrap();
            if let Some(slot) = children.get_mut(&offset) {
                slot.master = Some(Arc::downgrade(&child.0));
            }
            Ok(Child::Master(child))
        } else {
            let data_offset = self.data_offset();
            let (tag, payload) = self.with_file(|file| {
                file.seek(SeekFrom::Start(data_offset + offset))?;
                let header = Header::read_from(file)?;
                let payload = header.read_body(file)?;
                Ok((header.id, payload))
            })?;
            Ok(Child::Leaf { tag, payload })
        }
    }

    /// Lazily iterate children in offset order. Re-queries the next
    /// offset after each item is yielded, so a concurrent move does not
    /// strand the iterator on a stale position.
    pub fn iter_children(&self) -> ChildIter {
        ChildIter {
            owner: self.clone(),
            cursor: None,
            started: false,
        }
    }

    fn check_new_child_layout(&self, offset: u64, size: u64) -> crate::Result<()> {
        let children = self.0.children.lock().unwrap();
        match last_child_before(&children, offset) {
            Some(p) => {
                let prev_end = children[&p].end_offset;
                if offset < prev_end {
                    return Err(write_err(self.0.tag, offset, format!("collides with sibling at {p} (end offset {prev_end})")));
                }
                if offset == prev_end + 1 {
                    return Err(write_err(self.0.tag, offset, "must start immediately after, or at least two bytes past, the previous sibling"));
                }
            }
            None if offset == 1 => {
                return Err(write_err(self.0.tag, offset, "cannot add a child at offset 1"));
            }
            None => {}
        }

        match first_child_at_or_after(&children, offset) {
            Some(n) => {
                if offset + size > n {
                    return Err(write_err(self.0.tag, offset, format!("collides with sibling at {n}")));
                }
                if n > 0 && offset + size == n - 1 {
                    return Err(write_err(self.0.tag, offset, "would leave a one-byte gap before the next sibling"));
                }
            }
            None => {
                let data_size = self.data_size();
                if offset + size > data_size {
                    return Err(write_err(self.0.tag, offset, format!("extends past element size {data_size}")));
                }
                if data_size > 0 && offset + size == data_size - 1 {
                    return Err(write_err(self.0.tag, offset, "would leave a one-byte gap before the end of the element"));
                }
            }
        }
        Ok(())
    }

    /// Check whether [`add_value_child`](Self::add_value_child) would
    /// succeed without performing the write.
    pub fn can_add_value_child(&self, offset: u64, tag: VInt64, payload_len: u64) -> crate::Result<()> {
        let size = VInt64::encode_size(tag.value) as u64
            + VInt64::encode_size(payload_len) as u64
            + payload_len;
        self.check_new_child_layout(offset, size)
    }

    /// Write a non-master child at `offset`: its header plus `payload`,
    /// void-filling whatever gap opens up before and after it. Fails if
    /// the write would overlap a sibling or leave a one-byte gap.
    pub fn add_value_child(&self, offset: u64, tag: VInt64, payload: &[u8]) -> crate::Result<()> {
        let mut header_bytes = Vec::new();
        Header {
            id: tag,
            size: VInt64::new(payload.len() as u64),
        }
        .encode(&mut header_bytes)?;
        let header_len = header_bytes.len() as u64;
        let mut encoded = header_bytes;
        encoded.extend_from_slice(payload);
        let total = encoded.len() as u64;

        self.check_new_child_layout(offset, total)?;
        let _critical = NoInterrupt::enter();

        let (prev_end, next_start) = {
            let children = self.0.children.lock().unwrap();
            let prev_end = last_child_before(&children, offset).map(|p| children[&p].end_offset).unwrap_or(0);
            let next_start = first_child_at_or_after(&children, offset).unwrap_or_else(|| self.data_size());
            (prev_end, next_start)
        };

        let data_offset = self.data_offset();
        let end = offset + total;
        self.with_file(|file| {
            if offset > prev_end {
                write_void(file, self.0.tag, data_offset + prev_end, offset - prev_end)?;
            }
            if next_start > end {
                write_void(file, self.0.tag, data_offset + end, next_start - end)?;
            }
            file.seek(SeekFrom::Start(data_offset + offset))?;
            file.write_all(&encoded)?;
            file.flush()?;
            Ok(())
        })?;

        self.0.children.lock().unwrap().insert(
            offset,
            ChildSlot {
                tag,
                header_len,
                end_offset: end,
                master: None,
            },
        );
        Ok(())
    }

    /// Allocate a nested master element at `offset`, registering it as a
    /// child and returning a handle to it.
    pub fn add_master_child(
        &self,
        offset: u64,
        tag: VInt64,
        size_vint_width: usize,
        initial_size: u64,
    ) -> crate::Result<InFileMaster> {
        if VInt64::encode_size(initial_size) > size_vint_width {
            return Err(write_err(
                self.0.tag,
                offset,
                format!("initial size {initial_size} does not fit a {size_vint_width}-byte size vint"),
            ));
        }
        let mut header_bytes = Vec::new();
        tag.encode(&mut header_bytes)?;
        header_bytes.extend(VInt64::encode_fixed_width(initial_size, size_vint_width)?);
        let header_len = header_bytes.len() as u64;
        let total = header_len + initial_size;

        self.check_new_child_layout(offset, total)?;
        let _critical = NoInterrupt::enter();

        let (prev_end, next_start) = {
            let children = self.0.children.lock().unwrap();
            let prev_end = last_child_before(&children, offset).map(|p| children[&p].end_offset).unwrap_or(0);
            let next_start = first_child_at_or_after(&children, offset).unwrap_or_else(|| self.data_size());
            (prev_end, next_start)
        };

        let data_offset = self.data_offset();
        let end = offset + total;
        self.with_file(|file| {
            if offset > prev_end {
                write_void(file, self.0.tag, data_offset + prev_end, offset - prev_end)?;
            }
            if next_start > end {
                write_void(file, self.0.tag, data_offset + end, next_start - end)?;
            }
            file.seek(SeekFrom::Start(data_offset + offset))?;
            file.write_all(&header_bytes)?;
            if initial_size > 0 {
                write_void(file, tag, data_offset + offset + header_len, initial_size)?;
            }
            file.flush()?;
            Ok(())
        })?;

        let child = InFileMaster(Arc::new(Inner {
            file: self.0.file.clone(),
            parent: Some(self.clone()),
            tag,
            offset_in_parent: AtomicU64::new(offset),
            root_header_offset: 0,
            size_vint_width,
            data_size: AtomicU64::new(initial_size),
            children: Mutex::new(BTreeMap::new()),
            block_size: self.0.block_size,
            factory: self.0.factory.clone(),
        }));

        self.0.children.lock().unwrap().insert(
            offset,
            ChildSlot {
                tag,
                header_len,
                end_offset: end,
                master: Some(Arc::downgrade(&child.0)),
            },
        );
        Ok(child)
    }

    /// Erase the child at `offset` from the index and void-fill the span
    /// it vacates, merged with any adjoining gap.
    pub fn remove_child(&self, offset: u64) -> crate::Result<()> {
        let (prev_end, next_start) = {
            let children = self.0.children.lock().unwrap();
            if !children.contains_key(&offset) {
                return Err(write_err(self.0.tag, offset, "no child registered at this offset"));
            }
            let prev_end = last_child_before(&children, offset).map(|p| children[&p].end_offset).unwrap_or(0);
            let next_start = first_child_strictly_after(&children, offset).unwrap_or_else(|| self.data_size());
            (prev_end, next_start)
        };

        let _critical = NoInterrupt::enter();
        let data_offset = self.data_offset();
        if next_start > prev_end {
            self.with_file(|file| {
                write_void(file, self.0.tag, data_offset + prev_end, next_start - prev_end)?;
                file.flush()?;
                Ok(())
            })?;
        }

        self.0.children.lock().unwrap().remove(&offset);
        Ok(())
    }

    /// Check whether [`move_child`](Self::move_child) would succeed.
    pub fn can_move_child(&self, offset: u64, new_offset: u64) -> crate::Result<()> {
        let children = self.0.children.lock().unwrap();
        let size = children
            .get(&offset)
            .map(|s| s.end_offset - offset)
            .ok_or_else(|| write_err(self.0.tag, offset, "no child registered at this offset"))?;

        let prev = children.range(..new_offset).filter(|&(&k, _)| k != offset).next_back();
        match prev {
            Some((&p, slot)) => {
                let prev_end = slot.end_offset;
                if new_offset < prev_end {
                    return Err(write_err(self.0.tag, new_offset, format!("collides with sibling at {p} (end offset {prev_end})")));
                }
                if new_offset == prev_end + 1 {
                    return Err(write_err(self.0.tag, new_offset, "would leave a one-byte gap after the previous sibling"));
                }
            }
            None if new_offset == 1 => {
                return Err(write_err(self.0.tag, new_offset, "cannot place a child at offset 1"));
            }
            None => {}
        }

        let next = children.range(new_offset..).filter(|&(&k, _)| k != offset).next();
        let new_end = new_offset + size;
        match next {
            Some((&n, _)) => {
                if new_end > n {
                    return Err(write_err(self.0.tag, new_offset, format!("collides with sibling at {n}")));
                }
                if n > 0 && new_end == n - 1 {
                    return Err(write_err(self.0.tag, new_offset, "would leave a one-byte gap before the next sibling"));
                }
            }
            None => {
                let data_size = self.data_size();
                if new_end > data_size {
                    return Err(write_err(self.0.tag, new_offset, format!("would extend past element size {data_size}")));
                }
                if data_size > 0 && new_end == data_size - 1 {
                    return Err(write_err(self.0.tag, new_offset, "would leave a one-byte gap before the end of the element"));
                }
            }
        }
        Ok(())
    }

    /// Physically copy a child's bytes to `new_offset`, in block-sized
    /// chunks moving in whichever direction avoids self-overlap, then
    /// void-fill whatever it vacates and reindex it.
    pub fn move_child(&self, offset: u64, new_offset: u64) -> crate::Result<()> {
        self.can_move_child(offset, new_offset)?;
        if offset == new_offset {
            return Ok(());
        }
        let _critical = NoInterrupt::enter();

        let (size, old_prev_end, old_next_start, dest_prev_end, dest_next_start) = {
            let children = self.0.children.lock().unwrap();
            let slot = &children[&offset];
            let size = slot.end_offset - offset;
            let prev_end = last_child_before(&children, offset).map(|p| children[&p].end_offset).unwrap_or(0);
            let next_start = first_child_strictly_after(&children, offset).unwrap_or_else(|| self.data_size());
            // Neighbors around the destination, ignoring the moving child's
            // own (still-registered) old slot so a disjoint move doesn't
            // mistake it for its own new neighbor.
            let dest_prev_end = children
                .range(..new_offset)
                .rev()
                .find(|&(&k, _)| k != offset)
                .map(|(_, s)| s.end_offset)
                .unwrap_or(0);
            let dest_next_start = children
                .range((Bound::Excluded(new_offset), Bound::Unbounded))
                .find(|&(&k, _)| k != offset)
                .map(|(&k, _)| k)
                .unwrap_or_else(|| self.data_size());
            (size, prev_end, next_start, dest_prev_end, dest_next_start)
        };

        let block = self.0.block_size.max(1);
        let data_offset = self.data_offset();
        let new_end = new_offset + size;

        self.with_file(|file| {
            if new_offset < offset {
                let mut src = offset;
                let mut dst = new_offset;
                while src < offset + size {
                    let chunk = block.min(offset + size - src);
                    let mut buf = vec![0u8; chunk as usize];
                    file.seek(SeekFrom::Start(data_offset + src))?;
                    file.read_exact(&mut buf)?;
                    file.seek(SeekFrom::Start(data_offset + dst))?;
                    file.write_all(&buf)?;
                    src += chunk;
                    dst += chunk;
                }
            } else {
                let mut remaining = size;
                while remaining > 0 {
                    let chunk = block.min(remaining);
                    let src = offset + remaining - chunk;
                    let dst = new_offset + remaining - chunk;
                    let mut buf = vec![0u8; chunk as usize];
                    file.seek(SeekFrom::Start(data_offset + src))?;
                    file.read_exact(&mut buf)?;
                    file.seek(SeekFrom::Start(data_offset + dst))?;
                    file.write_all(&buf)?;
                    remaining -= chunk;
                }
            }

            if new_offset >= old_next_start || new_end <= old_prev_end {
                // Source and destination are different gaps: void the whole
                // vacated source gap, then repair the destination gap around
                // the child's new position the same way a same-gap move
                // repairs its one gap below — the stale Void that used to
                // span the destination gap must not survive spanning over
                // the bytes the child now occupies.
                if old_next_start > old_prev_end {
                    write_void(file, self.0.tag, data_offset + old_prev_end, old_next_start - old_prev_end)?;
                }
                if new_offset > dest_prev_end {
                    write_void(file, self.0.tag, data_offset + dest_prev_end, new_offset - dest_prev_end)?;
                }
                if dest_next_start > new_end {
                    write_void(file, self.0.tag, data_offset + new_end, dest_next_start - new_end)?;
                }
            } else {
                if new_offset > old_prev_end {
                    write_void(file, self.0.tag, data_offset + old_prev_end, new_offset - old_prev_end)?;
                }
                if new_end < old_next_start {
                    write_void(file, self.0.tag, data_offset + new_end, old_next_start - new_end)?;
                }
            }
            file.flush()?;
            Ok(())
        })?;

        let mut children = self.0.children.lock().unwrap();
        let mut slot = children.remove(&offset).expect("checked by can_move_child");
        slot.end_offset = new_end;
        if let Some(inner) = slot.master.as_ref().and_then(Weak::upgrade) {
            inner.offset_in_parent.store(new_offset, Ordering::SeqCst);
        }
        children.insert(new_offset, slot);
        Ok(())
    }

    /// Check whether [`resize`](Self::resize) would succeed.
    pub fn can_resize(&self, new_size: u64) -> crate::Result<()> {
        {
            let children = self.0.children.lock().unwrap();
            match children.values().next_back() {
                Some(last) => {
                    if new_size < last.end_offset || new_size == last.end_offset + 1 {
                        return Err(resize_err(self.0.tag, new_size, format!("last child ends at {}", last.end_offset)));
                    }
                }
                None if new_size == 1 => {
                    return Err(resize_err(self.0.tag, new_size, "a size of 1 cannot be void-filled"));
                }
                None => {}
            }
        }
        if let Some(parent) = &self.0.parent {
            parent.check_child_resize(self.offset_in_parent(), new_size)?;
        }
        Ok(())
    }

    fn check_child_resize(&self, child_offset: u64, new_child_size: u64) -> crate::Result<()> {
        let children = self.0.children.lock().unwrap();
        let slot = children
            .get(&child_offset)
            .ok_or_else(|| resize_err(self.0.tag, new_child_size, "child not found"))?;
        let new_end = child_offset + slot.header_len + new_child_size;
        match first_child_strictly_after(&children, child_offset) {
            Some(n) => {
                if new_end > n || (n > 0 && new_end == n - 1) {
                    return Err(resize_err(self.0.tag, new_child_size, format!("next sibling starts at {n}")));
                }
            }
            None => {
                let data_size = self.data_size();
                if new_end > data_size || (data_size > 0 && new_end == data_size - 1) {
                    return Err(resize_err(self.0.tag, new_child_size, format!("element size is {data_size}")));
                }
            }
        }
        Ok(())
    }

    /// Change this element's declared `dataSize`, rewriting its size
    /// field in place. When this is a sub-master, the parent's record of
    /// its end offset and the gap after it are updated too; when it is
    /// root-in-file, the file is truncated or extended to match.
    pub fn resize(&self, new_size: u64) -> crate::Result<()> {
        self.can_resize(new_size)?;
        let _critical = NoInterrupt::enter();

        let last_end = self.end_of_last_child();
        let data_offset = self.data_offset();
        let size_vint_pos = self.header_offset() + VInt64::encode_size(self.0.tag.value) as u64;

        self.with_file(|file| {
            file.seek(SeekFrom::Start(size_vint_pos))?;
            file.write_all(&VInt64::encode_fixed_width(new_size, self.0.size_vint_width)?)?;
            if new_size > last_end {
                write_void(file, self.0.tag, data_offset + last_end, new_size - last_end)?;
            }
            match &self.0.parent {
                Some(parent) => {
                    let my_offset = self.offset_in_parent();
                    let header_len = parent.0.children.lock().unwrap()[&my_offset].header_len;
                    let new_end = my_offset + header_len + new_size;
                    let sibling_gap_start = parent.next_child(my_offset).unwrap_or_else(|| parent.data_size());
                    if sibling_gap_start > new_end {
                        write_void(file, parent.0.tag, parent.data_offset() + new_end, sibling_gap_start - new_end)?;
                    }
                    if let Some(slot) = parent.0.children.lock().unwrap().get_mut(&my_offset) {
                        slot.end_offset = new_end;
                    }
                }
                None => {
                    file.set_len(data_offset + new_size)?;
                }
            }
            file.flush()?;
            Ok(())
        })?;

        self.0.data_size.store(new_size, Ordering::SeqCst);
        Ok(())
    }

    /// Shift this element's own children at or after `offset_in_self` by
    /// `delta` bytes, update its declared size and size field, and
    /// recurse into its parent (translating `offset_in_self` by this
    /// element's position) so the growth or shrinkage propagates all the
    /// way to the root.
    fn cascade_range_delta(&self, offset_in_self: u64, delta: i64) -> crate::Result<()> {
        {
            let mut children = self.0.children.lock().unwrap();
            let affected: Vec<u64> = children.range(offset_in_self..).map(|(&k, _)| k).collect();
            let ordered: Box<dyn Iterator<Item = u64>> = if delta >= 0 {
                Box::new(affected.into_iter().rev())
            } else {
                Box::new(affected.into_iter())
            };
            for k in ordered {
                if let Some(mut slot) = children.remove(&k) {
                    let new_key = (k as i64 + delta) as u64;
                    slot.end_offset = (slot.end_offset as i64 + delta) as u64;
                    if let Some(inner) = slot.master.as_ref().and_then(Weak::upgrade) {
                        inner.offset_in_parent.store(new_key, Ordering::SeqCst);
                    }
                    children.insert(new_key, slot);
                }
            }
        }

        let new_data_size = (self.data_size() as i64 + delta) as u64;
        let size_vint_pos = self.header_offset() + VInt64::encode_size(self.0.tag.value) as u64;
        self.with_file(|file| {
            file.seek(SeekFrom::Start(size_vint_pos))?;
            file.write_all(&VInt64::encode_fixed_width(new_data_size, self.0.size_vint_width)?)?;
            file.flush()?;
            Ok(())
        })?;
        self.0.data_size.store(new_data_size, Ordering::SeqCst);

        if let Some(parent) = &self.0.parent {
            let my_offset = self.offset_in_parent();
            parent.cascade_range_delta(my_offset, delta)?;
            if let Some(slot) = parent.0.children.lock().unwrap().get_mut(&my_offset) {
                slot.end_offset = (slot.end_offset as i64 + delta) as u64;
            }
        }
        Ok(())
    }

    /// Check whether [`insert_range`](Self::insert_range) would succeed.
    pub fn can_insert_range(&self, offset: u64, size: u64) -> crate::Result<()> {
        let data_size = self.data_size();
        if offset > data_size {
            return Err(write_err(self.0.tag, offset, format!("offset outside element (0..={data_size})")));
        }
        let mut node = Some(self.clone());
        while let Some(n) = node {
            let new_size = n.data_size() + size;
            if VInt64::encode_size(new_size) > n.0.size_vint_width {
                return Err(write_err(
                    n.0.tag,
                    offset,
                    format!("resizing to {new_size} would overflow its {}-byte size vint", n.0.size_vint_width),
                ));
            }
            node = n.0.parent.clone();
        }
        let children = self.0.children.lock().unwrap();
        if let Some(p) = last_child_before(&children, offset) {
            let prev_end = children[&p].end_offset;
            if prev_end > offset {
                return Err(write_err(self.0.tag, offset, format!("collides with child at {p} (end offset {prev_end})")));
            }
        }
        Ok(())
    }

    /// Insert `size` bytes at `offset` via `fallocate(FALLOC_FL_INSERT_RANGE)`,
    /// void-filling the opened gap and cascading the size increase up
    /// through every ancestor.
    pub fn insert_range(&self, offset: u64, size: u64) -> crate::Result<()> {
        self.can_insert_range(offset, size)?;
        let _critical = NoInterrupt::enter();

        let (prev_end, next_start) = {
            let children = self.0.children.lock().unwrap();
            let prev_end = last_child_before(&children, offset).map(|p| children[&p].end_offset).unwrap_or(0);
            let next_start = first_child_at_or_after(&children, offset).unwrap_or_else(|| self.data_size());
            (prev_end, next_start)
        };

        let data_offset = self.data_offset();
        self.with_file(|file| {
            let abs_offset = data_offset + offset;
            let eof = file.seek(SeekFrom::End(0))?;
            if abs_offset >= eof {
                file.set_len(abs_offset + size)?;
            } else {
                alloc::insert_range(file, abs_offset, size)?;
            }
            write_void(file, self.0.tag, data_offset + prev_end, next_start - prev_end + size)?;
            file.flush()?;
            Ok(())
        })?;

        self.cascade_range_delta(offset, size as i64)
    }

    /// Check whether [`collapse_range`](Self::collapse_range) would
    /// succeed.
    pub fn can_collapse_range(&self, offset: u64, size: u64) -> crate::Result<()> {
        let children = self.0.children.lock().unwrap();
        let prev_end = last_child_before(&children, offset).map(|p| children[&p].end_offset).unwrap_or(0);
        if prev_end > offset {
            return Err(write_err(self.0.tag, offset, format!("collides with child ending at {prev_end}")));
        }
        let data_size = self.data_size();
        if offset + size > data_size {
            return Err(write_err(self.0.tag, offset, format!("overruns element size {data_size}")));
        }
        match first_child_strictly_after(&children, offset) {
            Some(n) => {
                if offset + size > n {
                    return Err(write_err(self.0.tag, offset, format!("collides with child at {n}")));
                }
                if n.saturating_sub(prev_end).saturating_sub(size) == 1 {
                    return Err(write_err(self.0.tag, offset, "would leave a one-byte gap between neighbouring children"));
                }
            }
            None => {
                if data_size.saturating_sub(prev_end).saturating_sub(size) == 1 {
                    return Err(write_err(self.0.tag, offset, "would leave a one-byte gap before the end of the element"));
                }
            }
        }
        Ok(())
    }

    /// Remove `size` bytes at `offset` via `fallocate(FALLOC_FL_COLLAPSE_RANGE)`,
    /// void-filling the remaining gap and cascading the size decrease up
    /// through every ancestor.
    pub fn collapse_range(&self, offset: u64, size: u64) -> crate::Result<()> {
        self.can_collapse_range(offset, size)?;
        let _critical = NoInterrupt::enter();

        let (prev_end, next_start) = {
            let children = self.0.children.lock().unwrap();
            let prev_end = last_child_before(&children, offset).map(|p| children[&p].end_offset).unwrap_or(0);
            let next_start = first_child_strictly_after(&children, offset).unwrap_or_else(|| self.data_size());
            (prev_end, next_start)
        };

        let data_offset = self.data_offset();
        self.with_file(|file| {
            let abs_offset = data_offset + offset;
            let eof = file.seek(SeekFrom::End(0))?;
            if abs_offset + size >= eof {
                file.set_len(abs_offset)?;
            } else {
                alloc::collapse_range(file, abs_offset, size)?;
            }
            if next_start.saturating_sub(prev_end) >= size + 2 {
                write_void(file, self.0.tag, data_offset + prev_end, next_start - prev_end - size)?;
            }
            file.flush()?;
            Ok(())
        })?;

        self.cascade_range_delta(offset, -(size as i64))
    }

    /// Check whether [`punch_hole`](Self::punch_hole) would succeed.
    pub fn can_punch_hole(&self, offset: u64, size: u64) -> crate::Result<()> {
        let children = self.0.children.lock().unwrap();
        let prev_end = last_child_before(&children, offset).map(|p| children[&p].end_offset).unwrap_or(0);
        if prev_end > offset {
            return Err(write_err(self.0.tag, offset, format!("collides with child ending at {prev_end}")));
        }
        let data_size = self.data_size();
        if offset + size > data_size {
            return Err(write_err(self.0.tag, offset, format!("overruns element size {data_size}")));
        }
        if let Some(n) = first_child_strictly_after(&children, offset) {
            if offset + size > n {
                return Err(write_err(self.0.tag, offset, format!("collides with child at {n}")));
            }
        }
        Ok(())
    }

    /// Sparsify `size` bytes at `offset` via
    /// `fallocate(FALLOC_FL_PUNCH_HOLE | FALLOC_FL_KEEP_SIZE)`. Does not
    /// change layout: the range punched must already lie in a gap.
    pub fn punch_hole(&self, offset: u64, size: u64) -> crate::Result<()> {
        self.can_punch_hole(offset, size)?;
        let _critical = NoInterrupt::enter();

        let (prev_end, next_start) = {
            let children = self.0.children.lock().unwrap();
            let prev_end = last_child_before(&children, offset).map(|p| children[&p].end_offset).unwrap_or(0);
            let next_start = first_child_strictly_after(&children, offset).unwrap_or_else(|| self.data_size());
            (prev_end, next_start)
        };

        let data_offset = self.data_offset();
        self.with_file(|file| {
            file.flush()?;
            alloc::punch_hole(file, data_offset + offset, size)?;
            write_void(file, self.0.tag, data_offset + prev_end, next_start - prev_end)?;
            file.flush()?;
            Ok(())
        })
    }

    /// First offset at or after `start`, at least `size` bytes wide and
    /// not leaving a one-byte remainder, that is currently unoccupied.
    pub fn find_free(&self, size: u64, start: u64) -> Option<u64> {
        let children = self.0.children.lock().unwrap();
        let mut start = if start == 1 { 2 } else { start };
        for (&offset, slot) in children.iter() {
            if start == slot.end_offset + 1 {
                start += 1;
            }
            if start > offset {
                continue;
            }
            let gap = offset - start;
            if gap == size || gap >= size + 2 {
                return Some(start);
            }
            start = slot.end_offset;
        }
        let gap = self.data_size().saturating_sub(start);
        if gap == size || gap >= size + 2 {
            Some(start)
        } else {
            None
        }
    }

    /// Nearest offset at or after `start` that both sits on a filesystem
    /// block boundary and does not fall inside an existing child.
    pub fn find_open_boundary(&self, start: u64) -> Option<u64> {
        let bsize = self.0.block_size.max(1);
        let data_size = self.data_size();
        let data_offset = self.data_offset();
        let children = self.0.children.lock().unwrap();
        let mut start = start;
        loop {
            if start > data_size {
                return None;
            }
            let abs = data_offset + start;
            let rem = abs % bsize;
            if rem != 0 {
                start = (abs / bsize + 1) * bsize - data_offset;
                continue;
            }
            if let Some((&p, slot)) = children.range(..=start).next_back() {
                if p <= start && start < slot.end_offset {
                    start = slot.end_offset;
                    continue;
                }
                if start == slot.end_offset + 1 {
                    start += bsize;
                    continue;
                }
            }
            return Some(start);
        }
    }

    /// Nearest offset at or before `start` (or before the end of the last
    /// child, if `start` is `None`) that sits on a block boundary and
    /// does not fall inside an existing child.
    pub fn rfind_open_boundary(&self, start: Option<u64>) -> Option<u64> {
        let bsize = self.0.block_size.max(1);
        let data_offset = self.data_offset();
        let children = self.0.children.lock().unwrap();
        let mut start = start.unwrap_or_else(|| {
            let end = children.values().next_back().map(|s| s.end_offset).unwrap_or(0);
            let abs = data_offset + end;
            let rem = abs % bsize;
            if rem != 0 {
                (abs / bsize + 1) * bsize - data_offset
            } else {
                end
            }
        });
        loop {
            let abs = data_offset + start;
            let rem = abs % bsize;
            if rem != 0 {
                start = (abs / bsize) * bsize - data_offset.min(abs / bsize * bsize);
            }
            match children.range(..=start).next_back() {
                Some((&p, slot)) if start < slot.end_offset => {
                    if p == 0 {
                        return None;
                    }
                    start = p.saturating_sub(1);
                }
                _ => return Some(start),
            }
        }
    }

    /// Attempt [`collapse_range`](Self::collapse_range) between the
    /// nearest open boundaries at or after `start` and at or before
    /// `end`, suppressing any layout error.
    pub fn try_collapse_range(&self, start: u64, end: u64) -> bool {
        let Some(start) = self.find_open_boundary(start) else {
            return false;
        };
        let Some(end) = self.rfind_open_boundary(Some(end)) else {
            return false;
        };
        if start >= end {
            return true;
        }
        self.collapse_range(start, end - start).is_ok()
    }

    /// Attempt [`move_child`](Self::move_child), suppressing any layout
    /// error.
    pub fn try_move_child(&self, offset: u64, new_offset: u64) -> bool {
        self.move_child(offset, new_offset).is_ok()
    }

    /// Shrink this element by moving children smaller than `max_size`
    /// toward its start and collapsing the ranges that opens up, then
    /// resizing down to the tightest boundary that still holds every
    /// child. Sub-master children are trimmed recursively first.
    pub fn quick_trim(&self, max_size: u64) -> crate::Result<()> {
        let offsets: Vec<u64> = self.0.children.lock().unwrap().keys().copied().collect();
        let mut prev_end = 0u64;
        for offset in offsets {
            let info = self
                .0
                .children
                .lock()
                .unwrap()
                .get(&offset)
                .map(|s| (s.end_offset, s.tag));
            let Some((end_offset, tag)) = info else {
                continue;
            };
            if self.0.factory.is_master(tag) {
                if let Ok(Child::Master(m)) = self.get_child(offset) {
                    m.quick_trim(max_size)?;
                }
                self.try_collapse_range(prev_end, offset);
            } else if end_offset - offset <= max_size {
                if offset > prev_end {
                    if let Some(target) = self.find_open_boundary(prev_end) {
                        if target < offset {
                            self.try_move_child(offset, target);
                        }
                    }
                }
            } else {
                self.try_collapse_range(prev_end, offset);
            }
            prev_end = self
                .0
                .children
                .lock()
                .unwrap()
                .values()
                .next_back()
                .map(|s| s.end_offset)
                .unwrap_or(prev_end);
        }

        if let Some(boundary) = self.find_open_boundary(self.end_of_last_child()) {
            if boundary < self.data_size() && self.can_resize(boundary).is_ok() {
                self.resize(boundary)?;
            }
        }
        Ok(())
    }
}

/// Lazy, move-robust iterator over a master element's children, returned
/// by [`InFileMaster::iter_children`].
pub struct ChildIter {
    owner: InFileMaster,
    cursor: Option<u64>,
    started: bool,
}

impl Iterator for ChildIter {
    type Item = crate::Result<Child>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = if !self.started {
            self.started = true;
            self.owner.start_of_first_child()
        } else {
            self.cursor.and_then(|c| self.owner.next_child(c))
        }?;
        self.cursor = Some(offset);
        Some(self.owner.get_child(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::leaf::UnsignedInteger;

    const ROOT_TAG: VInt64 = VInt64::from_encoded(0x18538067);
    const CHILD_TAG: VInt64 = VInt64::from_encoded(0x80);
    const SUB_TAG: VInt64 = VInt64::from_encoded(0x81);

    struct SubMasterFactory;
    impl ChildFactory for SubMasterFactory {
        fn is_master(&self, tag: VInt64) -> bool {
            tag == SUB_TAG
        }
    }

    fn open_temp() -> File {
        tempfile::tempfile().unwrap()
    }

    #[test]
    fn add_get_and_remove_child() {
        let file = open_temp();
        let root = InFileMaster::create_root(file, 0, ROOT_TAG, 4, 256, Arc::new(NoMasterChildren)).unwrap();

        root.add_value_child(0, CHILD_TAG, &[1, 2, 3]).unwrap();
        let Child::Leaf { tag, payload } = root.get_child(0).unwrap() else {
            panic!("expected leaf");
        };
        assert_eq!(tag, CHILD_TAG);
        assert_eq!(payload, vec![1, 2, 3]);

        root.remove_child(0).unwrap();
        assert!(root.get_child(0).is_err());
        assert_eq!(root.start_of_first_child(), None);
    }

    #[test]
    fn add_child_rejects_one_byte_gap() {
        let file = open_temp();
        let root = InFileMaster::create_root(file, 0, ROOT_TAG, 4, 256, Arc::new(NoMasterChildren)).unwrap();
        root.add_value_child(0, CHILD_TAG, &[0u8; 4]).unwrap();
        // child ends at offset 6 (2-byte header + 4-byte payload); offset 7
        // would leave exactly one free byte before it.
        let err = root.add_value_child(7, CHILD_TAG, &[0u8]).unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
    }

    #[test]
    fn round_trips_through_reopen() {
        let mut file = open_temp();
        {
            let root = InFileMaster::create_root(file.try_clone().unwrap(), 0, ROOT_TAG, 4, 256, Arc::new(NoMasterChildren)).unwrap();
            root.add_value_child(0, CHILD_TAG, &[9, 9]).unwrap();
        }
        file.seek(SeekFrom::Start(0)).unwrap();
        let reopened = InFileMaster::open_root(file, 0, Some(ROOT_TAG), Arc::new(NoMasterChildren)).unwrap();
        let Child::Leaf { payload, .. } = reopened.get_child(0).unwrap() else {
            panic!("expected leaf");
        };
        assert_eq!(payload, vec![9, 9]);
    }

    #[test]
    fn nested_master_child_hydrates_and_caches() {
        let file = open_temp();
        let root = InFileMaster::create_root(file, 0, ROOT_TAG, 4, 256, Arc::new(SubMasterFactory)).unwrap();
        let sub = root.add_master_child(0, SUB_TAG, 2, 64).unwrap();
        sub.add_value_child(0, CHILD_TAG, &[7]).unwrap();

        let Child::Master(hydrated) = root.get_child(0).unwrap() else {
            panic!("expected master");
        };
        assert_eq!(hydrated.data_size(), 64);
        let Child::Leaf { payload, .. } = hydrated.get_child(0).unwrap() else {
            panic!("expected leaf");
        };
        assert_eq!(payload, vec![7]);
    }

    #[test]
    fn collapse_range_cascades_size_to_parent() {
        let file = open_temp();
        let root = InFileMaster::create_root(file, 0, ROOT_TAG, 4, 4096, Arc::new(SubMasterFactory)).unwrap();
        let sub = root.add_master_child(16, SUB_TAG, 4, 4096).unwrap();
        sub.add_value_child(0, CHILD_TAG, &[1, 2, 3, 4]).unwrap();

        sub.collapse_range(1024, 2048).unwrap();
        assert_eq!(sub.data_size(), 4096 - 2048);

        root.scan().unwrap();
        let Child::Master(reloaded) = root.get_child(16).unwrap() else {
            panic!("expected master");
        };
        assert_eq!(reloaded.data_size(), 4096 - 2048);
    }

    #[test]
    fn insert_range_cascades_up_two_levels() {
        let file = open_temp();
        let root = InFileMaster::create_root(file, 0, ROOT_TAG, 8, 8192, Arc::new(SubMasterFactory)).unwrap();
        let mid = root.add_master_child(16, SUB_TAG, 8, 4096).unwrap();
        let leaf_tag = CHILD_TAG;
        mid.add_value_child(0, leaf_tag, &[0xAA]).unwrap();

        let before_root_size = root.data_size();
        mid.insert_range(0, 512).unwrap();

        assert_eq!(mid.data_size(), 4096 + 512);
        assert_eq!(root.data_size(), before_root_size + 512);
    }

    #[test]
    fn move_child_preserves_payload() {
        let file = open_temp();
        let root = InFileMaster::create_root(file, 0, ROOT_TAG, 4, 256, Arc::new(NoMasterChildren)).unwrap();
        root.add_value_child(0, CHILD_TAG, &[5, 6, 7, 8]).unwrap();
        root.move_child(0, 64).unwrap();

        let Child::Leaf { payload, .. } = root.get_child(64).unwrap() else {
            panic!("expected leaf");
        };
        assert_eq!(payload, vec![5, 6, 7, 8]);
        assert!(root.get_child(0).is_err());
    }

    #[test]
    fn move_child_across_a_different_gap_repairs_both_gaps() {
        let mut file = open_temp();
        {
            let root = InFileMaster::create_root(
                file.try_clone().unwrap(),
                0,
                ROOT_TAG,
                4,
                256,
                Arc::new(NoMasterChildren),
            )
            .unwrap();
            // Two siblings with a sizable quiescent gap between and after
            // them, so moving `a` into the far gap is a genuinely different
            // gap than the one it vacates.
            root.add_value_child(0, CHILD_TAG, &[1, 2, 3, 4]).unwrap();
            root.add_value_child(64, CHILD_TAG, &[5, 6]).unwrap();

            root.move_child(0, 160).unwrap();

            let Child::Leaf { payload, .. } = root.get_child(160).unwrap() else {
                panic!("expected leaf at destination");
            };
            assert_eq!(payload, vec![1, 2, 3, 4]);
            assert!(root.get_child(0).is_err());
            let Child::Leaf { payload, .. } = root.get_child(64).unwrap() else {
                panic!("expected untouched sibling");
            };
            assert_eq!(payload, vec![5, 6]);
        }

        // Reread from the on-disk bytes alone: if the destination gap's
        // stale Void header were left spanning over the moved child, this
        // scan would either lose it or choke on an overlap.
        file.seek(SeekFrom::Start(0)).unwrap();
        let reopened = InFileMaster::open_root(file, 0, Some(ROOT_TAG), Arc::new(NoMasterChildren)).unwrap();
        let Child::Leaf { payload, .. } = reopened.get_child(160).unwrap() else {
            panic!("expected leaf to survive a fresh scan");
        };
        assert_eq!(payload, vec![1, 2, 3, 4]);
        let Child::Leaf { payload, .. } = reopened.get_child(64).unwrap() else {
            panic!("expected sibling to survive a fresh scan");
        };
        assert_eq!(payload, vec![5, 6]);
    }

    #[test]
    fn resize_grows_and_truncates_root() {
        let file = open_temp();
        let root = InFileMaster::create_root(file, 0, ROOT_TAG, 4, 16, Arc::new(NoMasterChildren)).unwrap();
        root.resize(32).unwrap();
        assert_eq!(root.data_size(), 32);
        root.resize(0).unwrap();
        assert_eq!(root.data_size(), 0);
    }

    #[test]
    fn find_free_skips_one_byte_remainders() {
        let file = open_temp();
        let root = InFileMaster::create_root(file, 0, ROOT_TAG, 4, 256, Arc::new(NoMasterChildren)).unwrap();
        root.add_value_child(0, CHILD_TAG, &[0u8; 4]).unwrap();
        let free = root.find_free(4, 0).unwrap();
        assert!(free >= root.end_of_last_child());
    }

    #[test]
    fn value_leaf_decodes_with_concrete_element_type() {
        let file = open_temp();
        let root = InFileMaster::create_root(file, 0, ROOT_TAG, 4, 256, Arc::new(NoMasterChildren)).unwrap();
        let n: UnsignedInteger<0x80> = 42u64.into();
        let mut encoded = Vec::new();
        n.encode(&mut encoded).unwrap();
        // encoded already carries the tag+size header; strip it back off
        // so add_value_child can rewrite it with the same tag.
        let mut cursor = &encoded[..];
        let header = Header::read_from(&mut cursor).unwrap();
        root.add_value_child(0, header.id, cursor).unwrap();

        let Child::Leaf { payload, .. } = root.get_child(0).unwrap() else {
            panic!("expected leaf");
        };
        let decoded = UnsignedInteger::<0x80>::decode_body(&mut &payload[..]).unwrap();
        assert_eq!(*decoded, 42);
    }
}
