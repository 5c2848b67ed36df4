//! Capability contracts the storage engines implement.
//!
//! Adapters only translate validated requests into engine calls. Name
//! checks, uniqueness, shape and precision rules live in
//! [`FileHandle`](crate::FileHandle) so every engine observes them the same way.

#[cfg(feature = "hdf5")]
pub mod hdf5;
#[cfg(feature = "zarr")]
pub mod zarr;

use crate::attr::AttrValue;
use crate::data::ArrayData;
use crate::error::{Error, Result};
use crate::path::{ArrayInfo, NodePath};
use crate::precision::Precision;

use core::fmt::{Display, Formatter};
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

/// Attribute key holding an array's [`Layout`](crate::Layout). Hidden from callers.
pub(crate) const LAYOUT_ATTR: &str = "_arrayfile_layout";

/// Keys written by this crate or by an engine for its own bookkeeping.
pub(crate) fn is_reserved_attr(key: &str) -> bool {
    key == LAYOUT_ATTR || key == "_zarrs"
}

/// Identifies a storage engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendId {
    Hdf5,
    Zarr,
}

impl BackendId {
    pub const ALL: [BackendId; 2] = [BackendId::Hdf5, BackendId::Zarr];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Hdf5 => "hdf5",
            BackendId::Zarr => "zarr",
        }
    }
}

impl Display for BackendId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hdf5" | "h5" => Ok(BackendId::Hdf5),
            "zarr" => Ok(BackendId::Zarr),
            _ => Err(Error::unavailable(s, "not a registered backend identifier")),
        }
    }
}

/// How a container is opened.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpenMode {
    /// Create a new container, truncating an existing one.
    Create,
    /// Open an existing container for reading.
    ReadOnly,
    /// Open an existing container for reading and writing.
    ReadWrite,
}

impl OpenMode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

/// What an engine reports about an existing node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeInfo {
    Group,
    Array(ArrayInfo),
}

/// The operations a storage engine must provide for [`FileHandle`](crate::FileHandle).
///
/// Paths are canonical and already validated. Callers guarantee that the
/// parent of a created node is an existing group, that created names are
/// free, and that data passed to `append` and `write_rows` matches the
/// target array's precision and extent.
pub trait NodeStore {
    fn backend(&self) -> BackendId;

    /// Location of the container on disk.
    fn location(&self) -> &Path;

    /// Whether anything is stored at `path`. The node's content is not decoded.
    fn exists(&self, path: &NodePath) -> Result<bool>;

    /// Looks up a node, `None` if nothing exists at `path`.
    fn get(&self, path: &NodePath) -> Result<Option<NodeInfo>>;

    fn create_group(&mut self, path: &NodePath) -> Result<()>;

    /// Allocates an array of shape `[0, tail_shape..]` that grows along dimension 0.
    fn create_extendable_array(
        &mut self,
        path: &NodePath,
        tail_shape: &[usize],
        precision: Precision,
    ) -> Result<()>;

    /// Grows the array by `data.nrows()` rows and stores `data` in them.
    /// Batches without elements only grow the extent.
    fn append(&mut self, path: &NodePath, data: &ArrayData) -> Result<()>;

    /// Reads rows `rows` along dimension 0, or everything when `rows` is `None`.
    fn read(&self, path: &NodePath, rows: Option<Range<usize>>) -> Result<ArrayData>;

    /// Overwrites rows starting at `offset`.
    fn write_rows(&mut self, path: &NodePath, offset: usize, data: &ArrayData) -> Result<()>;

    /// Upserts an attribute.
    fn set_attribute(&mut self, path: &NodePath, key: &str, value: &AttrValue) -> Result<()>;

    fn get_attribute(&self, path: &NodePath, key: &str) -> Result<Option<AttrValue>>;

    /// Attribute keys of a node, reserved keys included.
    fn attribute_names(&self, path: &NodePath) -> Result<Vec<String>>;

    /// Deletes a node and, for groups, everything beneath it.
    fn remove(&mut self, path: &NodePath) -> Result<()>;

    /// Names of the direct children of a group.
    fn list(&self, path: &NodePath) -> Result<Vec<String>>;

    fn flush(&mut self) -> Result<()>;

    /// Releases the engine's resources.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Extra operation needed by [`CacheFileHandle`](crate::CacheFileHandle).
pub trait CacheStore: NodeStore {
    /// Allocates a fixed-shape array using the engine's compression policy.
    fn create_compressible_array(
        &mut self,
        path: &NodePath,
        shape: &[usize],
        precision: Precision,
    ) -> Result<()>;
}
