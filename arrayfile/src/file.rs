use crate::attr::AttrValue;
use crate::backend::{is_reserved_attr, BackendId, NodeInfo, NodeStore, OpenMode};
use crate::data::ArrayData;
use crate::error::{Error, Result};
use crate::path::{ArrayInfo, ArrayRef, GroupRef, Layout, Node, NodePath, NodeRef, PathResolver};
use crate::precision::Precision;

use itertools::Itertools;
use log::{debug, info};
use std::ops::Range;
use std::path::Path;

/// An open container.
///
/// The handle owns one engine session and validates every request before
/// handing it to the engine, so both backends accept and reject exactly the
/// same calls. Nodes are addressed as `(name, group)` where `None` means
/// the root group.
///
/// Dropping the handle releases the engine resources. [`FileHandle::close`]
/// does the same but reports failures.
pub struct FileHandle<S: ?Sized + NodeStore = dyn NodeStore> {
    store: Box<S>,
    mode: OpenMode,
}

impl<S: ?Sized + NodeStore> FileHandle<S> {
    pub(crate) fn new(store: Box<S>, mode: OpenMode) -> Self {
        FileHandle { store, mode }
    }

    pub fn backend(&self) -> BackendId {
        self.store.backend()
    }

    /// Location of the container on disk.
    pub fn path(&self) -> &Path {
        self.store.location()
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn root(&self) -> GroupRef {
        GroupRef::root()
    }

    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub(crate) fn writable(&self) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    fn lookup(&self, path: &NodePath) -> Result<Option<NodeRef>> {
        Ok(self.store.get(path)?.map(|info| match info {
            NodeInfo::Group => GroupRef::new(path.clone()).into(),
            NodeInfo::Array(info) => ArrayRef::new(path.clone(), info).into(),
        }))
    }

    fn require(&self, path: &NodePath) -> Result<NodeRef> {
        self.lookup(path)?
            .ok_or_else(|| Error::NodeNotFound(path.to_string()))
    }

    fn require_array(&self, path: &NodePath) -> Result<ArrayInfo> {
        match self.store.get(path)? {
            Some(NodeInfo::Array(info)) => Ok(info),
            Some(NodeInfo::Group) => Err(Error::NodeKind {
                path: path.to_string(),
                expected: "array",
            }),
            None => Err(Error::NodeNotFound(path.to_string())),
        }
    }

    /// Resolves a name that is about to be created: the container must be
    /// writable, the parent an existing group and the name free.
    pub(crate) fn vacant(&self, name: &str, group: Option<&GroupRef>) -> Result<NodePath> {
        self.writable()?;
        let path = PathResolver::resolve(name, group)?;
        self.require(&PathResolver::parent(group))?.into_group()?;
        if self.store.exists(&path)? {
            return Err(Error::NodeExists(path.to_string()));
        }
        Ok(path)
    }

    pub fn create_group(&mut self, name: &str, group: Option<&GroupRef>) -> Result<GroupRef> {
        let path = self.vacant(name, group)?;
        self.store.create_group(&path)?;
        debug!("created group {}", path);
        Ok(GroupRef::new(path))
    }

    /// Creates an array of shape `[0, tail_shape..]` that grows through [`FileHandle::append`].
    pub fn create_extendable_array(
        &mut self,
        name: &str,
        tail_shape: &[usize],
        precision: Precision,
        group: Option<&GroupRef>,
    ) -> Result<ArrayRef> {
        let path = self.vacant(name, group)?;
        self.store
            .create_extendable_array(&path, tail_shape, precision)?;
        debug!("created extendable {} array {} with tail {:?}", precision, path, tail_shape);
        let shape = std::iter::once(0).chain(tail_shape.iter().copied()).collect();
        Ok(ArrayRef::new(
            path,
            ArrayInfo {
                precision,
                shape,
                layout: Layout::Extendable,
            },
        ))
    }

    /// Appends `data` along dimension 0.
    ///
    /// The target must be an extendable array of the same precision whose
    /// trailing dimensions equal those of `data`. A batch without rows
    /// changes nothing, one without elements only grows the extent.
    pub fn append(&mut self, array: &ArrayRef, data: &ArrayData) -> Result<()> {
        self.writable()?;
        let path = array.path();
        let info = self.require_array(path)?;
        if info.layout != Layout::Extendable {
            return Err(Error::NotExtendable(path.to_string()));
        }
        check_rows(&info, data)?;
        if data.nrows() == 0 {
            return Ok(());
        }
        self.store.append(path, data)?;
        debug!("appended {} rows to {}", data.nrows(), path);
        Ok(())
    }

    /// Overwrites rows `offset..offset + data.nrows()`, which must lie within
    /// the current extent.
    pub fn write_rows(&mut self, array: &ArrayRef, offset: usize, data: &ArrayData) -> Result<()> {
        self.writable()?;
        let path = array.path();
        let info = self.require_array(path)?;
        check_rows(&info, data)?;
        let end = match offset.checked_add(data.nrows()) {
            Some(end) if end <= info.shape[0] => end,
            _ => {
                let mut actual = info.shape.clone();
                actual[0] = offset.saturating_add(data.nrows());
                return Err(Error::ShapeMismatch {
                    expected: info.shape,
                    actual,
                });
            }
        };
        if data.is_empty() {
            return Ok(());
        }
        self.store.write_rows(path, offset, data)?;
        debug!("wrote rows {}..{} of {}", offset, end, path);
        Ok(())
    }

    pub fn get(&self, name: &str, group: Option<&GroupRef>) -> Result<NodeRef> {
        self.require(&PathResolver::resolve(name, group)?)
    }

    /// Looks a node up by its canonical path.
    pub fn get_path(&self, path: &NodePath) -> Result<NodeRef> {
        self.require(path)
    }

    /// Whether a node called `name` exists directly under `group`. Nodes
    /// this crate cannot decode still count.
    pub fn exists(&self, name: &str, group: Option<&GroupRef>) -> Result<bool> {
        let path = PathResolver::resolve(name, group)?;
        self.store.exists(&path)
    }

    /// Child names of `group`, sorted.
    pub fn list(&self, group: Option<&GroupRef>) -> Result<Vec<String>> {
        let path = PathResolver::parent(group);
        self.require(&path)?.into_group()?;
        self.store.list(&path)
    }

    /// Current shape of an array.
    pub fn shape(&self, array: &ArrayRef) -> Result<Vec<usize>> {
        Ok(self.require_array(array.path())?.shape)
    }

    /// Reads the whole array.
    pub fn read(&self, array: &ArrayRef) -> Result<ArrayData> {
        let info = self.require_array(array.path())?;
        if info.shape.iter().product::<usize>() == 0 {
            return Ok(ArrayData::zeros(info.precision, &info.shape));
        }
        self.store.read(array.path(), None)
    }

    /// Reads rows `rows` along dimension 0.
    pub fn read_rows(&self, array: &ArrayRef, rows: Range<usize>) -> Result<ArrayData> {
        let info = self.require_array(array.path())?;
        let nrows = info.shape.first().copied().unwrap_or(0);
        if info.shape.is_empty() || rows.start > rows.end || rows.end > nrows {
            let mut actual = info.shape.clone();
            if let Some(first) = actual.first_mut() {
                *first = rows.end;
            }
            return Err(Error::ShapeMismatch {
                expected: info.shape,
                actual,
            });
        }
        let mut shape = info.shape.clone();
        shape[0] = rows.len();
        if shape.iter().product::<usize>() == 0 {
            return Ok(ArrayData::zeros(info.precision, &shape));
        }
        self.store.read(array.path(), Some(rows))
    }

    /// Sets `key` on a node, replacing any previous value.
    pub fn set_attribute<N, V>(&mut self, node: &N, key: &str, value: V) -> Result<()>
    where
        N: Node,
        V: Into<AttrValue>,
    {
        self.writable()?;
        if key.is_empty() || key.contains('\0') || is_reserved_attr(key) {
            return Err(Error::InvalidName(key.to_string()));
        }
        let path = node.path();
        self.require(path)?;
        self.store.set_attribute(path, key, &value.into())
    }

    pub fn get_attribute<N: Node>(&self, node: &N, key: &str) -> Result<AttrValue> {
        let path = node.path();
        self.require(path)?;
        let not_found = || Error::AttributeNotFound {
            path: path.to_string(),
            key: key.to_string(),
        };
        if is_reserved_attr(key) {
            return Err(not_found());
        }
        self.store.get_attribute(path, key)?.ok_or_else(not_found)
    }

    /// Attribute keys of a node, sorted.
    pub fn attribute_names<N: Node>(&self, node: &N) -> Result<Vec<String>> {
        let path = node.path();
        self.require(path)?;
        Ok(self
            .store
            .attribute_names(path)?
            .into_iter()
            .filter(|k| !is_reserved_attr(k))
            .sorted()
            .collect())
    }

    /// Deletes a node together with its attributes and, for groups, its subtree.
    pub fn remove(&mut self, name: &str, group: Option<&GroupRef>) -> Result<()> {
        self.writable()?;
        let path = PathResolver::resolve(name, group)?;
        self.require(&path)?;
        self.store.remove(&path)?;
        debug!("removed {}", path);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    /// Releases the engine session.
    pub fn close(self) -> Result<()> {
        info!("closing {} container {}", self.backend(), self.path().display());
        NodeStore::close(self.store)
    }
}

/// Precision and row shape of `data` must agree with the array.
fn check_rows(info: &ArrayInfo, data: &ArrayData) -> Result<()> {
    if data.precision() != info.precision {
        return Err(Error::PrecisionMismatch {
            expected: info.precision,
            actual: data.precision(),
        });
    }
    if info.shape.is_empty()
        || data.ndim() != info.shape.len()
        || data.tail_shape() != &info.shape[1..]
    {
        let expected = std::iter::once(data.nrows())
            .chain(info.shape.iter().skip(1).copied())
            .collect();
        return Err(Error::ShapeMismatch {
            expected,
            actual: data.shape().to_vec(),
        });
    }
    Ok(())
}

#[cfg(all(test, feature = "zarr"))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::selector::BackendSelector;
    use ndarray::{array, Array2, Array3};
    use tempfile::tempdir;

    fn with_tmp_file<T, F: FnOnce(FileHandle) -> T>(func: F) -> T {
        let dir = tempdir().unwrap();
        let file = BackendSelector::default()
            .select(BackendId::Zarr)
            .unwrap()
            .create(dir.path().join("test.zarr"))
            .unwrap();
        func(file)
    }

    #[test]
    fn test_pressure() {
        with_tmp_file(|mut file| {
            let arr = file
                .create_extendable_array("pressure", &[3], Precision::Float64, None)
                .unwrap();
            assert_eq!(arr.shape(), &[0, 3]);
            let batch = Array2::from_shape_fn((2, 3), |(i, j)| (i + j) as f64);
            file.append(&arr, &batch.clone().into_dyn().into()).unwrap();

            let node = file.get("pressure", None).unwrap().into_array().unwrap();
            assert_eq!(node.shape(), &[2, 3]);
            assert_eq!(node.precision(), Precision::Float64);
            assert_eq!(file.read(&node).unwrap(), batch.into_dyn().into());

            file.set_attribute(&node, "unit", "Pa").unwrap();
            assert_eq!(file.get_attribute(&node, "unit").unwrap(), AttrValue::from("Pa"));
            assert!(file.exists("pressure", None).unwrap());

            file.remove("pressure", None).unwrap();
            assert!(!file.exists("pressure", None).unwrap());
            assert_eq!(
                file.get("pressure", None).unwrap_err().kind(),
                ErrorKind::NodeNotFound
            );
        })
    }

    #[test]
    fn test_append_checks() {
        with_tmp_file(|mut file| {
            let arr = file
                .create_extendable_array("x", &[2, 2], Precision::Int16, None)
                .unwrap();
            let good = Array3::<i16>::ones((1, 2, 2)).into_dyn();
            let wrong_tail = Array3::<i16>::ones((1, 2, 3)).into_dyn();
            let wrong_rank = Array2::<i16>::ones((1, 4)).into_dyn();
            let wrong_type = Array3::<i32>::ones((1, 2, 2)).into_dyn();

            let err = file.append(&arr, &wrong_tail.into()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
            let err = file.append(&arr, &wrong_rank.into()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
            let err = file.append(&arr, &wrong_type.into()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PrecisionMismatch);
            assert_eq!(file.shape(&arr).unwrap(), vec![0, 2, 2]);

            file.append(&arr, &ArrayData::zeros(Precision::Int16, &[0, 2, 2]))
                .unwrap();
            file.append(&arr, &good.into()).unwrap();
            assert_eq!(file.shape(&arr).unwrap(), vec![1, 2, 2]);

            let group = file.create_group("g", None).unwrap();
            let as_array = ArrayRef::new(
                group.path().clone(),
                ArrayInfo {
                    precision: Precision::Int16,
                    shape: vec![0, 2, 2],
                    layout: Layout::Extendable,
                },
            );
            let err = file
                .append(&as_array, &ArrayData::zeros(Precision::Int16, &[1, 2, 2]))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NodeKind);
        })
    }

    #[test]
    fn test_rows() {
        with_tmp_file(|mut file| {
            let arr = file
                .create_extendable_array("x", &[2], Precision::Float32, None)
                .unwrap();
            let data: ArrayData = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]].into_dyn().into();
            file.append(&arr, &data).unwrap();

            assert_eq!(file.read_rows(&arr, 1..3).unwrap(), data.slice_rows(1..3));
            assert_eq!(file.read_rows(&arr, 2..2).unwrap().shape(), &[0, 2]);
            let err = file.read_rows(&arr, 2..4).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ShapeMismatch);

            let patch: ArrayData = array![[9.0f32, 9.0]].into_dyn().into();
            file.write_rows(&arr, 1, &patch).unwrap();
            assert_eq!(file.read_rows(&arr, 1..2).unwrap(), patch);
            let err = file.write_rows(&arr, 3, &patch).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
            let err = file.write_rows(&arr, usize::MAX, &patch).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        })
    }

    #[test]
    fn test_zero_width() {
        with_tmp_file(|mut file| {
            let arr = file
                .create_extendable_array("w", &[0], Precision::Complex64, None)
                .unwrap();
            file.append(&arr, &ArrayData::zeros(Precision::Complex64, &[2, 0]))
                .unwrap();
            assert_eq!(file.shape(&arr).unwrap(), vec![2, 0]);
            file.write_rows(&arr, 1, &ArrayData::zeros(Precision::Complex64, &[1, 0]))
                .unwrap();
            let err = file
                .write_rows(&arr, 2, &ArrayData::zeros(Precision::Complex64, &[1, 0]))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
            assert_eq!(
                file.read(&arr).unwrap(),
                ArrayData::zeros(Precision::Complex64, &[2, 0])
            );
        })
    }

    #[test]
    fn test_create_conflicts() {
        with_tmp_file(|mut file| {
            let g = file.create_group("run", None).unwrap();
            let err = file.create_group("run", None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NodeExists);
            let err = file
                .create_extendable_array("run", &[1], Precision::Bool, None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NodeExists);

            let arr = file
                .create_extendable_array("a", &[1], Precision::Bool, Some(&g))
                .unwrap();
            assert_eq!(arr.path().as_str(), "/run/a");
            let err = file.create_group("", Some(&g)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName);
            assert_eq!(file.list(None).unwrap(), vec!["run"]);
            assert_eq!(file.list(Some(&g)).unwrap(), vec!["a"]);
        })
    }

    #[test]
    fn test_attributes() {
        with_tmp_file(|mut file| {
            let root = file.root();
            file.set_attribute(&root, "count", 3i64).unwrap();
            file.set_attribute(&root, "count", 4i64).unwrap();
            file.set_attribute(&root, "rate", 51200.0).unwrap();
            assert_eq!(file.get_attribute(&root, "count").unwrap(), AttrValue::Int(4));
            assert_eq!(file.attribute_names(&root).unwrap(), vec!["count", "rate"]);
            let err = file.get_attribute(&root, "missing").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AttributeNotFound);
            let err = file.set_attribute(&root, "a\0b", 1i64).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName);

            let arr = file
                .create_extendable_array("x", &[], Precision::Int8, None)
                .unwrap();
            assert!(file.attribute_names(&arr).unwrap().is_empty());
            let err = file.set_attribute(&arr, "_arrayfile_layout", "x").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName);
        })
    }

    #[test]
    fn test_read_only() {
        let dir = tempdir().unwrap();
        let factory = BackendSelector::default().select(BackendId::Zarr).unwrap();
        let path = dir.path().join("ro.zarr");
        let mut file = factory.create(&path).unwrap();
        let arr = file
            .create_extendable_array("x", &[2], Precision::Int32, None)
            .unwrap();
        file.append(&arr, &ArrayData::zeros(Precision::Int32, &[3, 2]))
            .unwrap();
        file.close().unwrap();

        let mut file = factory.open(&path).unwrap();
        assert_eq!(file.shape(&arr).unwrap(), vec![3, 2]);
        let err = file.create_group("g", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
        let err = file.remove("x", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
        let root = file.root();
        let err = file.set_attribute(&root, "k", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
    }
}
