//! HDF5 files through the `hdf5` crate.
//!
//! Nodes are reached by walking group handles from the file root along the
//! segments of their canonical path. Extendable arrays are chunked datasets
//! with resizable extents; append resizes the dataset, then writes the new
//! hyperslab.
//!
//! `hdf5` is built against an older `ndarray` release than the rest of the
//! crate. Arrays cross that boundary only as a flat buffer plus shape, see
//! `to_h5` and `from_h5`.

use crate::attr::AttrValue;
use crate::backend::{BackendId, CacheStore, NodeInfo, NodeStore, OpenMode, LAYOUT_ATTR};
use crate::data::ArrayData;
use crate::error::{Error, Result, StorageContext};
use crate::layout::{compressible_chunk, extendable_chunk};
use crate::macros::{dyn_map, precision_match};
use crate::path::{ArrayInfo, Layout, NodePath};
use crate::precision::Precision;
use crate::selector::BackendRegistration;

use anyhow::{anyhow, bail};
use hdf5::{
    types::{TypeDescriptor, VarLenUnicode},
    Dataset, File, Group, H5Type, Location, Selection, SimpleExtents,
};
use log::info;
use ndarray::ArrayD;
use ndarray_h5::{IxDyn, SliceInfo, SliceInfoElem};
use std::ops::{Deref, Range};
use std::path::{Path, PathBuf};

///////////////////////////////////////////////////////////////////////////////
/// Precision codec
///////////////////////////////////////////////////////////////////////////////

/// HDF5 datatype descriptor for a precision.
pub fn encode_precision(precision: Precision) -> TypeDescriptor {
    macro_rules! fun {
        ($ty:ty) => {
            <$ty as H5Type>::type_descriptor()
        };
    }
    precision_match!(precision, fun)
}

/// Precision of a stored datatype.
pub fn decode_precision(descriptor: &TypeDescriptor) -> Result<Precision> {
    Precision::ALL
        .into_iter()
        .find(|p| &encode_precision(*p) == descriptor)
        .ok_or_else(|| Error::UnsupportedPrecision(format!("{}", descriptor)))
}

///////////////////////////////////////////////////////////////////////////////
/// Store
///////////////////////////////////////////////////////////////////////////////

pub struct H5Store {
    file: File,
    location: PathBuf,
}

enum Handle {
    Group(Group),
    Dataset(Dataset),
}

impl Deref for Handle {
    type Target = Location;

    fn deref(&self) -> &Self::Target {
        match self {
            Handle::Group(g) => g,
            Handle::Dataset(d) => d,
        }
    }
}

impl H5Store {
    pub fn open<P: AsRef<Path>>(location: P, mode: OpenMode) -> Result<Self> {
        let location = location.as_ref().to_path_buf();
        let file = match mode {
            OpenMode::Create => File::create(&location),
            OpenMode::ReadOnly => File::open(&location),
            OpenMode::ReadWrite => File::open_rw(&location),
        }
        .storage(format!("opening {}", location.display()))?;
        info!("opened hdf5 file {} ({:?})", location.display(), mode);
        Ok(H5Store { file, location })
    }

    fn root(&self) -> Result<Group> {
        self.file.group("/").storage("opening root group")
    }

    /// Walks group handles down to `path`, `None` if a segment is missing.
    fn handle(&self, path: &NodePath) -> Result<Option<Handle>> {
        let mut group = self.root()?;
        let mut segments = path.segments().peekable();
        while let Some(seg) = segments.next() {
            if !group.link_exists(seg) {
                return Ok(None);
            }
            let last = segments.peek().is_none();
            match group.group(seg) {
                Ok(g) if last => return Ok(Some(Handle::Group(g))),
                Ok(g) => group = g,
                Err(_) if last => {
                    let dataset = group.dataset(seg).storage(format!("opening {}", path))?;
                    return Ok(Some(Handle::Dataset(dataset)));
                }
                Err(_) => return Ok(None),
            }
        }
        Ok(Some(Handle::Group(group)))
    }

    fn existing(&self, path: &NodePath) -> Result<Handle> {
        self.handle(path)?
            .ok_or_else(|| Error::NodeNotFound(path.to_string()))
    }

    fn group(&self, path: &NodePath) -> Result<Group> {
        match self.existing(path)? {
            Handle::Group(g) => Ok(g),
            Handle::Dataset(_) => Err(Error::NodeKind {
                path: path.to_string(),
                expected: "group",
            }),
        }
    }

    fn dataset(&self, path: &NodePath) -> Result<Dataset> {
        match self.existing(path)? {
            Handle::Dataset(d) => Ok(d),
            Handle::Group(_) => Err(Error::NodeKind {
                path: path.to_string(),
                expected: "array",
            }),
        }
    }

    /// Parent group handle and leaf name of a non-root path.
    fn parent(&self, path: &NodePath) -> Result<(Group, String)> {
        let name = path
            .name()
            .ok_or_else(|| Error::InvalidName(path.to_string()))?
            .to_string();
        let parent = path.parent().unwrap_or_else(NodePath::root);
        Ok((self.group(&parent)?, name))
    }

    fn create_dataset(
        &self,
        path: &NodePath,
        shape: &[usize],
        chunk: &[usize],
        precision: Precision,
        layout: Layout,
    ) -> Result<()> {
        let (parent, name) = self.parent(path)?;
        macro_rules! fun {
            ($ty:ty) => {
                parent.new_dataset::<$ty>()
            };
        }
        let mut builder = precision_match!(precision, fun).chunk(chunk);
        if layout == Layout::Compressible {
            builder = builder.lzf();
        }
        let extents: hdf5::Extents = SimpleExtents::resizable(shape).into();
        let dataset = builder
            .shape(extents)
            .create(name.as_str())
            .storage(format!("creating dataset {}", path))?;
        write_scalar_attr(&dataset, LAYOUT_ATTR, &AttrValue::from(layout.as_str()))
    }

    fn write_slab(&self, path: &NodePath, dataset: &Dataset, offset: usize, data: &ArrayData) -> Result<()> {
        let selection = rows_selection(data.shape(), offset)?;
        macro_rules! fun {
            ($variant:ident, $arr:expr) => {
                dataset
                    .write_slice(&to_h5($arr)?, selection)
                    .storage(format!("writing rows of {}", path))
            };
        }
        dyn_map!(data, fun)
    }
}

/// Copies an array into the `ndarray` release used by `hdf5`.
fn to_h5<T: Clone>(arr: &ArrayD<T>) -> Result<ndarray_h5::ArrayD<T>> {
    ndarray_h5::ArrayD::from_shape_vec(IxDyn(arr.shape()), arr.iter().cloned().collect())
        .storage("copying array for hdf5")
}

/// Inverse of [`to_h5`].
fn from_h5<T: Clone>(arr: ndarray_h5::ArrayD<T>) -> Result<ArrayD<T>> {
    ArrayD::from_shape_vec(ndarray::IxDyn(arr.shape()), arr.iter().cloned().collect())
        .storage("copying array from hdf5")
}

/// Hyperslab covering `shape` with its leading dimension shifted by `offset`.
fn rows_selection(shape: &[usize], offset: usize) -> Result<Selection> {
    let slices: Vec<SliceInfoElem> = shape
        .iter()
        .enumerate()
        .map(|(i, &n)| {
            let start = if i == 0 { offset } else { 0 };
            SliceInfoElem::Slice {
                start: start as isize,
                end: Some((start + n) as isize),
                step: 1,
            }
        })
        .collect();
    let info = SliceInfo::<_, IxDyn, IxDyn>::try_from(slices).storage("building hyperslab")?;
    Selection::try_from(info).storage("building hyperslab")
}

fn array_info(dataset: &Dataset) -> Result<ArrayInfo> {
    let descriptor = dataset
        .dtype()
        .and_then(|t| t.to_descriptor())
        .storage(format!("reading datatype of {}", dataset.name()))?;
    let precision = decode_precision(&descriptor)?;
    let layout = match read_scalar_attr(dataset, LAYOUT_ATTR)? {
        Some(AttrValue::Str(s)) => Layout::from_tag(&s).unwrap_or(Layout::Compressible),
        _ if dataset.is_resizable() => Layout::Extendable,
        _ => Layout::Compressible,
    };
    Ok(ArrayInfo {
        precision,
        shape: dataset.shape(),
        layout,
    })
}

fn read_scalar_attr(loc: &Location, name: &str) -> Result<Option<AttrValue>> {
    let names = loc.attr_names().storage("listing attributes")?;
    if !names.iter().any(|n| n == name) {
        return Ok(None);
    }
    let read = || -> anyhow::Result<AttrValue> {
        let attr = loc.attr(name)?;
        let value = match attr.dtype()?.to_descriptor()? {
            TypeDescriptor::Boolean => AttrValue::Bool(attr.read_scalar::<bool>()?),
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
                AttrValue::Int(attr.read_scalar::<i64>()?)
            }
            TypeDescriptor::Float(_) => AttrValue::Float(attr.read_scalar::<f64>()?),
            TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
                AttrValue::Str(attr.read_scalar::<VarLenUnicode>()?.to_string())
            }
            v => bail!("unsupported attribute type {}", v),
        };
        Ok(value)
    };
    read()
        .map(Some)
        .map_err(|e| Error::StorageIo(e.context(format!("reading attribute '{}'", name))))
}

fn write_scalar_attr(loc: &Location, name: &str, value: &AttrValue) -> Result<()> {
    del_attr(loc, name)?;
    let write = || -> anyhow::Result<()> {
        match value {
            AttrValue::Bool(x) => loc.new_attr::<bool>().create(name)?.write_scalar(x)?,
            AttrValue::Int(x) => loc.new_attr::<i64>().create(name)?.write_scalar(x)?,
            AttrValue::Float(x) => loc.new_attr::<f64>().create(name)?.write_scalar(x)?,
            AttrValue::Str(x) => {
                let value: VarLenUnicode = x.parse()?;
                loc.new_attr::<VarLenUnicode>()
                    .create(name)?
                    .write_scalar(&value)?
            }
        }
        Ok(())
    };
    write().map_err(|e| Error::StorageIo(e.context(format!("writing attribute '{}'", name))))
}

fn del_attr(loc: &Location, name: &str) -> Result<()> {
    let c_name = std::ffi::CString::new(name).map_err(|_| Error::InvalidName(name.to_string()))?;
    let status = unsafe {
        if hdf5_sys::h5a::H5Aexists(loc.id(), c_name.as_ptr()) > 0 {
            hdf5_sys::h5a::H5Adelete(loc.id(), c_name.as_ptr())
        } else {
            0
        }
    };
    if status < 0 {
        return Err(anyhow!("deleting attribute '{}'", name).into());
    }
    Ok(())
}

impl NodeStore for H5Store {
    fn backend(&self) -> BackendId {
        BackendId::Hdf5
    }

    fn location(&self) -> &Path {
        &self.location
    }

    fn exists(&self, path: &NodePath) -> Result<bool> {
        Ok(self.handle(path)?.is_some())
    }

    fn get(&self, path: &NodePath) -> Result<Option<NodeInfo>> {
        match self.handle(path)? {
            None => Ok(None),
            Some(Handle::Group(_)) => Ok(Some(NodeInfo::Group)),
            Some(Handle::Dataset(d)) => Ok(Some(NodeInfo::Array(array_info(&d)?))),
        }
    }

    fn create_group(&mut self, path: &NodePath) -> Result<()> {
        let (parent, name) = self.parent(path)?;
        parent
            .create_group(name.as_str())
            .storage(format!("creating group {}", path))?;
        Ok(())
    }

    fn create_extendable_array(
        &mut self,
        path: &NodePath,
        tail_shape: &[usize],
        precision: Precision,
    ) -> Result<()> {
        let shape: Vec<usize> = std::iter::once(0).chain(tail_shape.iter().copied()).collect();
        let chunk = extendable_chunk(tail_shape);
        self.create_dataset(path, &shape, &chunk, precision, Layout::Extendable)
    }

    fn append(&mut self, path: &NodePath, data: &ArrayData) -> Result<()> {
        let dataset = self.dataset(path)?;
        let mut shape = dataset.shape();
        let start = shape[0];
        shape[0] += data.nrows();
        dataset
            .resize(shape.as_slice())
            .storage(format!("resizing {}", path))?;
        if data.is_empty() {
            return Ok(());
        }
        self.write_slab(path, &dataset, start, data)
    }

    fn read(&self, path: &NodePath, rows: Option<Range<usize>>) -> Result<ArrayData> {
        let dataset = self.dataset(path)?;
        let info = array_info(&dataset)?;
        let selection = match rows {
            None => Selection::All,
            Some(r) => {
                let mut shape = info.shape.clone();
                shape[0] = r.end - r.start;
                rows_selection(&shape, r.start)?
            }
        };
        macro_rules! fun {
            ($ty:ty) => {{
                let arr = dataset
                    .read_slice::<$ty, _, IxDyn>(selection)
                    .storage(format!("reading {}", path))?;
                ArrayData::from(from_h5(arr)?)
            }};
        }
        Ok(precision_match!(info.precision, fun))
    }

    fn write_rows(&mut self, path: &NodePath, offset: usize, data: &ArrayData) -> Result<()> {
        let dataset = self.dataset(path)?;
        self.write_slab(path, &dataset, offset, data)
    }

    fn set_attribute(&mut self, path: &NodePath, key: &str, value: &AttrValue) -> Result<()> {
        let handle = self.existing(path)?;
        write_scalar_attr(&handle, key, value)
    }

    fn get_attribute(&self, path: &NodePath, key: &str) -> Result<Option<AttrValue>> {
        let handle = self.existing(path)?;
        read_scalar_attr(&handle, key)
    }

    fn attribute_names(&self, path: &NodePath) -> Result<Vec<String>> {
        let handle = self.existing(path)?;
        handle
            .attr_names()
            .storage(format!("listing attributes of {}", path))
    }

    fn remove(&mut self, path: &NodePath) -> Result<()> {
        let (parent, name) = self.parent(path)?;
        parent
            .unlink(name.as_str())
            .storage(format!("removing {}", path))
    }

    fn list(&self, path: &NodePath) -> Result<Vec<String>> {
        let mut names = self
            .group(path)?
            .member_names()
            .storage(format!("listing {}", path))?;
        names.sort();
        Ok(names)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush().storage("flushing")
    }

    fn close(self: Box<Self>) -> Result<()> {
        let H5Store { file, location } = *self;
        file.close()
            .storage(format!("closing {}", location.display()))?;
        info!("closed hdf5 file {}", location.display());
        Ok(())
    }
}

impl CacheStore for H5Store {
    fn create_compressible_array(
        &mut self,
        path: &NodePath,
        shape: &[usize],
        precision: Precision,
    ) -> Result<()> {
        let chunk = compressible_chunk(shape);
        self.create_dataset(path, shape, &chunk, precision, Layout::Compressible)
    }
}

///////////////////////////////////////////////////////////////////////////////
/// Registration
///////////////////////////////////////////////////////////////////////////////

fn probe() -> anyhow::Result<()> {
    let (major, minor, release) = hdf5::library_version();
    if (major, minor) < (1, 8) {
        bail!("HDF5 {}.{}.{} is too old, 1.8 or newer is required", major, minor, release);
    }
    Ok(())
}

fn open_file(path: &Path, mode: OpenMode) -> Result<Box<dyn NodeStore>> {
    Ok(Box::new(H5Store::open(path, mode)?))
}

fn open_cache(path: &Path, mode: OpenMode) -> Result<Box<dyn CacheStore>> {
    Ok(Box::new(H5Store::open(path, mode)?))
}

pub fn registration() -> BackendRegistration {
    BackendRegistration {
        id: BackendId::Hdf5,
        probe,
        open_file,
        open_cache,
    }
}

/// test module
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, concatenate, Array2, Axis};
    use num::complex::Complex64;
    use tempfile::tempdir;

    fn with_tmp_store<T, F: FnOnce(H5Store) -> T>(func: F) -> T {
        let dir = tempdir().unwrap();
        let store = H5Store::open(dir.path().join("temp.h5"), OpenMode::Create).unwrap();
        func(store)
    }

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_codec() {
        for precision in Precision::ALL {
            assert_eq!(decode_precision(&encode_precision(precision)).unwrap(), precision);
        }
        assert!(decode_precision(&u64::type_descriptor()).is_err());
    }

    #[test]
    fn test_handles() {
        with_tmp_store(|mut store| {
            store.create_group(&p("/a")).unwrap();
            store.create_group(&p("/a/b")).unwrap();
            store
                .create_extendable_array(&p("/a/b/x"), &[2, 2], Precision::Complex128)
                .unwrap();
            assert_eq!(store.get(&p("/a/b")).unwrap(), Some(NodeInfo::Group));
            assert_eq!(store.get(&p("/a/c")).unwrap(), None);
            assert_eq!(store.get(&p("/a/b/x/y")).unwrap(), None);
            assert_eq!(store.list(&p("/a/b")).unwrap(), vec!["x"]);
            match store.get(&p("/a/b/x")).unwrap() {
                Some(NodeInfo::Array(info)) => {
                    assert_eq!(info.shape, vec![0, 2, 2]);
                    assert_eq!(info.precision, Precision::Complex128);
                    assert_eq!(info.layout, Layout::Extendable);
                }
                other => panic!("unexpected {:?}", other),
            }
        })
    }

    #[test]
    fn test_append_resize() {
        with_tmp_store(|mut store| {
            let path = p("/x");
            store.create_extendable_array(&path, &[3], Precision::Float64).unwrap();
            let a = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f64);
            let b = Array2::from_shape_fn((4, 3), |(i, j)| -((i * 3 + j) as f64));
            store.append(&path, &a.clone().into_dyn().into()).unwrap();
            store.append(&path, &b.clone().into_dyn().into()).unwrap();

            let merged = concatenate(Axis(0), &[a.view(), b.view()]).unwrap();
            assert_eq!(store.read(&path, None).unwrap(), merged.clone().into_dyn().into());
            assert_eq!(
                store.read(&path, Some(1..3)).unwrap(),
                merged.slice(ndarray::s![1..3, ..]).to_owned().into_dyn().into()
            );
        })
    }

    #[test]
    fn test_zero_width_append() {
        with_tmp_store(|mut store| {
            let path = p("/w");
            store.create_extendable_array(&path, &[0], Precision::Int8).unwrap();
            store
                .append(&path, &ArrayData::zeros(Precision::Int8, &[3, 0]))
                .unwrap();
            match store.get(&path).unwrap() {
                Some(NodeInfo::Array(info)) => assert_eq!(info.shape, vec![3, 0]),
                other => panic!("unexpected {:?}", other),
            }
        })
    }

    #[test]
    fn test_foreign_dataset() {
        with_tmp_store(|store| {
            store
                .file
                .new_dataset::<u64>()
                .shape(vec![2])
                .create("foreign")
                .unwrap();
            let path = p("/foreign");
            assert!(store.exists(&path).unwrap());
            assert!(!store.exists(&p("/foreign/x")).unwrap());
            let err = store.get(&path).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::UnsupportedPrecision);
        })
    }

    #[test]
    fn test_compressible() {
        with_tmp_store(|mut store| {
            let path = p("/c");
            store
                .create_compressible_array(&path, &[2, 2], Precision::Complex128)
                .unwrap();
            let data: ArrayData = array![
                [Complex64::new(1.0, -1.0), Complex64::new(0.5, 2.0)],
                [Complex64::new(0.0, 0.0), Complex64::new(-3.0, 4.0)]
            ]
            .into_dyn()
            .into();
            store.write_rows(&path, 0, &data).unwrap();
            assert_eq!(store.read(&path, None).unwrap(), data);
            let dataset = store.dataset(&path).unwrap();
            assert_eq!(array_info(&dataset).unwrap().layout, Layout::Compressible);
        })
    }

    #[test]
    fn test_attributes() {
        with_tmp_store(|mut store| {
            store.create_group(&p("/g")).unwrap();
            let g = p("/g");
            store.set_attribute(&g, "unit", &"Pa".into()).unwrap();
            store.set_attribute(&g, "unit", &AttrValue::Int(3)).unwrap();
            store.set_attribute(&g, "ok", &AttrValue::Bool(true)).unwrap();
            assert_eq!(store.get_attribute(&g, "unit").unwrap(), Some(AttrValue::Int(3)));
            assert_eq!(store.get_attribute(&g, "ok").unwrap(), Some(AttrValue::Bool(true)));
            assert_eq!(store.get_attribute(&g, "nope").unwrap(), None);

            let mut names = store.attribute_names(&g).unwrap();
            names.sort();
            assert_eq!(names, vec!["ok", "unit"]);

            store.remove(&g).unwrap();
            assert_eq!(store.get(&g).unwrap(), None);
        })
    }
}
