//! Zarr v3 directory stores through `zarrs`.
//!
//! Nodes are addressed by their canonical path string, which is also the
//! zarrs node path. Store keys drop the leading slash: the metadata of
//! `/run1/pressure` lives under `run1/pressure/zarr.json`.

use crate::attr::{json, AttrValue};
use crate::backend::{BackendId, CacheStore, NodeInfo, NodeStore, OpenMode, LAYOUT_ATTR};
use crate::data::ArrayData;
use crate::error::{Error, Result, StorageContext};
use crate::layout::{compressible_chunk, extendable_chunk};
use crate::macros::{dyn_map, precision_match};
use crate::path::{ArrayInfo, Layout, NodePath};
use crate::precision::Precision;
use crate::selector::BackendRegistration;

use anyhow::anyhow;
use log::info;
use ndarray::ArrayD;
use num::complex::{Complex32, Complex64};
use serde_json::{Map, Value};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zarrs::array::codec::GzipCodec;
use zarrs::array::data_type;
use zarrs::array::{Array, ArrayBuilder, ArraySubset, DataType, FillValue};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::{Group, GroupBuilder};
use zarrs::storage::{
    ListableStorageTraits, ReadableStorageTraits, StoreKey, StorePrefix, WritableStorageTraits,
};

/// Gzip level applied to compressible arrays.
const GZIP_LEVEL: u32 = 5;

const METADATA_FILE: &str = "zarr.json";

///////////////////////////////////////////////////////////////////////////////
/// Precision codec
///////////////////////////////////////////////////////////////////////////////

/// Zarr data type and fill value for a precision.
pub fn encode_precision(precision: Precision) -> (DataType, FillValue) {
    match precision {
        Precision::Float32 => (data_type::float32(), 0.0f32.into()),
        Precision::Float64 => (data_type::float64(), 0.0f64.into()),
        Precision::Complex64 => (data_type::complex64(), Complex32::new(0.0, 0.0).into()),
        Precision::Complex128 => (data_type::complex128(), Complex64::new(0.0, 0.0).into()),
        Precision::Bool => (data_type::bool(), false.into()),
        Precision::Int8 => (data_type::int8(), 0i8.into()),
        Precision::Int16 => (data_type::int16(), 0i16.into()),
        Precision::Int32 => (data_type::int32(), 0i32.into()),
    }
}

/// Precision of a stored `data_type` entry. Zarr names coincide with precision tags.
pub fn decode_precision(data_type: &Value) -> Result<Precision> {
    let name = match data_type {
        Value::String(s) => s.as_str(),
        Value::Object(m) => m.get("name").and_then(Value::as_str).unwrap_or_default(),
        _ => "",
    };
    name.parse()
}

///////////////////////////////////////////////////////////////////////////////
/// Store
///////////////////////////////////////////////////////////////////////////////

pub struct ZarrStore {
    store: Arc<FilesystemStore>,
    location: PathBuf,
}

impl ZarrStore {
    pub fn open<P: AsRef<Path>>(location: P, mode: OpenMode) -> Result<Self> {
        let location = location.as_ref().to_path_buf();
        let display = location.display().to_string();
        if mode == OpenMode::Create {
            // only an existing zarr container is truncated
            if location.join(METADATA_FILE).is_file() {
                std::fs::remove_dir_all(&location).storage(format!("truncating {}", display))?;
            } else if location.exists() {
                return Err(anyhow!("{} exists and is not a zarr container", display).into());
            }
            std::fs::create_dir_all(&location).storage(format!("creating {}", display))?;
        }
        let store = FilesystemStore::new(&location).storage(format!("opening {}", display))?;
        let zarr = ZarrStore {
            store: Arc::new(store),
            location,
        };

        if mode == OpenMode::Create {
            GroupBuilder::new()
                .build(zarr.store.clone(), "/")
                .storage("creating root group")?
                .store_metadata()
                .storage("writing root group")?;
        } else if zarr.metadata(&NodePath::root())?.is_none() {
            return Err(anyhow!("{} is not a zarr container", display).into());
        }
        info!("opened zarr store {} ({:?})", display, mode);
        Ok(zarr)
    }

    fn metadata(&self, path: &NodePath) -> Result<Option<Map<String, Value>>> {
        let key = metadata_key(path)?;
        let bytes = self
            .store
            .get(&key)
            .storage(format!("reading metadata of {}", path))?;
        match bytes {
            None => Ok(None),
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(Value::Object(map)) => Ok(Some(map)),
                Ok(_) => Err(anyhow!("malformed metadata at {}", path).into()),
                Err(e) => Err(e).storage(format!("parsing metadata of {}", path)),
            },
        }
    }

    fn open_array(&self, path: &NodePath) -> Result<Array<FilesystemStore>> {
        Array::open(self.store.clone(), path.as_str()).storage(format!("opening array {}", path))
    }

    fn create_array(
        &self,
        path: &NodePath,
        shape: &[usize],
        chunk: &[usize],
        precision: Precision,
        layout: Layout,
    ) -> Result<()> {
        let (data_type, fill_value) = encode_precision(precision);
        let mut builder = ArrayBuilder::new(to_u64(shape), to_u64(chunk), data_type, fill_value);
        let mut attributes = Map::new();
        attributes.insert(LAYOUT_ATTR.to_string(), Value::from(layout.as_str()));
        builder.attributes(attributes);
        if layout == Layout::Compressible {
            let gzip = GzipCodec::new(GZIP_LEVEL).storage("configuring gzip")?;
            builder.bytes_to_bytes_codecs(vec![Arc::new(gzip)]);
        }
        builder
            .build(self.store.clone(), path.as_str())
            .storage(format!("creating array {}", path))?
            .store_metadata()
            .storage(format!("writing metadata of {}", path))
    }

    fn store_rows(
        &self,
        path: &NodePath,
        array: &Array<FilesystemStore>,
        offset: usize,
        data: &ArrayData,
    ) -> Result<()> {
        let ranges: Vec<Range<u64>> = data
            .shape()
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let start = if i == 0 { offset as u64 } else { 0 };
                start..start + n as u64
            })
            .collect();
        let subset = ArraySubset::new_with_ranges(&ranges);
        macro_rules! fun {
            ($variant:ident, $arr:expr) => {
                array.store_array_subset(&subset, $arr.clone())
            };
        }
        dyn_map!(data, fun).storage(format!("writing rows of {}", path))
    }
}

fn to_u64(shape: &[usize]) -> Vec<u64> {
    shape.iter().map(|&x| x as u64).collect()
}

fn metadata_key(path: &NodePath) -> Result<StoreKey> {
    let key = if path.is_root() {
        METADATA_FILE.to_string()
    } else {
        format!("{}/{}", &path.as_str()[1..], METADATA_FILE)
    };
    StoreKey::new(key.as_str()).storage(format!("store key of {}", path))
}

fn store_prefix(path: &NodePath) -> Result<StorePrefix> {
    let prefix = if path.is_root() {
        String::new()
    } else {
        format!("{}/", &path.as_str()[1..])
    };
    StorePrefix::new(prefix.as_str()).storage(format!("store prefix of {}", path))
}

fn attributes(meta: &Map<String, Value>) -> Option<&Map<String, Value>> {
    meta.get("attributes").and_then(Value::as_object)
}

fn array_info(path: &NodePath, meta: &Map<String, Value>) -> Result<ArrayInfo> {
    let precision = decode_precision(meta.get("data_type").unwrap_or(&Value::Null))?;
    let shape = meta
        .get("shape")
        .and_then(Value::as_array)
        .and_then(|dims| {
            dims.iter()
                .map(|x| x.as_u64().map(|x| x as usize))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| Error::from(anyhow!("missing shape in metadata of {}", path)))?;
    // arrays written by other tools carry no marker and are treated as fixed
    let layout = attributes(meta)
        .and_then(|attrs| attrs.get(LAYOUT_ATTR))
        .and_then(Value::as_str)
        .and_then(Layout::from_tag)
        .unwrap_or(Layout::Compressible);
    Ok(ArrayInfo {
        precision,
        shape,
        layout,
    })
}

impl NodeStore for ZarrStore {
    fn backend(&self) -> BackendId {
        BackendId::Zarr
    }

    fn location(&self) -> &Path {
        &self.location
    }

    fn exists(&self, path: &NodePath) -> Result<bool> {
        let key = metadata_key(path)?;
        let size = self
            .store
            .size_key(&key)
            .storage(format!("checking {}", path))?;
        Ok(size.is_some())
    }

    fn get(&self, path: &NodePath) -> Result<Option<NodeInfo>> {
        let meta = match self.metadata(path)? {
            Some(meta) => meta,
            None => return Ok(None),
        };
        match meta.get("node_type").and_then(Value::as_str) {
            Some("group") => Ok(Some(NodeInfo::Group)),
            Some("array") => Ok(Some(NodeInfo::Array(array_info(path, &meta)?))),
            other => Err(anyhow!("unknown node type {:?} at {}", other, path).into()),
        }
    }

    fn create_group(&mut self, path: &NodePath) -> Result<()> {
        GroupBuilder::new()
            .build(self.store.clone(), path.as_str())
            .storage(format!("creating group {}", path))?
            .store_metadata()
            .storage(format!("writing metadata of {}", path))
    }

    fn create_extendable_array(
        &mut self,
        path: &NodePath,
        tail_shape: &[usize],
        precision: Precision,
    ) -> Result<()> {
        let shape: Vec<usize> = std::iter::once(0).chain(tail_shape.iter().copied()).collect();
        let chunk = extendable_chunk(tail_shape);
        self.create_array(path, &shape, &chunk, precision, Layout::Extendable)
    }

    fn append(&mut self, path: &NodePath, data: &ArrayData) -> Result<()> {
        let mut array = self.open_array(path)?;
        let mut shape = array.shape().to_vec();
        let start = shape[0] as usize;
        shape[0] += data.nrows() as u64;
        array
            .set_shape(shape)
            .storage(format!("resizing {}", path))?;
        array
            .store_metadata()
            .storage(format!("writing metadata of {}", path))?;
        if data.is_empty() {
            return Ok(());
        }
        self.store_rows(path, &array, start, data)
    }

    fn read(&self, path: &NodePath, rows: Option<Range<usize>>) -> Result<ArrayData> {
        let precision = match self.get(path)? {
            Some(NodeInfo::Array(info)) => info.precision,
            _ => return Err(Error::NodeNotFound(path.to_string())),
        };
        let array = self.open_array(path)?;
        let ranges: Vec<Range<u64>> = array
            .shape()
            .iter()
            .enumerate()
            .map(|(i, &n)| match (i, &rows) {
                (0, Some(r)) => r.start as u64..r.end as u64,
                _ => 0..n,
            })
            .collect();
        let subset = ArraySubset::new_with_ranges(&ranges);
        macro_rules! fun {
            ($ty:ty) => {
                array
                    .retrieve_array_subset::<ArrayD<$ty>>(&subset)
                    .map(ArrayData::from)
            };
        }
        precision_match!(precision, fun).storage(format!("reading {}", path))
    }

    fn write_rows(&mut self, path: &NodePath, offset: usize, data: &ArrayData) -> Result<()> {
        let array = self.open_array(path)?;
        self.store_rows(path, &array, offset, data)
    }

    fn set_attribute(&mut self, path: &NodePath, key: &str, value: &AttrValue) -> Result<()> {
        let value = json::to_json(value);
        match self.get(path)? {
            Some(NodeInfo::Group) => {
                let mut group = Group::open(self.store.clone(), path.as_str())
                    .storage(format!("opening group {}", path))?;
                group.attributes_mut().insert(key.to_string(), value);
                group
                    .store_metadata()
                    .storage(format!("writing attributes of {}", path))
            }
            Some(NodeInfo::Array(_)) => {
                let mut array = self.open_array(path)?;
                array.attributes_mut().insert(key.to_string(), value);
                array
                    .store_metadata()
                    .storage(format!("writing attributes of {}", path))
            }
            None => Err(Error::NodeNotFound(path.to_string())),
        }
    }

    fn get_attribute(&self, path: &NodePath, key: &str) -> Result<Option<AttrValue>> {
        let meta = self
            .metadata(path)?
            .ok_or_else(|| Error::NodeNotFound(path.to_string()))?;
        match attributes(&meta).and_then(|attrs| attrs.get(key)) {
            None => Ok(None),
            Some(value) => json::from_json(value)
                .map(Some)
                .ok_or_else(|| anyhow!("attribute '{}' of {} is not a scalar", key, path).into()),
        }
    }

    fn attribute_names(&self, path: &NodePath) -> Result<Vec<String>> {
        let meta = self
            .metadata(path)?
            .ok_or_else(|| Error::NodeNotFound(path.to_string()))?;
        Ok(attributes(&meta)
            .map(|attrs| attrs.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn remove(&mut self, path: &NodePath) -> Result<()> {
        let prefix = store_prefix(path)?;
        self.store
            .erase_prefix(&prefix)
            .storage(format!("removing {}", path))
    }

    fn list(&self, path: &NodePath) -> Result<Vec<String>> {
        let prefix = store_prefix(path)?;
        let children = self
            .store
            .list_dir(&prefix)
            .storage(format!("listing {}", path))?;
        let mut names = Vec::new();
        for child in children.prefixes() {
            let name = child
                .as_str()
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default();
            let child_path = path.join(name)?;
            if self.metadata(&child_path)?.is_some() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        info!("closed zarr store {}", self.location.display());
        Ok(())
    }
}

impl CacheStore for ZarrStore {
    fn create_compressible_array(
        &mut self,
        path: &NodePath,
        shape: &[usize],
        precision: Precision,
    ) -> Result<()> {
        let chunk = compressible_chunk(shape);
        self.create_array(path, shape, &chunk, precision, Layout::Compressible)
    }
}

///////////////////////////////////////////////////////////////////////////////
/// Registration
///////////////////////////////////////////////////////////////////////////////

fn probe() -> anyhow::Result<()> {
    GzipCodec::new(GZIP_LEVEL)?;
    Ok(())
}

fn open_file(path: &Path, mode: OpenMode) -> Result<Box<dyn NodeStore>> {
    Ok(Box::new(ZarrStore::open(path, mode)?))
}

fn open_cache(path: &Path, mode: OpenMode) -> Result<Box<dyn CacheStore>> {
    Ok(Box::new(ZarrStore::open(path, mode)?))
}

pub fn registration() -> BackendRegistration {
    BackendRegistration {
        id: BackendId::Zarr,
        probe,
        open_file,
        open_cache,
    }
}
