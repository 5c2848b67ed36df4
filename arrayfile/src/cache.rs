use crate::backend::{CacheStore, OpenMode};
use crate::error::{Error, Result};
use crate::file::FileHandle;
use crate::path::{ArrayInfo, ArrayRef, GroupRef, Layout};
use crate::precision::Precision;

use log::debug;
use std::ops::{Deref, DerefMut};

/// A [`FileHandle`] used as a result cache.
///
/// Adds fixed-shape compressed arrays and a pure existence query. Every
/// [`FileHandle`] operation is reachable through `Deref`.
pub struct CacheFileHandle {
    inner: FileHandle<dyn CacheStore>,
}

impl CacheFileHandle {
    pub(crate) fn new(store: Box<dyn CacheStore>, mode: OpenMode) -> Self {
        CacheFileHandle {
            inner: FileHandle::new(store, mode),
        }
    }

    /// Creates an array of fixed `shape`, chunked and compressed with the
    /// backend's policy. Its content is written with
    /// [`FileHandle::write_rows`]; it cannot be appended to.
    pub fn create_compressible_array(
        &mut self,
        name: &str,
        shape: &[usize],
        precision: Precision,
        group: Option<&GroupRef>,
    ) -> Result<ArrayRef> {
        let path = self.inner.vacant(name, group)?;
        if shape.is_empty() {
            return Err(Error::ShapeMismatch {
                expected: vec![1],
                actual: Vec::new(),
            });
        }
        self.inner
            .store_mut()
            .create_compressible_array(&path, shape, precision)?;
        debug!("created compressible {} array {} of shape {:?}", precision, path, shape);
        Ok(ArrayRef::new(
            path,
            ArrayInfo {
                precision,
                shape: shape.to_vec(),
                layout: Layout::Compressible,
            },
        ))
    }

    /// Whether a node called `name` exists directly under `group`. Content is not inspected.
    pub fn is_cached(&self, name: &str, group: Option<&GroupRef>) -> Result<bool> {
        self.inner.exists(name, group)
    }

    pub fn close(self) -> Result<()> {
        self.inner.close()
    }
}

impl Deref for CacheFileHandle {
    type Target = FileHandle<dyn CacheStore>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for CacheFileHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(all(test, feature = "zarr"))]
mod tests {
    use super::*;
    use crate::backend::BackendId;
    use crate::data::ArrayData;
    use crate::error::ErrorKind;
    use crate::selector::BackendSelector;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn with_tmp_cache<T, F: FnOnce(CacheFileHandle) -> T>(func: F) -> T {
        let dir = tempdir().unwrap();
        let file = BackendSelector::default()
            .select_cache(BackendId::Zarr)
            .unwrap()
            .create(dir.path().join("cache.zarr"))
            .unwrap();
        func(file)
    }

    #[test]
    fn test_compressible() {
        with_tmp_cache(|mut cache| {
            let arr = cache
                .create_compressible_array("psf", &[4, 3], Precision::Float32, None)
                .unwrap();
            assert_eq!(arr.shape(), &[4, 3]);
            assert!(!arr.is_extendable());
            assert_eq!(
                cache.read(&arr).unwrap(),
                ArrayData::zeros(Precision::Float32, &[4, 3])
            );

            let data: ArrayData = Array2::from_shape_fn((4, 3), |(i, j)| (i * j) as f32)
                .into_dyn()
                .into();
            cache.write_rows(&arr, 0, &data).unwrap();
            assert_eq!(cache.read(&arr).unwrap(), data);

            let err = cache.append(&arr, &data).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotExtendable);
            let err = cache
                .create_compressible_array("scalar", &[], Precision::Float32, None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        })
    }

    #[test]
    fn test_is_cached() {
        with_tmp_cache(|mut cache| {
            let g = cache.create_group("beamformer", None).unwrap();
            assert!(!cache.is_cached("result", Some(&g)).unwrap());
            cache
                .create_compressible_array("result", &[8], Precision::Complex128, Some(&g))
                .unwrap();
            assert!(cache.is_cached("result", Some(&g)).unwrap());
            assert!(!cache.is_cached("result", None).unwrap());

            cache.create_group("other", None).unwrap();
            cache.remove("other", None).unwrap();
            assert!(cache.is_cached("result", Some(&g)).unwrap());

            cache.remove("beamformer", None).unwrap();
            assert!(!cache.is_cached("result", Some(&g)).unwrap());
            assert!(!cache.is_cached("beamformer", None).unwrap());
        })
    }

    #[test]
    fn test_foreign_node() {
        with_tmp_cache(|mut cache| {
            let node = cache.path().join("foreign");
            std::fs::create_dir(&node).unwrap();
            let meta = serde_json::json!({
                "zarr_format": 3,
                "node_type": "array",
                "shape": [2],
                "data_type": "uint64",
                "chunk_grid": { "name": "regular", "configuration": { "chunk_shape": [2] } },
                "chunk_key_encoding": { "name": "default", "configuration": { "separator": "/" } },
                "fill_value": 0,
                "codecs": [{ "name": "bytes", "configuration": { "endian": "little" } }],
                "attributes": {}
            });
            std::fs::write(node.join("zarr.json"), meta.to_string()).unwrap();

            assert!(cache.is_cached("foreign", None).unwrap());
            let err = cache.create_group("foreign", None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NodeExists);
            let err = cache
                .create_compressible_array("foreign", &[2], Precision::Int32, None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NodeExists);
            let err = cache.get("foreign", None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedPrecision);
        })
    }
}
