use arrayfile::*;

use ndarray::{ArrayD, IxDyn};
use num::complex::{Complex32, Complex64};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use std::path::PathBuf;
use tempfile::tempdir;

pub fn with_tmp_dir<T, F: FnMut(PathBuf) -> T>(mut func: F) -> T {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();
    func(path)
}

/// File name suffix conventionally used by a backend.
pub fn extension(id: BackendId) -> &'static str {
    match id {
        BackendId::Hdf5 => "h5",
        BackendId::Zarr => "zarr",
    }
}

pub fn file_factory(id: BackendId) -> FileFactory {
    BackendSelector::default().select(id).unwrap()
}

pub fn cache_factory(id: BackendId) -> CacheFileFactory {
    BackendSelector::default().select_cache(id).unwrap()
}

////////////////////////////////////////////////////////////////////////////////
/// Strategies
////////////////////////////////////////////////////////////////////////////////

pub fn precision_strat() -> impl Strategy<Value = Precision> {
    proptest::sample::select(Precision::ALL.to_vec())
}

/// Trailing shapes of rank 0 to 2 with small, possibly zero, dimensions.
pub fn tail_strat() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(0usize..5, 0..3)
}

pub fn name_strat() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

/// Strategy for generating an array of the given precision and shape.
/// Floats are kept finite so results can be compared with `==`.
pub fn array_strat(precision: Precision, shape: Vec<usize>) -> BoxedStrategy<ArrayData> {
    let n = shape.iter().product::<usize>();
    macro_rules! build {
        ($elem:expr) => {
            proptest::collection::vec($elem, n)
                .prop_map(move |v| -> ArrayData {
                    ArrayD::from_shape_vec(IxDyn(&shape), v).unwrap().into()
                })
                .boxed()
        };
    }
    match precision {
        Precision::Float32 => build!(-1e3f32..1e3f32),
        Precision::Float64 => build!(-1e6f64..1e6f64),
        Precision::Complex64 => build!((-1e3f32..1e3f32, -1e3f32..1e3f32)
            .prop_map(|(re, im)| Complex32::new(re, im))),
        Precision::Complex128 => build!((-1e6f64..1e6f64, -1e6f64..1e6f64)
            .prop_map(|(re, im)| Complex64::new(re, im))),
        Precision::Bool => build!(any::<bool>()),
        Precision::Int8 => build!(any::<i8>()),
        Precision::Int16 => build!(any::<i16>()),
        Precision::Int32 => build!(any::<i32>()),
    }
}

/// A batch of up to `max_rows` rows with the given tail shape.
pub fn batch_strat(
    precision: Precision,
    tail: Vec<usize>,
    max_rows: usize,
) -> impl Strategy<Value = ArrayData> {
    (0..=max_rows).prop_flat_map(move |rows| {
        let shape = std::iter::once(rows).chain(tail.iter().copied()).collect();
        array_strat(precision, shape)
    })
}

/// Two batches sharing a precision and tail shape.
pub fn batch_pair_strat(max_rows: usize) -> impl Strategy<Value = (ArrayData, ArrayData)> {
    (precision_strat(), tail_strat()).prop_flat_map(move |(precision, tail)| {
        (
            batch_strat(precision, tail.clone(), max_rows),
            batch_strat(precision, tail, max_rows),
        )
    })
}
