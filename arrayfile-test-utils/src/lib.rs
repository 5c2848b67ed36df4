mod common;
pub use common::*;

use arrayfile::*;
use itertools::Itertools;
use ndarray::{array, Array1, Array2};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;

pub fn test_scenario(id: BackendId) {
    with_tmp_dir(|dir| {
        let mut file = cache_factory(id)
            .create(dir.join(format!("scenario.{}", extension(id))))
            .unwrap();
        let arr = file
            .create_extendable_array("pressure", &[3], Precision::Float64, None)
            .unwrap();
        let batch = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f64 * 0.5);
        file.append(&arr, &batch.into_dyn().into()).unwrap();

        let node = file.get("pressure", None).unwrap().into_array().unwrap();
        assert_eq!(node.shape(), &[2, 3]);
        assert_eq!(node.precision(), Precision::Float64);

        file.set_attribute(&node, "unit", "Pa").unwrap();
        assert_eq!(file.get_attribute(&node, "unit").unwrap().as_str(), Some("Pa"));
        assert!(file.is_cached("pressure", None).unwrap());

        file.remove("pressure", None).unwrap();
        assert!(!file.is_cached("pressure", None).unwrap());
        let err = file.get("pressure", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NodeNotFound);
        file.close().unwrap();
    })
}

pub fn test_roundtrip_all_precisions(id: BackendId) {
    with_tmp_dir(|dir| {
        let path = dir.join(format!("roundtrip.{}", extension(id)));
        for precision in Precision::ALL {
            let batches = tail_strat().prop_flat_map(move |tail| batch_strat(precision, tail, 12));
            proptest!(ProptestConfig::with_cases(8), |(batch in batches)| {
                let mut file = file_factory(id).create(&path).unwrap();
                let arr = file
                    .create_extendable_array("x", batch.tail_shape(), precision, None)
                    .unwrap();
                file.append(&arr, &batch).unwrap();
                file.close().unwrap();

                let file = file_factory(id).open(&path).unwrap();
                let arr = file.get("x", None).unwrap().into_array().unwrap();
                prop_assert_eq!(arr.precision(), precision);
                prop_assert_eq!(arr.tail_shape(), batch.tail_shape());
                prop_assert_eq!(arr.shape()[0], batch.nrows());
                let data = file.read(&arr).unwrap();
                prop_assert_eq!(data.precision(), precision);
                prop_assert_eq!(&data, &batch);
            });
        }
    })
}

pub fn test_append_associative(id: BackendId) {
    with_tmp_dir(|dir| {
        let path = dir.join(format!("append.{}", extension(id)));
        proptest!(ProptestConfig::with_cases(32), |((a, b) in batch_pair_strat(10))| {
            let mut file = file_factory(id).create(&path).unwrap();
            let precision = a.precision();
            let split = file
                .create_extendable_array("split", a.tail_shape(), precision, None)
                .unwrap();
            let joined = file
                .create_extendable_array("joined", a.tail_shape(), precision, None)
                .unwrap();
            file.append(&split, &a).unwrap();
            file.append(&split, &b).unwrap();
            file.append(&joined, &ArrayData::concat(&[a.clone(), b.clone()]).unwrap())
                .unwrap();

            prop_assert_eq!(file.shape(&split).unwrap()[0], a.nrows() + b.nrows());
            prop_assert_eq!(file.shape(&split).unwrap(), file.shape(&joined).unwrap());
            let split = file.read(&split).unwrap();
            prop_assert_eq!(&split, &file.read(&joined).unwrap());
            prop_assert_eq!(split.slice_rows(0..a.nrows()), a.clone());
            file.close().unwrap();
        });
    })
}

/// One step of the existence model checked by [`test_is_cached`].
#[derive(Debug, Clone)]
enum CacheOp {
    Create(usize),
    Append(usize),
    Remove(usize),
}

pub fn test_is_cached(id: BackendId) {
    const NAMES: [&str; 4] = ["a", "b", "c", "d"];
    with_tmp_dir(|dir| {
        let path = dir.join(format!("cached.{}", extension(id)));
        let op = prop_oneof![
            (0..NAMES.len()).prop_map(CacheOp::Create),
            (0..NAMES.len()).prop_map(CacheOp::Append),
            (0..NAMES.len()).prop_map(CacheOp::Remove),
        ];
        let scripts = proptest::collection::vec(op, 0..12);
        proptest!(ProptestConfig::with_cases(24), |(ops in scripts)| {
            let mut file = cache_factory(id).create(&path).unwrap();
            let group = file.create_group("results", None).unwrap();
            let mut model = BTreeSet::new();
            for op in ops {
                match op {
                    CacheOp::Create(i) => {
                        let res = file.create_extendable_array(NAMES[i], &[2], Precision::Int32, Some(&group));
                        if model.insert(i) {
                            prop_assert!(res.is_ok());
                        } else {
                            prop_assert_eq!(res.unwrap_err().kind(), ErrorKind::NodeExists);
                        }
                    }
                    CacheOp::Append(i) => {
                        if model.contains(&i) {
                            let arr = file.get(NAMES[i], Some(&group)).unwrap().into_array().unwrap();
                            file.append(&arr, &ArrayData::zeros(Precision::Int32, &[1, 2])).unwrap();
                        }
                    }
                    CacheOp::Remove(i) => {
                        let res = file.remove(NAMES[i], Some(&group));
                        if model.remove(&i) {
                            prop_assert!(res.is_ok());
                        } else {
                            prop_assert_eq!(res.unwrap_err().kind(), ErrorKind::NodeNotFound);
                        }
                    }
                }
                for (i, name) in NAMES.iter().enumerate() {
                    prop_assert_eq!(file.is_cached(name, Some(&group)).unwrap(), model.contains(&i));
                    prop_assert!(!file.is_cached(name, None).unwrap());
                }
            }
            let expected = model.iter().map(|&i| NAMES[i].to_string()).collect_vec();
            prop_assert_eq!(file.list(Some(&group)).unwrap(), expected);
        });
    })
}

pub fn test_remove(id: BackendId) {
    with_tmp_dir(|dir| {
        let mut file = file_factory(id)
            .create(dir.join(format!("remove.{}", extension(id))))
            .unwrap();
        let run = file.create_group("run", None).unwrap();
        let mics = file.create_group("mics", Some(&run)).unwrap();
        let arr = file
            .create_extendable_array("pressure", &[4], Precision::Float32, Some(&mics))
            .unwrap();
        file.set_attribute(&arr, "unit", "Pa").unwrap();
        file.create_group("keep", None).unwrap();

        file.remove("run", None).unwrap();
        assert!(!file.exists("run", None).unwrap());
        assert!(!file.exists("mics", Some(&run)).unwrap());
        assert!(!file.exists("pressure", Some(&mics)).unwrap());
        assert_eq!(file.get("mics", Some(&run)).unwrap_err().kind(), ErrorKind::NodeNotFound);
        assert_eq!(file.list(None).unwrap(), vec!["keep"]);

        // a node recreated under the same name starts without attributes
        let run = file.create_group("run", None).unwrap();
        let mics = file.create_group("mics", Some(&run)).unwrap();
        let arr = file
            .create_extendable_array("pressure", &[4], Precision::Float32, Some(&mics))
            .unwrap();
        assert!(file.attribute_names(&arr).unwrap().is_empty());
        assert_eq!(file.shape(&arr).unwrap(), vec![0, 4]);

        assert_eq!(file.remove("nope", None).unwrap_err().kind(), ErrorKind::NodeNotFound);
        file.close().unwrap();
    })
}

pub fn test_errors(id: BackendId) {
    with_tmp_dir(|dir| {
        let path = dir.join(format!("errors.{}", extension(id)));
        let mut file = file_factory(id).create(&path).unwrap();

        assert_eq!(
            "complex256".parse::<Precision>().unwrap_err().kind(),
            ErrorKind::UnsupportedPrecision
        );
        assert_eq!(file.get("x", None).unwrap_err().kind(), ErrorKind::NodeNotFound);
        assert_eq!(file.create_group("a/b", None).unwrap_err().kind(), ErrorKind::InvalidName);
        assert_eq!(file.create_group("..", None).unwrap_err().kind(), ErrorKind::InvalidName);
        for name in ["zarr.json", "__meta"] {
            assert_eq!(file.create_group(name, None).unwrap_err().kind(), ErrorKind::InvalidName);
            assert_eq!(file.exists(name, None).unwrap_err().kind(), ErrorKind::InvalidName);
        }
        let root = file.root();
        let err = file.set_attribute(&root, "a\0b", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);

        let arr = file
            .create_extendable_array("x", &[3], Precision::Float64, None)
            .unwrap();
        let err = file
            .create_extendable_array("x", &[3], Precision::Float64, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NodeExists);
        let err = file.create_group("x", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NodeExists);

        let wrong: ArrayData = Array2::<f64>::zeros((2, 4)).into_dyn().into();
        assert_eq!(file.append(&arr, &wrong).unwrap_err().kind(), ErrorKind::ShapeMismatch);
        let wrong: ArrayData = Array2::<f32>::zeros((2, 3)).into_dyn().into();
        assert_eq!(file.append(&arr, &wrong).unwrap_err().kind(), ErrorKind::PrecisionMismatch);
        assert_eq!(file.shape(&arr).unwrap(), vec![0, 3]);

        let err = file.get_attribute(&arr, "unit").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AttributeNotFound);
        let err = file.get("x", None).unwrap().into_group().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NodeKind);

        // stale group reference
        let g = file.create_group("g", None).unwrap();
        file.remove("g", None).unwrap();
        let err = file.create_group("h", Some(&g)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NodeNotFound);
        file.close().unwrap();

        let mut file = file_factory(id).open(&path).unwrap();
        assert_eq!(file.create_group("g", None).unwrap_err().kind(), ErrorKind::ReadOnly);
        let data = ArrayData::zeros(Precision::Float64, &[1, 3]);
        assert_eq!(file.append(&arr, &data).unwrap_err().kind(), ErrorKind::ReadOnly);

        let missing = dir.join(format!("missing.{}", extension(id)));
        let err = file_factory(id).open(&missing).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::StorageIo);
    })
}

pub fn test_compressible(id: BackendId) {
    with_tmp_dir(|dir| {
        let path = dir.join(format!("compressible.{}", extension(id)));
        let mut file = cache_factory(id).create(&path).unwrap();
        let arr = file
            .create_compressible_array("csm", &[5, 4], Precision::Complex128, None)
            .unwrap();
        assert_eq!(arr.layout(), Layout::Compressible);
        assert_eq!(file.read(&arr).unwrap(), ArrayData::zeros(Precision::Complex128, &[5, 4]));

        let data: ArrayData = Array2::from_shape_fn((5, 4), |(i, j)| {
            num::complex::Complex64::new(i as f64, -(j as f64))
        })
        .into_dyn()
        .into();
        file.write_rows(&arr, 0, &data).unwrap();
        let patch = ArrayData::zeros(Precision::Complex128, &[2, 4]);
        file.write_rows(&arr, 3, &patch).unwrap();
        assert_eq!(file.read_rows(&arr, 0..3).unwrap(), data.slice_rows(0..3));
        assert_eq!(file.read_rows(&arr, 3..5).unwrap(), patch);
        assert_eq!(
            file.write_rows(&arr, 4, &patch).unwrap_err().kind(),
            ErrorKind::ShapeMismatch
        );
        assert_eq!(file.append(&arr, &patch).unwrap_err().kind(), ErrorKind::NotExtendable);

        let long = file
            .create_compressible_array("long", &[12000], Precision::Int32, None)
            .unwrap();
        let values: ArrayData = Array1::from_iter(0..12000i32).into_dyn().into();
        file.write_rows(&long, 0, &values).unwrap();
        file.close().unwrap();

        let file = cache_factory(id).open(&path).unwrap();
        let long = file.get("long", None).unwrap().into_array().unwrap();
        assert!(!long.is_extendable());
        assert_eq!(file.read(&long).unwrap(), values);
        let arr = file.get("csm", None).unwrap().into_array().unwrap();
        assert_eq!(arr.shape(), &[5, 4]);
        assert_eq!(arr.precision(), Precision::Complex128);
    })
}

pub fn test_groups(id: BackendId) {
    with_tmp_dir(|dir| {
        let mut file = file_factory(id)
            .create(dir.join(format!("groups.{}", extension(id))))
            .unwrap();
        let a = file.create_group("a", None).unwrap();
        let b = file.create_group("b", Some(&a)).unwrap();
        file.create_group("c", Some(&a)).unwrap();
        let arr = file
            .create_extendable_array("d", &[], Precision::Bool, Some(&b))
            .unwrap();
        assert_eq!(b.path().as_str(), "/a/b");
        assert_eq!(arr.path().as_str(), "/a/b/d");

        assert_eq!(file.list(None).unwrap(), vec!["a"]);
        assert_eq!(file.list(Some(&a)).unwrap(), vec!["b", "c"]);
        assert_eq!(file.list(Some(&b)).unwrap(), vec!["d"]);

        let node = file.get("b", Some(&a)).unwrap();
        assert_eq!(node.as_group(), Some(&b));
        let node = file.get_path(&NodePath::parse("/a/b/d").unwrap()).unwrap();
        assert_eq!(node.as_array().map(|x| x.shape().to_vec()), Some(vec![0]));
        assert!(!file.exists("d", Some(&a)).unwrap());

        let data: ArrayData = array![true, false, true].into_dyn().into();
        file.append(&arr, &data).unwrap();
        assert_eq!(file.read(&arr).unwrap(), data);
        file.close().unwrap();
    })
}

pub fn test_attributes(id: BackendId) {
    with_tmp_dir(|dir| {
        let path = dir.join(format!("attributes.{}", extension(id)));
        let mut file = file_factory(id).create(&path).unwrap();
        let root = file.root();
        let g = file.create_group("g", None).unwrap();
        let arr = file
            .create_extendable_array("x", &[2], Precision::Int8, Some(&g))
            .unwrap();

        file.set_attribute(&root, "version", 2i64).unwrap();
        file.set_attribute(&g, "sample_freq", 51200.0).unwrap();
        file.set_attribute(&g, "calibrated", true).unwrap();
        file.set_attribute(&arr, "unit", "Pa").unwrap();
        file.set_attribute(&arr, "unit", -1i64).unwrap();
        file.set_attribute(&arr, "inf", f64::INFINITY).unwrap();
        file.set_attribute(&arr, "nan", f64::NAN).unwrap();
        file.close().unwrap();

        let file = file_factory(id).open(&path).unwrap();
        let g = file.get("g", None).unwrap().into_group().unwrap();
        let arr = file.get("x", Some(&g)).unwrap();
        assert_eq!(file.get_attribute(&root, "version").unwrap(), AttrValue::Int(2));
        assert_eq!(file.get_attribute(&g, "sample_freq").unwrap(), AttrValue::Float(51200.0));
        assert_eq!(file.get_attribute(&g, "calibrated").unwrap(), AttrValue::Bool(true));
        assert_eq!(file.get_attribute(&arr, "unit").unwrap(), AttrValue::Int(-1));
        assert_eq!(file.get_attribute(&arr, "inf").unwrap(), AttrValue::Float(f64::INFINITY));
        assert!(file.get_attribute(&arr, "nan").unwrap().as_f64().unwrap().is_nan());
        assert_eq!(file.attribute_names(&arr).unwrap(), vec!["inf", "nan", "unit"]);
        assert_eq!(file.attribute_names(&g).unwrap(), vec!["calibrated", "sample_freq"]);
    })
}

/// Observable result of one step of [`replay`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    Group(String),
    Array {
        path: String,
        shape: Vec<usize>,
        precision: Precision,
    },
    Shape(Vec<usize>),
    Data(ArrayData),
    Attr(AttrValue),
    Names(Vec<String>),
    Cached(bool),
    Failed(ErrorKind),
}

impl From<NodeRef> for Outcome {
    fn from(node: NodeRef) -> Self {
        match node {
            NodeRef::Group(g) => Outcome::Group(g.path().to_string()),
            NodeRef::Array(a) => Outcome::Array {
                path: a.path().to_string(),
                shape: a.shape().to_vec(),
                precision: a.precision(),
            },
        }
    }
}

fn outcome<T: Into<Outcome>>(res: Result<T>) -> Outcome {
    match res {
        Ok(x) => x.into(),
        Err(e) => Outcome::Failed(e.kind()),
    }
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Outcome::Done
    }
}

impl From<GroupRef> for Outcome {
    fn from(g: GroupRef) -> Self {
        NodeRef::from(g).into()
    }
}

impl From<ArrayRef> for Outcome {
    fn from(a: ArrayRef) -> Self {
        NodeRef::from(a).into()
    }
}

impl From<ArrayData> for Outcome {
    fn from(data: ArrayData) -> Self {
        Outcome::Data(data)
    }
}

impl From<AttrValue> for Outcome {
    fn from(value: AttrValue) -> Self {
        Outcome::Attr(value)
    }
}

impl From<Vec<String>> for Outcome {
    fn from(names: Vec<String>) -> Self {
        Outcome::Names(names)
    }
}

impl From<bool> for Outcome {
    fn from(cached: bool) -> Self {
        Outcome::Cached(cached)
    }
}

/// Runs a fixed script of operations, failing ones included, and records
/// every result. Two backends are interchangeable when their recordings are equal.
pub fn replay<P: AsRef<Path>>(id: BackendId, path: P) -> anyhow::Result<Vec<Outcome>> {
    let mut file = cache_factory(id).create(path.as_ref())?;
    let mut out = Vec::new();

    let run = file.create_group("run1", None)?;
    out.push(outcome(Ok(run.clone())));
    out.push(outcome(file.create_group("run1", None)));
    out.push(outcome(file.create_group("bad/name", None)));
    out.push(outcome(file.create_group("zarr.json", None)));
    out.push(outcome(file.create_group("__meta", Some(&run))));
    out.push(outcome(file.is_cached("zarr.json", None)));
    out.push(outcome(file.is_cached("__meta", Some(&run))));

    for (i, precision) in Precision::ALL.into_iter().enumerate() {
        let name = format!("arr_{}", precision);
        out.push(outcome(file.create_extendable_array(&name, &[2, 3], precision, Some(&run))));
        let arr = file.get(&name, Some(&run))?.into_array()?;
        let batch = ArrayData::zeros(precision, &[i, 2, 3]);
        out.push(outcome(file.append(&arr, &batch)));
        out.push(outcome(file.append(&arr, &ArrayData::zeros(precision, &[1, 3, 2]))));
        out.push(outcome(file.shape(&arr).map(Outcome::Shape)));
        out.push(outcome(file.read(&arr)));
    }

    let pressure = file.create_extendable_array("pressure", &[3], Precision::Float64, None)?;
    let batch: ArrayData = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn().into();
    out.push(outcome(file.append(&pressure, &batch)));
    out.push(outcome(file.append(&pressure, &ArrayData::zeros(Precision::Int32, &[1, 3]))));
    out.push(outcome(file.read_rows(&pressure, 1..2)));
    out.push(outcome(file.read_rows(&pressure, 1..5)));
    out.push(outcome(file.get("pressure", None)));

    out.push(outcome(file.set_attribute(&pressure, "unit", "Pa")));
    out.push(outcome(file.get_attribute(&pressure, "unit")));
    out.push(outcome(file.get_attribute(&pressure, "missing")));
    out.push(outcome(file.set_attribute(&run, "n", 3i64)));
    out.push(outcome(file.set_attribute(&run, "n", 2.5)));
    out.push(outcome(file.set_attribute(&run, "a\0b", 1i64)));
    out.push(outcome(file.attribute_names(&run)));

    let thin = file.create_extendable_array("thin", &[0], Precision::Int16, None)?;
    out.push(outcome(file.append(&thin, &ArrayData::zeros(Precision::Int16, &[3, 0]))));
    out.push(outcome(file.shape(&thin).map(Outcome::Shape)));
    let row = ArrayData::zeros(Precision::Int16, &[1, 0]);
    out.push(outcome(file.write_rows(&thin, usize::MAX, &row)));

    let csm = file.create_compressible_array("csm", &[3, 2], Precision::Complex64, Some(&run))?;
    out.push(outcome(file.append(&csm, &ArrayData::zeros(Precision::Complex64, &[1, 2]))));
    out.push(outcome(file.read(&csm)));
    out.push(outcome(file.is_cached("csm", Some(&run))));
    out.push(outcome(file.is_cached("csm", None)));

    out.push(outcome(file.list(None)));
    out.push(outcome(file.list(Some(&run))));
    out.push(outcome(file.remove("pressure", None)));
    out.push(outcome(file.remove("pressure", None)));
    out.push(outcome(file.is_cached("pressure", None)));
    out.push(outcome(file.get("pressure", None)));
    out.push(outcome(file.remove("run1", None)));
    out.push(outcome(file.list(None)));
    out.push(outcome(file.create_group("x", Some(&run))));

    file.close()?;
    Ok(out)
}
