use arrayfile::{BackendConfig, BackendId, BackendRegistry, BackendSelector};
use arrayfile_test_utils as utils;
use arrayfile_test_utils::with_tmp_dir;

fn backends() -> Vec<BackendId> {
    BackendRegistry::available().ids()
}

#[test]
fn test_scenario() {
    backends().into_iter().for_each(utils::test_scenario);
}

#[test]
fn test_roundtrip_all_precisions() {
    backends().into_iter().for_each(utils::test_roundtrip_all_precisions);
}

#[test]
fn test_append_associative() {
    backends().into_iter().for_each(utils::test_append_associative);
}

#[test]
fn test_is_cached() {
    backends().into_iter().for_each(utils::test_is_cached);
}

#[test]
fn test_remove() {
    backends().into_iter().for_each(utils::test_remove);
}

#[test]
fn test_errors() {
    backends().into_iter().for_each(utils::test_errors);
}

#[test]
fn test_compressible() {
    backends().into_iter().for_each(utils::test_compressible);
}

#[test]
fn test_groups() {
    backends().into_iter().for_each(utils::test_groups);
}

#[test]
fn test_attributes() {
    backends().into_iter().for_each(utils::test_attributes);
}

#[test]
fn test_default_backend() {
    let selector = BackendSelector::default();
    let config = BackendConfig::default();
    assert!(selector.registry().contains(config.backend));
    assert_eq!(selector.from_config(&config).unwrap().backend(), config.backend);
}

#[test]
fn test_parity() {
    let ids = backends();
    if !(ids.contains(&BackendId::Hdf5) && ids.contains(&BackendId::Zarr)) {
        return;
    }
    with_tmp_dir(|dir| {
        let h5 = utils::replay(BackendId::Hdf5, dir.join("replay.h5")).unwrap();
        let zarr = utils::replay(BackendId::Zarr, dir.join("replay.zarr")).unwrap();
        assert_eq!(h5.len(), zarr.len());
        for (i, (a, b)) in h5.iter().zip(zarr.iter()).enumerate() {
            assert_eq!(a, b, "step {}", i);
        }
    })
}

#[test]
fn test_replay_deterministic() {
    for id in backends() {
        with_tmp_dir(|dir| {
            let ext = utils::extension(id);
            let first = utils::replay(id, dir.join(format!("a.{}", ext))).unwrap();
            let second = utils::replay(id, dir.join(format!("b.{}", ext))).unwrap();
            assert_eq!(first, second);
        })
    }
}
