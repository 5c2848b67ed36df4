//! Groups, typed arrays and attributes over interchangeable storage engines.
//!
//! A container is opened through a [`BackendSelector`], which hands out
//! [`FileHandle`]s (or [`CacheFileHandle`]s) for one of the registered
//! engines. Callers never see engine types: names are resolved by
//! [`PathResolver`], element types are described by [`Precision`], and every
//! failure is an [`Error`] whose [`ErrorKind`] is the same on every engine.
//!
//! ```no_run
//! use arrayfile::{BackendConfig, BackendSelector, Precision};
//!
//! # fn main() -> arrayfile::Result<()> {
//! let selector = BackendSelector::default();
//! let mut file = selector.from_config(&BackendConfig::from_env()?)?.create("data.zarr")?;
//! let pressure = file.create_extendable_array("pressure", &[3], Precision::Float64, None)?;
//! file.append(&pressure, &ndarray::Array2::<f64>::zeros((2, 3)).into_dyn().into())?;
//! file.set_attribute(&pressure, "unit", "Pa")?;
//! file.close()
//! # }
//! ```

mod macros;

mod attr;
pub mod backend;
mod cache;
mod config;
mod data;
mod error;
mod file;
mod layout;
mod path;
mod precision;
mod selector;

pub use attr::AttrValue;
pub use backend::{BackendId, CacheStore, NodeInfo, NodeStore, OpenMode};
pub use cache::CacheFileHandle;
pub use config::{BackendConfig, BACKEND_ENV};
pub use data::ArrayData;
pub use error::{Error, ErrorKind, Result};
pub use file::FileHandle;
pub use path::{validate_name, ArrayInfo, ArrayRef, GroupRef, Layout, Node, NodePath, NodeRef, PathResolver};
pub use precision::{Element, Precision};
pub use selector::{
    BackendRegistration, BackendRegistry, BackendSelector, CacheFileFactory, FileFactory,
};
