use crate::backend::BackendId;
use crate::error::{Error, Result};

use std::str::FromStr;

/// Environment variable read by [`BackendConfig::from_env`].
pub const BACKEND_ENV: &str = "ARRAYFILE_BACKEND";

/// Which backend to open containers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendConfig {
    pub backend: BackendId,
}

impl Default for BackendConfig {
    /// The first compiled-in backend, Zarr before HDF5.
    fn default() -> Self {
        let backend = if cfg!(feature = "zarr") || !cfg!(feature = "hdf5") {
            BackendId::Zarr
        } else {
            BackendId::Hdf5
        };
        BackendConfig { backend }
    }
}

impl FromStr for BackendConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(BackendConfig { backend: s.parse()? })
    }
}

impl From<BackendId> for BackendConfig {
    fn from(backend: BackendId) -> Self {
        BackendConfig { backend }
    }
}

impl BackendConfig {
    /// Reads `ARRAYFILE_BACKEND`, falling back to the default when it is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(BACKEND_ENV) {
            Ok(value) => value.parse(),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(Error::unavailable(format!("{:?}", e), "unreadable backend setting")),
        }
    }
}
