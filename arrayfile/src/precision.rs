use crate::data::ArrayData;
use crate::error::{Error, Result};

use core::fmt::{Display, Formatter};
use ndarray::ArrayD;
use num::complex::{Complex32, Complex64};
use std::str::FromStr;

/// The closed set of element types an array can hold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Precision {
    Float32,
    Float64,
    Complex64,
    Complex128,
    Bool,
    Int8,
    Int16,
    Int32,
}

impl Precision {
    pub const ALL: [Precision; 8] = [
        Precision::Float32,
        Precision::Float64,
        Precision::Complex64,
        Precision::Complex128,
        Precision::Bool,
        Precision::Int8,
        Precision::Int16,
        Precision::Int32,
    ];

    /// The tag used in configuration and on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Float32 => "float32",
            Precision::Float64 => "float64",
            Precision::Complex64 => "complex64",
            Precision::Complex128 => "complex128",
            Precision::Bool => "bool",
            Precision::Int8 => "int8",
            Precision::Int16 => "int16",
            Precision::Int32 => "int32",
        }
    }

    /// Size of one element in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            Precision::Bool | Precision::Int8 => 1,
            Precision::Int16 => 2,
            Precision::Float32 | Precision::Int32 => 4,
            Precision::Float64 | Precision::Complex64 => 8,
            Precision::Complex128 => 16,
        }
    }
}

impl Display for Precision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Precision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Precision::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::UnsupportedPrecision(s.to_string()))
    }
}

/// Rust element types that map onto a [`Precision`].
pub trait Element: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    const PRECISION: Precision;

    fn into_data(arr: ArrayD<Self>) -> ArrayData;
    fn from_data(data: ArrayData) -> Result<ArrayD<Self>>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const PRECISION: Precision = Precision::$variant;

            fn into_data(arr: ArrayD<Self>) -> ArrayData {
                ArrayData::$variant(arr)
            }

            fn from_data(data: ArrayData) -> Result<ArrayD<Self>> {
                match data {
                    ArrayData::$variant(x) => Ok(x),
                    other => Err(Error::PrecisionMismatch {
                        expected: Precision::$variant,
                        actual: other.precision(),
                    }),
                }
            }
        }
    };
}

impl_element!(f32, Float32);
impl_element!(f64, Float64);
impl_element!(Complex32, Complex64);
impl_element!(Complex64, Complex128);
impl_element!(bool, Bool);
impl_element!(i8, Int8);
impl_element!(i16, Int16);
impl_element!(i32, Int32);
