use crate::macros::{dyn_map, dyn_map_fun, precision_match};
use crate::precision::{Element, Precision};
use crate::error::{Error, Result};

use ndarray::{concatenate, ArrayD, Axis, Slice};
use num::complex::{Complex32, Complex64};
use std::ops::Range;

/// A dynamically typed n-dimensional array, one variant per [`Precision`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Complex64(ArrayD<Complex32>),
    Complex128(ArrayD<Complex64>),
    Bool(ArrayD<bool>),
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
}

impl ArrayData {
    /// An array of default values (zero, `false`).
    pub fn zeros(precision: Precision, shape: &[usize]) -> Self {
        macro_rules! fun {
            ($ty:ty) => {
                <$ty as Element>::into_data(ArrayD::<$ty>::default(shape.to_vec()))
            };
        }
        precision_match!(precision, fun)
    }

    pub fn precision(&self) -> Precision {
        macro_rules! fun {
            ($variant:ident, $arr:expr) => {
                Precision::$variant
            };
        }
        dyn_map!(self, fun)
    }

    pub fn shape(&self) -> &[usize] {
        dyn_map_fun!(self, shape)
    }

    pub fn ndim(&self) -> usize {
        dyn_map_fun!(self, ndim)
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        dyn_map_fun!(self, len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length along dimension 0. Zero-dimensional arrays have no rows.
    pub fn nrows(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    /// Every dimension except the leading one.
    pub fn tail_shape(&self) -> &[usize] {
        self.shape().get(1..).unwrap_or(&[])
    }

    pub fn into_array<T: Element>(self) -> Result<ArrayD<T>> {
        T::from_data(self)
    }

    /// Copies rows `range` along dimension 0.
    pub fn slice_rows(&self, range: Range<usize>) -> Self {
        macro_rules! fun {
            ($variant:ident, $arr:expr) => {
                ArrayData::$variant(
                    $arr.slice_axis(Axis(0), Slice::from(range.clone())).to_owned(),
                )
            };
        }
        dyn_map!(self, fun)
    }

    /// Joins arrays of the same precision along dimension 0.
    pub fn concat(items: &[ArrayData]) -> Result<Self> {
        let first = items.first().ok_or(Error::ShapeMismatch {
            expected: vec![1],
            actual: Vec::new(),
        })?;
        let precision = first.precision();
        if let Some(other) = items.iter().find(|x| x.precision() != precision) {
            return Err(Error::PrecisionMismatch {
                expected: precision,
                actual: other.precision(),
            });
        }
        if let Some(other) = items.iter().find(|x| x.tail_shape() != first.tail_shape()) {
            return Err(Error::ShapeMismatch {
                expected: first.tail_shape().to_vec(),
                actual: other.tail_shape().to_vec(),
            });
        }
        macro_rules! fun {
            ($ty:ty) => {{
                let arrays = items
                    .iter()
                    .map(|x| x.clone().into_array::<$ty>())
                    .collect::<Result<Vec<_>>>()?;
                let views: Vec<_> = arrays.iter().map(|x| x.view()).collect();
                // only zero-dimensional items get here
                let joined = concatenate(Axis(0), &views).map_err(|_| Error::ShapeMismatch {
                    expected: vec![1],
                    actual: first.shape().to_vec(),
                })?;
                Ok(<$ty as Element>::into_data(joined))
            }};
        }
        precision_match!(precision, fun)
    }
}

impl<T: Element> From<ArrayD<T>> for ArrayData {
    fn from(arr: ArrayD<T>) -> Self {
        T::into_data(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ndarray::{array, Array2};

    #[test]
    fn test_shape() {
        let data: ArrayData = Array2::<i16>::zeros((4, 3)).into_dyn().into();
        assert_eq!(data.precision(), Precision::Int16);
        assert_eq!(data.shape(), &[4, 3]);
        assert_eq!(data.tail_shape(), &[3]);
        assert_eq!(data.nrows(), 4);

        let empty = ArrayData::zeros(Precision::Complex128, &[0, 2, 5]);
        assert_eq!(empty.nrows(), 0);
        assert_eq!(empty.tail_shape(), &[2, 5]);
        assert!(empty.is_empty());
        assert_eq!(data.len(), 12);
        assert!(ArrayData::zeros(Precision::Int8, &[3, 0]).is_empty());
    }

    #[test]
    fn test_rows() {
        let a: ArrayData = array![[1.0, 2.0], [3.0, 4.0]].into_dyn().into();
        let b: ArrayData = array![[5.0, 6.0]].into_dyn().into();
        let joined = ArrayData::concat(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(joined.shape(), &[3, 2]);
        assert_eq!(joined.slice_rows(2..3), b);
        assert_eq!(joined.slice_rows(0..2), a);

        let c: ArrayData = array![[true, false, true]].into_dyn().into();
        assert!(ArrayData::concat(&[a.clone(), c]).is_err());

        let err = ArrayData::concat(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        let flat: ArrayData = ndarray::arr0(1.0).into_dyn().into();
        let err = ArrayData::concat(&[flat.clone(), flat]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        let wide: ArrayData = array![[1.0, 2.0, 3.0]].into_dyn().into();
        let err = ArrayData::concat(&[a, wide]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }
}
