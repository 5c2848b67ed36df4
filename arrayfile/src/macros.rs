/// Expands `$inner_macro!(ty)` with the element type of a [`Precision`](crate::Precision).
macro_rules! precision_match {
    ($precision:expr, $inner_macro:ident) => {
        match $precision {
            $crate::Precision::Float32 => $inner_macro!(f32),
            $crate::Precision::Float64 => $inner_macro!(f64),
            $crate::Precision::Complex64 => $inner_macro!(num::complex::Complex32),
            $crate::Precision::Complex128 => $inner_macro!(num::complex::Complex64),
            $crate::Precision::Bool => $inner_macro!(bool),
            $crate::Precision::Int8 => $inner_macro!(i8),
            $crate::Precision::Int16 => $inner_macro!(i16),
            $crate::Precision::Int32 => $inner_macro!(i32),
        }
    };
}

/// Expands `$inner_macro!(Variant, arr)` for the array held by an [`ArrayData`](crate::ArrayData).
macro_rules! dyn_map {
    ($data:expr, $inner_macro:ident) => {
        match $data {
            $crate::ArrayData::Float32(_val) => $inner_macro!(Float32, _val),
            $crate::ArrayData::Float64(_val) => $inner_macro!(Float64, _val),
            $crate::ArrayData::Complex64(_val) => $inner_macro!(Complex64, _val),
            $crate::ArrayData::Complex128(_val) => $inner_macro!(Complex128, _val),
            $crate::ArrayData::Bool(_val) => $inner_macro!(Bool, _val),
            $crate::ArrayData::Int8(_val) => $inner_macro!(Int8, _val),
            $crate::ArrayData::Int16(_val) => $inner_macro!(Int16, _val),
            $crate::ArrayData::Int32(_val) => $inner_macro!(Int32, _val),
        }
    };
}

/// Calls `$fun` on the array held by an [`ArrayData`](crate::ArrayData).
macro_rules! dyn_map_fun {
    ($data:expr, $fun:ident $(, $arg:expr)*) => {
        match $data {
            $crate::ArrayData::Float32(_val) => _val.$fun($($arg),*),
            $crate::ArrayData::Float64(_val) => _val.$fun($($arg),*),
            $crate::ArrayData::Complex64(_val) => _val.$fun($($arg),*),
            $crate::ArrayData::Complex128(_val) => _val.$fun($($arg),*),
            $crate::ArrayData::Bool(_val) => _val.$fun($($arg),*),
            $crate::ArrayData::Int8(_val) => _val.$fun($($arg),*),
            $crate::ArrayData::Int16(_val) => _val.$fun($($arg),*),
            $crate::ArrayData::Int32(_val) => _val.$fun($($arg),*),
        }
    };
}

pub(crate) use {dyn_map, dyn_map_fun, precision_match};
