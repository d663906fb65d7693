//! Typed socket buffers.
//!
//! A [`Buffer`] is a tagged union of element vectors. The tag ([`DataType`]) is
//! stored on the owning socket, and typed access goes through the [`Element`]
//! trait, so no buffer is ever reinterpreted as a different element type.
//!
//! Buffers are shared between sockets through [`SharedBuffer`]: the socket
//! that allocated a buffer holds the only strong handle, every input bound to
//! it holds a [`Weak`](std::sync::Weak) reference.

use std::fmt;
use std::sync::{Arc, RwLock};

/// Handle to a buffer owned by one socket and readable by the sockets bound to it.
pub type SharedBuffer = Arc<RwLock<Buffer>>;

/// Element type tag of a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl DataType {
    /// Returns the short type name used in trace headers (`int32`, `float`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }

    /// Returns true for floating-point types.
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A contiguous buffer of elements of a single [`DataType`].
#[derive(Clone, Debug, PartialEq)]
pub enum Buffer {
    /// `i8` elements.
    I8(Vec<i8>),
    /// `i16` elements.
    I16(Vec<i16>),
    /// `i32` elements.
    I32(Vec<i32>),
    /// `i64` elements.
    I64(Vec<i64>),
    /// `u8` elements.
    U8(Vec<u8>),
    /// `u16` elements.
    U16(Vec<u16>),
    /// `u32` elements.
    U32(Vec<u32>),
    /// `u64` elements.
    U64(Vec<u64>),
    /// `f32` elements.
    F32(Vec<f32>),
    /// `f64` elements.
    F64(Vec<f64>),
}

// Expands `$body` once per variant with `$v` bound to the inner vector.
macro_rules! each_variant {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            Buffer::I8($v) => $body,
            Buffer::I16($v) => $body,
            Buffer::I32($v) => $body,
            Buffer::I64($v) => $body,
            Buffer::U8($v) => $body,
            Buffer::U16($v) => $body,
            Buffer::U32($v) => $body,
            Buffer::U64($v) => $body,
            Buffer::F32($v) => $body,
            Buffer::F64($v) => $body,
        }
    };
}

impl Buffer {
    /// Creates a zeroed buffer of `len` elements of type `data_type`.
    pub fn zeroed(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::I8 => Self::I8(vec![0; len]),
            DataType::I16 => Self::I16(vec![0; len]),
            DataType::I32 => Self::I32(vec![0; len]),
            DataType::I64 => Self::I64(vec![0; len]),
            DataType::U8 => Self::U8(vec![0; len]),
            DataType::U16 => Self::U16(vec![0; len]),
            DataType::U32 => Self::U32(vec![0; len]),
            DataType::U64 => Self::U64(vec![0; len]),
            DataType::F32 => Self::F32(vec![0.0; len]),
            DataType::F64 => Self::F64(vec![0.0; len]),
        }
    }

    /// Creates a buffer holding a copy of `values`.
    pub fn from_slice<T: Element>(values: &[T]) -> Self {
        T::wrap(values.to_vec())
    }

    /// Returns the element type tag.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::I8(_) => DataType::I8,
            Self::I16(_) => DataType::I16,
            Self::I32(_) => DataType::I32,
            Self::I64(_) => DataType::I64,
            Self::U8(_) => DataType::U8,
            Self::U16(_) => DataType::U16,
            Self::U32(_) => DataType::U32,
            Self::U64(_) => DataType::U64,
            Self::F32(_) => DataType::F32,
            Self::F64(_) => DataType::F64,
        }
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    /// Returns true if the buffer has zero elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the elements as a typed slice, or `None` if `T` is not the buffer's type.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(self)
    }

    /// Returns the elements as a mutable typed slice, or `None` on type mismatch.
    pub fn as_mut_slice<T: Element>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(self)
    }

    /// Returns element `idx` widened to `f64`, or `None` if out of range.
    ///
    /// Used by predicates that compare values regardless of the element type.
    pub fn value_f64(&self, idx: usize) -> Option<f64> {
        each_variant!(self, v => v.get(idx).map(|&x| x as f64))
    }

    /// Copies every element from `other`.
    ///
    /// Returns `false` and leaves `self` untouched if the types or lengths differ.
    pub fn copy_from(&mut self, other: &Buffer) -> bool {
        macro_rules! copy {
            ($($variant:ident),*) => {
                match (self, other) {
                    $((Buffer::$variant(dst), Buffer::$variant(src)) if dst.len() == src.len() => {
                        dst.copy_from_slice(src);
                        true
                    })*
                    _ => false,
                }
            };
        }
        copy!(I8, I16, I32, I64, U8, U16, U32, U64, F32, F64)
    }

    /// Sets every element to zero.
    pub fn clear(&mut self) {
        each_variant!(self, v => v.fill(Default::default()))
    }

    /// Formats the elements in `range` as a comma-separated list.
    ///
    /// Integers honour `hex`; floats are printed with `precision` decimals, or
    /// as raw IEEE-754 bits when `hex` is set.
    pub fn format_range(
        &self,
        range: std::ops::Range<usize>,
        hex: bool,
        precision: usize,
    ) -> String {
        each_variant!(self, v => {
            let end = range.end.min(v.len());
            let start = range.start.min(end);
            v[start..end]
                .iter()
                .map(|x| x.format_value(hex, precision))
                .collect::<Vec<_>>()
                .join(", ")
        })
    }
}

/// A scalar type that can live in a [`Buffer`].
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The tag matching this element type.
    const DATA_TYPE: DataType;

    /// Borrows the buffer as `&[Self]` if the tag matches.
    fn slice(buf: &Buffer) -> Option<&[Self]>;

    /// Borrows the buffer as `&mut [Self]` if the tag matches.
    fn slice_mut(buf: &mut Buffer) -> Option<&mut [Self]>;

    /// Wraps a vector in the matching [`Buffer`] variant.
    fn wrap(values: Vec<Self>) -> Buffer;

    /// Formats one value for debug traces.
    fn format_value(&self, hex: bool, precision: usize) -> String;
}

macro_rules! impl_int_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn slice(buf: &Buffer) -> Option<&[Self]> {
                match buf {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(buf: &mut Buffer) -> Option<&mut [Self]> {
                match buf {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> Buffer {
                Buffer::$variant(values)
            }

            fn format_value(&self, hex: bool, _precision: usize) -> String {
                if hex {
                    format!("{:#x}", self)
                } else {
                    self.to_string()
                }
            }
        }
    )*};
}

impl_int_element!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
);

macro_rules! impl_float_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn slice(buf: &Buffer) -> Option<&[Self]> {
                match buf {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(buf: &mut Buffer) -> Option<&mut [Self]> {
                match buf {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> Buffer {
                Buffer::$variant(values)
            }

            fn format_value(&self, hex: bool, precision: usize) -> String {
                if hex {
                    format!("{:#x}", self.to_bits())
                } else {
                    format!("{:.*}", precision, self)
                }
            }
        }
    )*};
}

impl_float_element!(f32 => F32, f64 => F64);
