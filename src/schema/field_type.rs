//! Attribute field types and their native Rust representations.
//!
//! Every typed component (references, evaluators, comparators, filters,
//! distinctors) is instantiated through [`dispatch_field_type!`], the single
//! place that maps a runtime [`FieldType`] to a native type. Adding a field
//! type means adding one enum variant, one [`NativeValue`] impl and one
//! macro arm.
//!
//! The 128- and 256-bit types are storable and comparable but have no numeric
//! coercion: [`NativeValue::to_f64`] and [`NativeValue::to_i64`] return zero
//! for them.

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    /// Days since epoch.
    Date,
    /// Milliseconds of day.
    Time,
    /// Milliseconds since epoch.
    Timestamp,
    UInt128,
    UInt256,
}

impl FieldType {
    /// Width in bytes of one value.
    pub fn native_size(self) -> usize {
        crate::dispatch_field_type!(self, T => <T as NativeValue>::SIZE)
    }

    /// Whether values of this type can be coerced to `f64`/`i64`.
    pub fn supports_numeric_coercion(self) -> bool {
        !matches!(self, FieldType::UInt128 | FieldType::UInt256)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, FieldType::Float | FieldType::Double)
    }
}

/// Fixed-width little-endian 256-bit value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct U256(pub [u8; 32]);

/// A plain value type that can live inside a `DocInfo` buffer or an
/// attribute column.
pub trait NativeValue:
    Copy + Default + PartialOrd + PartialEq + Debug + Send + Sync + 'static
{
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Hashable identity used for distinct counting.
    type DistinctKey: Hash + Eq + Copy + Debug + Send + Sync;

    /// Decode from the first `SIZE` bytes of `buf`.
    fn read_le(buf: &[u8]) -> Self;

    /// Encode into the first `SIZE` bytes of `buf`.
    fn write_le(self, buf: &mut [u8]);

    fn to_f64(self) -> f64;

    fn to_i64(self) -> i64;

    fn distinct_key(self) -> Self::DistinctKey;

    /// Whether the value has no place in the ordering (float NaN).
    fn is_nan(self) -> bool {
        false
    }

    /// Decimal rendering.
    fn render(self) -> String;
}

macro_rules! impl_integer_native {
    ($($t:ty),* $(,)?) => {
        $(
            impl NativeValue for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                type DistinctKey = $t;

                fn read_le(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; std::mem::size_of::<$t>()];
                    bytes.copy_from_slice(&buf[..Self::SIZE]);
                    <$t>::from_le_bytes(bytes)
                }

                fn write_le(self, buf: &mut [u8]) {
                    buf[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn to_i64(self) -> i64 {
                    self as i64
                }

                fn distinct_key(self) -> Self::DistinctKey {
                    self
                }

                fn render(self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_integer_native!(i8, u8, i16, u16, i32, u32, i64, u64);

macro_rules! impl_float_native {
    ($($t:ty => $bits:ty),* $(,)?) => {
        $(
            impl NativeValue for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                type DistinctKey = $bits;

                fn read_le(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; std::mem::size_of::<$t>()];
                    bytes.copy_from_slice(&buf[..Self::SIZE]);
                    <$t>::from_le_bytes(bytes)
                }

                fn write_le(self, buf: &mut [u8]) {
                    buf[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn to_i64(self) -> i64 {
                    self as i64
                }

                fn distinct_key(self) -> Self::DistinctKey {
                    // -0.0 and 0.0 are the same value
                    if self == 0.0 { 0 } else { self.to_bits() }
                }

                fn is_nan(self) -> bool {
                    <$t>::is_nan(self)
                }

                fn render(self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_float_native!(f32 => u32, f64 => u64);

impl NativeValue for u128 {
    const SIZE: usize = 16;
    type DistinctKey = u128;

    fn read_le(buf: &[u8]) -> Self {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&buf[..16]);
        u128::from_le_bytes(bytes)
    }

    fn write_le(self, buf: &mut [u8]) {
        buf[..16].copy_from_slice(&self.to_le_bytes());
    }

    fn to_f64(self) -> f64 {
        0.0
    }

    fn to_i64(self) -> i64 {
        0
    }

    fn distinct_key(self) -> Self::DistinctKey {
        self
    }

    fn render(self) -> String {
        self.to_string()
    }
}

impl NativeValue for U256 {
    const SIZE: usize = 32;
    type DistinctKey = U256;

    fn read_le(buf: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&buf[..32]);
        U256(bytes)
    }

    fn write_le(self, buf: &mut [u8]) {
        buf[..32].copy_from_slice(&self.0);
    }

    fn to_f64(self) -> f64 {
        0.0
    }

    fn to_i64(self) -> i64 {
        0
    }

    fn distinct_key(self) -> Self::DistinctKey {
        self
    }

    fn render(self) -> String {
        self.0.iter().rev().map(|b| format!("{b:02x}")).collect()
    }
}

/// Instantiate `$body` with `$T` bound to the native type of `$field_type`.
///
/// ```ignore
/// let size = dispatch_field_type!(field_type, T => <T as NativeValue>::SIZE);
/// ```
#[macro_export]
macro_rules! dispatch_field_type {
    ($field_type:expr, $T:ident => $body:expr) => {{
        match $field_type {
            $crate::schema::FieldType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::schema::FieldType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::schema::FieldType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::schema::FieldType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::schema::FieldType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::schema::FieldType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::schema::FieldType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::schema::FieldType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::schema::FieldType::Float => {
                type $T = f32;
                $body
            }
            $crate::schema::FieldType::Double => {
                type $T = f64;
                $body
            }
            $crate::schema::FieldType::Date => {
                type $T = u32;
                $body
            }
            $crate::schema::FieldType::Time => {
                type $T = i32;
                $body
            }
            $crate::schema::FieldType::Timestamp => {
                type $T = i64;
                $body
            }
            $crate::schema::FieldType::UInt128 => {
                type $T = u128;
                $body
            }
            $crate::schema::FieldType::UInt256 => {
                type $T = $crate::schema::U256;
                $body
            }
        }
    }};
}
