use netrep_serde::{read_length_capped, write_length, BitReader, BitWrite, Serde, SerdeErr};

/// The kinds of value a replicated variable may hold
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Vec2,
    Vec3,
    Quat,
}

impl ValueKind {
    const TABLE: [ValueKind; 14] = [
        ValueKind::Bool,
        ValueKind::U8,
        ValueKind::U16,
        ValueKind::U32,
        ValueKind::U64,
        ValueKind::I32,
        ValueKind::I64,
        ValueKind::F32,
        ValueKind::F64,
        ValueKind::String,
        ValueKind::Bytes,
        ValueKind::Vec2,
        ValueKind::Vec3,
        ValueKind::Quat,
    ];

    pub fn tag(&self) -> u8 {
        match self {
            ValueKind::Bool => 0,
            ValueKind::U8 => 1,
            ValueKind::U16 => 2,
            ValueKind::U32 => 3,
            ValueKind::U64 => 4,
            ValueKind::I32 => 5,
            ValueKind::I64 => 6,
            ValueKind::F32 => 7,
            ValueKind::F64 => 8,
            ValueKind::String => 9,
            ValueKind::Bytes => 10,
            ValueKind::Vec2 => 11,
            ValueKind::Vec3 => 12,
            ValueKind::Quat => 13,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, SerdeErr> {
        Self::TABLE
            .get(tag as usize)
            .copied()
            .ok_or(SerdeErr::InvalidTag {
                tag,
                type_name: "ValueKind",
            })
    }

    /// Whether values of this kind carry a length prefix
    pub fn is_variable_length(&self) -> bool {
        matches!(self, ValueKind::String | ValueKind::Bytes)
    }
}

/// A value held by a replicated variable. Each variant maps to one entry of
/// the fixed codec table in [`ValueKind`].
#[derive(Clone, Debug, PartialEq)]
pub enum ReplicatedValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Quat([f32; 4]),
}

impl ReplicatedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ReplicatedValue::Bool(_) => ValueKind::Bool,
            ReplicatedValue::U8(_) => ValueKind::U8,
            ReplicatedValue::U16(_) => ValueKind::U16,
            ReplicatedValue::U32(_) => ValueKind::U32,
            ReplicatedValue::U64(_) => ValueKind::U64,
            ReplicatedValue::I32(_) => ValueKind::I32,
            ReplicatedValue::I64(_) => ValueKind::I64,
            ReplicatedValue::F32(_) => ValueKind::F32,
            ReplicatedValue::F64(_) => ValueKind::F64,
            ReplicatedValue::String(_) => ValueKind::String,
            ReplicatedValue::Bytes(_) => ValueKind::Bytes,
            ReplicatedValue::Vec2(_) => ValueKind::Vec2,
            ReplicatedValue::Vec3(_) => ValueKind::Vec3,
            ReplicatedValue::Quat(_) => ValueKind::Quat,
        }
    }

    /// Payload length in bytes for length-prefixed kinds
    pub fn payload_length(&self) -> Option<usize> {
        match self {
            ReplicatedValue::String(value) => Some(value.len()),
            ReplicatedValue::Bytes(value) => Some(value.len()),
            _ => None,
        }
    }

    /// Bitwise equality, used for dirty detection. Unlike `==`, a NaN float
    /// equals itself here, so it isn't re-sent every tick.
    pub fn bit_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ReplicatedValue::F32(a), ReplicatedValue::F32(b)) => a.to_bits() == b.to_bits(),
            (ReplicatedValue::F64(a), ReplicatedValue::F64(b)) => a.to_bits() == b.to_bits(),
            (ReplicatedValue::Vec2(a), ReplicatedValue::Vec2(b)) => floats_bit_eq(a, b),
            (ReplicatedValue::Vec3(a), ReplicatedValue::Vec3(b)) => floats_bit_eq(a, b),
            (ReplicatedValue::Quat(a), ReplicatedValue::Quat(b)) => floats_bit_eq(a, b),
            (a, b) => a == b,
        }
    }

    fn ser_body(&self, writer: &mut dyn BitWrite) {
        match self {
            ReplicatedValue::Bool(value) => value.ser(writer),
            ReplicatedValue::U8(value) => value.ser(writer),
            ReplicatedValue::U16(value) => value.ser(writer),
            ReplicatedValue::U32(value) => value.ser(writer),
            ReplicatedValue::U64(value) => value.ser(writer),
            ReplicatedValue::I32(value) => value.ser(writer),
            ReplicatedValue::I64(value) => value.ser(writer),
            ReplicatedValue::F32(value) => value.ser(writer),
            ReplicatedValue::F64(value) => value.ser(writer),
            ReplicatedValue::String(value) => {
                write_length(writer, value.len());
                writer.write_bytes(value.as_bytes());
            }
            ReplicatedValue::Bytes(value) => {
                write_length(writer, value.len());
                writer.write_bytes(value);
            }
            ReplicatedValue::Vec2(value) => value.ser(writer),
            ReplicatedValue::Vec3(value) => value.ser(writer),
            ReplicatedValue::Quat(value) => value.ser(writer),
        }
    }

    /// Reads a tagged value, rejecting length-prefixed payloads above `cap`
    pub fn de_capped(reader: &mut BitReader, cap: Option<usize>) -> Result<Self, SerdeErr> {
        let kind = ValueKind::from_tag(u8::de(reader)?)?;
        let value = match kind {
            ValueKind::Bool => ReplicatedValue::Bool(bool::de(reader)?),
            ValueKind::U8 => ReplicatedValue::U8(u8::de(reader)?),
            ValueKind::U16 => ReplicatedValue::U16(u16::de(reader)?),
            ValueKind::U32 => ReplicatedValue::U32(u32::de(reader)?),
            ValueKind::U64 => ReplicatedValue::U64(u64::de(reader)?),
            ValueKind::I32 => ReplicatedValue::I32(i32::de(reader)?),
            ValueKind::I64 => ReplicatedValue::I64(i64::de(reader)?),
            ValueKind::F32 => ReplicatedValue::F32(f32::de(reader)?),
            ValueKind::F64 => ReplicatedValue::F64(f64::de(reader)?),
            ValueKind::String => {
                let length = read_length_capped(reader, cap)?;
                let bytes = reader.read_bytes(length)?;
                ReplicatedValue::String(String::from_utf8(bytes).map_err(|_| SerdeErr::InvalidUtf8)?)
            }
            ValueKind::Bytes => {
                let length = read_length_capped(reader, cap)?;
                ReplicatedValue::Bytes(reader.read_bytes(length)?)
            }
            ValueKind::Vec2 => ReplicatedValue::Vec2(<[f32; 2]>::de(reader)?),
            ValueKind::Vec3 => ReplicatedValue::Vec3(<[f32; 3]>::de(reader)?),
            ValueKind::Quat => ReplicatedValue::Quat(<[f32; 4]>::de(reader)?),
        };
        Ok(value)
    }
}

fn floats_bit_eq<const N: usize>(a: &[f32; N], b: &[f32; N]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
}

impl Serde for ReplicatedValue {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.kind().tag().ser(writer);
        self.ser_body(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Self::de_capped(reader, None)
    }
}

macro_rules! impl_from_for_value {
    ($type:ty, $variant:ident) => {
        impl From<$type> for ReplicatedValue {
            fn from(value: $type) -> Self {
                ReplicatedValue::$variant(value)
            }
        }
    };
}

impl_from_for_value!(bool, Bool);
impl_from_for_value!(u8, U8);
impl_from_for_value!(u16, U16);
impl_from_for_value!(u32, U32);
impl_from_for_value!(u64, U64);
impl_from_for_value!(i32, I32);
impl_from_for_value!(i64, I64);
impl_from_for_value!(f32, F32);
impl_from_for_value!(f64, F64);
impl_from_for_value!(String, String);
impl_from_for_value!(Vec<u8>, Bytes);
impl_from_for_value!([f32; 2], Vec2);
impl_from_for_value!([f32; 3], Vec3);
impl_from_for_value!([f32; 4], Quat);

impl From<&str> for ReplicatedValue {
    fn from(value: &str) -> Self {
        ReplicatedValue::String(value.to_string())
    }
}
