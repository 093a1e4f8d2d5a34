use crate::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr};

pub type UnsignedInteger<const BITS: u8> = SerdeInteger<false, false, BITS>;
pub type SignedInteger<const BITS: u8> = SerdeInteger<true, false, BITS>;
pub type UnsignedVariableInteger<const BITS: u8> = SerdeInteger<false, true, BITS>;
pub type SignedVariableInteger<const BITS: u8> = SerdeInteger<true, true, BITS>;

// The generic wrapper delegates to a non-generic inner type so that the
// encoding logic is only compiled once.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SerdeInteger<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> {
    inner: IntegerInner,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct IntegerInner {
    value: i128,
    signed: bool,
    variable: bool,
    bits: u8,
}

impl IntegerInner {
    fn try_new(signed: bool, variable: bool, bits: u8, value: i128) -> Result<Self, SerdeErr> {
        if bits == 0 || bits > 127 {
            return Err(SerdeErr::InvalidBitWidth { bits });
        }
        if !signed && value < 0 {
            return Err(SerdeErr::IntegerOutOfRange {
                value,
                type_name: "unsigned integer",
            });
        }
        if !variable {
            let limit: u128 = 1_u128 << bits;
            if value.unsigned_abs() >= limit {
                return Err(SerdeErr::IntegerOutOfRange {
                    value,
                    type_name: "fixed-width integer",
                });
            }
        }

        Ok(Self {
            value,
            signed,
            variable,
            bits,
        })
    }

    fn ser(&self, writer: &mut dyn BitWrite) {
        if self.signed {
            writer.write_bit(self.value < 0);
        }
        let mut magnitude: u128 = self.value.unsigned_abs();

        if self.variable {
            let limit: u128 = 1_u128 << self.bits;
            loop {
                let proceed = magnitude >= limit;
                writer.write_bit(proceed);
                for _ in 0..self.bits {
                    writer.write_bit(magnitude & 1 != 0);
                    magnitude >>= 1;
                }
                if !proceed {
                    return;
                }
            }
        } else {
            for _ in 0..self.bits {
                writer.write_bit(magnitude & 1 != 0);
                magnitude >>= 1;
            }
        }
    }

    fn de(reader: &mut BitReader, signed: bool, variable: bool, bits: u8) -> Result<Self, SerdeErr> {
        let negative = if signed { reader.read_bit()? } else { false };

        let mut magnitude: u128 = 0;
        let mut shift: u32 = 0;

        loop {
            let proceed = if variable { reader.read_bit()? } else { false };
            for _ in 0..bits {
                let bit = reader.read_bit()?;
                if bit {
                    if shift >= 127 {
                        return Err(SerdeErr::IntegerOutOfRange {
                            value: i128::MAX,
                            type_name: "variable-width integer",
                        });
                    }
                    magnitude |= 1_u128 << shift;
                }
                shift += 1;
            }
            if !proceed {
                break;
            }
        }

        let value = magnitude as i128;
        Ok(Self {
            value: if negative { -value } else { value },
            signed,
            variable,
            bits,
        })
    }

    fn bit_length(&self) -> u32 {
        let mut output: u32 = 0;

        if self.signed {
            output += 1;
        }

        if self.variable {
            let limit: u128 = 1_u128 << self.bits;
            let mut magnitude = self.value.unsigned_abs();
            loop {
                output += 1 + self.bits as u32;
                let proceed = magnitude >= limit;
                magnitude >>= self.bits;
                if !proceed {
                    break;
                }
            }
        } else {
            output += self.bits as u32;
        }
        output
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> SerdeInteger<SIGNED, VARIABLE, BITS> {
    /// Creates a new integer
    ///
    /// # Panics
    ///
    /// Panics if the value cannot be represented with this width or sign.
    /// Use `try_new` for a fallible version.
    pub fn new<T: Into<i128>>(value: T) -> Self {
        match Self::try_new(value) {
            Ok(integer) => integer,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_new<T: Into<i128>>(value: T) -> Result<Self, SerdeErr> {
        Ok(Self {
            inner: IntegerInner::try_new(SIGNED, VARIABLE, BITS, value.into())?,
        })
    }

    pub fn get(&self) -> i128 {
        self.inner.value
    }

    /// Converts into a concrete integer type, failing if the value doesn't fit
    pub fn to<T: TryFrom<i128>>(&self) -> Result<T, SerdeErr> {
        T::try_from(self.inner.value).map_err(|_| SerdeErr::IntegerOutOfRange {
            value: self.inner.value,
            type_name: std::any::type_name::<T>(),
        })
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> Serde
    for SerdeInteger<SIGNED, VARIABLE, BITS>
{
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.inner.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let inner = IntegerInner::de(reader, SIGNED, VARIABLE, BITS)?;
        Ok(Self { inner })
    }

    fn bit_length(&self) -> u32 {
        self.inner.bit_length()
    }
}

impl<const SIGNED: bool, const BITS: u8> ConstBitLength for SerdeInteger<SIGNED, false, BITS> {
    fn const_bit_length() -> u32 {
        let sign_bit: u32 = if SIGNED { 1 } else { 0 };
        sign_bit + BITS as u32
    }
}
