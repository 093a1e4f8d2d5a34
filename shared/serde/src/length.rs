use crate::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};

type LengthPrefix = UnsignedVariableInteger<7>;

pub fn write_length(writer: &mut dyn BitWrite, length: usize) {
    LengthPrefix::new(length as u64).ser(writer);
}

pub fn read_length(reader: &mut BitReader) -> Result<usize, SerdeErr> {
    LengthPrefix::de(reader)?.to::<usize>()
}

/// Reads a length prefix, rejecting it if it exceeds `cap` (when set)
pub fn read_length_capped(reader: &mut BitReader, cap: Option<usize>) -> Result<usize, SerdeErr> {
    let length = read_length(reader)?;
    if let Some(cap) = cap {
        if length > cap {
            return Err(SerdeErr::LengthExceeded { length, cap });
        }
    }
    Ok(length)
}
