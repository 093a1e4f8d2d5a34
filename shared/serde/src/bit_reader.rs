use crate::SerdeErr;

/// Reads bit-packed input produced by a [`BitWriter`](crate::BitWriter)
pub struct BitReader<'b> {
    buffer: &'b [u8],
    bit_index: usize,
}

impl<'b> BitReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self {
            buffer,
            bit_index: 0,
        }
    }

    pub fn bits_remaining(&self) -> usize {
        (self.buffer.len() * 8).saturating_sub(self.bit_index)
    }

    pub fn is_empty(&self) -> bool {
        self.bits_remaining() < 8
    }

    pub fn read_bit(&mut self) -> Result<bool, SerdeErr> {
        let byte_index = self.bit_index / 8;
        let Some(byte) = self.buffer.get(byte_index) else {
            return Err(SerdeErr::UnexpectedEnd);
        };
        let bit = (byte >> (self.bit_index % 8)) & 1 != 0;
        self.bit_index += 1;
        Ok(bit)
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        if self.bit_index % 8 == 0 {
            let Some(byte) = self.buffer.get(self.bit_index / 8) else {
                return Err(SerdeErr::UnexpectedEnd);
            };
            self.bit_index += 8;
            return Ok(*byte);
        }

        let mut output: u8 = 0;
        for index in 0..8 {
            if self.read_bit()? {
                output |= 1 << index;
            }
        }
        Ok(output)
    }

    /// Reads `length` bytes. The remaining input is checked before anything
    /// is allocated, so a corrupt length can never trigger a large allocation.
    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>, SerdeErr> {
        if length.saturating_mul(8) > self.bits_remaining() {
            return Err(SerdeErr::UnexpectedEnd);
        }
        let mut output = Vec::with_capacity(length);
        for _ in 0..length {
            output.push(self.read_byte()?);
        }
        Ok(output)
    }
}
