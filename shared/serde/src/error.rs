use thiserror::Error;

/// Errors raised while decoding a bit stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerdeErr {
    /// The buffer ended before the value was complete
    #[error("Unexpected end of buffer")]
    UnexpectedEnd,

    /// A length prefix exceeded the configured safety cap
    #[error("Length {length} exceeds the configured cap of {cap} bytes")]
    LengthExceeded { length: usize, cap: usize },

    /// An enum discriminant did not match any known variant
    #[error("Invalid tag {tag} while decoding {type_name}")]
    InvalidTag { tag: u8, type_name: &'static str },

    /// A string payload was not valid UTF-8
    #[error("String payload is not valid UTF-8")]
    InvalidUtf8,

    /// An integer did not fit its declared width or target type
    #[error("Integer {value} is out of range for {type_name}")]
    IntegerOutOfRange { value: i128, type_name: &'static str },

    /// An integer was declared with an unusable bit width
    #[error("Integer bit width {bits} must be between 1 and 127")]
    InvalidBitWidth { bits: u8 },
}
