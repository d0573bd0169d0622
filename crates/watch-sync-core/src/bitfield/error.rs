use thiserror::Error;

#[derive(Debug, Error)]
pub enum BitfieldError {
    #[error("invalid watched field format: {0}")]
    InvalidFormat(String),

    #[error("failed to decode bitfield: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("bitfield compression failed: {0}")]
    Compression(#[from] std::io::Error),
}
