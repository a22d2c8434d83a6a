use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key file: {0}")]
    KeyIo(#[from] std::io::Error),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,

    #[error("signature header missing")]
    MissingSignature,

    #[error("signature header is not valid hex")]
    MalformedSignature,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid subnet {0}")]
    InvalidSubnet(String),
}
