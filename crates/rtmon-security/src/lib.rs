//! Payload protection shared by the agent's egress chain and the server's
//! ingress middleware.
//!
//! - [`sign::HmacSigner`] signs and verifies exact body bytes.
//! - [`cipher::ChunkCipher`] encrypts bodies chunk by chunk.
//! - [`subnet::TrustedSubnet`] checks a caller address against a CIDR block.

pub mod cipher;
pub mod error;
pub mod sign;
pub mod subnet;

pub use cipher::{ChunkCipher, Decrypter, Encrypter};
pub use error::SecurityError;
pub use sign::HmacSigner;
pub use subnet::TrustedSubnet;
