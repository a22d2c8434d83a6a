use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::SecurityError;

pub const KEY_LEN: usize = 32;
pub const DEFAULT_MAX_PAYLOAD: usize = 1024;

const TAG_LEN: usize = 16;

/// Encrypts a request body. Implementations may split long bodies and seal
/// each chunk on its own.
pub trait Encrypter: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecurityError>;
}

/// Reverses [`Encrypter`]: opens every sealed chunk and concatenates the
/// plaintext.
pub trait Decrypter: Send + Sync {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SecurityError>;
}

/// AES-256-GCM over fixed-size chunks.
///
/// A sealed chunk is `nonce || ciphertext || tag`, so every sealed chunk but
/// the last is exactly `max_payload + 28` bytes long.
pub struct ChunkCipher {
    key: LessSafeKey,
    max_payload: usize,
    rng: SystemRandom,
}

impl ChunkCipher {
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, SecurityError> {
        if key_bytes.len() != KEY_LEN {
            return Err(SecurityError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                key_bytes.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key_bytes)
            .map_err(|_| SecurityError::InvalidKey("rejected by AES-256-GCM".into()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            max_payload: DEFAULT_MAX_PAYLOAD,
            rng: SystemRandom::new(),
        })
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload.max(1);
        self
    }

    /// Loads an existing key file. Used by the agent, which must share the
    /// server's key rather than invent its own.
    pub fn load(path: &Path) -> Result<Self, SecurityError> {
        let key_bytes = std::fs::read(path)?;
        Self::from_key_bytes(&key_bytes)
    }

    /// Loads the key file, generating a fresh owner-only key when it does
    /// not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self, SecurityError> {
        if path.exists() {
            return Self::load(path);
        }

        let mut key = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| SecurityError::InvalidKey("failed to generate key".into()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, key)?;
        #[cfg(unix)]
        {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        tracing::info!(path = %path.display(), "Generated new payload encryption key");

        Self::from_key_bytes(&key)
    }

    fn sealed_len(&self) -> usize {
        NONCE_LEN + self.max_payload + TAG_LEN
    }

    fn seal_chunk(&self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), SecurityError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).map_err(|_| SecurityError::Encrypt)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = chunk.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| SecurityError::Encrypt)?;

        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(())
    }

    fn open_chunk(&self, sealed: &[u8], out: &mut Vec<u8>) -> Result<(), SecurityError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(SecurityError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| SecurityError::Decrypt)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| SecurityError::Decrypt)?;
        out.extend_from_slice(plaintext);
        Ok(())
    }
}

impl Encrypter for ChunkCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let chunks = plaintext.len().div_ceil(self.max_payload);
        let mut out = Vec::with_capacity(chunks * self.sealed_len());
        for chunk in plaintext.chunks(self.max_payload) {
            self.seal_chunk(chunk, &mut out)?;
        }
        Ok(out)
    }
}

impl Decrypter for ChunkCipher {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let mut out = Vec::with_capacity(ciphertext.len());
        for sealed in ciphertext.chunks(self.sealed_len()) {
            self.open_chunk(sealed, &mut out)?;
        }
        Ok(out)
    }
}
