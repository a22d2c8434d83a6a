use rtmon_common::{REAL_IP_HEADER, SIGNATURE_HEADER};
use rtmon_security::{Encrypter, HmacSigner, SecurityError};
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("encrypt stage failed: {0}")]
    Encrypt(#[from] SecurityError),
}

/// A request body plus the headers the stages attached to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingRequest {
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl OutgoingRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One egress transformation.
#[derive(Clone)]
pub enum Stage {
    /// Announces the agent's address in `X-Real-IP`.
    RealIp(IpAddr),
    /// Replaces the body with its chunked ciphertext.
    Encrypt(Arc<dyn Encrypter>),
    /// Signs the body as it will go on the wire.
    Sign(HmacSigner),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::RealIp(_) => "real-ip",
            Stage::Encrypt(_) => "encrypt",
            Stage::Sign(_) => "sign",
        }
    }

    fn apply(&self, request: &mut OutgoingRequest) -> Result<(), ChainError> {
        match self {
            Stage::RealIp(ip) => request.headers.push((REAL_IP_HEADER, ip.to_string())),
            Stage::Encrypt(encrypter) => {
                request.body = encrypter.encrypt(&request.body)?;
            }
            Stage::Sign(signer) => {
                let signature = signer.sign(&request.body);
                request.headers.push((SIGNATURE_HEADER, signature));
            }
        }
        Ok(())
    }
}

/// The agent's egress stages in their fixed order: real-ip, encrypt, sign.
///
/// Signing always runs last so the signature covers the exact bytes sent,
/// ciphertext included. The server verifies before it decrypts.
#[derive(Clone, Default)]
pub struct SecurityChain {
    stages: Vec<Stage>,
}

impl SecurityChain {
    pub fn new(real_ip: Option<IpAddr>, encrypter: Option<Arc<dyn Encrypter>>, signer: Option<HmacSigner>) -> Self {
        let mut stages = Vec::new();
        if let Some(ip) = real_ip {
            stages.push(Stage::RealIp(ip));
        }
        if let Some(encrypter) = encrypter {
            stages.push(Stage::Encrypt(encrypter));
        }
        if let Some(signer) = signer {
            stages.push(Stage::Sign(signer));
        }
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    pub fn apply(&self, body: Vec<u8>) -> Result<OutgoingRequest, ChainError> {
        let mut request = OutgoingRequest {
            headers: Vec::new(),
            body,
        };
        for stage in &self.stages {
            stage.apply(&mut request)?;
        }
        Ok(request)
    }
}
