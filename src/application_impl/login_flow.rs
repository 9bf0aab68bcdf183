use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LoginFlowError {
    #[error("state cookie missing or malformed")]
    Malformed,
    #[error("state mismatch")]
    Mismatch,
    #[error("internal error: {0}")]
    InternalError(String),
}

/// CSRF state for the provider round-trip. The state travels twice: once
/// through the provider's redirect and once in our own cookie, signed so the
/// cookie copy cannot be forged. No server-side storage is involved.
pub struct LoginFlow {
    key: Vec<u8>,
}

#[derive(Debug)]
pub struct LoginTicket {
    pub state: String,
    pub cookie_value: String,
}

impl LoginFlow {
    pub fn new(key: Vec<u8>) -> Self {
        LoginFlow { key }
    }

    fn hmac_hex(&self, msg: &str) -> Result<String, LoginFlowError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| LoginFlowError::InternalError(e.to_string()))?;
        mac.update(msg.as_bytes());
        let out = mac.finalize().into_bytes();
        Ok(hex::encode(out))
    }

    pub fn begin(&self) -> Result<LoginTicket, LoginFlowError> {
        let state = Uuid::new_v4().to_string();
        let sig = self.hmac_hex(&state)?;
        let cookie_value = format!("{}.{}", state, sig);
        Ok(LoginTicket {
            state,
            cookie_value,
        })
    }

    /// Check the callback against the cookie set at login: the cookie must
    /// carry a valid signature and the provider must have echoed the same
    /// state.
    pub fn verify(&self, cookie_value: &str, presented_state: &str) -> Result<(), LoginFlowError> {
        let (state, sig) = cookie_value
            .split_once('.')
            .ok_or(LoginFlowError::Malformed)?;
        let sig_bytes = hex::decode(sig).map_err(|_| LoginFlowError::Malformed)?;

        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| LoginFlowError::InternalError(e.to_string()))?;
        mac.update(state.as_bytes());
        mac.verify_slice(&sig_bytes)
            .map_err(|_| LoginFlowError::Mismatch)?;

        if state != presented_state {
            return Err(LoginFlowError::Mismatch);
        }
        Ok(())
    }
}
