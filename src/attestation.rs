//! Hardware-enclave remote-attestation collaborator (spec §1 Non-goals
//! list, §6 `SgxRaMsg*` message types, §9): SGX RA is optional, represented
//! as a trait so the session state machine's `{ATTEST|SKIP}` branch can
//! call either a real attestor or a no-op.

use crate::error::SessionError;

pub trait Attestor: Send + Sync {
    /// Run the attestation handshake (`SgxRaMsg01`..`SgxRaMsg4`) and return
    /// `Ok(())` once the peer is attested, or an error if verification
    /// fails. Called only when the client's `AttestationDecision` selects
    /// `ATTEST` (spec §4.8).
    fn attest(&self) -> Result<(), SessionError>;
}

/// Plain ECDH with no RA exchange — the default per spec.md (the crate
/// must work without a real enclave).
pub struct NullAttestor;

impl Attestor for NullAttestor {
    fn attest(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_attestor_always_succeeds() {
        assert!(NullAttestor.attest().is_ok());
    }
}
