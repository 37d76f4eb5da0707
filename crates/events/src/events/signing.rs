use serde::{Deserialize, Serialize};

/// Signing backend events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SigningEvent {
    /// Hashes handed to a signer
    Requested {
        signer: String,
        hashes: usize,
        keysets: Vec<String>,
    },

    /// Remote signing ticket submitted
    TicketSubmitted { ticket: String, instructions: String },

    /// Still waiting on a remote signer
    Polling {
        ticket: String,
        pending: usize,
        elapsed_secs: u64,
    },

    /// Signatures received for all hashes
    Received {
        signer: String,
        hashes: usize,
        signatures: usize,
    },

    /// Signer returned results that break the one-signature-per-keyset contract
    Rejected { signer: String, reason: String },
}
