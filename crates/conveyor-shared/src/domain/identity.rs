//! # Task Identity & Typing (§4.1)
//!
//! Pure functions. No I/O, no randomness, no wall-clock reads — callers
//! rely on these being stable across processes and restarts.

use sha2::{Digest, Sha256};

/// File-name suffixes (case-insensitive) that qualify a file for the
/// image-conversion phase.
pub const TIFF_SUFFIXES: &[&str] = &[".tiff", ".tif"];

/// Deterministic task identifier: a function of `(batch_id, phase_tag, input_key)`.
///
/// The input-key space is already unique per batch, so a truncated hash
/// (first 16 hex bytes of a SHA-256 digest, i.e. 64 bits) is sufficient
/// to make collisions within one batch's input set impossible in practice.
pub fn task_id(batch_id: &str, phase_tag: &str, input_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(batch_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(phase_tag.as_bytes());
    hasher.update(b"\0");
    hasher.update(input_key.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Classifies whether a file belongs to a phase by a case-insensitive
/// suffix match. Only the image-conversion phase tag is recognized today;
/// unknown phase tags never match (a new phase supplies its own suffixes).
pub fn matches_phase(file_name: &str, phase_tag: &str) -> bool {
    match phase_tag {
        "TIFF_CONVERSION" => {
            let lower = file_name.to_ascii_lowercase();
            TIFF_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
        }
        _ => false,
    }
}

/// Minimal hex encoding so this module does not pull in a dedicated `hex`
/// crate for eight bytes of output.
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}
