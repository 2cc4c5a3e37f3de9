//! UUID-based identifiers.
//!
//! Records, messages and traces are all identified by RFC 4122 UUIDs.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A 128-bit UUID identifier.
pub type Id = Uuid;

/// The zero/nil UUID.
pub const NIL_ID: Id = Uuid::nil();

/// Domain separator prefix for payload identity derivation.
const PAYLOAD_PREFIX: &[u8] = b"resource-graph:payload:";

/// Generates a fresh random identifier.
pub fn new_id() -> Id {
    Uuid::new_v4()
}

/// Derives a UUIDv8 from input bytes using SHA-256.
///
/// ```text
/// hash = SHA-256(input_bytes)[0:16]
/// hash[6] = (hash[6] & 0x0F) | 0x80  // version 8
/// hash[8] = (hash[8] & 0x3F) | 0x80  // RFC 4122 variant
/// ```
pub fn derived_uuid(input: &[u8]) -> Id {
    let hash = Sha256::digest(input);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set version 8 (bits 4-7 of byte 6)
    bytes[6] = (bytes[6] & 0x0F) | 0x80;
    // Set RFC 4122 variant (bits 6-7 of byte 8)
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Derives the identity of a message payload within a trace.
///
/// ```text
/// payload_id = derived_uuid("resource-graph:payload:" || trace_id || payload)
/// ```
///
/// Re-sending the same payload for the same trace yields the same id, so
/// consumers can drop duplicates produced by at-least-once delivery.
pub fn payload_id(trace_id: &Id, payload: &[u8]) -> Id {
    let mut input = Vec::with_capacity(PAYLOAD_PREFIX.len() + 16 + payload.len());
    input.extend_from_slice(PAYLOAD_PREFIX);
    input.extend_from_slice(trace_id.as_bytes());
    input.extend_from_slice(payload);
    derived_uuid(&input)
}

/// Formats a UUID as hyphenated lowercase hex (the wire format).
pub fn format_id(id: &Id) -> String {
    id.hyphenated().to_string()
}

/// Parses a UUID from a hex string (with or without hyphens).
pub fn parse_id(s: &str) -> Option<Id> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    Uuid::parse_str(trimmed).ok()
}
