//! Random tokens: request nonces and invite secrets
use uuid::Uuid;

/// Generate a nonce for an outgoing command frame
///
/// The peer echoes the nonce back in its response, so every command gets
/// a fresh one. The format is `{command}-{uuid}`.
///
/// ```
/// # use richlink::nonce::generate_nonce;
/// let nonce = generate_nonce("set-activity");
/// assert!(nonce.starts_with("set-activity-"));
/// ```
pub fn generate_nonce(command: &str) -> String {
    format!("{}-{}", command, Uuid::new_v4())
}

/// Generate an unguessable secret for `join_secret` / `spectate_secret`
///
/// UUID v4 carries 122 random bits. The hyphen-free form is used because
/// secrets end up inside launch URIs on the other side.
pub fn generate_secret() -> String {
    Uuid::new_v4().simple().to_string()
}
