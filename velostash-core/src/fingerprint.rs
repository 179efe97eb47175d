//! Cheap content fingerprints for source recordings.
//!
//! A fingerprint is the file size in base-36, followed by base-36 values of
//! every 4th byte among the first 64 bytes, then `_` and a sanitized copy of
//! the display name:
//!
//! ```text
//! 1y2k  5c 1s 0 ...  _morningride
//! size  sampled bytes  name (alphanumeric, max 20 chars)
//! ```
//!
//! This is a best-effort identity, not a hash. Two files collide whenever they
//! share size, the 16 sampled bytes and the sanitized name prefix, e.g. two
//! recordings from the same device model with the same length and a name that
//! only differs after the 20th character. Nothing here resists deliberate
//! collisions, so the fingerprint must never be treated as a security boundary.

use std::io::Read;
use std::path::Path;

/// Only the head of the file is read when fingerprinting from disk.
pub const HEAD_BYTES: usize = 8 * 1024;

/// Bytes considered for sampling.
const SAMPLE_WINDOW: usize = 64;

/// Sample every n-th byte of the window.
const SAMPLE_STRIDE: usize = 4;

/// Maximum length of the sanitized name suffix.
const NAME_CHARS: usize = 20;

/// Fingerprint an in-memory recording.
pub fn fingerprint_bytes(contents: &[u8], display_name: &str) -> String {
    fingerprint_parts(contents.len() as u64, contents, display_name)
}

/// Fingerprint from the total size and the first bytes of a recording.
///
/// `head` may be shorter than the sample window (or empty); only the bytes
/// present are sampled.
pub fn fingerprint_parts(size: u64, head: &[u8], display_name: &str) -> String {
    let mut out = to_base36(size);
    let window = &head[..head.len().min(SAMPLE_WINDOW)];
    for byte in window.iter().step_by(SAMPLE_STRIDE) {
        out.push_str(&to_base36(u64::from(*byte)));
    }
    out.push('_');
    out.extend(
        display_name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(NAME_CHARS),
    );
    out
}

/// Fingerprint a file on disk, reading at most [`HEAD_BYTES`].
///
/// The display name is the path's final component.
pub fn fingerprint_path(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    let mut head = Vec::with_capacity(HEAD_BYTES);
    file.take(HEAD_BYTES as u64).read_to_end(&mut head)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(fingerprint_parts(size, &head, &name))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}
