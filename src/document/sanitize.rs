//! Removes characters that XML 1.0 does not allow
//!
//! The remote service regularly embeds control characters and stray bytes in
//! comment bodies, which makes an otherwise fine document unparseable. Each
//! offending byte is replaced by a visible `\x..` escape instead of being
//! dropped, so the stored text still shows that something was there.

use std::fmt::Write;

/// Returns true if `c` is a legal XML 1.0 character
fn is_xml_char(c: char) -> bool {
    matches!(
        c as u32,
        0x9 | 0xA | 0xD | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF
    )
}

fn escape_byte(out: &mut String, byte: u8) {
    // Writing into a String cannot fail
    let _ = write!(out, "\\x{:x}", byte);
}

/// Sanitizes a raw payload before it is handed to the XML parser
///
/// Valid UTF-8 characters that are legal in XML are copied through. Every
/// byte of an illegal character, and every byte that is not valid UTF-8, is
/// re-encoded as `\x` followed by its lowercase hex value.
///
/// # Example
///
/// ```
/// use danmaku_harvest::document::sanitize;
///
/// assert_eq!(sanitize(b"ok\x01"), "ok\\x1");
/// ```
pub fn sanitize(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());

    for chunk in raw.utf8_chunks() {
        for c in chunk.valid().chars() {
            if is_xml_char(c) {
                out.push(c);
            } else {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    escape_byte(&mut out, byte);
                }
            }
        }
        for &byte in chunk.invalid() {
            escape_byte(&mut out, byte);
        }
    }

    out
}
