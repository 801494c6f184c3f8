//! Relay connection cursors.
//!
//! A cursor is the base64 encoding of `arrayconnection:<offset>`, where
//! `offset` is the zero-based position of an edge in the ordered edge list.
//! Paging `after` a cursor starts at the following position.
//!
//! ```ignore
//! assert_eq!(offset_to_cursor(0), "YXJyYXljb25uZWN0aW9uOjA=");
//! assert_eq!(cursor_to_offset("YXJyYXljb25uZWN0aW9uOjA="), Some(0));
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

const PREFIX: &str = "arrayconnection:";

#[cfg(test)]
pub(crate) fn offset_to_cursor(offset: u64) -> String {
    BASE64.encode(format!("{}{}", PREFIX, offset))
}

/// Offset encoded in `cursor`; `None` for anything that is not a cursor
pub fn cursor_to_offset(cursor: &str) -> Option<u64> {
    let bytes = BASE64.decode(cursor).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.strip_prefix(PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_encoding() {
        assert_eq!(offset_to_cursor(0), "YXJyYXljb25uZWN0aW9uOjA=");
        assert_eq!(cursor_to_offset(&offset_to_cursor(41)), Some(41));
    }

    #[test]
    fn test_rejects_foreign_cursors() {
        assert_eq!(cursor_to_offset("not base64!"), None);
        // "hello:3"
        assert_eq!(cursor_to_offset("aGVsbG86Mw=="), None);
        assert_eq!(cursor_to_offset(&BASE64.encode("arrayconnection:-1")), None);
    }
}
