//! JSON encoding for payloads written to browser clients.
//!
//! Payloads use `", "` and `": "` separators and escape every character
//! outside printable ASCII as `\uXXXX`, so `"thinking…"` is written as
//! `"thinking\u2026"`.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

/// Serializes `value` with spaced separators and ASCII-only output.
///
/// # Errors
///
/// Returns an error when `value`'s `Serialize` implementation fails.
pub fn to_string<T>(value: &T) -> serde_json::Result<String>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::with_capacity(64);
    value.serialize(&mut Serializer::with_formatter(&mut buf, AsciiFormatter))?;
    // The formatter only emits ASCII.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[derive(Debug, Clone, Copy, Default)]
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if matches!(ch, ' '..='~') {
                let mut byte = [0u8; 1];
                writer.write_all(ch.encode_utf8(&mut byte).as_bytes())?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn separators_are_spaced() {
        let value = json!({"a": [1, 2], "b": "c"});
        assert_eq!(to_string(&value).unwrap(), r#"{"a": [1, 2], "b": "c"}"#);
    }

    #[test]
    fn non_ascii_is_escaped() {
        let value = json!({"content": "thinking…"});
        assert_eq!(
            to_string(&value).unwrap(),
            r#"{"content": "thinking\u2026"}"#
        );
    }

    #[test]
    fn astral_characters_use_surrogate_pairs() {
        assert_eq!(to_string("🦀").unwrap(), r#""\ud83e\udd80""#);
    }

    #[test]
    fn control_characters_keep_short_escapes() {
        assert_eq!(to_string("a\nb\"c\u{7f}").unwrap(), r#""a\nb\"c\u007f""#);
    }

    #[test]
    fn empty_object_is_compact() {
        assert_eq!(to_string(&json!({})).unwrap(), "{}");
    }
}
