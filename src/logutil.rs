//! Logging helpers so that radio-borne text and key material stay on one readable log line.

use std::fmt::Write;

/// Longest text preview written to the log. Posts are capped well below this.
const MAX_PREVIEW: usize = 200;

/// Escape a string for single-line logging:
/// - `\n`, `\r`, `\t` and backslash are escaped
/// - other control characters become `\xNN`
///
/// Strings longer than the preview limit are cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Lowercase hex of the first `max` bytes, e.g. a public key prefix like `a1b2c3d4`.
pub fn hex_prefix(data: &[u8], max: usize) -> String {
    hex::encode(&data[..data.len().min(max)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_control_chars() {
        assert_eq!(escape_log("a\nb\r\tc"), "a\\nb\\r\\tc");
        assert_eq!(escape_log("bell\u{7}"), "bell\\x07");
    }

    #[test]
    fn long_text_is_cut() {
        let long = "x".repeat(MAX_PREVIEW + 10);
        let esc = escape_log(&long);
        assert!(esc.ends_with('…'));
        assert_eq!(esc.chars().count(), MAX_PREVIEW + 1);
    }

    #[test]
    fn hex_prefix_clamps_to_input() {
        assert_eq!(hex_prefix(&[0xab, 0x01, 0xff], 2), "ab01");
        assert_eq!(hex_prefix(&[0x0f], 4), "0f");
    }
}
