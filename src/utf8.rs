//! UTF-8 validation for frame payloads
//!
//! Backed by `simdutf8`, which picks SSE4.2/AVX2/NEON at runtime and falls
//! back to `std` elsewhere.

/// Validate that the input is valid UTF-8
#[inline]
pub fn validate_utf8(data: &[u8]) -> bool {
    simdutf8::basic::from_utf8(data).is_ok()
}

/// View a payload as `&str` if it is valid UTF-8
#[inline]
pub fn as_str(data: &[u8]) -> Option<&str> {
    simdutf8::basic::from_utf8(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ascii() {
        assert!(validate_utf8(b""));
        assert!(validate_utf8(b"Hello, World!"));
    }

    #[test]
    fn test_valid_multibyte() {
        assert!(validate_utf8("Привет, мир".as_bytes()));
        assert!(validate_utf8("日本語 🎉".as_bytes()));
    }

    #[test]
    fn test_invalid_utf8() {
        // Lone continuation byte
        assert!(!validate_utf8(&[0x80]));
        // Truncated 2-byte sequence
        assert!(!validate_utf8(&[0xC3]));
        // Overlong encoding of '/'
        assert!(!validate_utf8(&[0xC0, 0xAF]));
        // UTF-16 surrogate
        assert!(!validate_utf8(&[0xED, 0xA0, 0x80]));
        // Above U+10FFFF
        assert!(!validate_utf8(&[0xF4, 0x90, 0x80, 0x80]));
    }

    #[test]
    fn test_as_str() {
        assert_eq!(as_str(b"abc"), Some("abc"));
        assert_eq!(as_str(&[0xFF, 0xFE]), None);
    }

    #[test]
    fn test_long_input() {
        let long = "Hello, 世界! ".repeat(1000);
        assert!(validate_utf8(long.as_bytes()));

        let mut broken = long.into_bytes();
        broken[5000] = 0xFF;
        assert!(!validate_utf8(&broken));
    }
}
