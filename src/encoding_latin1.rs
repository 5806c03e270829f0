//! ISO-8859-1 encoding functions. Used on operating systems other than Windows.
//!
//! Other operating systems do not have a concept of the ANSI character set. LAN Manager hashing
//! requires a single-byte representation of the password, so the first 256 Unicode code points
//! are mapped onto their byte values and everything else is replaced.


/// The byte substituted for characters that have no single-byte representation.
const REPLACEMENT_BYTE: u8 = b'?';


/// Converts the given Rust string into a single-byte OEM string.
///
/// The conversion is lossy: characters beyond U+00FF become `?`, exactly one byte per character.
pub fn rust_string_to_oem(rust_str: &str) -> Option<Vec<u8>> {
    let bytes = rust_str.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT_BYTE))
        .collect();
    Some(bytes)
}


#[cfg(test)]
mod tests {
    use super::rust_string_to_oem;

    #[test]
    fn test_ascii_passes_through() {
        assert_eq!(rust_string_to_oem("KGS!@#$%"), Some(b"KGS!@#$%".to_vec()));
    }

    #[test]
    fn test_latin1_single_byte() {
        assert_eq!(rust_string_to_oem("\u{00C4}\u{00FF}"), Some(vec![0xC4, 0xFF]));
    }

    #[test]
    fn test_unrepresentable_replaced() {
        assert_eq!(rust_string_to_oem("A\u{20AC}\u{1F600}B"), Some(b"A??B".to_vec()));
    }
}
