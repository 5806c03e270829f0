//! Windows-specific encoding functions.
//!
//! On Windows, legacy programs use the configured ANSI character set and the operating system
//! provides functions to convert Unicode into this character set. LAN Manager servers expect the
//! password in that code page, so we let the operating system do the conversion.


use windows::Win32::Globalization::{CP_ACP, WC_NO_BEST_FIT_CHARS, WideCharToMultiByte};


/// Converts the given Rust string into a string in the ANSI code page.
///
/// Best-fit mapping is disabled; characters missing from the code page become the code page's
/// default character instead of a lookalike.
pub fn rust_string_to_oem(rust_str: &str) -> Option<Vec<u8>> {
    if rust_str.is_empty() {
        return Some(Vec::new());
    }

    let unicode: Vec<u16> = rust_str.encode_utf16().collect();

    // ask for the required length first
    let byte_count = unsafe {
        WideCharToMultiByte(
            CP_ACP,
            WC_NO_BEST_FIT_CHARS,
            &unicode,
            None,
            None,
            None,
        )
    };
    let byte_count_usize: usize = byte_count.try_into().ok()?;
    if byte_count_usize == 0 {
        return None;
    }

    let mut buf = vec![0u8; byte_count_usize];
    let bytes_written = unsafe {
        WideCharToMultiByte(
            CP_ACP,
            WC_NO_BEST_FIT_CHARS,
            &unicode,
            Some(buf.as_mut_slice()),
            None,
            None,
        )
    };
    let bytes_written_usize: usize = bytes_written.try_into().ok()?;
    if bytes_written_usize == 0 {
        return None;
    }
    buf.truncate(bytes_written_usize);

    Some(buf)
}
