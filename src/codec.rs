//! IDN⇄ACE conversion and quoted-printable encoding.
//!
//! Grounded on `examples/original_source/ppl7/include/ppl7-inet.h`'s
//! `Idn2Ace`/`Ace2Idn`/`ToQuotedPrintable` declarations. IDN conversion uses
//! the `idna` crate (Punycode/UTS-46) rather than re-deriving Punycode by
//! hand; quoted-printable has no crate in this pack and is small enough to
//! write directly.

use crate::error::{NetError, Result};

/// Converts an internationalized domain name to its ASCII-compatible
/// (Punycode) form.
pub fn idn_to_ace(idn: &str) -> Result<String> {
    idna::domain_to_ascii(idn).map_err(|e| NetError::IdnConversion(format!("{e:?}")))
}

/// Converts an ASCII-compatible-encoded domain name back to Unicode.
pub fn ace_to_idn(ace: &str) -> Result<String> {
    let (unicode, result) = idna::domain_to_unicode(ace);
    result.map_err(|e| NetError::IdnConversion(format!("{e:?}")))?;
    Ok(unicode)
}

/// RFC 2045 quoted-printable encoding, grounded on
/// `ppl7/src/internet/inet_functions.cpp`'s `ToQuotedPrintable`: every byte
/// outside printable ASCII (and `=`) becomes `=XX` hex; lines are not
/// soft-wrapped since this crate only uses it to encode short protocol
/// strings, not full MIME bodies.
pub fn to_quoted_printable(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &byte in data {
        if byte == b'=' || !(0x20..=0x7e).contains(&byte) {
            out.push_str(&format!("={byte:02X}"));
        } else {
            out.push(byte as char);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idn_round_trip() {
        let ace = idn_to_ace("müller.de").unwrap();
        assert!(ace.starts_with("xn--"));
        let idn = ace_to_idn(&ace).unwrap();
        assert_eq!(idn, "müller.de");
    }

    #[test]
    fn ascii_domain_passes_through() {
        assert_eq!(idn_to_ace("example.com").unwrap(), "example.com");
    }

    #[test]
    fn quoted_printable_basic() {
        assert_eq!(to_quoted_printable(b"hello"), "hello");
        assert_eq!(to_quoted_printable(b"a=b"), "a=3Db");
        assert_eq!(to_quoted_printable(&[0xff, b'x']), "=FFx");
    }
}
