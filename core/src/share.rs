//! Share links: document text carried in a URL fragment
//!
//! Links are written as `#code/<payload>` where the payload is lz-string's
//! URI-safe encoding. Legacy `#src=<percent-encoded text>` links are still
//! accepted when decoding.

use thiserror::Error;

const CODE_PREFIX: &str = "code/";
const SOURCE_PREFIX: &str = "src=";

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("not a share link: expected `#code/...` or `#src=...`")]
    MissingPrefix,

    #[error("malformed share payload")]
    Decode,

    #[error("share payload is not valid UTF-16")]
    Utf16(#[from] std::string::FromUtf16Error),

    #[error("share payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Fragment for `code`, including the leading `#`
pub fn encode_fragment(code: &str) -> String {
    format!(
        "#{}{}",
        CODE_PREFIX,
        lz_str::compress_to_encoded_uri_component(code)
    )
}

/// Full link for `code` under `base` (e.g. `https://example.com/play/`)
pub fn share_url(base: &str, code: &str) -> String {
    format!("{}{}", base, encode_fragment(code))
}

/// Recover the code from a fragment or a full URL.
///
/// Everything up to the first `#` is ignored. An empty payload decodes to
/// an empty document.
pub fn decode_fragment(input: &str) -> Result<String, ShareError> {
    let input = input.trim();
    let fragment = match input.find('#') {
        Some(index) => &input[index + 1..],
        None => input,
    };

    if let Some(source) = fragment.strip_prefix(SOURCE_PREFIX) {
        return Ok(urlencoding::decode(source.trim())?.into_owned());
    }

    let payload = fragment
        .strip_prefix(CODE_PREFIX)
        .ok_or(ShareError::MissingPrefix)?
        .trim();
    if payload.is_empty() {
        return Ok(String::new());
    }
    if !payload.chars().all(is_payload_char) {
        return Err(ShareError::Decode);
    }

    let units = lz_str::decompress_from_encoded_uri_component(payload).ok_or(ShareError::Decode)?;
    Ok(String::from_utf16(&units)?)
}

/// Alphabet of lz-string's URI-safe encoding
fn is_payload_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    // Payloads as written by the web playground's lz-string encoder
    const PRINT_ONE: &str = "A4JwlgdgLgFAjASiA";
    const GREETING: &str = "MYewdgzgLgBA5gJwKZKgSzHGBeGAiACwEuAbEkPAKFEhBKQDpy4AKRFdTASkqA";
    const MOON: &str = "MYewdgzgLgBAticMC8MBEgeDcJj7aBQpIQAbAUwDoiQBzACgXAEog";

    #[test]
    fn test_encode_fragment() {
        assert_eq!(encode_fragment("print(1)"), format!("#code/{}", PRINT_ONE));
    }

    #[test]
    fn test_decode_playground_links() {
        let url = format!("https://example.com/play/#code/{}", GREETING);
        assert_eq!(
            decode_fragment(&url).unwrap(),
            "const greeting = \"héllo\"\nconsole.log(greeting)\n"
        );
        assert_eq!(
            decode_fragment(&format!("#code/{}", MOON)).unwrap(),
            "const moon = \"🌙\"\nconsole.log(moon)"
        );
    }

    #[test]
    fn test_share_url_decodes_back() {
        let code = "let total = 0\nfor (const x of [1, 2, 3]) {\n    total += x\n}\n";
        let url = share_url("https://example.com/play/", code);
        assert!(url.starts_with("https://example.com/play/#code/"));
        assert_eq!(decode_fragment(&url).unwrap(), code);
    }

    #[test]
    fn test_decode_bare_fragment() {
        assert_eq!(decode_fragment(&format!("code/{}", PRINT_ONE)).unwrap(), "print(1)");
        assert_eq!(decode_fragment("#code/").unwrap(), "");
    }

    #[test]
    fn test_decode_legacy_source_fragment() {
        assert_eq!(
            decode_fragment("https://example.com/play/#src=console.log(%22hi%22)%3B%0A").unwrap(),
            "console.log(\"hi\");\n"
        );
        assert_eq!(decode_fragment("#src=").unwrap(), "");
        assert!(matches!(
            decode_fragment("#src=%FF"),
            Err(ShareError::Utf8(_))
        ));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_fragment("https://example.com/#other/abc"),
            Err(ShareError::MissingPrefix)
        ));
        assert!(matches!(decode_fragment("#code/!!!"), Err(ShareError::Decode)));
    }
}
