use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// How the bytes of a source file were turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    Utf8,
    Utf8Bom,
    Latin1,
}

impl Encoding {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf8Bom => "utf-8-bom",
            Self::Latin1 => "latin-1",
        }
    }
}

/// One file's text, owned by the step that processes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// `/`-separated path below the walk root
    pub relative_path: String,
    pub text: String,
    pub encoding: Encoding,
}

/// Decode file bytes as UTF-8, falling back to Latin-1.
///
/// Bytes containing NUL are treated as binary and rejected: Latin-1 maps every byte, so
/// binary content would otherwise decode into garbage text.
pub fn decode(bytes: &[u8]) -> Result<(String, Encoding), String> {
    if bytes.contains(&0) {
        return Err("binary content (NUL byte) is not decodable as text".to_string());
    }

    let (body, utf8_encoding) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest, Encoding::Utf8Bom),
        None => (bytes, Encoding::Utf8),
    };
    match std::str::from_utf8(body) {
        Ok(text) => Ok((text.to_string(), utf8_encoding)),
        Err(_) => Ok((bytes.iter().map(|&b| char::from(b)).collect(), Encoding::Latin1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_utf8_with_and_without_bom() {
        assert_eq!(
            decode("const π = 3;".as_bytes()).unwrap(),
            ("const π = 3;".to_string(), Encoding::Utf8)
        );
        assert_eq!(
            decode(b"\xEF\xBB\xBFlet a;").unwrap(),
            ("let a;".to_string(), Encoding::Utf8Bom)
        );
    }

    #[test]
    fn test_invalid_utf8_falls_back_to_latin1() {
        let (text, encoding) = decode(b"// caf\xE9\nlet x = 1;").unwrap();
        assert_eq!(encoding, Encoding::Latin1);
        assert_eq!(text, "// café\nlet x = 1;");
    }

    #[test]
    fn test_binary_is_rejected() {
        assert!(decode(b"\x7FELF\x00\x01").is_err());
    }
}
