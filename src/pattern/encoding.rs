//! Character encodings a pattern can be searched in

use super::PatternError;
use std::fmt;

/// Target encoding for a pattern's characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// 7-bit ASCII
    Ascii,
    /// UTF-8
    Utf8,
    /// UTF-16, little endian
    Utf16Le,
    /// UTF-16, big endian
    Utf16Be,
    /// Any other WHATWG encoding
    Other(&'static encoding_rs::Encoding),
}

impl Encoding {
    /// Resolve an encoding name as written in a rule
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_uppercase().as_str() {
            "ASCII" | "US-ASCII" => Some(Encoding::Ascii),
            "UTF-8" | "UTF8" => Some(Encoding::Utf8),
            "UTF-16" | "UTF-16LE" | "UTF16LE" => Some(Encoding::Utf16Le),
            "UTF-16BE" | "UTF16BE" => Some(Encoding::Utf16Be),
            _ => encoding_rs::Encoding::for_label(label.as_bytes()).map(|enc| {
                // encoding_rs encodes UTF-16 output as UTF-8
                if enc == encoding_rs::UTF_16LE {
                    Encoding::Utf16Le
                } else if enc == encoding_rs::UTF_16BE {
                    Encoding::Utf16Be
                } else {
                    Encoding::Other(enc)
                }
            }),
        }
    }

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Ascii => "ASCII",
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Other(enc) => enc.name(),
        }
    }

    /// Append the encoded form of `text` to `out`
    pub fn encode_into(&self, text: &str, out: &mut Vec<u8>) -> Result<(), PatternError> {
        match self {
            Encoding::Ascii => {
                if !text.is_ascii() {
                    return Err(PatternError::Unencodable {
                        pattern: text.to_string(),
                        encoding: self.name().to_string(),
                    });
                }
                out.extend_from_slice(text.as_bytes());
            }
            Encoding::Utf8 => out.extend_from_slice(text.as_bytes()),
            Encoding::Utf16Le => text
                .encode_utf16()
                .for_each(|u| out.extend_from_slice(&u.to_le_bytes())),
            Encoding::Utf16Be => text
                .encode_utf16()
                .for_each(|u| out.extend_from_slice(&u.to_be_bytes())),
            Encoding::Other(enc) => {
                let (bytes, _, had_errors) = enc.encode(text);
                if had_errors {
                    return Err(PatternError::Unencodable {
                        pattern: text.to_string(),
                        encoding: self.name().to_string(),
                    });
                }
                out.extend_from_slice(&bytes);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
