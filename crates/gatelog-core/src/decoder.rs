//! Tag identifier extraction from raw reader frames.
//!
//! The reader pushes frames of varying shape: a bare EPC, an EPC wrapped in a
//! vendor preamble and trailer, or noise. Decoding renders the frame as
//! lowercase hex and tries an ordered list of [`TagMatcher`]s; the first hit
//! wins. When nothing matches and the frame starts with a known preamble, the
//! preamble is stripped and the matchers run again on the remainder.
//!
//! Decoding never fails. `None` is a normal outcome and the caller keeps the
//! raw frame for the unknown tag archive.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{DecodedTag, RawFrame};

/// Length in hex digits of a canonical identifier (96-bit EPC).
pub const IDENTIFIER_HEX_LEN: usize = 24;

/// Hex preambles some reader firmwares prepend to every frame.
pub const KNOWN_PREAMBLES: &[&str] = &["cccfff", "aa55"];

static FAMILY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"e[2-9][0-9a-f]{22}").expect("valid family prefix regex"));
static LOOSE_LEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[e-f][0-9a-f]{23}").expect("valid loose leading regex"));
static ANY_HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9a-f]{24}").expect("valid hex run regex"));

/// One strategy for locating an identifier inside a hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatcher {
    /// `e2`..`e9` followed by 22 hex digits: a known tag family.
    FamilyPrefix,
    /// `e` or `f` followed by 23 hex digits: out-of-family tags.
    LooseLeading,
    /// Any run of 24 hex digits.
    AnyHex,
}

/// Matchers in precedence order.
pub const DEFAULT_MATCHERS: &[TagMatcher] = &[
    TagMatcher::FamilyPrefix,
    TagMatcher::LooseLeading,
    TagMatcher::AnyHex,
];

impl TagMatcher {
    fn pattern(self) -> &'static Regex {
        match self {
            Self::FamilyPrefix => &FAMILY_PREFIX,
            Self::LooseLeading => &LOOSE_LEADING,
            Self::AnyHex => &ANY_HEX,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FamilyPrefix => "family_prefix",
            Self::LooseLeading => "loose_leading",
            Self::AnyHex => "any_hex",
        }
    }

    /// Leftmost candidate in `hex` (lowercase) that is not all zeros.
    ///
    /// After an all-zero candidate the search resumes one digit later, so a
    /// window that overlaps zero padding is still found.
    #[must_use]
    pub fn find(self, hex: &str) -> Option<String> {
        let pattern = self.pattern();
        let mut start = 0;
        while let Some(m) = pattern.find_at(hex, start) {
            if m.as_str().bytes().any(|c| c != b'0') {
                return Some(m.as_str().to_string());
            }
            start = m.start() + 1;
        }
        None
    }
}

/// Ordered-cascade identifier decoder.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    matchers: Vec<TagMatcher>,
    preambles: Vec<String>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(
            DEFAULT_MATCHERS.to_vec(),
            KNOWN_PREAMBLES.iter().map(|p| (*p).to_string()).collect(),
        )
    }
}

impl FrameDecoder {
    /// Build a decoder with a custom matcher order and preamble list.
    #[must_use]
    pub fn new(matchers: Vec<TagMatcher>, preambles: Vec<String>) -> Self {
        Self {
            matchers,
            preambles: preambles.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Decode raw bytes into a canonical identifier.
    #[must_use]
    pub fn decode(&self, raw: &[u8]) -> Option<String> {
        self.decode_hex(&crate::types::to_hex(raw))
    }

    /// Decode a frame, keeping the frame alongside the result.
    #[must_use]
    pub fn decode_frame(&self, raw: RawFrame) -> DecodedTag {
        DecodedTag {
            identifier: self.decode(raw.bytes()),
            raw,
        }
    }

    /// Decode an already hex-encoded frame. Case-insensitive.
    #[must_use]
    pub fn decode_hex(&self, hex: &str) -> Option<String> {
        let hex = hex.to_lowercase();

        if let Some(found) = self.run_matchers(&hex) {
            return Some(found);
        }

        self.strip_preamble(&hex)
            .and_then(|rest| self.run_matchers(rest))
    }

    /// The remainder of `hex` after the first known preamble it starts with.
    #[must_use]
    pub fn strip_preamble<'a>(&self, hex: &'a str) -> Option<&'a str> {
        self.preambles
            .iter()
            .find_map(|preamble| hex.strip_prefix(preamble.as_str()))
    }

    fn run_matchers(&self, hex: &str) -> Option<String> {
        self.matchers.iter().find_map(|matcher| {
            let found = matcher.find(hex)?;
            tracing::trace!(matcher = matcher.name(), identifier = %found, "Tag pattern matched");
            Some(found)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_bytes(hex: &str) -> Vec<u8> {
        hex::decode(hex).unwrap()
    }

    #[test]
    fn test_decodes_family_prefixed_tag() {
        let decoder = FrameDecoder::default();
        let frame = hex_bytes("e2001122334455667788990011223344");
        assert_eq!(
            decoder.decode(&frame).as_deref(),
            Some("e20011223344556677889900")
        );
    }

    #[test]
    fn test_family_prefix_beats_generic_run() {
        let decoder = FrameDecoder::default();
        // A plain 24-digit run comes first, the family tag later.
        let hex = "0123456789abcdef01234567aa e2a1b2c3d4e5f60718293a4b".replace(' ', "");
        assert_eq!(
            decoder.decode_hex(&hex).as_deref(),
            Some("e2a1b2c3d4e5f60718293a4b")
        );
    }

    #[test]
    fn test_loose_leading_fallback() {
        let decoder = FrameDecoder::default();
        let hex = "0011f1a2b3c4d5e6f708192a3b4c";
        assert_eq!(
            decoder.decode_hex(hex).as_deref(),
            Some("f1a2b3c4d5e6f708192a3b4c")
        );
        assert_eq!(TagMatcher::FamilyPrefix.find(hex), None);
    }

    #[test]
    fn test_any_hex_last_resort() {
        let decoder = FrameDecoder::default();
        let hex = "0123456789abcd0123456789";
        assert_eq!(decoder.decode_hex(hex).as_deref(), Some(hex));
    }

    #[test]
    fn test_uppercase_input_is_normalized() {
        let decoder = FrameDecoder::default();
        assert_eq!(
            decoder.decode_hex("E2001122334455667788990A").as_deref(),
            Some("e2001122334455667788990a")
        );
    }

    #[test]
    fn test_all_zero_frames_do_not_decode() {
        let decoder = FrameDecoder::default();
        assert_eq!(decoder.decode(&[0u8; 11]), None);
        assert_eq!(decoder.decode(&[0u8; 12]), None);
        assert_eq!(decoder.decode(&[0u8; 32]), None);
    }

    #[test]
    fn test_zero_padding_before_payload_still_decodes() {
        let decoder = FrameDecoder::default();
        let hex = format!("{}1a2b3c4d5e6f7a8b9c0d1e", "0".repeat(24));
        let expected = format!("{}1", "0".repeat(23));
        assert_eq!(decoder.decode_hex(&hex), Some(expected.clone()));
        assert_eq!(decoder.decode(&hex_bytes(&hex)), Some(expected));
    }

    #[test]
    fn test_zero_run_inside_candidate_is_kept() {
        let hex = format!("{}ab", "0".repeat(22));
        assert_eq!(TagMatcher::AnyHex.find(&hex), Some(hex.clone()));
    }

    #[test]
    fn test_short_frames_do_not_decode() {
        let decoder = FrameDecoder::default();
        assert_eq!(decoder.decode(&[0xe2, 0x00, 0x11]), None);
        assert_eq!(decoder.decode(&[]), None);
    }

    #[test]
    fn test_strip_preamble() {
        let decoder = FrameDecoder::default();
        assert_eq!(decoder.strip_preamble("aa55e200"), Some("e200"));
        assert_eq!(decoder.strip_preamble("cccfff0011"), Some("0011"));
        assert_eq!(decoder.strip_preamble("e2aa55"), None);
    }

    #[test]
    fn test_preambled_frame_decodes_to_family_tag() {
        let decoder = FrameDecoder::default();
        let hex = "cccfffe2001122334455667788990a7e";
        assert_eq!(
            decoder.decode_hex(hex).as_deref(),
            Some("e2001122334455667788990a")
        );
    }

    #[test]
    fn test_decode_frame_keeps_raw() {
        let decoder = FrameDecoder::default();
        let frame = RawFrame::now(vec![0xde, 0xad]);
        let decoded = decoder.decode_frame(frame.clone());
        assert_eq!(decoded.identifier, None);
        assert_eq!(decoded.raw, frame);
    }
}
