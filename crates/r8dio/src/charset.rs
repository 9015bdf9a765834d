//! UTF-8 → display code page. One output byte per input character; anything
//! the controller's ROM can't show becomes `?`.

pub const PLACEHOLDER: u8 = b'?';

// U+00A0..U+00BF
const LATIN1_A0: [u8; 32] = [
    0x3f, 0xe9, 0xe4, 0xe5, 0x3f, 0xe6, 0x7c, 0x3f, //
    0xf1, 0x3f, 0x61, 0xfb, 0x3f, 0x3f, 0x3f, 0xff, //
    0xdf, 0x3f, 0x32, 0x33, 0xf4, 0x75, 0x3f, 0xa5, //
    0x3f, 0x31, 0x30, 0xfc, 0xf6, 0xf5, 0x3f, 0x9f, //
];

// U+00C0..U+00FF, accents folded where the ROM has no glyph
const LATIN1_C0: [u8; 64] = [
    0x41, 0x41, 0x8f, 0xea, 0x8e, 0x41, 0x92, 0x80, //
    0x45, 0x90, 0x45, 0x45, 0x49, 0x49, 0x49, 0x49, //
    0x44, 0x4e, 0x4f, 0x4f, 0x4f, 0xec, 0x4f, 0xf7, //
    0xee, 0x55, 0x55, 0x55, 0x9a, 0x59, 0x3f, 0x3f, //
    0x85, 0xe0, 0x83, 0xeb, 0x84, 0x61, 0x91, 0x87, //
    0x8a, 0x82, 0x88, 0x89, 0x8d, 0xe1, 0x8c, 0x8b, //
    0x64, 0x9b, 0x95, 0xe2, 0x93, 0xed, 0x94, 0xf8, //
    0xee, 0x97, 0xe3, 0x96, 0x81, 0x79, 0x3f, 0x79, //
];

// U+0390..U+03AF; capitals without a Latin lookalike sit in CGROM below 0x20
const GREEK_390: [u8; 32] = [
    0x3f, 0x41, 0x42, 0x09, 0x15, 0x45, 0x5a, 0x48, //
    0x16, 0x49, 0x4b, 0x17, 0x4d, 0x4e, 0x18, 0x4f, //
    0x19, 0x50, 0x3f, 0x1a, 0x54, 0x59, 0xef, 0x58, //
    0x1d, 0x1e, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, //
];

// U+FF60..U+FF7F (halfwidth katakana)
const HALFWIDTH_FF60: [u8; 32] = [
    0x20, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, //
    0xa8, 0xa9, 0xaa, 0xab, 0xac, 0xad, 0xae, 0xaf, //
    0xb0, 0xb1, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, //
    0xb8, 0xb9, 0xba, 0xbb, 0xbc, 0xbd, 0xbe, 0xbf, //
];

// U+FF80..U+FF9F
const HALFWIDTH_FF80: [u8; 32] = [
    0xc0, 0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, //
    0xc8, 0xc9, 0xca, 0xcb, 0xcc, 0xcd, 0xce, 0xcf, //
    0xd0, 0xd1, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, //
    0xd8, 0xd9, 0xda, 0xdb, 0xdc, 0xdd, 0xde, 0xdf, //
];

pub fn encode(text: &str) -> Vec<u8> {
    encode_bytes(text.as_bytes())
}

/// Byte-level entry point; accepts malformed input (e.g. a stream title in
/// the wrong encoding) and never reads past the end.
pub fn encode_bytes(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let declared = sequence_len(input[i]);
        let end = (i + declared).min(input.len());
        out.push(map_sequence(&input[i..end], declared));
        i = end;
    }
    out
}

/// Length announced by a lead byte. Stray continuation bytes and invalid
/// leads count as one.
fn sequence_len(lead: u8) -> usize {
    match lead {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}

fn map_sequence(seq: &[u8], declared: usize) -> u8 {
    if seq.len() < declared {
        return PLACEHOLDER;
    }
    match *seq {
        [b @ 0x20..=0x7f] => b,
        [0xc2, c @ 0xa0..=0xbf] => LATIN1_A0[(c - 0xa0) as usize],
        [0xc3, c @ 0x80..=0xbf] => LATIN1_C0[(c - 0x80) as usize],
        [0xce, c @ 0x90..=0xaf] => GREEK_390[(c - 0x90) as usize],
        [0xef, 0xbd, c @ 0xa0..=0xbf] => HALFWIDTH_FF60[(c - 0xa0) as usize],
        [0xef, 0xbe, c @ 0x80..=0x9f] => HALFWIDTH_FF80[(c - 0x80) as usize],
        _ => PLACEHOLDER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        assert_eq!(encode("AB"), vec![0x41, 0x42]);
        assert_eq!(encode(" ~"), vec![0x20, 0x7e]);
    }

    #[test]
    fn test_control_bytes_become_placeholder() {
        assert_eq!(encode("a\tb\n"), b"a?b?".to_vec());
    }

    #[test]
    fn test_table_lookups() {
        assert_eq!(encode("é"), vec![0x82]);
        assert_eq!(encode("°"), vec![0xdf]);
        assert_eq!(encode("ﾗｼﾞｵ"), vec![0xd7, 0xbc, 0xde, 0xb5]);
        assert_eq!(encode("Σ"), vec![0x1a]);
        assert_eq!(encode("Ω"), vec![0x1e]);
    }

    #[test]
    fn test_unmapped_characters_are_one_placeholder_each() {
        // hiragana (3 bytes) and an emoji (4 bytes)
        assert_eq!(encode("あ😀x"), b"??x".to_vec());
        assert_eq!(encode("\u{80}"), b"?".to_vec());
    }

    #[test]
    fn test_truncated_sequence_at_end() {
        assert_eq!(encode_bytes(&[0x41, 0xc3]), vec![0x41, PLACEHOLDER]);
        assert_eq!(encode_bytes(&[0xef, 0xbd]), vec![PLACEHOLDER]);
    }

    #[test]
    fn test_bad_continuation_consumes_declared_length() {
        // the lead claims two bytes, so 'A' is swallowed with it
        assert_eq!(encode_bytes(&[0xc3, 0x41, 0x42]), vec![PLACEHOLDER, 0x42]);
        // stray continuation byte on its own
        assert_eq!(encode_bytes(&[0x9f, 0x41]), vec![PLACEHOLDER, 0x41]);
    }
}
