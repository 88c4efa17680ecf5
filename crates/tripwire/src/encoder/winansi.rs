//! WinAnsiEncoding, the single-byte encoding used by the standard Type 1
//! fonts. Only characters with a code point here can appear in the visible
//! layer.

/// Code points 0x80..=0x9F differ from Latin-1.
const SPECIALS: [(u8, char); 27] = [
    (0x80, '€'),
    (0x82, '‚'),
    (0x83, 'ƒ'),
    (0x84, '„'),
    (0x85, '…'),
    (0x86, '†'),
    (0x87, '‡'),
    (0x88, 'ˆ'),
    (0x89, '‰'),
    (0x8A, 'Š'),
    (0x8B, '‹'),
    (0x8C, 'Œ'),
    (0x8E, 'Ž'),
    (0x91, '‘'),
    (0x92, '’'),
    (0x93, '“'),
    (0x94, '”'),
    (0x95, '•'),
    (0x96, '–'),
    (0x97, '—'),
    (0x98, '˜'),
    (0x99, '™'),
    (0x9A, 'š'),
    (0x9B, '›'),
    (0x9C, 'œ'),
    (0x9E, 'ž'),
    (0x9F, 'Ÿ'),
];

pub fn encode_char(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x09 | 0x0D | 0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => SPECIALS
            .iter()
            .find(|(_, special)| *special == c)
            .map(|(byte, _)| *byte),
    }
}

pub fn decode_byte(b: u8) -> char {
    match b {
        0x80..=0x9F => SPECIALS
            .iter()
            .find(|(byte, _)| *byte == b)
            .map(|(_, c)| *c)
            .unwrap_or(char::REPLACEMENT_CHARACTER),
        _ => b as char,
    }
}

pub fn is_encodable(c: char) -> bool {
    c == '\n' || encode_char(c).is_some()
}

pub fn encode_str(s: &str) -> Vec<u8> {
    s.chars().filter_map(encode_char).collect()
}

pub fn decode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| decode_byte(*b)).collect()
}
