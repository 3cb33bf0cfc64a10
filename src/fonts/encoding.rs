//! Single-byte font encodings.
//!
//! Simple (non-composite) fonts without a ToUnicode table are decoded through
//! one of these fixed tables. Latin-1 is the default assumption when the font
//! declares nothing; it is an approximation, but it is the same one the PDF
//! string machinery itself leans on.

/// Simple-font byte encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimpleEncoding {
    /// Latin-1 (ISO 8859-1): byte value is the code point.
    #[default]
    Latin1,
    /// WinAnsiEncoding (Windows-1252): Latin-1 with 0x80–0x9F overrides.
    WinAnsi,
    /// MacRomanEncoding: Apple's legacy 8-bit encoding.
    MacRoman,
}

/// Windows-1252 overrides of the 0x80–0x9F range. Bytes absent from this
/// table (0x81, 0x8D, 0x8F, 0x90, 0x9D) are undefined in Windows-1252 and
/// fall back to the Latin-1 identity.
const WIN_ANSI_OVERRIDES: &[(u8, char)] = &[
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
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
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

/// MacRoman 0x80–0xFF, indexed by `byte - 0x80`.
const MAC_ROMAN_HIGH: [char; 128] = [
    'Ä', 'Å', 'Ç', 'É', 'Ñ', 'Ö', 'Ü', 'á', 'à', 'â', 'ä', 'ã', 'å', 'ç', 'é', 'è', //
    'ê', 'ë', 'í', 'ì', 'î', 'ï', 'ñ', 'ó', 'ò', 'ô', 'ö', 'õ', 'ú', 'ù', 'û', 'ü', //
    '†', '°', '¢', '£', '§', '•', '¶', 'ß', '®', '©', '™', '´', '¨', '≠', 'Æ', 'Ø', //
    '∞', '±', '≤', '≥', '¥', 'µ', '∂', '∑', '∏', 'π', '∫', 'ª', 'º', 'Ω', 'æ', 'ø', //
    '¿', '¡', '¬', '√', 'ƒ', '≈', '∆', '«', '»', '…', '\u{00A0}', 'À', 'Ã', 'Õ', 'Œ', 'œ', //
    '–', '—', '“', '”', '‘', '’', '÷', '◊', 'ÿ', 'Ÿ', '⁄', '€', '‹', '›', 'ﬁ', 'ﬂ', //
    '‡', '·', '‚', '„', '‰', 'Â', 'Ê', 'Á', 'Ë', 'È', 'Í', 'Î', 'Ï', 'Ì', 'Ó', 'Ô', //
    '\u{F8FF}', 'Ò', 'Ú', 'Û', 'Ù', 'ı', 'ˆ', '˜', '¯', '˘', '˙', '˚', '¸', '˝', '˛', 'ˇ',
];

impl SimpleEncoding {
    /// Recognize an `Encoding` name from a font dictionary.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "WinAnsiEncoding" => Some(SimpleEncoding::WinAnsi),
            "MacRomanEncoding" => Some(SimpleEncoding::MacRoman),
            "StandardEncoding" | "PDFDocEncoding" => Some(SimpleEncoding::Latin1),
            _ => None,
        }
    }

    /// Decode one byte to a character.
    pub fn decode_byte(self, byte: u8) -> char {
        match self {
            SimpleEncoding::Latin1 => byte as char,
            SimpleEncoding::WinAnsi => {
                if (0x80..0xA0).contains(&byte) {
                    WIN_ANSI_OVERRIDES
                        .iter()
                        .find(|(b, _)| *b == byte)
                        .map(|(_, c)| *c)
                        .unwrap_or(byte as char)
                } else {
                    byte as char
                }
            }
            SimpleEncoding::MacRoman => {
                if byte < 0x80 {
                    byte as char
                } else {
                    MAC_ROMAN_HIGH[(byte - 0x80) as usize]
                }
            }
        }
    }

    /// Encode one character back to a byte, if the encoding has it.
    pub fn encode_char(self, c: char) -> Option<u8> {
        match self {
            SimpleEncoding::Latin1 => {
                let code = c as u32;
                (code <= 0xFF).then_some(code as u8)
            }
            SimpleEncoding::WinAnsi => {
                if let Some((b, _)) = WIN_ANSI_OVERRIDES.iter().find(|(_, ch)| *ch == c) {
                    return Some(*b);
                }
                let code = c as u32;
                (code <= 0xFF && !(0x80..0xA0).contains(&code)).then_some(code as u8)
            }
            SimpleEncoding::MacRoman => {
                if (c as u32) < 0x80 {
                    return Some(c as u8);
                }
                MAC_ROMAN_HIGH
                    .iter()
                    .position(|&ch| ch == c)
                    .map(|i| (i + 0x80) as u8)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_identity() {
        assert_eq!(SimpleEncoding::Latin1.decode_byte(0x41), 'A');
        assert_eq!(SimpleEncoding::Latin1.decode_byte(0xE9), 'é');
        assert_eq!(SimpleEncoding::Latin1.encode_char('é'), Some(0xE9));
        assert_eq!(SimpleEncoding::Latin1.encode_char('€'), None);
    }

    #[test]
    fn test_win_ansi_high_range() {
        assert_eq!(SimpleEncoding::WinAnsi.decode_byte(0x80), '€');
        assert_eq!(SimpleEncoding::WinAnsi.decode_byte(0x97), '—');
        assert_eq!(SimpleEncoding::WinAnsi.decode_byte(0xE9), 'é');
        assert_eq!(SimpleEncoding::WinAnsi.encode_char('€'), Some(0x80));
        assert_eq!(SimpleEncoding::WinAnsi.encode_char('—'), Some(0x97));
    }

    #[test]
    fn test_mac_roman_round_trip() {
        for byte in 0u8..=255 {
            let c = SimpleEncoding::MacRoman.decode_byte(byte);
            assert_eq!(SimpleEncoding::MacRoman.encode_char(c), Some(byte));
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            SimpleEncoding::from_name("WinAnsiEncoding"),
            Some(SimpleEncoding::WinAnsi)
        );
        assert_eq!(
            SimpleEncoding::from_name("MacRomanEncoding"),
            Some(SimpleEncoding::MacRoman)
        );
        assert_eq!(SimpleEncoding::from_name("Identity-H"), None);
    }
}
