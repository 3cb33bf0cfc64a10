//! Content-stream token parser and writer.
//!
//! Decodes a page's raw content-stream bytes into an ordered sequence of
//! operators with typed operands, and serializes such a sequence back using
//! the same grammar. Malformed syntax is a hard failure: resuming after an
//! unrecognized construct risks misreading every operand that follows, which
//! would corrupt the page on rewrite.

use crate::error::{Error, Result};

/// A typed operand of a content-stream operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Literal string `(...)`, stored with escapes resolved.
    Str(Vec<u8>),
    /// Hex string `<...>`, stored as decoded bytes.
    HexStr(Vec<u8>),
    /// Name without the leading slash, `#`-escapes resolved.
    Name(Vec<u8>),
    Array(Vec<Operand>),
    Dict(Vec<(Vec<u8>, Operand)>),
}

impl Operand {
    /// String payload, if this operand carries one.
    pub fn as_string_bytes(&self) -> Option<&[u8]> {
        match self {
            Operand::Str(b) | Operand::HexStr(b) => Some(b),
            _ => None,
        }
    }
}

/// One content-stream instruction: operands followed by an operator.
///
/// A trailing group of operands with no operator (truncated stream tail) is
/// kept as an `Op` with an empty operator name and re-emitted verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub operator: String,
    pub operands: Vec<Operand>,
    /// Raw binary payload between `ID` and `EI` for inline images.
    pub inline_data: Option<Vec<u8>>,
}

impl Op {
    pub fn new(operator: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            operator: operator.into(),
            operands,
            inline_data: None,
        }
    }
}

/// The four text-showing operators.
pub fn is_text_showing(operator: &str) -> bool {
    matches!(operator, "Tj" | "TJ" | "'" | "\"")
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum RawToken {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Str(Vec<u8>),
    HexStr(Vec<u8>),
    Name(Vec<u8>),
    Keyword(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a [u8]) -> Self {
        Lexer { input, pos: 0 }
    }

    fn next_token(&mut self) -> Result<Option<RawToken>> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.input.len() {
            return Ok(None);
        }

        let byte = self.input[self.pos];
        self.pos += 1;
        match byte {
            b'[' => Ok(Some(RawToken::ArrayStart)),
            b']' => Ok(Some(RawToken::ArrayEnd)),
            b'<' if self.peek() == Some(b'<') => {
                self.pos += 1;
                Ok(Some(RawToken::DictStart))
            }
            b'>' if self.peek() == Some(b'>') => {
                self.pos += 1;
                Ok(Some(RawToken::DictEnd))
            }
            b'(' => Ok(Some(RawToken::Str(self.read_literal_string()?))),
            b'<' => Ok(Some(RawToken::HexStr(self.read_hex_string()?))),
            b'/' => Ok(Some(RawToken::Name(self.read_name()))),
            b'+' | b'-' | b'.' | b'0'..=b'9' => Ok(Some(self.read_number(byte)?)),
            b')' | b'>' | b'{' | b'}' => Err(Error::ContentParse(format!(
                "unexpected '{}' at offset {}",
                byte as char,
                self.pos - 1
            ))),
            _ if is_regular(byte) => {
                let word = self.read_word(byte);
                Ok(Some(match word.as_str() {
                    "true" => RawToken::Boolean(true),
                    "false" => RawToken::Boolean(false),
                    "null" => RawToken::Null,
                    _ => RawToken::Keyword(word),
                }))
            }
            _ => Err(Error::ContentParse(format!(
                "unknown byte 0x{:02X} at offset {}",
                byte,
                self.pos - 1
            ))),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.input.len() && is_whitespace(self.input[self.pos]) {
                self.pos += 1;
            }
            if self.pos < self.input.len() && self.input[self.pos] == b'%' {
                while self.pos < self.input.len() && self.input[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn read_literal_string(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut depth = 1;
        while self.pos < self.input.len() {
            let byte = self.input[self.pos];
            self.pos += 1;
            match byte {
                b'\\' => {
                    let Some(next) = self.peek() else {
                        break;
                    };
                    self.pos += 1;
                    match next {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'\\' => out.push(b'\\'),
                        b'(' => out.push(b'('),
                        b')' => out.push(b')'),
                        // Escaped end-of-line is a line continuation.
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut val = (next - b'0') as u16;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(b @ b'0'..=b'7') => {
                                        self.pos += 1;
                                        val = (val << 3) | (b - b'0') as u16;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((val & 0xFF) as u8);
                        }
                        other => out.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    out.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push(byte);
                }
                _ => out.push(byte),
            }
        }
        Err(Error::ContentParse("unterminated literal string".to_string()))
    }

    fn read_hex_string(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut pending_nibble: Option<u8> = None;
        while self.pos < self.input.len() {
            let byte = self.input[self.pos];
            self.pos += 1;
            if byte == b'>' {
                // Odd nibble count: the final digit's low nibble is zero.
                if let Some(high) = pending_nibble {
                    out.push(high << 4);
                }
                return Ok(out);
            }
            if is_whitespace(byte) {
                continue;
            }
            match hex_nibble(byte) {
                Some(nibble) => {
                    if let Some(high) = pending_nibble.take() {
                        out.push((high << 4) | nibble);
                    } else {
                        pending_nibble = Some(nibble);
                    }
                }
                None => {
                    return Err(Error::ContentParse(format!(
                        "invalid hex digit 0x{:02X} in hex string",
                        byte
                    )))
                }
            }
        }
        Err(Error::ContentParse("unterminated hex string".to_string()))
    }

    fn read_name(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while self.pos < self.input.len() {
            let byte = self.input[self.pos];
            if is_delim(byte) || is_whitespace(byte) {
                break;
            }
            self.pos += 1;
            // `#xx` escapes; malformed escapes are kept literally, as the
            // container library does.
            if byte == b'#' && self.pos + 1 < self.input.len() {
                let (h, l) = (self.input[self.pos], self.input[self.pos + 1]);
                if let (Some(high), Some(low)) = (hex_nibble(h), hex_nibble(l)) {
                    out.push((high << 4) | low);
                    self.pos += 2;
                    continue;
                }
            }
            out.push(byte);
        }
        out
    }

    fn read_number(&mut self, first: u8) -> Result<RawToken> {
        let mut out = vec![first];
        while self.pos < self.input.len() {
            let byte = self.input[self.pos];
            if is_delim(byte) || is_whitespace(byte) {
                break;
            }
            out.push(byte);
            self.pos += 1;
        }
        let s = String::from_utf8(out)
            .map_err(|_| Error::ContentParse("non-ASCII bytes in number".to_string()))?;
        if s.contains('.') {
            s.parse::<f64>()
                .map(RawToken::Real)
                .map_err(|_| Error::ContentParse(format!("invalid number '{}'", s)))
        } else {
            s.parse::<i64>()
                .map(RawToken::Integer)
                .map_err(|_| Error::ContentParse(format!("invalid number '{}'", s)))
        }
    }

    fn read_word(&mut self, first: u8) -> String {
        let mut out = vec![first];
        while self.pos < self.input.len() {
            let byte = self.input[self.pos];
            if is_delim(byte) || is_whitespace(byte) {
                break;
            }
            out.push(byte);
            self.pos += 1;
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Consume inline-image dictionary entries after `BI`, then the binary
    /// payload between `ID` and `EI`.
    fn read_inline_image(&mut self) -> Result<(Vec<(Vec<u8>, Operand)>, Vec<u8>)> {
        let mut pairs = Vec::new();
        loop {
            let tok = self.next_token()?.ok_or_else(|| {
                Error::ContentParse("unterminated inline image header".to_string())
            })?;
            match tok {
                RawToken::Keyword(kw) if kw == "ID" => break,
                RawToken::Name(key) => {
                    let val_tok = self.next_token()?.ok_or_else(|| {
                        Error::ContentParse("unterminated inline image header".to_string())
                    })?;
                    let value = collect_value(val_tok, self)?;
                    pairs.push((key, value));
                }
                other => {
                    return Err(Error::ContentParse(format!(
                        "unexpected token in inline image header: {:?}",
                        other
                    )))
                }
            }
        }

        // One whitespace byte separates ID from the data.
        if self.peek() == Some(b'\r') {
            self.pos += 1;
            if self.peek() == Some(b'\n') {
                self.pos += 1;
            }
        } else if self.peek().is_some_and(is_whitespace) {
            self.pos += 1;
        }

        let start = self.pos;
        let mut i = self.pos;
        while i + 1 < self.input.len() {
            if self.input[i] == b'E' && self.input[i + 1] == b'I' {
                let prev_ok = i > start && is_whitespace(self.input[i - 1]);
                let next_ok = i + 2 >= self.input.len()
                    || is_whitespace(self.input[i + 2])
                    || is_delim(self.input[i + 2]);
                if prev_ok && next_ok {
                    let data = self.input[start..i - 1].to_vec();
                    self.pos = i + 2;
                    return Ok((pairs, data));
                }
            }
            i += 1;
        }
        Err(Error::ContentParse("unterminated inline image data".to_string()))
    }
}

/// Build a full operand value from a raw token, recursing into arrays and
/// dictionaries.
fn collect_value(tok: RawToken, lexer: &mut Lexer) -> Result<Operand> {
    match tok {
        RawToken::Null => Ok(Operand::Null),
        RawToken::Boolean(b) => Ok(Operand::Boolean(b)),
        RawToken::Integer(i) => Ok(Operand::Integer(i)),
        RawToken::Real(r) => Ok(Operand::Real(r)),
        RawToken::Str(s) => Ok(Operand::Str(s)),
        RawToken::HexStr(s) => Ok(Operand::HexStr(s)),
        RawToken::Name(n) => Ok(Operand::Name(n)),
        RawToken::ArrayStart => {
            let mut items = Vec::new();
            loop {
                match lexer.next_token()? {
                    None => return Err(Error::ContentParse("unterminated array".to_string())),
                    Some(RawToken::ArrayEnd) => return Ok(Operand::Array(items)),
                    Some(RawToken::Keyword(kw)) => {
                        return Err(Error::ContentParse(format!(
                            "unexpected keyword '{}' inside array",
                            kw
                        )))
                    }
                    Some(other) => items.push(collect_value(other, lexer)?),
                }
            }
        }
        RawToken::DictStart => {
            let mut pairs = Vec::new();
            loop {
                match lexer.next_token()? {
                    None => {
                        return Err(Error::ContentParse("unterminated dictionary".to_string()))
                    }
                    Some(RawToken::DictEnd) => return Ok(Operand::Dict(pairs)),
                    Some(RawToken::Name(key)) => {
                        let val_tok = lexer.next_token()?.ok_or_else(|| {
                            Error::ContentParse("unterminated dictionary".to_string())
                        })?;
                        pairs.push((key, collect_value(val_tok, lexer)?));
                    }
                    Some(other) => {
                        return Err(Error::ContentParse(format!(
                            "dictionary key must be a name, got {:?}",
                            other
                        )))
                    }
                }
            }
        }
        RawToken::ArrayEnd => Err(Error::ContentParse("unbalanced ']'".to_string())),
        RawToken::DictEnd => Err(Error::ContentParse("unbalanced '>>'".to_string())),
        RawToken::Keyword(kw) => Err(Error::ContentParse(format!(
            "keyword '{}' used as operand",
            kw
        ))),
    }
}

/// Parse raw content-stream bytes into an ordered operator sequence.
pub fn parse(data: &[u8]) -> Result<Vec<Op>> {
    let mut lexer = Lexer::new(data);
    let mut ops = Vec::new();
    let mut operands: Vec<Operand> = Vec::new();

    while let Some(tok) = lexer.next_token()? {
        match tok {
            RawToken::Keyword(kw) if kw == "BI" => {
                if !operands.is_empty() {
                    return Err(Error::ContentParse(
                        "operands before inline image".to_string(),
                    ));
                }
                let (pairs, data) = lexer.read_inline_image()?;
                ops.push(Op {
                    operator: "BI".to_string(),
                    operands: vec![Operand::Dict(pairs)],
                    inline_data: Some(data),
                });
            }
            RawToken::Keyword(kw) => {
                ops.push(Op::new(kw, std::mem::take(&mut operands)));
            }
            other => operands.push(collect_value(other, &mut lexer)?),
        }
    }

    // A truncated tail of operands is preserved rather than dropped, so the
    // rewritten stream stays byte-for-byte faithful outside text runs.
    if !operands.is_empty() {
        ops.push(Op::new("", operands));
    }
    Ok(ops)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Serialize an operator sequence back to content-stream bytes.
pub fn serialize(ops: &[Op]) -> Vec<u8> {
    let mut out = Vec::new();
    for op in ops {
        if let Some(data) = &op.inline_data {
            out.extend_from_slice(b"BI");
            if let Some(Operand::Dict(pairs)) = op.operands.first() {
                for (key, value) in pairs {
                    out.push(b' ');
                    write_name(&mut out, key);
                    out.push(b' ');
                    write_operand(&mut out, value);
                }
            }
            out.extend_from_slice(b" ID\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\nEI\n");
            continue;
        }
        for operand in &op.operands {
            write_operand(&mut out, operand);
            out.push(b' ');
        }
        out.extend_from_slice(op.operator.as_bytes());
        out.push(b'\n');
    }
    out
}

fn write_operand(out: &mut Vec<u8>, operand: &Operand) {
    match operand {
        Operand::Null => out.extend_from_slice(b"null"),
        Operand::Boolean(true) => out.extend_from_slice(b"true"),
        Operand::Boolean(false) => out.extend_from_slice(b"false"),
        Operand::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Operand::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
        Operand::Str(s) => write_literal_string(out, s),
        Operand::HexStr(s) => {
            out.push(b'<');
            for b in s {
                out.extend_from_slice(format!("{:02X}", b).as_bytes());
            }
            out.push(b'>');
        }
        Operand::Name(n) => write_name(out, n),
        Operand::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_operand(out, item);
            }
            out.push(b']');
        }
        Operand::Dict(pairs) => {
            out.extend_from_slice(b"<<");
            for (key, value) in pairs {
                out.push(b' ');
                write_name(out, key);
                out.push(b' ');
                write_operand(out, value);
            }
            out.extend_from_slice(b" >>");
        }
    }
}

fn write_literal_string(out: &mut Vec<u8>, s: &[u8]) {
    out.push(b'(');
    for &b in s {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0C => out.extend_from_slice(b"\\f"),
            b if b < 0x20 => out.extend_from_slice(format!("\\{:03o}", b).as_bytes()),
            b => out.push(b),
        }
    }
    out.push(b')');
}

fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &b in name {
        if b == b'#' || b < 0x21 || b > 0x7E || is_delim(b) {
            out.extend_from_slice(format!("#{:02X}", b).as_bytes());
        } else {
            out.push(b);
        }
    }
}

// Whole values keep a decimal point so they reparse as reals, not integers.
fn format_real(r: f64) -> String {
    if r == r.trunc() && r.abs() < 1e15 {
        format!("{}.0", r as i64)
    } else {
        format!("{}", r)
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\x00' | b'\x09' | b'\x0A' | b'\x0C' | b'\x0D' | b' ')
}

fn is_delim(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(byte: u8) -> bool {
    !(is_delim(byte) || is_whitespace(byte))
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_text_operators() {
        let ops = parse(b"BT /F1 12 Tf (Hello) Tj ET").unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].operator, "BT");
        assert_eq!(ops[1].operator, "Tf");
        assert_eq!(
            ops[1].operands,
            vec![Operand::Name(b"F1".to_vec()), Operand::Integer(12)]
        );
        assert_eq!(ops[2].operator, "Tj");
        assert_eq!(ops[2].operands, vec![Operand::Str(b"Hello".to_vec())]);
        assert_eq!(ops[3].operator, "ET");
    }

    #[test]
    fn test_tj_array_with_kerning() {
        let ops = parse(b"[(He) -20 (llo)] TJ").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operator, "TJ");
        assert_eq!(
            ops[0].operands,
            vec![Operand::Array(vec![
                Operand::Str(b"He".to_vec()),
                Operand::Integer(-20),
                Operand::Str(b"llo".to_vec()),
            ])]
        );
    }

    #[test]
    fn test_string_escapes() {
        let ops = parse(b"(a\\(b\\)c\\n\\101) Tj").unwrap();
        assert_eq!(ops[0].operands, vec![Operand::Str(b"a(b)c\nA".to_vec())]);
    }

    #[test]
    fn test_nested_parens_unescaped() {
        let ops = parse(b"(a (b) c) Tj").unwrap();
        assert_eq!(ops[0].operands, vec![Operand::Str(b"a (b) c".to_vec())]);
    }

    #[test]
    fn test_hex_string() {
        let ops = parse(b"<48656C6C 6F> Tj").unwrap();
        assert_eq!(ops[0].operands, vec![Operand::HexStr(b"Hello".to_vec())]);
    }

    #[test]
    fn test_hex_string_odd_nibble() {
        let ops = parse(b"<48656C6C 6F7> Tj").unwrap();
        assert_eq!(
            ops[0].operands,
            vec![Operand::HexStr(vec![0x48, 0x65, 0x6C, 0x6C, 0x6F, 0x70])]
        );
    }

    #[test]
    fn test_dict_operand() {
        let ops = parse(b"/Span << /ActualText (x) >> BDC EMC").unwrap();
        assert_eq!(ops[0].operator, "BDC");
        assert_eq!(ops[0].operands.len(), 2);
        assert_eq!(
            ops[0].operands[1],
            Operand::Dict(vec![(b"ActualText".to_vec(), Operand::Str(b"x".to_vec()))])
        );
    }

    #[test]
    fn test_unterminated_string_is_fatal() {
        let err = parse(b"(no closing paren Tj").unwrap_err();
        assert!(matches!(err, Error::ContentParse(_)));
    }

    #[test]
    fn test_unterminated_array_is_fatal() {
        let err = parse(b"[(a) (b) TJ").unwrap_err();
        assert!(matches!(err, Error::ContentParse(_)));
    }

    #[test]
    fn test_stray_delimiter_is_fatal() {
        assert!(parse(b"{ 0 1 }").is_err());
        assert!(parse(b") Tj").is_err());
    }

    #[test]
    fn test_invalid_number_is_fatal() {
        assert!(parse(b"1.2.3 Tj").is_err());
    }

    #[test]
    fn test_comment_skipped() {
        let ops = parse(b"% a comment\n(x) Tj").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operator, "Tj");
    }

    #[test]
    fn test_trailing_operands_preserved() {
        let ops = parse(b"(a) Tj 1 0 0 1").unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].operator, "");
        assert_eq!(ops[1].operands.len(), 4);
        let bytes = serialize(&ops);
        let reparsed = parse(&bytes).unwrap();
        assert_eq!(reparsed, ops);
    }

    #[test]
    fn test_serialize_round_trip() {
        let src: &[u8] =
            b"BT /F1 12 Tf 72 720 Td (Hello \\(World\\)) Tj [(a) -120 (b)] TJ ET q 1 0 0 1 10 10 cm Q";
        let ops = parse(src).unwrap();
        let bytes = serialize(&ops);
        let reparsed = parse(&bytes).unwrap();
        assert_eq!(reparsed, ops);
    }

    #[test]
    fn test_inline_image_round_trip() {
        let src: &[u8] = b"BI /W 2 /H 2 /BPC 8 ID \x00\x01\xFF\x03 EI Q";
        let ops = parse(src).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operator, "BI");
        assert_eq!(ops[0].inline_data.as_deref(), Some(&b"\x00\x01\xFF\x03"[..]));
        assert_eq!(ops[1].operator, "Q");
        let bytes = serialize(&ops);
        let reparsed = parse(&bytes).unwrap();
        assert_eq!(reparsed[0].inline_data, ops[0].inline_data);
    }

    #[test]
    fn test_real_formatting() {
        let ops = parse(b"0.5 -.25 10. w").unwrap();
        let bytes = serialize(&ops);
        // Whole reals keep their decimal point and stay reals on reparse.
        assert_eq!(bytes, b"0.5 -0.25 10.0 w\n".to_vec());
        assert_eq!(parse(&bytes).unwrap(), ops);
    }
}
