//! Literal decoding and validation.
//!
//! The raw lexer keeps literal spellings verbatim; everything here turns a
//! spelling into a value. A spelling that fails digit or suffix validation
//! yields `None`, which the classifier reports as an invalid literal.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u8)]
pub enum IntegerSuffix {
    L,
    LL,
    U,
    UL,
    ULL,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u8)]
pub enum FloatSuffix {
    F,
    L,
}

/// Strip an integer suffix: `u`/`l` in either case and order, at most one
/// `u` and two `l`s.
fn strip_integer_suffix(text: &str) -> (&str, Option<IntegerSuffix>) {
    let bytes = text.as_bytes();
    let len = bytes.len();

    if len >= 3 {
        let last3 = (
            bytes[len - 3].to_ascii_lowercase(),
            bytes[len - 2].to_ascii_lowercase(),
            bytes[len - 1].to_ascii_lowercase(),
        );
        if matches!(last3, (b'u', b'l', b'l') | (b'l', b'l', b'u')) {
            return (&text[..len - 3], Some(IntegerSuffix::ULL));
        }
    }
    if len >= 2 {
        let last2 = (bytes[len - 2].to_ascii_lowercase(), bytes[len - 1].to_ascii_lowercase());
        if matches!(last2, (b'u', b'l') | (b'l', b'u')) {
            return (&text[..len - 2], Some(IntegerSuffix::UL));
        }
        if last2 == (b'l', b'l') {
            return (&text[..len - 2], Some(IntegerSuffix::LL));
        }
    }
    if len >= 1 {
        match bytes[len - 1].to_ascii_lowercase() {
            b'u' => return (&text[..len - 1], Some(IntegerSuffix::U)),
            b'l' => return (&text[..len - 1], Some(IntegerSuffix::L)),
            _ => {}
        }
    }
    (text, None)
}

/// Parse a decimal/octal/hex integer literal with optional suffix.
pub fn parse_integer_literal(text: &str) -> Option<(u64, Option<IntegerSuffix>)> {
    let (number_part, suffix) = strip_integer_suffix(text);

    if number_part == "0" {
        return Some((0, suffix));
    }

    let (base, digits) = if let Some(hex) = number_part
        .strip_prefix("0x")
        .or_else(|| number_part.strip_prefix("0X"))
    {
        (16, hex)
    } else if let Some(oct) = number_part.strip_prefix('0') {
        (8, oct)
    } else {
        (10, number_part)
    };

    if digits.is_empty() {
        return None;
    }

    let mut result: u64 = 0;
    for c in digits.chars() {
        let digit = c.to_digit(base)?;
        result = result.checked_mul(base as u64)?;
        result = result.checked_add(digit as u64)?;
    }
    Some((result, suffix))
}

/// Parse a floating literal with optional `f`/`l` suffix.
pub fn parse_float_literal(text: &str) -> Option<(f64, Option<FloatSuffix>)> {
    let (body, suffix) = match text.as_bytes().last() {
        Some(b'f') | Some(b'F') => (&text[..text.len() - 1], Some(FloatSuffix::F)),
        Some(b'l') | Some(b'L') => (&text[..text.len() - 1], Some(FloatSuffix::L)),
        _ => (text, None),
    };
    // Only literals with a point or exponent are floats; a plain digit
    // run must go through the integer path.
    if !body.contains('.') && !body.contains('e') && !body.contains('E') {
        return None;
    }
    body.parse::<f64>().ok().map(|v| (v, suffix))
}

/// Decode the escapes in a string literal body (without quotes). `None`
/// on a malformed escape.
pub fn unescape_string(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            'n' => result.push('\n'),
            't' => result.push('\t'),
            'r' => result.push('\r'),
            'b' => result.push('\u{0008}'),
            'f' => result.push('\u{000C}'),
            'v' => result.push('\u{000B}'),
            'a' => result.push('\u{0007}'),
            '\\' => result.push('\\'),
            '\'' => result.push('\''),
            '"' => result.push('"'),
            '?' => result.push('?'),
            'x' => {
                let mut val: u32 = 0;
                let mut digits = 0;
                while let Some(d) = chars.peek().and_then(|ch| ch.to_digit(16)) {
                    val = val.saturating_mul(16).saturating_add(d);
                    digits += 1;
                    chars.next();
                }
                if digits == 0 {
                    return None;
                }
                result.push(char::from_u32(val).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            c @ '0'..='7' => {
                let mut val = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|ch| ch.to_digit(8)) {
                        Some(d) => {
                            val = val * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                result.push(char::from_u32(val).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            _ => return None,
        }
    }
    Some(result)
}

/// Split a literal spelling into its optional `L` width prefix and the
/// quoted body.
pub fn split_literal_spelling(spelling: &str) -> Option<(bool, &str)> {
    let (wide, rest) = match spelling.strip_prefix('L') {
        Some(rest) => (true, rest),
        None => (false, spelling),
    };
    if rest.len() < 2 {
        return None;
    }
    let quote = rest.as_bytes()[0];
    if rest.as_bytes()[rest.len() - 1] != quote {
        return None;
    }
    Some((wide, &rest[1..rest.len() - 1]))
}

/// Decode a character literal spelling (quotes included) into its value.
/// Multi-character constants pack bytes big-endian, matching the usual
/// host-compiler behavior for `'ab'`.
pub fn parse_char_literal(spelling: &str) -> Option<u64> {
    let (_wide, body) = split_literal_spelling(spelling)?;
    let unescaped = unescape_string(body)?;
    if unescaped.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for c in unescaped.chars() {
        value = (value << 8) | (c as u64 & 0xff);
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_bases_and_suffixes() {
        assert_eq!(parse_integer_literal("0"), Some((0, None)));
        assert_eq!(parse_integer_literal("42"), Some((42, None)));
        assert_eq!(parse_integer_literal("0x3f"), Some((0x3f, None)));
        assert_eq!(parse_integer_literal("01771"), Some((0o1771, None)));
        assert_eq!(parse_integer_literal("1u"), Some((1, Some(IntegerSuffix::U))));
        assert_eq!(parse_integer_literal("1ULL"), Some((1, Some(IntegerSuffix::ULL))));
        assert_eq!(parse_integer_literal("0x3fLL"), Some((0x3f, Some(IntegerSuffix::LL))));
        assert_eq!(parse_integer_literal("1lu"), Some((1, Some(IntegerSuffix::UL))));
    }

    #[test]
    fn invalid_integers_rejected() {
        assert_eq!(parse_integer_literal("09"), None);
        assert_eq!(parse_integer_literal("0x"), None);
        assert_eq!(parse_integer_literal("12xyz"), None);
        assert_eq!(parse_integer_literal("1lll"), None);
    }

    #[test]
    fn float_literals() {
        assert_eq!(parse_float_literal("1.5"), Some((1.5, None)));
        assert_eq!(parse_float_literal("1e3"), Some((1000.0, None)));
        assert_eq!(parse_float_literal("2.0f"), Some((2.0, Some(FloatSuffix::F))));
        assert_eq!(parse_float_literal("7"), None);
    }

    #[test]
    fn char_literals_pack() {
        assert_eq!(parse_char_literal("'a'"), Some('a' as u64));
        assert_eq!(parse_char_literal("'\\n'"), Some(b'\n' as u64));
        assert_eq!(parse_char_literal("'\\x41'"), Some(0x41));
        assert_eq!(parse_char_literal("'ab'"), Some(((b'a' as u64) << 8) | b'b' as u64));
        assert_eq!(parse_char_literal("''"), None);
    }

    #[test]
    fn string_unescape() {
        assert_eq!(unescape_string("hi\\n"), Some("hi\n".to_string()));
        assert_eq!(unescape_string("\\101"), Some("A".to_string()));
        assert_eq!(unescape_string("\\x"), None);
    }
}
