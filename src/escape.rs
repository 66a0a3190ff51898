//! Text level codecs: backslash escaping for TEXT values, the caret
//! scheme for parameter values, separated list forms, quoted token
//! scanning and the 75-octet line folding writer.

use crate::error::{CalendarError, CalendarResult};
use crate::parser::{ParserContext, ParserPolicy};

/// Escape a TEXT value for the line-folded form.
pub fn escape_text(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ';' => out.push_str("\\;"),
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            _ => out.push(c),
        }
    }
}

#[must_use]
pub fn escaped_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    escape_text(value, &mut out);
    out
}

/// Decode a TEXT value, honoring the escape policies in `ctx`.
pub fn decode_text(value: &str, ctx: &ParserContext) -> CalendarResult<String> {
    if !value.contains('\\') {
        return Ok(value.to_owned());
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') | Some('N') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some(':') => match ctx.invalid_colon_escape_sequence {
                ParserPolicy::Raise => {
                    return Err(CalendarError::invalid_value()
                        .with_message("'\\:' escape not allowed in TEXT")
                        .with_data(value))
                }
                ParserPolicy::Fix => out.push(':'),
                _ => {}
            },
            Some(other) => match ctx.invalid_escape_sequences {
                ParserPolicy::Raise => {
                    return Err(CalendarError::invalid_value()
                        .with_message(format!("'\\{other}' escape not allowed in TEXT"))
                        .with_data(value))
                }
                ParserPolicy::Fix => out.push(other),
                _ => {}
            },
            None => break,
        }
    }
    Ok(out)
}

/// Encode a parameter value with the caret scheme.
///
/// `^n` encodes a line break, `^'` a double quote, `^^` a caret.
#[must_use]
pub fn encode_parameter_value(value: &str) -> String {
    if !value.contains(['\r', '\n', '"', '^']) {
        return value.to_owned();
    }
    let mut out = String::with_capacity(value.len() + 2);
    let mut last = '\0';
    for c in value.chars() {
        match c {
            '\r' => out.push_str("^n"),
            // A LF directly after CR was already encoded with it.
            '\n' => {
                if last != '\r' {
                    out.push_str("^n");
                }
            }
            '"' => out.push_str("^'"),
            '^' => out.push_str("^^"),
            _ => out.push(c),
        }
        last = c;
    }
    out
}

/// Decode a caret encoded parameter value. Unknown `^x` pairs pass
/// through literally.
#[must_use]
pub fn decode_parameter_value(value: &str) -> String {
    if !value.contains('^') {
        return value.to_owned();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '^' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\'') => out.push('"'),
            Some('^') => out.push('^'),
            Some(other) => {
                out.push('^');
                out.push(other);
            }
            None => out.push('^'),
        }
    }
    out
}

/// Split a separated TEXT list, honoring backslash escapes of the
/// separator, and decode each element.
pub fn parse_text_list(data: &str, sep: char, ctx: &ParserContext) -> CalendarResult<Vec<String>> {
    let mut results = Vec::new();
    let mut item = String::new();
    let mut prev = '\0';
    for c in data.chars() {
        if c == sep && prev != '\\' {
            results.push(decode_text(&item, ctx)?);
            item.clear();
        } else {
            item.push(c);
        }
        prev = c;
    }
    results.push(decode_text(&item, ctx)?);
    Ok(results)
}

/// Emit a separated TEXT list with each element escaped.
pub fn generate_text_list(values: &[String], sep: char, out: &mut String) {
    let mut first = true;
    for value in values {
        if !first {
            out.push(sep);
        }
        first = false;
        escape_text(value, out);
    }
}

/// One element of a structured (double nested) value: a list of one or
/// more comma separated strings.
pub type NestedItem = Vec<String>;

/// Parse the `;`-separated, comma sub-divided structure used by ADR
/// and N values, padding or policing against `expected` components.
pub fn parse_double_nested_list(
    data: &str,
    expected: usize,
    ctx: &ParserContext,
) -> CalendarResult<Vec<NestedItem>> {
    let mut results: Vec<NestedItem> = Vec::new();
    let mut items: Vec<String> = vec![String::new()];
    let mut prev = '\0';
    for c in data.chars() {
        if c == ';' && prev != '\\' {
            let decoded = items
                .iter()
                .map(|i| decode_text(i, ctx))
                .collect::<CalendarResult<Vec<_>>>()?;
            results.push(decoded);
            items = vec![String::new()];
        } else if c == ',' && prev != '\\' {
            items.push(String::new());
        } else {
            items.last_mut().expect("items is never empty").push(c);
        }
        prev = c;
    }
    let decoded = items
        .iter()
        .map(|i| decode_text(i, ctx))
        .collect::<CalendarResult<Vec<_>>>()?;
    results.push(decoded);

    while results.len() < expected {
        results.push(vec![String::new()]);
    }
    if results.len() > expected {
        match ctx.invalid_adr_n_values {
            ParserPolicy::Fix => results.truncate(expected),
            ParserPolicy::Raise => {
                return Err(CalendarError::invalid_value()
                    .with_message("too many components in structured value")
                    .with_data(data))
            }
            _ => {}
        }
    }
    Ok(results)
}

/// Emit the `;`-separated, comma sub-divided structure.
pub fn generate_double_nested_list(items: &[NestedItem], out: &mut String) {
    let mut first_item = true;
    for item in items {
        if !first_item {
            out.push(';');
        }
        first_item = false;
        let mut first = true;
        for part in item {
            if !first {
                out.push(',');
            }
            first = false;
            escape_text(part, out);
        }
    }
}

/// Scan the next token off `data`, stopping at any of `delims` that is
/// outside double quotes. Returns the token (quotes stripped) and the
/// remainder starting at the delimiter, or `None` for an empty token.
pub fn next_token<'a>(data: &'a str, delims: &str) -> Option<(&'a str, &'a str)> {
    let bytes = data.as_bytes();
    let mut quoted = false;
    let mut idx = 0;
    while idx < bytes.len() {
        let c = bytes[idx] as char;
        if c == '"' {
            quoted = !quoted;
        } else if !quoted && delims.contains(c) {
            break;
        }
        idx += 1;
    }
    if quoted {
        return None;
    }
    let token = &data[..idx];
    let token = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token);
    Some((token, &data[idx..]))
}

/// Fold a logical line to physical lines of at most 75 octets, with
/// continuations beginning with a single space. The fold point never
/// splits a UTF-8 code point: candidate boundaries walk backwards over
/// continuation bytes.
pub fn write_folded(line: &str, out: &mut String) {
    let bytes = line.as_bytes();
    if bytes.len() < 75 {
        out.push_str(line);
        out.push_str("\r\n");
        return;
    }
    let mut start = 0;
    let mut wrap = 74;
    while start < bytes.len() {
        let mut offset = start + wrap;
        if offset >= bytes.len() {
            out.push_str(&line[start..]);
            break;
        }
        while bytes[offset] & 0xC0 == 0x80 {
            offset -= 1;
        }
        out.push_str(&line[start..offset]);
        out.push_str("\r\n ");
        wrap = 73;
        start = offset;
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lenient() -> ParserContext {
        ParserContext::lenient()
    }

    #[test]
    fn text_escape_round_trip() {
        let raw = "a,b;c\\d\ne";
        let escaped = escaped_text(raw);
        assert_eq!(escaped, "a\\,b\\;c\\\\d\\ne");
        assert_eq!(decode_text(&escaped, &lenient()).unwrap(), raw);
    }

    #[test]
    fn capital_n_decodes_to_newline() {
        assert_eq!(decode_text("a\\Nb", &lenient()).unwrap(), "a\nb");
    }

    #[test]
    fn colon_escape_policy() {
        assert_eq!(decode_text("a\\:b", &lenient()).unwrap(), "a:b");
        assert!(decode_text("a\\:b", &ParserContext::strict()).is_err());
    }

    #[test]
    fn caret_round_trip() {
        let raw = "say \"hi\"\nand ^ up";
        let encoded = encode_parameter_value(raw);
        assert_eq!(encoded, "say ^'hi^'^nand ^^ up");
        assert_eq!(decode_parameter_value(&encoded), raw);
    }

    #[test]
    fn unknown_caret_pair_passes_through() {
        assert_eq!(decode_parameter_value("a^zb"), "a^zb");
    }

    #[test]
    fn escaped_comma_keeps_list_item_together() {
        let items = parse_text_list("a\\,b,c", ',', &lenient()).unwrap();
        assert_eq!(items, vec!["a,b", "c"]);
    }

    #[test]
    fn nested_list_pads_to_size() {
        let items = parse_double_nested_list("a;b,c", 4, &lenient()).unwrap();
        assert_eq!(
            items,
            vec![
                vec!["a".to_owned()],
                vec!["b".to_owned(), "c".to_owned()],
                vec![String::new()],
                vec![String::new()],
            ]
        );
    }

    #[test]
    fn token_scan_honors_quotes() {
        let (token, rest) = next_token("\"a;b\";X:1", ";:").unwrap();
        assert_eq!(token, "a;b");
        assert_eq!(rest, ";X:1");
    }

    #[test]
    fn folding_limits_physical_lines() {
        let line = format!("DESCRIPTION:{}", "x".repeat(200));
        let mut out = String::new();
        write_folded(&line, &mut out);
        for physical in out.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(physical.len() <= 75, "line too long: {}", physical.len());
        }
        let unfolded: String = out.replace("\r\n ", "").replace("\r\n", "");
        assert_eq!(unfolded, line);
    }

    #[test]
    fn folding_never_splits_code_points() {
        let line = format!("SUMMARY:{}", "é".repeat(100));
        let mut out = String::new();
        write_folded(&line, &mut out);
        for physical in out.split("\r\n") {
            // Would panic on a split code point when slicing above;
            // also confirm each piece is valid on its own.
            assert!(physical.len() <= 75);
            assert!(std::str::from_utf8(physical.as_bytes()).is_ok());
        }
    }
}
