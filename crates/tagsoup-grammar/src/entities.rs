//! Character entity decoding.

use std::collections::HashMap;

lazy_static::lazy_static! {
    static ref ENTITIES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        // Markup-significant entities
        m.insert("lt", "<");
        m.insert("gt", ">");
        m.insert("amp", "&");
        m.insert("quot", "\"");
        m.insert("apos", "'");
        // Common named entities
        m.insert("nbsp", "\u{00A0}");
        m.insert("copy", "\u{00A9}");
        m.insert("reg", "\u{00AE}");
        m.insert("trade", "\u{2122}");
        m.insert("hellip", "\u{2026}");
        m.insert("mdash", "\u{2014}");
        m.insert("ndash", "\u{2013}");
        m.insert("ldquo", "\u{201C}");
        m.insert("rdquo", "\u{201D}");
        m.insert("lsquo", "\u{2018}");
        m.insert("rsquo", "\u{2019}");
        m.insert("laquo", "\u{00AB}");
        m.insert("raquo", "\u{00BB}");
        m.insert("bull", "\u{2022}");
        m.insert("middot", "\u{00B7}");
        m.insert("times", "\u{00D7}");
        m.insert("divide", "\u{00F7}");
        m.insert("euro", "\u{20AC}");
        m.insert("pound", "\u{00A3}");
        m.insert("yen", "\u{00A5}");
        m.insert("cent", "\u{00A2}");
        m.insert("deg", "\u{00B0}");
        m.insert("plusmn", "\u{00B1}");
        m.insert("micro", "\u{00B5}");
        m.insert("para", "\u{00B6}");
        m.insert("sect", "\u{00A7}");
        m.insert("frac14", "\u{00BC}");
        m.insert("frac12", "\u{00BD}");
        m.insert("frac34", "\u{00BE}");
        m.insert("sup1", "\u{00B9}");
        m.insert("sup2", "\u{00B2}");
        m.insert("sup3", "\u{00B3}");
        m.insert("auml", "\u{00E4}");
        m.insert("ouml", "\u{00F6}");
        m.insert("uuml", "\u{00FC}");
        m.insert("Auml", "\u{00C4}");
        m.insert("Ouml", "\u{00D6}");
        m.insert("Uuml", "\u{00DC}");
        m.insert("szlig", "\u{00DF}");
        m.insert("eacute", "\u{00E9}");
        m.insert("egrave", "\u{00E8}");
        m.insert("aacute", "\u{00E1}");
        m.insert("agrave", "\u{00E0}");
        m.insert("ccedil", "\u{00E7}");
        m.insert("ntilde", "\u{00F1}");
        m.insert("alpha", "\u{03B1}");
        m.insert("beta", "\u{03B2}");
        m.insert("gamma", "\u{03B3}");
        m.insert("delta", "\u{03B4}");
        m.insert("epsilon", "\u{03B5}");
        m.insert("pi", "\u{03C0}");
        m.insert("sigma", "\u{03C3}");
        m.insert("omega", "\u{03C9}");
        m
    };
}

/// Resolve a complete entity reference such as `&amp;`, `&#65;` or `&#x41;`.
///
/// Returns `None` for anything that is not a well-formed, known entity.
pub fn decode_entity(entity: &str) -> Option<String> {
    let body = entity.strip_prefix('&')?.strip_suffix(';')?;
    if body.is_empty() {
        return None;
    }
    if let Some(num_str) = body.strip_prefix('#') {
        return decode_numeric(num_str);
    }
    ENTITIES.get(body).map(|decoded| decoded.to_string())
}

/// Whether `c` may appear between `&` and `;` of an entity reference.
pub fn is_entity_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '#'
}

/// Decode every entity in `input` using `resolve`.
///
/// Entities longer than `max_len` characters, or ones `resolve` rejects,
/// are kept literally.
pub fn decode_with<F>(input: &str, max_len: usize, resolve: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '&' {
            result.push(ch);
            continue;
        }

        let mut entity = String::from("&");
        let mut found_end = false;

        while let Some(&next_ch) = chars.peek() {
            if next_ch == ';' {
                chars.next();
                entity.push(';');
                found_end = true;
                break;
            } else if is_entity_char(next_ch) {
                entity.push(next_ch);
                chars.next();
            } else {
                break;
            }

            if entity.len() > max_len {
                break;
            }
        }

        if found_end {
            if let Some(decoded) = resolve(&entity) {
                result.push_str(&decoded);
                continue;
            }
        }

        result.push_str(&entity);
    }

    result
}

/// Decode entities using the built-in table only.
pub fn decode(input: &str) -> String {
    decode_with(input, 32, decode_entity)
}

fn decode_numeric(num_str: &str) -> Option<String> {
    let (radix, digits) = match num_str.strip_prefix(['x', 'X']) {
        Some(hex) => (16, hex),
        None => (10, num_str),
    };
    if digits.is_empty() {
        return None;
    }

    let code_point = u32::from_str_radix(digits, radix).ok()?;
    char::from_u32(code_point).map(|c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic_entities() {
        assert_eq!(decode("&lt;"), "<");
        assert_eq!(decode("&gt;"), ">");
        assert_eq!(decode("&amp;"), "&");
        assert_eq!(decode("&quot;"), "\"");
        assert_eq!(decode("&apos;"), "'");
    }

    #[test]
    fn test_decode_numeric_entities() {
        assert_eq!(decode("&#65;"), "A");
        assert_eq!(decode("&#x41;"), "A");
        assert_eq!(decode("&#x1F600;"), "\u{1F600}");
    }

    #[test]
    fn test_decode_multiple_entities() {
        assert_eq!(decode("&lt;div&gt;"), "<div>");
        assert_eq!(decode("Tom &amp; Jerry"), "Tom & Jerry");
    }

    #[test]
    fn test_decode_unknown_entity() {
        assert_eq!(decode("&unknown;"), "&unknown;");
        assert_eq!(decode("&#;"), "&#;");
        assert_eq!(decode("&#x;"), "&#x;");
    }

    #[test]
    fn test_decode_incomplete_entity() {
        assert_eq!(decode("&lt"), "&lt");
        assert_eq!(decode("&"), "&");
        assert_eq!(decode("a & b"), "a & b");
    }

    #[test]
    fn test_decode_respects_length_budget() {
        assert_eq!(decode_with("&amp;", 3, decode_entity), "&amp;");
        assert_eq!(decode_with("&amp;", 8, decode_entity), "&");
    }

    #[test]
    fn test_decode_entity_requires_delimiters() {
        assert_eq!(decode_entity("&amp;"), Some("&".to_string()));
        assert_eq!(decode_entity("amp;"), None);
        assert_eq!(decode_entity("&amp"), None);
        assert_eq!(decode_entity("&;"), None);
    }

    #[test]
    fn test_decode_nbsp() {
        assert_eq!(decode("&nbsp;"), "\u{00A0}");
        assert_eq!(decode("&copy;"), "\u{00A9}");
    }
}
