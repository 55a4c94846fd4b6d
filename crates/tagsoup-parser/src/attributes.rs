//! Attribute parsing for raw tag tokens.
//!
//! Accepted value forms are `name="value"`, `name='value'`, `name=value`
//! and bare `name`, which takes its own name as value. A quote directly
//! after the name is treated as if the value separator were present.

use crate::source::LookaheadSource;
use crate::{ParseError, ParseResult};
use tagsoup_grammar::Grammar;
use tagsoup_tree::AttributeSet;
use tracing::debug;

struct TagReader<'a> {
    src: LookaheadSource,
    grammar: &'a dyn Grammar,
    tag_type: String,
}

impl<'a> TagReader<'a> {
    fn next(&mut self) -> ParseResult<Option<char>> {
        Ok(self.src.read()?)
    }

    fn skip_whitespace(&mut self) -> ParseResult<()> {
        while self.src.peek(0).is_some_and(|c| self.grammar.is_whitespace(c)) {
            self.src.skip(1)?;
        }
        Ok(())
    }

    /// Closing `>` or `/>` at the very end of the token.
    fn at_tag_end(&self) -> bool {
        let g = self.grammar;
        match self.src.peek(0) {
            None => true,
            Some(c) if c == g.tag_end() => self.src.peek(1).is_none(),
            Some(c) if c == g.end_tag_marker() => {
                self.src.peek(1) == Some(g.tag_end()) && self.src.peek(2).is_none()
            }
            _ => false,
        }
    }

    fn crop_name(&mut self) -> ParseResult<String> {
        let mut name = String::new();
        if !self.src.peek(0).is_some_and(|c| self.grammar.is_name_start(c)) {
            return Ok(name);
        }
        while let Some(c) = self.src.peek(0) {
            if !self.grammar.is_name_char(c) {
                break;
            }
            name.push(c);
            self.src.skip(1)?;
        }
        Ok(name)
    }

    fn crop_value(&mut self, attribute: &str) -> ParseResult<String> {
        let g = self.grammar;
        match self.src.peek(0) {
            Some(q) if g.is_quote(q) => {
                self.src.skip(1)?;
                self.crop_quoted(q, attribute)
            }
            _ => {
                let mut value = String::new();
                while !self.at_tag_end() {
                    match self.src.peek(0) {
                        Some(c) if !g.is_whitespace(c) => {
                            value.push(c);
                            self.src.skip(1)?;
                        }
                        _ => break,
                    }
                }
                Ok(value)
            }
        }
    }

    fn crop_quoted(&mut self, quote: char, attribute: &str) -> ParseResult<String> {
        let g = self.grammar;
        let mut value = String::new();
        loop {
            let breaks_here = self.at_tag_end();
            let Some(c) = self.src.peek(0) else {
                return self.unclosed(value, attribute);
            };
            if c == quote {
                self.src.skip(1)?;
                return Ok(value);
            }
            if breaks_here
                || (g.is_whitespace(c) && !g.whitespace_in_value(&self.tag_type, attribute))
            {
                return self.unclosed(value, attribute);
            }
            value.push(c);
            self.next()?;
        }
    }

    fn unclosed(&self, value: String, attribute: &str) -> ParseResult<String> {
        if !self.grammar.error_correction() {
            return Err(ParseError::MalformedQuoting {
                tag: self.tag_type.clone(),
                attribute: attribute.to_string(),
            });
        }
        debug!(tag = %self.tag_type, attribute, "Closing unterminated attribute value");
        Ok(value)
    }
}

/// Split a start or singular tag token into its case-folded tag type and
/// its attributes.
///
/// Attribute values are entity-decoded. Later duplicates overwrite earlier
/// values while keeping the first spelling of the name.
pub fn parse_tag(token: &str, grammar: &dyn Grammar) -> ParseResult<(String, AttributeSet)> {
    let mut reader = TagReader {
        src: LookaheadSource::from_text(token, grammar.lookahead_chars()),
        grammar,
        tag_type: String::new(),
    };
    if reader.src.peek(0) == Some(grammar.tag_start()) {
        reader.src.skip(1)?;
    }
    if reader.src.peek(0) == Some(grammar.end_tag_marker()) {
        reader.src.skip(1)?;
    }
    let mut name = String::new();
    while let Some(c) = reader.src.peek(0) {
        if !grammar.is_name_char(c) {
            break;
        }
        name.push(c);
        reader.src.skip(1)?;
    }
    reader.tag_type = grammar.fold_case(&name);

    let mut attributes = AttributeSet::new();
    loop {
        reader.skip_whitespace()?;
        if reader.at_tag_end() {
            break;
        }
        let name = reader.crop_name()?;
        if name.is_empty() {
            // Stray character between attributes.
            reader.src.skip(1)?;
            continue;
        }
        reader.skip_whitespace()?;
        let value = match reader.src.peek(0) {
            Some(c) if c == grammar.value_separator() => {
                reader.src.skip(1)?;
                reader.skip_whitespace()?;
                reader.crop_value(&name)?
            }
            Some(c) if grammar.is_quote(c) => reader.crop_value(&name)?,
            _ => name.clone(),
        };
        attributes.insert(name, grammar.decode(&value));
    }
    Ok((reader.tag_type, attributes))
}

/// Attributes of a tag token.
pub fn parse_attributes(token: &str, grammar: &dyn Grammar) -> ParseResult<AttributeSet> {
    parse_tag(token, grammar).map(|(_, attributes)| attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagsoup_grammar::BasicGrammar;

    #[test]
    fn test_value_forms() {
        let g = BasicGrammar::html();
        let (tag, attrs) =
            parse_tag("<INPUT type=\"text\" name='q' size=10 disabled>", &g).unwrap();
        assert_eq!(tag, "input");
        assert_eq!(attrs.get("type"), Some("text"));
        assert_eq!(attrs.get("name"), Some("q"));
        assert_eq!(attrs.get("size"), Some("10"));
        assert_eq!(attrs.get("disabled"), Some("disabled"));
        assert_eq!(
            attrs.names().collect::<Vec<_>>(),
            vec!["type", "name", "size", "disabled"]
        );
    }

    #[test]
    fn test_quote_without_separator() {
        let g = BasicGrammar::html();
        let attrs = parse_attributes("<a href\"x.html\">", &g).unwrap();
        assert_eq!(attrs.get("href"), Some("x.html"));
    }

    #[test]
    fn test_whitespace_around_separator() {
        let g = BasicGrammar::html();
        let attrs = parse_attributes("<a href = \"x\" >", &g).unwrap();
        assert_eq!(attrs.get("href"), Some("x"));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn test_values_are_decoded() {
        let g = BasicGrammar::html();
        let attrs = parse_attributes("<a title=\"a &amp; b &#34;c&#34;\">", &g).unwrap();
        assert_eq!(attrs.get("title"), Some("a & b \"c\""));
    }

    #[test]
    fn test_duplicate_keeps_first_spelling() {
        let g = BasicGrammar::html();
        let attrs = parse_attributes("<a ID=1 id=2>", &g).unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.names().collect::<Vec<_>>(), vec!["ID"]);
        assert_eq!(attrs.get("id"), Some("2"));
    }

    #[test]
    fn test_singular_tag_attributes() {
        let g = BasicGrammar::xml();
        let (tag, attrs) = parse_tag("<img src=a.png/>", &g).unwrap();
        assert_eq!(tag, "img");
        assert_eq!(attrs.get("src"), Some("a.png"));

        let (_, attrs) = parse_tag("<x flag />", &g).unwrap();
        assert_eq!(attrs.get("flag"), Some("flag"));
    }

    #[test]
    fn test_garbage_is_skipped() {
        let g = BasicGrammar::html();
        let attrs = parse_attributes("<p 9x=1 ,class=a>", &g).unwrap();
        assert_eq!(attrs.get("class"), Some("a"));
    }

    #[test]
    fn test_missing_closing_quote() {
        let g = BasicGrammar::html();
        let attrs = parse_attributes("<a title=\"open>", &g).unwrap();
        assert_eq!(attrs.get("title"), Some("open"));

        let strict = BasicGrammar::xml();
        let err = parse_attributes("<a title=\"open>", &strict).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MalformedQuoting { ref tag, ref attribute } if tag == "a" && attribute == "title"
        ));
    }

    #[test]
    fn test_whitespace_disallowed_in_value() {
        let g = BasicGrammar::html().with_whitespace_in_values(false);
        let attrs = parse_attributes("<x a=\"1 b=2>", &g).unwrap();
        assert_eq!(attrs.get("a"), Some("1"));
        assert_eq!(attrs.get("b"), Some("2"));
    }
}
