//! # Tagsoup Grammar
//!
//! The grammar policy consumed by the tagsoup tokenizer and tree assembler.
//!
//! The engine knows nothing about any particular markup dialect. Every
//! structural question (which characters delimit a tag, which tags never
//! take content, which tags may nest inside which, whether malformed input
//! is repaired or reported) is answered by a [`Grammar`]. A grammar is
//! immutable once constructed and may be shared by any number of
//! concurrent parses.
//!
//! [`BasicGrammar`] is a configurable policy with [`BasicGrammar::html`]
//! and [`BasicGrammar::xml`] presets.

pub mod basic;
pub mod entities;

pub use basic::BasicGrammar;

/// Classification of a raw token string.
///
/// Tokens are plain strings; their kind is always re-derived through
/// [`Grammar::token_kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `<name ...>`
    StartTag,
    /// `</name>`
    EndTag,
    /// `<name .../>` or a grammar-declared singular element.
    SingularTag,
    /// `<!-- ... -->`
    Comment,
    /// `<! ... >`
    Dtd,
    /// `<? ... ?>`
    ProcessingInstruction,
    /// Character data.
    Text,
}

impl TokenKind {
    /// Start, end or singular tag.
    pub fn is_tag(self) -> bool {
        matches!(
            self,
            TokenKind::StartTag | TokenKind::EndTag | TokenKind::SingularTag
        )
    }

    /// Tokens that become childless nodes.
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            TokenKind::Comment | TokenKind::Dtd | TokenKind::ProcessingInstruction | TokenKind::Text
        )
    }
}

/// Markup dialect policy.
///
/// Implementors supply the primitive policy; the provided methods derive
/// classification, escaping and tag serialization from it.
pub trait Grammar: Send + Sync {
    /// Character opening every tag.
    fn tag_start(&self) -> char;

    /// Character closing every tag.
    fn tag_end(&self) -> char;

    /// Marker following [`Grammar::tag_start`] in end tags and preceding
    /// [`Grammar::tag_end`] in self-closing tags.
    fn end_tag_marker(&self) -> char;

    /// Separator written between the tag name and each attribute.
    fn attribute_separator(&self) -> char;

    /// Separator between an attribute name and its value.
    fn value_separator(&self) -> char;

    /// Characters that may quote attribute values.
    fn quote_chars(&self) -> &[char];

    /// Start and end markers of comments.
    fn comment_markers(&self) -> (&str, &str);

    /// Start and end markers of DTD declarations.
    fn dtd_markers(&self) -> (&str, &str);

    /// Start and end markers of processing instructions.
    fn pi_markers(&self) -> (&str, &str);

    /// Whitespace predicate.
    fn is_whitespace(&self, c: char) -> bool;

    /// Escape sequence for a raw character in character data, if it needs
    /// one.
    fn escape_char(&self, c: char) -> Option<&str>;

    /// Resolve a complete entity reference (`&name;`).
    fn decode_entity(&self, entity: &str) -> Option<String>;

    /// Tags that never have content or a separate end tag.
    fn is_singular(&self, tag_type: &str) -> bool;

    /// Tags whose content is opaque up to the matching end tag.
    fn wait_for_end_tag(&self, tag_type: &str) -> bool;

    /// Whether `child` may be a direct child of `parent`.
    fn can_be_child_of(&self, child: &str, parent: &str) -> bool;

    /// Whether `child` may appear anywhere below `ancestor`.
    fn can_be_embedded_in(&self, child: &str, ancestor: &str) -> bool;

    /// Repair malformed input instead of reporting it.
    fn error_correction(&self) -> bool;

    /// Whether the quoted value of `attribute` on `tag_type` may contain
    /// whitespace.
    fn whitespace_in_value(&self, tag_type: &str, attribute: &str) -> bool;

    /// Minimum number of characters the tokenizer keeps buffered.
    fn lookahead_chars(&self) -> usize;

    /// Minimum number of tokens the tokenizer keeps buffered.
    fn lookahead_tokens(&self) -> usize;

    /// Tag and attribute names are compared case-sensitively.
    fn case_sensitive(&self) -> bool;

    /// Singular tags serialize as `<name/>` rather than start/end pairs.
    fn strict_xml(&self) -> bool;

    fn is_quote(&self, c: char) -> bool {
        self.quote_chars().contains(&c)
    }

    /// Characters allowed in tag and attribute names.
    fn is_name_char(&self, c: char) -> bool {
        c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ':')
    }

    /// Characters allowed to start an attribute name.
    fn is_name_start(&self, c: char) -> bool {
        self.is_name_char(c) && !c.is_ascii_digit()
    }

    /// Whether `c`, directly after [`Grammar::tag_start`], opens a tag.
    fn is_suitable_tag_start(&self, c: char) -> bool {
        c.is_alphabetic() || c == '_' || c == ':'
    }

    /// Normalize a tag or attribute name according to case sensitivity.
    fn fold_case(&self, name: &str) -> String {
        if self.case_sensitive() {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    /// Extract the (case-folded) tag type of a tag token.
    fn tag_type(&self, token: &str) -> String {
        let mut chars = token.chars().peekable();
        if chars.peek() == Some(&self.tag_start()) {
            chars.next();
        }
        if chars.peek() == Some(&self.end_tag_marker()) {
            chars.next();
        }
        let name: String = chars.take_while(|&c| self.is_name_char(c)).collect();
        self.fold_case(&name)
    }

    /// Classify a raw token.
    fn token_kind(&self, token: &str) -> TokenKind {
        let (comment_start, comment_end) = self.comment_markers();
        if token.len() >= comment_start.len() + comment_end.len()
            && token.starts_with(comment_start)
            && token.ends_with(comment_end)
        {
            return TokenKind::Comment;
        }
        let (pi_start, pi_end) = self.pi_markers();
        if token.len() >= pi_start.len() + pi_end.len()
            && token.starts_with(pi_start)
            && token.ends_with(pi_end)
        {
            return TokenKind::ProcessingInstruction;
        }
        let (dtd_start, dtd_end) = self.dtd_markers();
        if token.len() >= dtd_start.len() + dtd_end.len()
            && token.starts_with(dtd_start)
            && token.ends_with(dtd_end)
        {
            return TokenKind::Dtd;
        }

        let mut chars = token.chars();
        if chars.next() != Some(self.tag_start()) || !token.ends_with(self.tag_end()) {
            return TokenKind::Text;
        }
        match chars.next() {
            Some(c) if c == self.end_tag_marker() => match chars.next() {
                Some(n) if self.is_suitable_tag_start(n) => TokenKind::EndTag,
                _ => TokenKind::Text,
            },
            Some(c) if self.is_suitable_tag_start(c) => {
                let mut rest = token.chars().rev();
                rest.next();
                if rest.next() == Some(self.end_tag_marker())
                    || self.is_singular(&self.tag_type(token))
                {
                    TokenKind::SingularTag
                } else {
                    TokenKind::StartTag
                }
            }
            _ => TokenKind::Text,
        }
    }

    /// Escape character data.
    fn encode(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match self.escape_char(c) {
                Some(escaped) => out.push_str(escaped),
                None => out.push(c),
            }
        }
        out
    }

    /// Escape an attribute value for quoting with `quote`.
    fn encode_attribute(&self, value: &str, quote: char) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            if c == quote {
                out.push_str(&format!("&#{};", c as u32));
            } else {
                match self.escape_char(c) {
                    Some(escaped) => out.push_str(escaped),
                    None => out.push(c),
                }
            }
        }
        out
    }

    /// Resolve every entity in `text`; unresolvable ones stay literal.
    fn decode(&self, text: &str) -> String {
        entities::decode_with(text, self.lookahead_chars(), |entity| {
            self.decode_entity(entity)
        })
    }

    /// Serialize a start tag.
    fn start_tag_text<'a>(
        &self,
        tag_type: &str,
        attributes: &mut dyn Iterator<Item = (&'a str, &'a str)>,
    ) -> String {
        let mut out = String::new();
        out.push(self.tag_start());
        out.push_str(tag_type);
        self.push_attributes(&mut out, attributes);
        out.push(self.tag_end());
        out
    }

    /// Serialize an end tag.
    fn end_tag_text(&self, tag_type: &str) -> String {
        let mut out = String::with_capacity(tag_type.len() + 3);
        out.push(self.tag_start());
        out.push(self.end_tag_marker());
        out.push_str(tag_type);
        out.push(self.tag_end());
        out
    }

    /// Serialize a self-closing tag.
    fn singular_tag_text<'a>(
        &self,
        tag_type: &str,
        attributes: &mut dyn Iterator<Item = (&'a str, &'a str)>,
    ) -> String {
        let mut out = String::new();
        out.push(self.tag_start());
        out.push_str(tag_type);
        self.push_attributes(&mut out, attributes);
        out.push(self.end_tag_marker());
        out.push(self.tag_end());
        out
    }

    fn push_attributes<'a>(
        &self,
        out: &mut String,
        attributes: &mut dyn Iterator<Item = (&'a str, &'a str)>,
    ) {
        let quote = self.quote_chars().first().copied().unwrap_or('"');
        for (name, value) in attributes {
            out.push(self.attribute_separator());
            out.push_str(name);
            out.push(self.value_separator());
            out.push(quote);
            out.push_str(&self.encode_attribute(value, quote));
            out.push(quote);
        }
    }
}
