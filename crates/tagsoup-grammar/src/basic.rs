//! A configurable grammar with HTML and XML presets.

use crate::{entities, Grammar};
use std::collections::{HashMap, HashSet};

/// Void elements that cannot have children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose content is raw text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "xmp", "iframe", "noembed", "noframes"];

/// Elements that cause implicit closure of p elements.
const P_CLOSING_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "fieldset", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hgroup", "hr",
    "main", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// Direct children each element refuses, as `(parent, children)`.
const HTML_FORBIDDEN_CHILDREN: &[(&str, &[&str])] = &[
    ("li", &["li"]),
    ("dt", &["dt", "dd"]),
    ("dd", &["dt", "dd"]),
    ("option", &["option", "optgroup"]),
    ("tr", &["tr"]),
    ("td", &["td", "th", "tr"]),
    ("th", &["td", "th", "tr"]),
];

/// Elements that may not occur anywhere below an ancestor, as
/// `(ancestor, descendants)`.
const HTML_FORBIDDEN_NESTING: &[(&str, &[&str])] = &[
    ("p", P_CLOSING_ELEMENTS),
    ("a", &["a"]),
    ("form", &["form"]),
    ("button", &["button"]),
];

const QUOTES: [char; 2] = ['"', '\''];

/// Grammar configured through builder methods.
///
/// ```
/// use tagsoup_grammar::{BasicGrammar, Grammar};
///
/// let grammar = BasicGrammar::html().with_error_correction(false);
/// assert!(!grammar.error_correction());
/// assert!(grammar.is_singular("br"));
/// ```
#[derive(Debug, Clone)]
pub struct BasicGrammar {
    error_correction: bool,
    lookahead_chars: usize,
    lookahead_tokens: usize,
    case_sensitive: bool,
    strict_xml: bool,
    whitespace_in_values: bool,
    singular_tags: HashSet<String>,
    wait_for_end_tags: HashSet<String>,
    forbidden_children: HashMap<String, HashSet<String>>,
    forbidden_nesting: HashMap<String, HashSet<String>>,
}

impl Default for BasicGrammar {
    fn default() -> Self {
        Self::html()
    }
}

impl BasicGrammar {
    /// A dialect-free grammar: `<`/`>` delimiters, no singular, opaque or
    /// nesting rules, error correction on.
    pub fn plain() -> Self {
        Self {
            error_correction: true,
            lookahead_chars: 64,
            lookahead_tokens: 2,
            case_sensitive: false,
            strict_xml: false,
            whitespace_in_values: true,
            singular_tags: HashSet::new(),
            wait_for_end_tags: HashSet::new(),
            forbidden_children: HashMap::new(),
            forbidden_nesting: HashMap::new(),
        }
    }

    /// Lenient HTML-style grammar.
    pub fn html() -> Self {
        let mut grammar = Self::plain()
            .with_singular_tags(VOID_ELEMENTS.iter().copied())
            .with_wait_for_end_tags(RAW_TEXT_ELEMENTS.iter().copied());
        for (parent, children) in HTML_FORBIDDEN_CHILDREN {
            grammar = grammar.with_forbidden_children(parent, children.iter().copied());
        }
        for (ancestor, descendants) in HTML_FORBIDDEN_NESTING {
            grammar = grammar.with_forbidden_nesting(ancestor, descendants.iter().copied());
        }
        grammar
    }

    /// Strict XML-style grammar: case-sensitive names, `<x/>` singular
    /// tags, malformed input reported rather than repaired.
    pub fn xml() -> Self {
        Self {
            error_correction: false,
            case_sensitive: true,
            strict_xml: true,
            ..Self::plain()
        }
    }

    /// Enable or disable error correction.
    pub fn with_error_correction(mut self, enabled: bool) -> Self {
        self.error_correction = enabled;
        self
    }

    /// Set the character lookahead budget.
    pub fn with_lookahead_chars(mut self, chars: usize) -> Self {
        self.lookahead_chars = chars.max(8);
        self
    }

    /// Set the token lookahead budget.
    pub fn with_lookahead_tokens(mut self, tokens: usize) -> Self {
        self.lookahead_tokens = tokens;
        self
    }

    /// Compare names case-sensitively.
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Serialize singular tags as `<name/>`.
    pub fn with_strict_xml(mut self, strict: bool) -> Self {
        self.strict_xml = strict;
        self
    }

    /// Allow whitespace inside quoted attribute values.
    pub fn with_whitespace_in_values(mut self, allowed: bool) -> Self {
        self.whitespace_in_values = allowed;
        self
    }

    /// Declare tags that never take content.
    pub fn with_singular_tags<'a>(mut self, tags: impl IntoIterator<Item = &'a str>) -> Self {
        for tag in tags {
            let tag = self.fold_case(tag);
            self.singular_tags.insert(tag);
        }
        self
    }

    /// Declare tags whose content is opaque up to their end tag.
    pub fn with_wait_for_end_tags<'a>(mut self, tags: impl IntoIterator<Item = &'a str>) -> Self {
        for tag in tags {
            let tag = self.fold_case(tag);
            self.wait_for_end_tags.insert(tag);
        }
        self
    }

    /// Forbid `children` as direct children of `parent`.
    pub fn with_forbidden_children<'a>(
        mut self,
        parent: &str,
        children: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let parent = self.fold_case(parent);
        let folded: Vec<String> = children.into_iter().map(|c| self.fold_case(c)).collect();
        self.forbidden_children
            .entry(parent)
            .or_default()
            .extend(folded);
        self
    }

    /// Forbid `descendants` anywhere below `ancestor`.
    pub fn with_forbidden_nesting<'a>(
        mut self,
        ancestor: &str,
        descendants: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let ancestor = self.fold_case(ancestor);
        let folded: Vec<String> = descendants.into_iter().map(|c| self.fold_case(c)).collect();
        self.forbidden_nesting
            .entry(ancestor)
            .or_default()
            .extend(folded);
        self
    }
}

impl Grammar for BasicGrammar {
    fn tag_start(&self) -> char {
        '<'
    }

    fn tag_end(&self) -> char {
        '>'
    }

    fn end_tag_marker(&self) -> char {
        '/'
    }

    fn attribute_separator(&self) -> char {
        ' '
    }

    fn value_separator(&self) -> char {
        '='
    }

    fn quote_chars(&self) -> &[char] {
        &QUOTES
    }

    fn comment_markers(&self) -> (&str, &str) {
        ("<!--", "-->")
    }

    fn dtd_markers(&self) -> (&str, &str) {
        ("<!", ">")
    }

    fn pi_markers(&self) -> (&str, &str) {
        ("<?", "?>")
    }

    fn is_whitespace(&self, c: char) -> bool {
        matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0C')
    }

    fn escape_char(&self, c: char) -> Option<&str> {
        match c {
            '&' => Some("&amp;"),
            '<' => Some("&lt;"),
            '>' => Some("&gt;"),
            _ => None,
        }
    }

    fn decode_entity(&self, entity: &str) -> Option<String> {
        entities::decode_entity(entity)
    }

    fn is_singular(&self, tag_type: &str) -> bool {
        self.singular_tags.contains(tag_type)
    }

    fn wait_for_end_tag(&self, tag_type: &str) -> bool {
        self.wait_for_end_tags.contains(tag_type)
    }

    fn can_be_child_of(&self, child: &str, parent: &str) -> bool {
        self.forbidden_children
            .get(parent)
            .map_or(true, |children| !children.contains(child))
    }

    fn can_be_embedded_in(&self, child: &str, ancestor: &str) -> bool {
        self.forbidden_nesting
            .get(ancestor)
            .map_or(true, |descendants| !descendants.contains(child))
    }

    fn error_correction(&self) -> bool {
        self.error_correction
    }

    fn whitespace_in_value(&self, _tag_type: &str, _attribute: &str) -> bool {
        self.whitespace_in_values
    }

    fn lookahead_chars(&self) -> usize {
        self.lookahead_chars
    }

    fn lookahead_tokens(&self) -> usize {
        self.lookahead_tokens
    }

    fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn strict_xml(&self) -> bool {
        self.strict_xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_preset() {
        let g = BasicGrammar::html();
        assert!(g.error_correction());
        assert!(g.is_singular("br"));
        assert!(g.is_singular("img"));
        assert!(!g.is_singular("div"));
        assert!(g.wait_for_end_tag("script"));
        assert!(!g.case_sensitive());
        assert!(!g.strict_xml());
    }

    #[test]
    fn test_xml_preset() {
        let g = BasicGrammar::xml();
        assert!(!g.error_correction());
        assert!(g.case_sensitive());
        assert!(g.strict_xml());
        assert!(!g.is_singular("br"));
        assert!(!g.wait_for_end_tag("script"));
    }

    #[test]
    fn test_nesting_rules() {
        let g = BasicGrammar::html();
        assert!(!g.can_be_child_of("li", "li"));
        assert!(g.can_be_child_of("ul", "li"));
        assert!(!g.can_be_embedded_in("div", "p"));
        assert!(!g.can_be_embedded_in("p", "p"));
        assert!(g.can_be_embedded_in("span", "p"));
        assert!(!g.can_be_embedded_in("a", "a"));
    }

    #[test]
    fn test_builder_folds_case() {
        let g = BasicGrammar::plain()
            .with_singular_tags(["HR"])
            .with_forbidden_children("UL", ["Div"]);
        assert!(g.is_singular("hr"));
        assert!(!g.can_be_child_of("div", "ul"));

        let x = BasicGrammar::xml().with_singular_tags(["Img"]);
        assert!(x.is_singular("Img"));
        assert!(!x.is_singular("img"));
    }

    #[test]
    fn test_lookahead_floor() {
        let g = BasicGrammar::plain().with_lookahead_chars(1);
        assert_eq!(g.lookahead_chars(), 8);
    }

    #[test]
    fn test_whitespace_predicate() {
        let g = BasicGrammar::default();
        assert!(g.is_whitespace('\t'));
        assert!(g.is_whitespace('\x0C'));
        assert!(!g.is_whitespace('x'));
    }
}
