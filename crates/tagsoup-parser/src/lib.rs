//! # Tagsoup Parser
//!
//! Error-tolerant tokenizer and tree assembler for SGML-family markup.
//!
//! Input flows through three layers:
//!
//! - [`source::LookaheadSource`] buffers characters and offers a bounded
//!   lookahead window.
//! - [`tokenizer::Tokenizer`] turns characters into raw token strings,
//!   repairing malformed markup when the grammar asks for it.
//! - [`parser::Parser`] assembles tokens into a [`tagsoup_tree::Tree`],
//!   closing unbalanced tags and enforcing the grammar's nesting rules.
//!
//! The assembler runs in one of three modes: build the whole tree, stream
//! tokens to a [`TokenSink`] while discarding finished subtrees, or queue
//! tokens for the caller to pull.

pub mod attributes;
pub mod parser;
pub mod source;
pub mod tokenizer;

use std::path::Path;

use tagsoup_grammar::Grammar;
use tagsoup_tree::Tree;
use thiserror::Error;

pub use attributes::{parse_attributes, parse_tag};
pub use parser::{Build, EmittedToken, Output, ParseStats, Parser, Pull, Stream};
pub use source::LookaheadSource;
pub use tokenizer::Tokenizer;

/// Errors that can occur during parsing.
///
/// Everything except [`ParseError::Io`] is a structural condition that is
/// only reported when the grammar disables error correction.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("</{closed_by}> closed unclosed tags: {}", missing.join(", "))]
    MissingEndTags {
        closed_by: String,
        /// Innermost first.
        missing: Vec<String>,
    },

    #[error("unexpected end tag </{tag}>")]
    UnexpectedEndTag { tag: String },

    #[error("<{child}> may not appear inside <{parent}>")]
    InvalidNesting { parent: String, child: String },

    #[error("malformed quoting in attribute '{attribute}' of <{tag}>")]
    MalformedQuoting { tag: String, attribute: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Whether parsing can continue with the next token.
    ///
    /// Structural errors leave the parser state untouched; I/O errors end
    /// the input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ParseError::Io(_))
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Receiver of the token stream in streaming mode.
///
/// `depth` is the number of open elements enclosing the token.
pub trait TokenSink {
    /// Called for every emitted token, in document order.
    fn accept(&mut self, token: &str, depth: usize) -> ParseResult<()>;

    /// Called once after the last token.
    fn close(&mut self) -> ParseResult<()> {
        Ok(())
    }
}

impl<K: TokenSink + ?Sized> TokenSink for &mut K {
    fn accept(&mut self, token: &str, depth: usize) -> ParseResult<()> {
        (**self).accept(token, depth)
    }

    fn close(&mut self) -> ParseResult<()> {
        (**self).close()
    }
}

/// Collects emitted tokens into a vector.
impl TokenSink for Vec<String> {
    fn accept(&mut self, token: &str, _depth: usize) -> ParseResult<()> {
        self.push(token.to_string());
        Ok(())
    }
}

/// Parse a string into a tree.
pub fn parse(input: &str, grammar: &dyn Grammar) -> ParseResult<Tree> {
    Parser::build(Tokenizer::from_text(input, grammar)).parse()
}

/// Parse bytes into a tree. Invalid UTF-8 decodes to U+FFFD.
pub fn parse_bytes(input: &[u8], grammar: &dyn Grammar) -> ParseResult<Tree> {
    parse(&String::from_utf8_lossy(input), grammar)
}

/// Parse a UTF-8 file into a tree.
pub fn parse_file(path: impl AsRef<Path>, grammar: &dyn Grammar) -> ParseResult<Tree> {
    Parser::build(Tokenizer::from_file(path, grammar)?).parse()
}

/// Stream a string through `sink`, returning the sink afterwards.
pub fn stream<K: TokenSink>(input: &str, grammar: &dyn Grammar, sink: K) -> ParseResult<K> {
    Parser::stream(Tokenizer::from_text(input, grammar), sink).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagsoup_grammar::BasicGrammar;
    use tagsoup_tree::NodeId;

    #[test]
    fn test_parse_simple() {
        let grammar = BasicGrammar::html();
        let tree = parse("<p>Hello <b>world</b></p>", &grammar).unwrap();
        assert_eq!(tree.text_content(NodeId::ROOT), "Hello world");
        assert_eq!(
            tree.to_markup(NodeId::ROOT, &grammar),
            "<p>Hello <b>world</b></p>"
        );
    }

    #[test]
    fn test_parse_bytes() {
        let grammar = BasicGrammar::html();
        let tree = parse_bytes(b"<p>Test</p>", &grammar).unwrap();
        assert_eq!(tree.text_content(NodeId::ROOT), "Test");
    }

    #[test]
    fn test_stream_into_vec() {
        let grammar = BasicGrammar::html();
        let tokens = stream("<a><b>x</a>", &grammar, Vec::<String>::new()).unwrap();
        assert_eq!(tokens, vec!["<a>", "<b>", "x", "</b>", "</a>"]);
    }

    #[test]
    fn test_error_display() {
        let err = ParseError::MissingEndTags {
            closed_by: "a".to_string(),
            missing: vec!["c".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "</a> closed unclosed tags: c, b");
        assert!(err.is_recoverable());

        let io = ParseError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!io.is_recoverable());
    }
}
