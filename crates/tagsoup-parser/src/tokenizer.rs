//! Markup tokenizer.
//!
//! Splits the character stream into raw token strings: tags, comments,
//! DTD declarations, processing instructions and text. Tokens are never
//! interpreted here beyond what is needed to find their boundaries; the
//! assembler classifies them through [`Grammar::token_kind`].
//!
//! With error correction enabled the tokenizer normalizes what it emits:
//! whitespace runs collapse, raw `&` and other escapable characters in text
//! are escaped, and tags cut off by the end of input are completed.

use crate::source::LookaheadSource;
use crate::{ParseError, ParseResult};
use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use tagsoup_grammar::entities::is_entity_char;
use tagsoup_grammar::{Grammar, TokenKind};
use tracing::{debug, trace};

/// What the next characters start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Tag,
    Comment,
    Dtd,
    ProcessingInstruction,
}

/// Tokenizer over a [`LookaheadSource`].
///
/// Keeps more than [`Grammar::lookahead_tokens`] tokens queued so the
/// assembler can look ahead without consuming.
pub struct Tokenizer<'g> {
    source: LookaheadSource,
    grammar: &'g dyn Grammar,
    queue: VecDeque<String>,
    /// Tag type whose end tag terminates opaque content.
    awaiting: Option<String>,
    /// Error hit while filling the queue, reported once the tokens before
    /// it have been handed out.
    pending_error: Option<ParseError>,
    finished: bool,
}

impl std::fmt::Debug for Tokenizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("source", &self.source)
            .field("queued", &self.queue.len())
            .field("awaiting", &self.awaiting)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'g> Tokenizer<'g> {
    pub fn new(source: LookaheadSource, grammar: &'g dyn Grammar) -> Self {
        Self {
            source,
            grammar,
            queue: VecDeque::new(),
            awaiting: None,
            pending_error: None,
            finished: false,
        }
    }

    pub fn from_text(input: &str, grammar: &'g dyn Grammar) -> Self {
        Self::new(
            LookaheadSource::from_text(input, grammar.lookahead_chars()),
            grammar,
        )
    }

    pub fn from_reader<R: Read + Send + 'static>(
        reader: R,
        grammar: &'g dyn Grammar,
    ) -> ParseResult<Self> {
        let source = LookaheadSource::from_reader(reader, grammar.lookahead_chars())?;
        Ok(Self::new(source, grammar))
    }

    pub fn from_chars<I>(chars: I, grammar: &'g dyn Grammar) -> ParseResult<Self>
    where
        I: IntoIterator<Item = char>,
        I::IntoIter: Send + 'static,
    {
        let source = LookaheadSource::from_chars(chars, grammar.lookahead_chars())?;
        Ok(Self::new(source, grammar))
    }

    pub fn from_file(path: impl AsRef<Path>, grammar: &'g dyn Grammar) -> ParseResult<Self> {
        let source = LookaheadSource::from_file(path, grammar.lookahead_chars())?;
        Ok(Self::new(source, grammar))
    }

    /// The grammar driving this tokenizer.
    pub fn grammar(&self) -> &'g dyn Grammar {
        self.grammar
    }

    /// Characters consumed from the input so far.
    pub fn position(&self) -> usize {
        self.source.position()
    }

    /// Whether another token (or a pending error) is available.
    pub fn has_more_tokens(&mut self) -> bool {
        self.fill(1);
        !self.queue.is_empty() || self.pending_error.is_some()
    }

    /// Take the next token. `Ok(None)` marks the end of input.
    pub fn next_token(&mut self) -> ParseResult<Option<String>> {
        self.fill(self.grammar.lookahead_tokens() + 1);
        match self.queue.pop_front() {
            Some(token) => Ok(Some(token)),
            None => match self.pending_error.take() {
                Some(e) => Err(e),
                None => Ok(None),
            },
        }
    }

    /// Look at the token `i` positions ahead without consuming it.
    pub fn peek_token(&mut self, i: usize) -> Option<&str> {
        self.fill(i + 1);
        self.queue.get(i).map(String::as_str)
    }

    fn fill(&mut self, wanted: usize) {
        while !self.finished && self.pending_error.is_none() && self.queue.len() < wanted {
            match self.scan() {
                Ok(Some(token)) => {
                    trace!(
                        kind = ?self.grammar.token_kind(&token),
                        len = token.len(),
                        "Tokenized"
                    );
                    self.queue.push_back(token);
                }
                Ok(None) => self.finished = true,
                Err(e) => self.pending_error = Some(e),
            }
        }
    }

    fn state(&self) -> State {
        let g = self.grammar;
        if self.source.starts_with(g.comment_markers().0, true, 0) {
            State::Comment
        } else if self.source.starts_with(g.pi_markers().0, true, 0) {
            State::ProcessingInstruction
        } else if self.at_tag_start() {
            State::Tag
        } else if self.source.starts_with(g.dtd_markers().0, true, 0) {
            State::Dtd
        } else {
            State::Text
        }
    }

    fn at_tag_start(&self) -> bool {
        let g = self.grammar;
        if self.source.peek(0) != Some(g.tag_start()) {
            return false;
        }
        match self.source.peek(1) {
            Some(c) if c == g.end_tag_marker() => self
                .source
                .peek(2)
                .is_some_and(|n| g.is_suitable_tag_start(n)),
            Some(c) => g.is_suitable_tag_start(c),
            None => false,
        }
    }

    fn scan(&mut self) -> ParseResult<Option<String>> {
        if let Some(tag_type) = self.awaiting.take() {
            let content = self.scan_opaque(&tag_type)?;
            if !content.is_empty() {
                return Ok(Some(content));
            }
        }
        if self.source.peek(0).is_none() {
            return Ok(None);
        }

        let g = self.grammar;
        let token = match self.state() {
            State::Comment => {
                let (start, end) = g.comment_markers();
                self.scan_delimited(start, end, false)?
            }
            State::ProcessingInstruction => {
                let (start, end) = g.pi_markers();
                self.scan_delimited(start, end, false)?
            }
            State::Dtd => {
                let (start, end) = g.dtd_markers();
                self.scan_delimited(start, end, true)?
            }
            State::Tag => self.scan_tag()?,
            State::Text => self.scan_text()?,
        };

        if g.token_kind(&token) == TokenKind::StartTag {
            let tag_type = g.tag_type(&token);
            if g.wait_for_end_tag(&tag_type) {
                self.awaiting = Some(tag_type);
            }
        }
        Ok(Some(token))
    }

    /// Comments, processing instructions and DTDs. A DTD only ends outside
    /// its bracketed internal subset.
    fn scan_delimited(&mut self, start: &str, end: &str, bracketed: bool) -> ParseResult<String> {
        let mut token = String::new();
        self.source.read_into(&mut token, start.chars().count())?;
        let min_len = start.len() + end.len();
        let mut depth = 0usize;
        loop {
            let Some(c) = self.source.read()? else {
                debug!(token = %token, "Completing declaration cut off by end of input");
                token.push_str(end);
                return Ok(token);
            };
            token.push(c);
            if bracketed {
                match c {
                    '[' => depth += 1,
                    ']' => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            if depth == 0 && token.len() >= min_len && token.ends_with(end) {
                return Ok(token);
            }
        }
    }

    fn scan_tag(&mut self) -> ParseResult<String> {
        let g = self.grammar;
        let mut tag = String::new();
        let mut name = String::new();
        let mut name_done = false;
        let mut attribute = String::new();
        let mut in_value = false;
        let mut pending_space = false;
        let mut quote: Option<char> = None;

        if let Some(c) = self.source.read()? {
            tag.push(c);
        }
        loop {
            let Some(c) = self.source.peek(0) else {
                if let Some(q) = quote {
                    tag.push(q);
                }
                tag.push(g.tag_end());
                debug!(tag = %tag, "Completing tag cut off by end of input");
                return Ok(tag);
            };

            if let Some(q) = quote {
                if c == q {
                    self.source.skip(1)?;
                    tag.push(c);
                    quote = None;
                    in_value = false;
                    attribute.clear();
                    continue;
                }
                let breaks = g.is_whitespace(c) || c == g.tag_end();
                let tag_type = g.fold_case(&name);
                if !(breaks && !g.whitespace_in_value(&tag_type, &attribute)) {
                    self.source.skip(1)?;
                    tag.push(c);
                    continue;
                }
                if !g.error_correction() {
                    return Err(ParseError::MalformedQuoting {
                        tag: tag_type,
                        attribute,
                    });
                }
                debug!(tag = %tag_type, attribute = %attribute, "Closing unterminated attribute value");
                tag.push(q);
                quote = None;
                in_value = false;
                attribute.clear();
            }

            if c == g.tag_end() {
                self.source.skip(1)?;
                tag.push(c);
                return Ok(tag);
            }
            if c == g.tag_start() && g.error_correction() {
                debug!(tag = %tag, "Closing tag interrupted by a new tag");
                tag.push(g.tag_end());
                return Ok(tag);
            }
            self.source.skip(1)?;

            if g.is_whitespace(c) {
                name_done = true;
                if !tag.ends_with(g.value_separator()) {
                    pending_space = true;
                }
                continue;
            }
            if c == g.value_separator() {
                pending_space = false;
                in_value = true;
                tag.push(c);
                continue;
            }
            if g.is_quote(c) && tag.ends_with(g.value_separator()) {
                tag.push(c);
                quote = Some(c);
                continue;
            }
            if pending_space {
                tag.push(g.attribute_separator());
                pending_space = false;
                in_value = false;
                attribute.clear();
            }
            if !name_done && g.is_name_char(c) {
                name.push(c);
            } else {
                name_done = true;
                if !in_value {
                    attribute.push(c);
                }
            }
            tag.push(c);
        }
    }

    fn scan_text(&mut self) -> ParseResult<String> {
        let g = self.grammar;
        let mut text = String::new();
        let mut last_was_space = false;
        while let Some(c) = self.source.peek(0) {
            if !text.is_empty() && self.state() != State::Text {
                break;
            }
            self.source.skip(1)?;

            if g.is_whitespace(c) {
                if !last_was_space {
                    text.push(normalize_whitespace(c));
                    last_was_space = true;
                }
                continue;
            }
            last_was_space = false;

            if !g.error_correction() {
                text.push(c);
                continue;
            }
            if c == '&' {
                if let Some(entity) = self.take_entity()? {
                    text.push_str(&entity);
                    continue;
                }
            }
            match g.escape_char(c) {
                Some(escaped) => text.push_str(escaped),
                None => text.push(c),
            }
        }
        Ok(text)
    }

    /// After a consumed `&`, take a complete known entity reference from the
    /// lookahead window.
    fn take_entity(&mut self) -> ParseResult<Option<String>> {
        let Some(end) = self.source.index_of(';') else {
            return Ok(None);
        };
        if end == 0 {
            return Ok(None);
        }
        let body: String = (0..end).filter_map(|i| self.source.peek(i)).collect();
        if !body.chars().all(is_entity_char) {
            return Ok(None);
        }
        let entity = format!("&{};", body);
        if self.grammar.decode_entity(&entity).is_none() {
            return Ok(None);
        }
        self.source.skip(end + 1)?;
        Ok(Some(entity))
    }

    /// Raw content up to the end tag of `tag_type`.
    ///
    /// An end tag longer than the lookahead window cannot be recognized;
    /// the content then runs to the end of input.
    fn scan_opaque(&mut self, tag_type: &str) -> ParseResult<String> {
        let g = self.grammar;
        let mut prefix = String::new();
        prefix.push(g.tag_start());
        prefix.push(g.end_tag_marker());
        prefix.push_str(tag_type);
        let prefix_len = prefix.chars().count();

        let mut content = String::new();
        while let Some(c) = self.source.peek(0) {
            if c == g.tag_start() && self.source.starts_with(&prefix, g.case_sensitive(), 0) {
                let closes = self
                    .source
                    .peek(prefix_len)
                    .map_or(true, |n| n == g.tag_end() || g.is_whitespace(n));
                if closes {
                    break;
                }
            }
            self.source.skip(1)?;
            content.push(c);
        }
        debug!(tag = tag_type, len = content.len(), "Captured opaque content");
        Ok(content)
    }
}

fn normalize_whitespace(c: char) -> char {
    match c {
        '\t' => ' ',
        '\r' | '\x0C' => '\n',
        c => c,
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = ParseResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Tokenize a whole string.
pub fn tokenize(input: &str, grammar: &dyn Grammar) -> ParseResult<Vec<String>> {
    Tokenizer::from_text(input, grammar).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tagsoup_grammar::BasicGrammar;

    fn tokens(input: &str) -> Vec<String> {
        tokenize(input, &BasicGrammar::html()).unwrap()
    }

    #[test]
    fn test_simple_document() {
        assert_eq!(
            tokens("<p class=\"x\">Hello</p>"),
            vec!["<p class=\"x\">", "Hello", "</p>"]
        );
    }

    #[test]
    fn test_all_token_kinds() {
        let toks = tokens("<!DOCTYPE html><?pi x?><!-- c --><br/>t");
        assert_eq!(
            toks,
            vec!["<!DOCTYPE html>", "<?pi x?>", "<!-- c -->", "<br/>", "t"]
        );
    }

    #[test]
    fn test_whitespace_collapses_in_text() {
        assert_eq!(tokens("a \t\r\n b"), vec!["a b"]);
        assert_eq!(tokens("\r\n"), vec!["\n"]);
        assert_eq!(tokens("x\ty"), vec!["x y"]);
    }

    #[test]
    fn test_whitespace_normalized_in_tags() {
        assert_eq!(
            tokens("<a  href = \"x y\"\n  title=t >"),
            vec!["<a href=\"x y\" title=t>"]
        );
    }

    #[test]
    fn test_ampersand_correction() {
        assert_eq!(tokens("a & b &amp; c &#38; d"), vec!["a &amp; b &amp; c &#38; d"]);
        assert_eq!(tokens("R&D &bogus; x"), vec!["R&amp;D &amp;bogus; x"]);
        assert_eq!(tokens("1 > 0"), vec!["1 &gt; 0"]);
    }

    #[test]
    fn test_no_correction_keeps_text_raw() {
        let g = BasicGrammar::plain().with_error_correction(false);
        assert_eq!(tokenize("a & b > c", &g).unwrap(), vec!["a & b > c"]);
    }

    #[test]
    fn test_lone_tag_start_is_text() {
        assert_eq!(tokens("a < b"), vec!["a &lt; b"]);
        assert_eq!(tokens("</ x>"), vec!["&lt;/ x&gt;"]);
    }

    #[test]
    fn test_truncated_tag_is_completed() {
        assert_eq!(tokens("<a href=\"x"), vec!["<a href=\"x\">"]);
        assert_eq!(tokens("<div"), vec!["<div>"]);
    }

    #[test]
    fn test_truncated_declarations_are_completed() {
        assert_eq!(tokens("<!-- open"), vec!["<!-- open-->"]);
        assert_eq!(tokens("<?pi"), vec!["<?pi?>"]);
        assert_eq!(tokens("<!DOCTYPE x"), vec!["<!DOCTYPE x>"]);
    }

    #[test]
    fn test_dtd_internal_subset() {
        let input = "<!DOCTYPE d [<!ENTITY e \"v\">]><d/>";
        assert_eq!(
            tokens(input),
            vec!["<!DOCTYPE d [<!ENTITY e \"v\">]>", "<d/>"]
        );
    }

    #[test]
    fn test_interrupted_tag() {
        assert_eq!(tokens("<div<p>x"), vec!["<div>", "<p>", "x"]);
    }

    #[test]
    fn test_quoted_tag_end() {
        assert_eq!(tokens("<a title=\"1>2\">"), vec!["<a title=\"1>2\">"]);
    }

    #[test]
    fn test_unterminated_quote_with_whitespace_disallowed() {
        let g = BasicGrammar::html().with_whitespace_in_values(false);
        assert_eq!(tokenize("<x a=\"1 b=2>", &g).unwrap(), vec!["<x a=\"1\" b=2>"]);

        let strict = g.with_error_correction(false);
        let mut tok = Tokenizer::from_text("ok<x a=\"1 b=2>", &strict);
        assert_eq!(tok.next_token().unwrap().as_deref(), Some("ok"));
        let err = tok.next_token().unwrap_err();
        assert!(matches!(err, ParseError::MalformedQuoting { .. }));
    }

    #[test]
    fn test_opaque_content() {
        let toks = tokens("<script>if (a < b && c) { x = '</p>'; }</script><p>");
        assert_eq!(
            toks,
            vec![
                "<script>",
                "if (a < b && c) { x = '</p>'; }",
                "</script>",
                "<p>"
            ]
        );
    }

    #[test]
    fn test_opaque_content_case_insensitive_end() {
        let toks = tokens("<style>a{}</STYLE >");
        assert_eq!(toks, vec!["<style>", "a{}", "</STYLE>"]);
    }

    #[test]
    fn test_opaque_content_does_not_stop_at_prefix() {
        let toks = tokens("<script>a</scripts>b</script>");
        assert_eq!(toks, vec!["<script>", "a</scripts>b", "</script>"]);
    }

    #[test]
    fn test_empty_opaque_content() {
        assert_eq!(tokens("<script></script>"), vec!["<script>", "</script>"]);
    }

    #[test]
    fn test_peek_token() {
        let g = BasicGrammar::html();
        let mut tok = Tokenizer::from_text("<a>b</a>", &g);
        assert_eq!(tok.peek_token(2), Some("</a>"));
        assert_eq!(tok.peek_token(0), Some("<a>"));
        assert_eq!(tok.next_token().unwrap().as_deref(), Some("<a>"));
        assert_eq!(tok.peek_token(0), Some("b"));
        assert_eq!(tok.peek_token(5), None);
    }

    #[test]
    fn test_streaming_reader_matches_string() {
        let g = BasicGrammar::html();
        let input = "<ul><li>one &amp; two<li>three</ul><!-- end -->";
        let from_reader: Vec<String> = Tokenizer::from_reader(Cursor::new(input.as_bytes().to_vec()), &g)
            .unwrap()
            .collect::<ParseResult<_>>()
            .unwrap();
        assert_eq!(from_reader, tokenize(input, &g).unwrap());
    }

    #[test]
    fn test_end_of_input() {
        let g = BasicGrammar::html();
        let mut tok = Tokenizer::from_text("", &g);
        assert!(!tok.has_more_tokens());
        assert!(tok.next_token().unwrap().is_none());
        assert!(tok.next_token().unwrap().is_none());
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_trace_logs_kind_and_length_not_content() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let body = "secret-payload-".repeat(20);
        let input = format!("<script>{body}</script><p>hi</p>");
        let toks = tracing::subscriber::with_default(subscriber, || tokens(&input));
        assert_eq!(toks[1], body);

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Tokenized"));
        assert!(output.contains("kind=StartTag"));
        assert!(output.contains(&format!("len={}", body.len())));
        assert!(!output.contains("secret-payload"));
    }
}
