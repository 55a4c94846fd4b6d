//! Tree assembler.
//!
//! Consumes tokens from a [`Tokenizer`] and maintains a stack of open
//! elements. End tags close everything above their match; start tags first
//! close whatever the grammar forbids them to nest in. Repairs are silent
//! with error correction enabled and reported as [`ParseError`]s otherwise.
//!
//! What happens to finished nodes is decided by the [`Output`] strategy:
//! [`Build`] keeps the whole tree, [`Stream`] forwards every token to a
//! [`TokenSink`] and [`Pull`] queues tokens for [`Parser::retrieve_token`].
//! The latter two keep only the path of open elements in memory.

use crate::attributes::parse_tag;
use crate::tokenizer::Tokenizer;
use crate::{ParseError, ParseResult, TokenSink};
use std::collections::{HashSet, VecDeque};
use tagsoup_grammar::{Grammar, TokenKind};
use tagsoup_tree::{AttributeSet, NodeId, NodeType, Tree};
use tracing::{debug, trace};

/// A token produced by the assembler, with the number of open elements
/// enclosing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedToken {
    pub token: String,
    pub depth: usize,
}

/// Where assembled tokens go.
pub trait Output {
    /// Keep finished nodes in the tree.
    const RETAIN: bool;
    /// Produce token strings at all.
    const EMITS: bool;

    fn emit(&mut self, token: String, depth: usize) -> ParseResult<()>;

    fn finish(&mut self) -> ParseResult<()> {
        Ok(())
    }
}

/// Build the complete tree.
#[derive(Debug, Default)]
pub struct Build;

impl Output for Build {
    const RETAIN: bool = true;
    const EMITS: bool = false;

    fn emit(&mut self, _token: String, _depth: usize) -> ParseResult<()> {
        Ok(())
    }
}

/// Forward tokens to a sink, discarding finished nodes.
#[derive(Debug)]
pub struct Stream<K: TokenSink> {
    sink: K,
}

impl<K: TokenSink> Output for Stream<K> {
    const RETAIN: bool = false;
    const EMITS: bool = true;

    fn emit(&mut self, token: String, depth: usize) -> ParseResult<()> {
        self.sink.accept(&token, depth)
    }

    fn finish(&mut self) -> ParseResult<()> {
        self.sink.close()
    }
}

/// Queue tokens for the caller, discarding finished nodes.
#[derive(Debug, Default)]
pub struct Pull {
    ready: VecDeque<EmittedToken>,
}

impl Output for Pull {
    const RETAIN: bool = false;
    const EMITS: bool = true;

    fn emit(&mut self, token: String, depth: usize) -> ParseResult<()> {
        self.ready.push_back(EmittedToken { token, depth });
        Ok(())
    }
}

/// Counters collected while parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub tokens_consumed: usize,
    pub tokens_emitted: usize,
    pub nodes_created: usize,
    /// Elements closed without their own end tag.
    pub implicit_closes: usize,
    /// End tags ignored because nothing open matched them.
    pub dropped_end_tags: usize,
    /// Largest number of simultaneously open elements.
    pub max_depth: usize,
}

/// Tree assembler.
pub struct Parser<'g, O: Output> {
    tokenizer: Tokenizer<'g>,
    grammar: &'g dyn Grammar,
    tree: Tree,
    /// Open elements, outermost first.
    open: Vec<(String, NodeId)>,
    /// Tags closed implicitly since the last start tag; their end tags are
    /// swallowed.
    implicitly_closed: HashSet<String>,
    cursor: NodeId,
    output: O,
    finished: bool,
    stats: ParseStats,
}

impl<'g> Parser<'g, Build> {
    /// Assembler that keeps the complete tree.
    pub fn build(tokenizer: Tokenizer<'g>) -> Self {
        Self::with_output(tokenizer, Build)
    }

    /// Consume all input and return the tree.
    pub fn parse(mut self) -> ParseResult<Tree> {
        self.consume_tokens()?;
        Ok(self.tree)
    }
}

impl<'g, K: TokenSink> Parser<'g, Stream<K>> {
    /// Assembler that forwards tokens to `sink`.
    pub fn stream(tokenizer: Tokenizer<'g>, sink: K) -> Self {
        Self::with_output(tokenizer, Stream { sink })
    }

    /// Consume all input and return the sink.
    pub fn parse(mut self) -> ParseResult<K> {
        self.consume_tokens()?;
        Ok(self.output.sink)
    }

    pub fn sink(&self) -> &K {
        &self.output.sink
    }

    pub fn into_sink(self) -> K {
        self.output.sink
    }
}

impl<'g> Parser<'g, Pull> {
    /// Assembler that queues tokens for [`Parser::retrieve_token`].
    pub fn pull(tokenizer: Tokenizer<'g>) -> Self {
        Self::with_output(tokenizer, Pull::default())
    }

    /// Next emitted token, consuming input as needed. `Ok(None)` once the
    /// document is complete.
    pub fn retrieve_token(&mut self) -> ParseResult<Option<EmittedToken>> {
        loop {
            if let Some(token) = self.output.ready.pop_front() {
                return Ok(Some(token));
            }
            if self.finished {
                return Ok(None);
            }
            self.consume_token()?;
        }
    }

    /// Number of emitted tokens not yet retrieved.
    pub fn ready_tokens(&self) -> usize {
        self.output.ready.len()
    }
}

impl<'g, O: Output> Parser<'g, O> {
    fn with_output(tokenizer: Tokenizer<'g>, output: O) -> Self {
        let grammar = tokenizer.grammar();
        Self {
            tokenizer,
            grammar,
            tree: Tree::new(),
            open: Vec::new(),
            implicitly_closed: HashSet::new(),
            cursor: NodeId::ROOT,
            output,
            finished: false,
            stats: ParseStats::default(),
        }
    }

    pub fn grammar(&self) -> &'g dyn Grammar {
        self.grammar
    }

    /// The tree as assembled so far. In streaming modes it only holds the
    /// open elements.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Node new content is attached to.
    pub fn cursor(&self) -> NodeId {
        self.cursor
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Tag types of the open elements, outermost first.
    pub fn open_tags(&self) -> impl Iterator<Item = &str> {
        self.open.iter().map(|(tag, _)| tag.as_str())
    }

    /// Characters consumed from the input so far.
    pub fn position(&self) -> usize {
        self.tokenizer.position()
    }

    /// Whether [`Parser::consume_token`] still has work to do.
    pub fn has_more_tokens(&self) -> bool {
        !self.finished
    }

    /// Process all remaining tokens.
    pub fn consume_tokens(&mut self) -> ParseResult<()> {
        while !self.finished {
            self.consume_token()?;
        }
        Ok(())
    }

    /// Process one token. At the end of input this closes every open
    /// element instead.
    ///
    /// A structural error leaves the assembler as it was before the token;
    /// the caller may keep consuming.
    pub fn consume_token(&mut self) -> ParseResult<()> {
        if self.finished {
            return Ok(());
        }
        match self.tokenizer.next_token()? {
            Some(token) => self.process(token),
            None => self.finish(),
        }
    }

    fn process(&mut self, token: String) -> ParseResult<()> {
        self.stats.tokens_consumed += 1;
        let g = self.grammar;
        let kind = g.token_kind(&token);
        trace!(kind = ?kind, len = token.len(), depth = self.open.len(), "Processing token");

        if let Some((top, _)) = self.open.last() {
            if g.wait_for_end_tag(top) && !(kind == TokenKind::EndTag && g.tag_type(&token) == *top)
            {
                return self.raw_data(token);
            }
        }

        match kind {
            TokenKind::StartTag => self.start_tag(token),
            TokenKind::EndTag => self.end_tag(token),
            TokenKind::SingularTag => self.singular_tag(token),
            TokenKind::Comment => self.leaf(token, NodeType::Comment),
            TokenKind::Dtd | TokenKind::ProcessingInstruction => {
                self.leaf(token, NodeType::Declaration)
            }
            TokenKind::Text => self.text(token),
        }
    }

    fn emit(&mut self, token: String, depth: usize) -> ParseResult<()> {
        if O::EMITS {
            self.stats.tokens_emitted += 1;
            self.output.emit(token, depth)?;
        }
        Ok(())
    }

    fn retain_leaf(&mut self, node_type: NodeType, value: String) {
        if O::RETAIN && self.tree.create_leaf(self.cursor, node_type, value).is_some() {
            self.stats.nodes_created += 1;
        }
    }

    fn leaf(&mut self, token: String, node_type: NodeType) -> ParseResult<()> {
        let depth = self.open.len();
        if O::EMITS {
            self.emit(token.clone(), depth)?;
        }
        self.retain_leaf(node_type, token);
        Ok(())
    }

    fn raw_data(&mut self, token: String) -> ParseResult<()> {
        self.leaf(token, NodeType::Data)
    }

    fn text(&mut self, token: String) -> ParseResult<()> {
        if O::RETAIN {
            let decoded = self.grammar.decode(&token);
            self.retain_leaf(NodeType::Data, decoded);
        }
        let depth = self.open.len();
        self.emit(token, depth)
    }

    /// Close open elements the grammar does not allow `tag_type` inside.
    fn correct_nesting(&mut self, tag_type: &str) -> ParseResult<()> {
        let g = self.grammar;
        while let Some((top, _)) = self.open.last() {
            let conflict = !g.can_be_child_of(tag_type, top)
                || self
                    .open
                    .iter()
                    .any(|(ancestor, _)| !g.can_be_embedded_in(tag_type, ancestor));
            if !conflict {
                break;
            }
            if !g.error_correction() {
                return Err(ParseError::InvalidNesting {
                    parent: top.clone(),
                    child: tag_type.to_string(),
                });
            }
            debug!(parent = %top, child = tag_type, "Closing element to allow nesting");
            self.close_top(None)?;
        }
        Ok(())
    }

    /// Pop the innermost open element, emitting `end_token` or a
    /// synthesized end tag.
    fn close_top(&mut self, end_token: Option<String>) -> ParseResult<()> {
        let Some((tag_type, id)) = self.open.pop() else {
            return Ok(());
        };
        let depth = self.open.len();
        self.cursor = self.open.last().map_or(NodeId::ROOT, |&(_, id)| id);

        let token = match end_token {
            Some(token) => Some(token),
            None => {
                self.stats.implicit_closes += 1;
                let synthesized = O::EMITS.then(|| self.grammar.end_tag_text(&tag_type));
                self.implicitly_closed.insert(tag_type);
                synthesized
            }
        };
        if let Some(token) = token {
            self.emit(token, depth)?;
        }
        if !O::RETAIN {
            self.tree.delete_subtree(id);
        }
        Ok(())
    }

    fn open_element(&mut self, tag_type: String, attributes: AttributeSet) -> Option<NodeId> {
        let id = self
            .tree
            .create_element(self.cursor, tag_type.as_str(), attributes)?;
        self.stats.nodes_created += 1;
        Some(id)
    }

    fn start_tag(&mut self, token: String) -> ParseResult<()> {
        let (tag_type, attributes) = parse_tag(&token, self.grammar)?;
        self.implicitly_closed.clear();
        self.correct_nesting(&tag_type)?;

        let depth = self.open.len();
        let Some(id) = self.open_element(tag_type.clone(), attributes) else {
            return Ok(());
        };
        self.emit(token, depth)?;
        self.open.push((tag_type, id));
        self.cursor = id;
        self.stats.max_depth = self.stats.max_depth.max(self.open.len());
        Ok(())
    }

    fn singular_tag(&mut self, token: String) -> ParseResult<()> {
        let (tag_type, attributes) = parse_tag(&token, self.grammar)?;
        self.implicitly_closed.clear();
        self.correct_nesting(&tag_type)?;

        let depth = self.open.len();
        let Some(id) = self.open_element(tag_type, attributes) else {
            return Ok(());
        };
        if O::EMITS {
            let g = self.grammar;
            if g.strict_xml() {
                let tag = self.tree.singular_tag(id, g).unwrap_or(token);
                self.emit(tag, depth)?;
            } else {
                let start = self.tree.start_tag(id, g).unwrap_or(token);
                let end = self.tree.end_tag(id, g).unwrap_or_default();
                self.emit(start, depth)?;
                self.emit(end, depth)?;
            }
        }
        if !O::RETAIN {
            self.tree.delete_subtree(id);
        }
        Ok(())
    }

    fn end_tag(&mut self, token: String) -> ParseResult<()> {
        let g = self.grammar;
        let tag_type = g.tag_type(&token);

        if self.implicitly_closed.remove(&tag_type) {
            trace!(tag = %tag_type, "Swallowing end tag of implicitly closed element");
            return Ok(());
        }

        let Some(index) = self.open.iter().rposition(|(open, _)| *open == tag_type) else {
            if !g.error_correction() {
                return Err(ParseError::UnexpectedEndTag { tag: tag_type });
            }
            debug!(tag = %tag_type, "Ignoring unmatched end tag");
            self.stats.dropped_end_tags += 1;
            return Ok(());
        };

        if index + 1 < self.open.len() && !g.error_correction() {
            let missing = self.open[index + 1..]
                .iter()
                .rev()
                .map(|(open, _)| open.clone())
                .collect();
            return Err(ParseError::MissingEndTags {
                closed_by: tag_type,
                missing,
            });
        }
        while self.open.len() > index + 1 {
            self.close_top(None)?;
        }
        self.close_top(Some(token))
    }

    /// Close every open element, innermost first, and flush the output.
    fn finish(&mut self) -> ParseResult<()> {
        if !self.open.is_empty() {
            debug!(open = self.open.len(), "Closing elements left open at end of input");
        }
        while !self.open.is_empty() {
            self.close_top(None)?;
        }
        self.implicitly_closed.clear();
        self.finished = true;
        self.output.finish()
    }
}
