//! Buffered character source with a guaranteed lookahead window.
//!
//! The source pulls characters lazily from its input and keeps at least
//! `lookahead` of them buffered until the input runs dry. Searches
//! ([`LookaheadSource::index_of`], [`LookaheadSource::find`], ...) only see
//! that window: a miss does not mean the pattern is absent further on.
//! There is no mark/reset; consumed characters are gone.

use regex::Regex;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Bytes, Read};
use std::path::Path;

type CharInput = Box<dyn Iterator<Item = io::Result<char>> + Send>;

/// Decodes UTF-8 from a byte stream, one character at a time.
///
/// Each maximal invalid subsequence decodes to one U+FFFD, and the byte that
/// broke it starts the next character, as `String::from_utf8_lossy` does.
struct Utf8Chars<R: Read> {
    bytes: Bytes<BufReader<R>>,
    held: Option<u8>,
}

impl<R: Read> Utf8Chars<R> {
    fn new(reader: R) -> Self {
        Self {
            bytes: BufReader::new(reader).bytes(),
            held: None,
        }
    }

    fn next_byte(&mut self) -> Option<io::Result<u8>> {
        match self.held.take() {
            Some(byte) => Some(Ok(byte)),
            None => self.bytes.next(),
        }
    }

    fn sequence_len(lead: u8) -> usize {
        match lead {
            0x00..=0x7F => 1,
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => 0,
        }
    }

    /// Valid range of the byte after `lead`. Narrower than `0x80..=0xBF`
    /// where overlong forms, surrogates or code points past U+10FFFF would
    /// otherwise slip through.
    fn second_byte_range(lead: u8) -> (u8, u8) {
        match lead {
            0xE0 => (0xA0, 0xBF),
            0xED => (0x80, 0x9F),
            0xF0 => (0x90, 0xBF),
            0xF4 => (0x80, 0x8F),
            _ => (0x80, 0xBF),
        }
    }
}

impl<R: Read> Iterator for Utf8Chars<R> {
    type Item = io::Result<char>;

    fn next(&mut self) -> Option<Self::Item> {
        let lead = match self.next_byte()? {
            Ok(byte) => byte,
            Err(e) => return Some(Err(e)),
        };
        let len = Self::sequence_len(lead);
        if len == 1 {
            return Some(Ok(char::from(lead)));
        }
        if len == 0 {
            return Some(Ok(char::REPLACEMENT_CHARACTER));
        }

        let mut code = u32::from(lead) & (0x7F >> len);
        for i in 1..len {
            let byte = match self.bytes.next() {
                Some(Ok(byte)) => byte,
                Some(Err(e)) => return Some(Err(e)),
                None => return Some(Ok(char::REPLACEMENT_CHARACTER)),
            };
            let (low, high) = if i == 1 {
                Self::second_byte_range(lead)
            } else {
                (0x80, 0xBF)
            };
            if !(low..=high).contains(&byte) {
                self.held = Some(byte);
                return Some(Ok(char::REPLACEMENT_CHARACTER));
            }
            code = (code << 6) | u32::from(byte & 0x3F);
        }
        Some(Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)))
    }
}

/// Character source with peek, search and skip over a lookahead window.
pub struct LookaheadSource {
    input: CharInput,
    buffer: VecDeque<char>,
    lookahead: usize,
    exhausted: bool,
    consumed: usize,
}

impl std::fmt::Debug for LookaheadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookaheadSource")
            .field("buffered", &self.buffer.len())
            .field("lookahead", &self.lookahead)
            .field("exhausted", &self.exhausted)
            .field("consumed", &self.consumed)
            .finish()
    }
}

impl LookaheadSource {
    /// Wrap a fallible character input.
    pub fn new(input: CharInput, lookahead: usize) -> io::Result<Self> {
        let mut source = Self {
            input,
            buffer: VecDeque::with_capacity(lookahead + 1),
            lookahead: lookahead.max(1),
            exhausted: false,
            consumed: 0,
        };
        source.fill()?;
        Ok(source)
    }

    /// Source over an in-memory string. The whole string is buffered up
    /// front, so this cannot fail.
    pub fn from_text(input: &str, lookahead: usize) -> Self {
        Self {
            input: Box::new(std::iter::empty()),
            buffer: input.chars().collect(),
            lookahead: lookahead.max(1),
            exhausted: true,
            consumed: 0,
        }
    }

    /// Source over a UTF-8 byte stream.
    pub fn from_reader<R: Read + Send + 'static>(reader: R, lookahead: usize) -> io::Result<Self> {
        Self::new(Box::new(Utf8Chars::new(reader)), lookahead)
    }

    /// Source over a character stream.
    pub fn from_chars<I>(chars: I, lookahead: usize) -> io::Result<Self>
    where
        I: IntoIterator<Item = char>,
        I::IntoIter: Send + 'static,
    {
        Self::new(Box::new(chars.into_iter().map(Ok)), lookahead)
    }

    /// Source over a UTF-8 file.
    pub fn from_file(path: impl AsRef<Path>, lookahead: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, lookahead)
    }

    fn fill(&mut self) -> io::Result<()> {
        while !self.exhausted && self.buffer.len() < self.lookahead {
            match self.input.next() {
                Some(Ok(c)) => self.buffer.push_back(c),
                Some(Err(e)) => return Err(e),
                None => self.exhausted = true,
            }
        }
        Ok(())
    }

    /// Size of the guaranteed lookahead window.
    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Number of characters consumed so far.
    pub fn position(&self) -> usize {
        self.consumed
    }

    /// Number of characters currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether every character has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffer.is_empty()
    }

    /// Inspect the character `i` positions ahead without consuming it.
    ///
    /// `None` means no more data within reach.
    pub fn peek(&self, i: usize) -> Option<char> {
        self.buffer.get(i).copied()
    }

    /// Consume one character.
    pub fn read(&mut self) -> io::Result<Option<char>> {
        let c = self.buffer.pop_front();
        if c.is_some() {
            self.consumed += 1;
        }
        self.fill()?;
        Ok(c)
    }

    /// Consume up to `len` characters into `out`, returning how many were
    /// read.
    pub fn read_into(&mut self, out: &mut String, len: usize) -> io::Result<usize> {
        let mut count = 0;
        while count < len {
            match self.read()? {
                Some(c) => out.push(c),
                None => break,
            }
            count += 1;
        }
        Ok(count)
    }

    /// Discard up to `n` characters, returning how many were skipped.
    pub fn skip(&mut self, n: usize) -> io::Result<usize> {
        let mut skipped = 0;
        while skipped < n {
            if self.buffer.is_empty() {
                self.fill()?;
                if self.buffer.is_empty() {
                    break;
                }
            }
            let take = (n - skipped).min(self.buffer.len());
            self.buffer.drain(..take);
            skipped += take;
            self.consumed += take;
        }
        self.fill()?;
        Ok(skipped)
    }

    fn window(&self) -> impl Iterator<Item = char> + '_ {
        self.buffer.iter().take(self.lookahead).copied()
    }

    /// Offset of the first `c` within the lookahead window.
    pub fn index_of(&self, c: char) -> Option<usize> {
        self.window().position(|x| x == c)
    }

    /// Offset of the first occurrence of `needle` fully inside the
    /// lookahead window.
    pub fn index_of_str(&self, needle: &str) -> Option<usize> {
        let needle: Vec<char> = needle.chars().collect();
        if needle.is_empty() {
            return Some(0);
        }
        let limit = self.buffer.len().min(self.lookahead);
        if needle.len() > limit {
            return None;
        }
        (0..=limit - needle.len()).find(|&start| {
            needle
                .iter()
                .enumerate()
                .all(|(i, &c)| self.buffer[start + i] == c)
        })
    }

    /// Whether the window holds `prefix` starting at offset `from`.
    pub fn starts_with(&self, prefix: &str, case_sensitive: bool, from: usize) -> bool {
        let mut offset = from;
        for expected in prefix.chars() {
            if offset >= self.lookahead {
                return false;
            }
            let Some(actual) = self.peek(offset) else {
                return false;
            };
            let matches = if case_sensitive {
                actual == expected
            } else {
                actual == expected || actual.to_lowercase().eq(expected.to_lowercase())
            };
            if !matches {
                return false;
            }
            offset += 1;
        }
        true
    }

    /// First match of `pattern` inside the window, as character offsets
    /// `(start, end)`.
    pub fn find(&self, pattern: &Regex) -> Option<(usize, usize)> {
        let window: String = self.window().collect();
        let m = pattern.find(&window)?;
        let start = window[..m.start()].chars().count();
        let end = start + m.as_str().chars().count();
        Some((start, end))
    }
}
