/// Dictionary lookup and input tokenisation for all versions
use crate::error::VmResult;
use crate::memory::Memory;
use crate::text::TextCodec;
use crate::vm::VM;
use log::debug;
use std::cmp::Ordering;

/// Parsed dictionary header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    pub separators: Vec<u8>,
    pub entry_length: u8,
    /// Negative for unsorted user dictionaries
    pub entry_count: i16,
    pub entries_addr: u32,
}

impl Dictionary {
    pub fn parse(memory: &Memory, addr: u32) -> VmResult<Self> {
        let sep_count = memory.read_byte(addr)?;
        let separators = memory.slice(addr + 1, sep_count as usize)?.to_vec();
        let entry_start = addr + 1 + sep_count as u32;
        let entry_length = memory.read_byte(entry_start)?;
        let entry_count = memory.read_word(entry_start + 1)? as i16;
        Ok(Dictionary {
            separators,
            entry_length,
            entry_count,
            entries_addr: entry_start + 3,
        })
    }

    /// Address of the entry matching `encoded`, or 0
    pub fn lookup(&self, memory: &Memory, encoded: &[u8]) -> VmResult<u16> {
        let count = self.entry_count.unsigned_abs() as u32;
        let entry_addr = |index: u32| self.entries_addr + index * self.entry_length as u32;

        if self.entry_count < 0 {
            for index in 0..count {
                let addr = entry_addr(index);
                if memory.slice(addr, encoded.len())? == encoded {
                    return Ok(addr as u16);
                }
            }
            return Ok(0);
        }

        // Binary search (dictionary is sorted)
        let mut low = 0i64;
        let mut high = count as i64 - 1;
        while low <= high {
            let mid = (low + high) / 2;
            let addr = entry_addr(mid as u32);
            match encoded.cmp(memory.slice(addr, encoded.len())?) {
                Ordering::Less => high = mid - 1,
                Ordering::Greater => low = mid + 1,
                Ordering::Equal => return Ok(addr as u16),
            }
        }
        Ok(0)
    }
}

/// A word found in the input: ZSCII bytes and offset within the text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: Vec<u8>,
    pub start: usize,
}

/// Split input at spaces and separators; separators are words themselves
pub fn split_words(input: &[u8], separators: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<Token> = None;
    for (i, &ch) in input.iter().enumerate() {
        if ch == b' ' || separators.contains(&ch) {
            if let Some(token) = current.take() {
                tokens.push(token);
            }
            if ch != b' ' {
                tokens.push(Token {
                    text: vec![ch],
                    start: i,
                });
            }
        } else {
            current
                .get_or_insert_with(|| Token {
                    text: Vec::new(),
                    start: i,
                })
                .text
                .push(ch);
        }
    }
    if let Some(token) = current {
        tokens.push(token);
    }
    tokens
}

impl VM {
    /// Read the ZSCII contents of a text buffer as filled by a line read
    pub fn text_buffer_contents(&self, text_buffer: u32) -> VmResult<(Vec<u8>, u32)> {
        if self.version() <= 4 {
            let max = self.read_byte(text_buffer)? as u32;
            let start = text_buffer + 1;
            let mut text = Vec::new();
            for i in 0..max {
                let ch = self.read_byte(start + i)?;
                if ch == 0 {
                    break;
                }
                text.push(ch);
            }
            Ok((text, start))
        } else {
            let len = self.read_byte(text_buffer + 1)? as usize;
            let start = text_buffer + 2;
            Ok((self.memory.slice(start, len)?.to_vec(), start))
        }
    }

    /// Fill `parse_buffer` from `text_buffer` against the dictionary at
    /// `dictionary_addr`. With `skip_unknown`, entries for words not in the
    /// dictionary are left untouched.
    pub fn tokenise(
        &mut self,
        codec: &TextCodec,
        text_buffer: u32,
        parse_buffer: u32,
        dictionary_addr: u32,
        skip_unknown: bool,
    ) -> VmResult<()> {
        let dictionary = Dictionary::parse(&self.memory, dictionary_addr)?;
        let (text, text_start) = self.text_buffer_contents(text_buffer)?;
        let max_words = self.read_byte(parse_buffer)? as usize;
        let tokens = split_words(&text, &dictionary.separators);

        let mut written = 0u8;
        for (slot, token) in tokens.iter().take(max_words).enumerate() {
            let encoded = codec.encode_zscii_word(&token.text);
            let addr = dictionary.lookup(&self.memory, &encoded)?;
            written += 1;
            if addr == 0 && skip_unknown {
                continue;
            }
            let entry = parse_buffer + 2 + 4 * slot as u32;
            self.write_word(entry, addr)?;
            self.write_byte(entry + 2, token.text.len() as u8)?;
            let position = text_start - text_buffer + token.start as u32;
            self.write_byte(entry + 3, position as u8)?;
        }
        self.write_byte(parse_buffer + 1, written)?;
        debug!(
            "tokenised {:?} into {} words",
            String::from_utf8_lossy(&text),
            written
        );
        Ok(())
    }
}
