//! Z-character text: decoding Z-strings, ZSCII to Unicode, and encoding
//! words for dictionary comparison.

use crate::error::{VmError, VmResult};
use crate::header::Header;
use crate::memory::Memory;
use log::{debug, trace};

/// The three default alphabets as ZSCII codes, indexed by Z-char - 6
const ALPHABET_A0: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// Slot 0 is the ZSCII escape and never looked up
const ALPHABET_A2_V1: &[u8; 26] = b" 0123456789.,!?_#'\"/\\<-:()";
/// Slot 0 is the ZSCII escape, slot 1 is newline
const ALPHABET_A2: &[u8; 26] = b" \r0123456789.,!?_#'\"/\\-:()";

/// ZSCII 155-223 when the story supplies no unicode table
const DEFAULT_EXTRA_CHARS: &str =
    "äöüÄÖÜß»«ëïÿËÏáéíóúýÁÉÍÓÚÝàèìòùÀÈÌÒÙâêîôûÂÊÎÔÛåÅøØãñõÃÑÕæÆçÇþðÞÐ£œŒ¡¿";

pub const ZSCII_NEWLINE: u8 = 13;
/// First ZSCII code of the extra-characters range
const EXTRA_CHARS_START: u16 = 155;

/// Static text tables of a story: alphabets, abbreviations and the extra
/// characters. Rebuilt whenever the header is re-derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCodec {
    version: u8,
    alphabets: [[u8; 26]; 3],
    abbrev_table: u32,
    extra_chars: Vec<char>,
}

impl TextCodec {
    pub fn new(memory: &Memory, header: &Header) -> VmResult<Self> {
        let version = header.version;
        let mut alphabets = [
            *ALPHABET_A0,
            *ALPHABET_A1,
            if version == 1 {
                *ALPHABET_A2_V1
            } else {
                *ALPHABET_A2
            },
        ];
        if version >= 5 && header.alphabet_table != 0 {
            let table = memory.slice(header.alphabet_table as u32, 78)?;
            for (i, alphabet) in alphabets.iter_mut().enumerate() {
                alphabet.copy_from_slice(&table[i * 26..(i + 1) * 26]);
            }
            // Escape and newline keep their meaning regardless of the table
            alphabets[2][1] = ZSCII_NEWLINE;
            debug!("Using custom alphabet table at {:04x}", header.alphabet_table);
        }

        let extra_chars = match header.unicode_table(memory) {
            Some(table) => {
                let count = memory.read_byte(table)?;
                let mut chars = Vec::with_capacity(count as usize);
                for i in 0..count as u32 {
                    let code = memory.read_word(table + 1 + 2 * i)?;
                    chars.push(char::from_u32(code as u32).unwrap_or('?'));
                }
                debug!("Unicode table at {:04x} with {} entries", table, count);
                chars
            }
            None => DEFAULT_EXTRA_CHARS.chars().collect(),
        };

        Ok(TextCodec {
            version,
            alphabets,
            abbrev_table: header.abbrev_table as u32,
            extra_chars,
        })
    }

    /// A decoder with fresh shift state
    pub fn decoder<'a>(&'a self, memory: &'a Memory) -> ZTextDecoder<'a> {
        ZTextDecoder {
            codec: self,
            memory,
            allow_abbreviations: true,
        }
    }

    /// Decode the Z-string at `addr`, returning the text and its length in bytes
    pub fn decode(&self, memory: &Memory, addr: u32) -> VmResult<(String, u32)> {
        self.decoder(memory).decode(addr)
    }

    /// Convert a ZSCII output code to a character, if it prints as one
    pub fn zscii_to_char(&self, code: u16) -> Option<char> {
        match code {
            0 => None,
            13 => Some('\n'),
            32..=126 => Some(code as u8 as char),
            155..=251 => Some(
                self.extra_chars
                    .get((code - EXTRA_CHARS_START) as usize)
                    .copied()
                    .unwrap_or('?'),
            ),
            _ => Some('?'),
        }
    }

    /// Convert an input character to ZSCII
    pub fn char_to_zscii(&self, ch: char) -> Option<u8> {
        match ch {
            '\n' | '\r' => Some(ZSCII_NEWLINE),
            ' '..='~' => Some(ch as u8),
            _ => self
                .extra_chars
                .iter()
                .position(|&c| c == ch)
                .map(|i| (i as u16 + EXTRA_CHARS_START) as u8),
        }
    }

    /// Encode ZSCII text to Z-characters the way the dictionary stores it:
    /// 6 Z-characters in 4 bytes (v1-3) or 9 in 6 bytes (v4+), padded with 5s.
    pub fn encode_zscii_word(&self, zscii: &[u8]) -> Vec<u8> {
        let resolution = if self.version <= 3 { 6 } else { 9 };
        let (shift_a1, shift_a2) = if self.version <= 2 { (2, 3) } else { (4, 5) };

        let mut zchars = Vec::with_capacity(resolution + 3);
        for &code in zscii {
            if zchars.len() >= resolution {
                break;
            }
            if code == b' ' {
                zchars.push(0);
            } else if let Some(i) = self.alphabets[0].iter().position(|&c| c == code) {
                zchars.push(i as u8 + 6);
            } else if let Some(i) = self.alphabets[1].iter().position(|&c| c == code) {
                zchars.extend_from_slice(&[shift_a1, i as u8 + 6]);
            } else if let Some(i) = self.alphabets[2]
                .iter()
                .skip(1)
                .position(|&c| c == code)
            {
                zchars.extend_from_slice(&[shift_a2, i as u8 + 7]);
            } else {
                zchars.extend_from_slice(&[shift_a2, 6, (code >> 5) & 0x1F, code & 0x1F]);
            }
        }
        zchars.truncate(resolution);
        zchars.resize(resolution, 5);

        let mut bytes = Vec::with_capacity(resolution / 3 * 2);
        for (i, chunk) in zchars.chunks(3).enumerate() {
            let mut word =
                ((chunk[0] as u16) << 10) | ((chunk[1] as u16) << 5) | chunk[2] as u16;
            if (i + 1) * 3 == resolution {
                word |= 0x8000;
            }
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes
    }
}

/// Transient decoding state over a codec's static tables. Abbreviations
/// are expanded by a child decoder that may not expand further.
pub struct ZTextDecoder<'a> {
    codec: &'a TextCodec,
    memory: &'a Memory,
    allow_abbreviations: bool,
}

impl<'a> ZTextDecoder<'a> {
    fn child(&self) -> ZTextDecoder<'a> {
        ZTextDecoder {
            codec: self.codec,
            memory: self.memory,
            allow_abbreviations: false,
        }
    }

    pub fn decode(&self, addr: u32) -> VmResult<(String, u32)> {
        let mut zchars = Vec::new();
        let mut offset = addr;
        loop {
            let word = self.memory.read_word(offset)?;
            offset += 2;
            zchars.extend_from_slice(&[
                ((word >> 10) & 0x1F) as u8,
                ((word >> 5) & 0x1F) as u8,
                (word & 0x1F) as u8,
            ]);
            if word & 0x8000 != 0 {
                break;
            }
        }
        trace!("Z-string at {:05x}: {:?}", addr, zchars);
        let text = self.decode_zchars(&zchars)?;
        Ok((text, offset - addr))
    }

    fn decode_zchars(&self, zchars: &[u8]) -> VmResult<String> {
        let version = self.codec.version;
        let mut result = String::new();
        let mut locked = 0usize;
        let mut current = 0usize;
        let mut iter = zchars.iter().copied();

        while let Some(zc) = iter.next() {
            let alphabet = current;
            current = locked;
            match zc {
                0 => result.push(' '),
                1 if version == 1 => result.push('\n'),
                1..=3 if version >= 3 || (version == 2 && zc == 1) => {
                    // Abbreviation; a trailing incomplete reference is dropped
                    let Some(index) = iter.next() else { break };
                    let entry = 32 * (zc as u32 - 1) + index as u32;
                    result.push_str(&self.expand_abbreviation(entry)?);
                }
                2 | 3 => {
                    // v1-2 temporary shift, relative to the locked alphabet
                    current = if zc == 2 { (locked + 1) % 3 } else { (locked + 2) % 3 };
                }
                4 | 5 if version <= 2 => {
                    locked = if zc == 4 { (locked + 1) % 3 } else { (locked + 2) % 3 };
                    current = locked;
                }
                4 => current = 1,
                5 => current = 2,
                6 if alphabet == 2 => {
                    // 10-bit ZSCII escape
                    let (Some(high), Some(low)) = (iter.next(), iter.next()) else {
                        break;
                    };
                    let code = ((high as u16) << 5) | low as u16;
                    if let Some(ch) = self.codec.zscii_to_char(code) {
                        result.push(ch);
                    }
                }
                _ => {
                    let code = self.codec.alphabets[alphabet][(zc - 6) as usize];
                    if let Some(ch) = self.codec.zscii_to_char(code as u16) {
                        result.push(ch);
                    }
                }
            }
        }
        Ok(result)
    }

    fn expand_abbreviation(&self, entry: u32) -> VmResult<String> {
        if !self.allow_abbreviations {
            return Err(VmError::Text(format!(
                "abbreviation {} used inside an abbreviation",
                entry
            )));
        }
        let word_addr = self
            .memory
            .read_word(self.codec.abbrev_table + 2 * entry)?;
        let (text, _) = self.child().decode(word_addr as u32 * 2)?;
        Ok(text)
    }
}
