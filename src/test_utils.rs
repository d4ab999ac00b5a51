//! Builders for small in-memory story images, so tests need no story files.
//!
//! Every story built here shares one layout:
//!
//! ```text
//! 0x0000 header
//! 0x0040 abbreviation table
//! 0x0100 global variables
//! 0x0300 object table (defaults, entries), property tables from 0x0500
//! 0x0600 text buffer, 0x0680 parse buffer, 0x0700 scratch tables
//! 0x0800 static memory: dictionary
//! 0x0900 static scratch (strings)
//! 0x0C00 high memory: entry point, routines from 0x1000
//! ```

use crate::header;

pub const STORY_SIZE: usize = 0x4000;

/// Encode `text` as a Z-string using the default alphabets.
pub fn encode_zstring(version: u8, text: &str) -> Vec<u8> {
    let mut zchars = zchars_for(version, text);
    while zchars.is_empty() || zchars.len() % 3 != 0 {
        zchars.push(5);
    }
    pack_zchars(&zchars)
}

/// Encode a dictionary word: 6 (v1-3) or 9 (v4+) Z-characters.
pub fn encode_dictionary_word(version: u8, word: &str) -> Vec<u8> {
    let resolution = if version <= 3 { 6 } else { 9 };
    let mut zchars = zchars_for(version, word);
    zchars.truncate(resolution);
    zchars.resize(resolution, 5);
    pack_zchars(&zchars)
}

fn zchars_for(version: u8, text: &str) -> Vec<u8> {
    let a2: &[u8] = if version == 1 {
        b" 0123456789.,!?_#'\"/\\<-:()"
    } else {
        b" \n0123456789.,!?_#'\"/\\-:()"
    };
    let (shift_a1, shift_a2) = if version <= 2 { (2, 3) } else { (4, 5) };

    let mut zchars = Vec::new();
    for ch in text.bytes() {
        match ch {
            b' ' => zchars.push(0),
            b'a'..=b'z' => zchars.push(ch - b'a' + 6),
            b'A'..=b'Z' => zchars.extend_from_slice(&[shift_a1, ch - b'A' + 6]),
            _ => match a2.iter().skip(1).position(|&c| c == ch) {
                Some(i) => zchars.extend_from_slice(&[shift_a2, i as u8 + 7]),
                None => zchars.extend_from_slice(&[shift_a2, 6, ch >> 5, ch & 0x1F]),
            },
        }
    }
    zchars
}

fn pack_zchars(zchars: &[u8]) -> Vec<u8> {
    let words = zchars.len() / 3;
    let mut bytes = Vec::with_capacity(words * 2);
    for (i, chunk) in zchars.chunks(3).enumerate() {
        let mut word = ((chunk[0] as u16) << 10) | ((chunk[1] as u16) << 5) | chunk[2] as u16;
        if i + 1 == words {
            word |= 0x8000;
        }
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes
}

/// One object in a built story
#[derive(Debug, Clone, Default)]
pub struct ObjectSpec {
    number: u16,
    parent: u16,
    sibling: u16,
    child: u16,
    attributes: Vec<u16>,
    name: String,
    properties: Vec<(u8, Vec<u8>)>,
}

impl ObjectSpec {
    pub fn new(number: u16) -> Self {
        ObjectSpec {
            number,
            ..Default::default()
        }
    }

    pub fn parent(mut self, parent: u16) -> Self {
        self.parent = parent;
        self
    }

    pub fn sibling(mut self, sibling: u16) -> Self {
        self.sibling = sibling;
        self
    }

    pub fn child(mut self, child: u16) -> Self {
        self.child = child;
        self
    }

    pub fn attributes(mut self, attributes: &[u16]) -> Self {
        self.attributes = attributes.to_vec();
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn property(mut self, number: u8, data: &[u8]) -> Self {
        self.properties.push((number, data.to_vec()));
        self
    }
}

pub struct StoryBuilder {
    version: u8,
    bytes: Vec<u8>,
    objects: Vec<ObjectSpec>,
    header_words: Vec<(u32, u16)>,
    dictionary: Option<(Vec<u8>, Vec<String>)>,
}

impl StoryBuilder {
    pub const ABBREVIATIONS: u32 = 0x0040;
    pub const GLOBALS: u32 = 0x0100;
    pub const OBJECT_TABLE: u32 = 0x0300;
    pub const PROPERTY_TABLES: u32 = 0x0500;
    pub const TEXT_BUFFER: u32 = 0x0600;
    pub const PARSE_BUFFER: u32 = 0x0680;
    pub const SCRATCH: u32 = 0x0700;
    pub const STATIC_BASE: u32 = 0x0800;
    pub const DICTIONARY: u32 = 0x0800;
    pub const STRINGS: u32 = 0x0900;
    pub const INITIAL_PC: u32 = 0x0C00;

    pub fn new(version: u8) -> Self {
        StoryBuilder {
            version,
            bytes: vec![0; STORY_SIZE],
            objects: Vec::new(),
            header_words: Vec::new(),
            dictionary: None,
        }
    }

    /// Where execution begins: version 6 enters a zero-local main routine
    pub fn entry_point(version: u8) -> u32 {
        if version == 6 {
            Self::INITIAL_PC + 1
        } else {
            Self::INITIAL_PC
        }
    }

    /// Packed form of a routine or string address
    pub fn packed(version: u8, addr: u32) -> u16 {
        match version {
            1..=3 => (addr / 2) as u16,
            4..=7 => (addr / 4) as u16,
            _ => (addr / 8) as u16,
        }
    }

    /// Override a header word after the defaults are written
    pub fn header_word(mut self, offset: u32, value: u16) -> Self {
        self.header_words.push((offset, value));
        self
    }

    pub fn code(mut self, addr: u32, code: &[u8]) -> Self {
        let start = addr as usize;
        self.bytes[start..start + code.len()].copy_from_slice(code);
        self
    }

    /// Code at the entry point
    pub fn main(self, code: &[u8]) -> Self {
        let entry = Self::entry_point(self.version);
        self.code(entry, code)
    }

    /// A routine header plus body. Initial values only exist before version 5.
    pub fn routine(mut self, addr: u32, locals: u8, initial: &[u16], body: &[u8]) -> Self {
        let mut at = addr as usize;
        self.bytes[at] = locals;
        at += 1;
        if self.version <= 4 {
            for i in 0..locals as usize {
                let value = initial.get(i).copied().unwrap_or(0);
                self.bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
                at += 2;
            }
        }
        self.bytes[at..at + body.len()].copy_from_slice(body);
        self
    }

    /// Set global variable `var` (16-255)
    pub fn global(mut self, var: u8, value: u16) -> Self {
        let addr = (Self::GLOBALS + 2 * (var as u32 - 16)) as usize;
        self.bytes[addr..addr + 2].copy_from_slice(&value.to_be_bytes());
        self
    }

    pub fn string(mut self, addr: u32, text: &str) -> Self {
        let encoded = encode_zstring(self.version, text);
        let start = addr as usize;
        self.bytes[start..start + encoded.len()].copy_from_slice(&encoded);
        self
    }

    pub fn object(mut self, spec: ObjectSpec) -> Self {
        self.objects.push(spec);
        self
    }

    pub fn default_property(mut self, prop: u8, value: u16) -> Self {
        let addr = (Self::OBJECT_TABLE + 2 * (prop as u32 - 1)) as usize;
        self.bytes[addr..addr + 2].copy_from_slice(&value.to_be_bytes());
        self
    }

    pub fn dictionary(mut self, separators: &[u8], words: &[&str]) -> Self {
        self.dictionary = Some((
            separators.to_vec(),
            words.iter().map(|w| w.to_string()).collect(),
        ));
        self
    }

    /// Address of a dictionary word in the built story
    pub fn dictionary_entry_addr(&self, word: &str) -> Option<u32> {
        let (separators, words) = self.dictionary.as_ref()?;
        let sorted = self.sorted_dictionary(words);
        let index = sorted.iter().position(|(_, w)| w == word)?;
        let entry_len = if self.version <= 3 { 7 } else { 9 };
        Some(Self::DICTIONARY + 1 + separators.len() as u32 + 3 + index as u32 * entry_len)
    }

    fn sorted_dictionary(&self, words: &[String]) -> Vec<(Vec<u8>, String)> {
        let mut sorted: Vec<(Vec<u8>, String)> = words
            .iter()
            .map(|w| (encode_dictionary_word(self.version, w), w.clone()))
            .collect();
        sorted.sort();
        sorted
    }

    fn write_objects(&mut self) {
        let v3 = self.version <= 3;
        let (defaults, entry_size) = if v3 { (31, 9) } else { (63, 14) };
        let tree_base = Self::OBJECT_TABLE + defaults * 2;
        let mut property_addr = Self::PROPERTY_TABLES as usize;

        let objects = std::mem::take(&mut self.objects);
        for spec in &objects {
            let entry = (tree_base + (spec.number as u32 - 1) * entry_size) as usize;
            for &attr in &spec.attributes {
                self.bytes[entry + attr as usize / 8] |= 0x80 >> (attr % 8);
            }
            if v3 {
                self.bytes[entry + 4] = spec.parent as u8;
                self.bytes[entry + 5] = spec.sibling as u8;
                self.bytes[entry + 6] = spec.child as u8;
                self.bytes[entry + 7..entry + 9]
                    .copy_from_slice(&(property_addr as u16).to_be_bytes());
            } else {
                self.bytes[entry + 6..entry + 8].copy_from_slice(&spec.parent.to_be_bytes());
                self.bytes[entry + 8..entry + 10].copy_from_slice(&spec.sibling.to_be_bytes());
                self.bytes[entry + 10..entry + 12].copy_from_slice(&spec.child.to_be_bytes());
                self.bytes[entry + 12..entry + 14]
                    .copy_from_slice(&(property_addr as u16).to_be_bytes());
            }

            let name = if spec.name.is_empty() {
                Vec::new()
            } else {
                encode_zstring(self.version, &spec.name)
            };
            self.bytes[property_addr] = (name.len() / 2) as u8;
            property_addr += 1;
            self.bytes[property_addr..property_addr + name.len()].copy_from_slice(&name);
            property_addr += name.len();

            let mut properties = spec.properties.clone();
            properties.sort_by(|a, b| b.0.cmp(&a.0));
            for (number, data) in properties {
                let len = data.len();
                if v3 {
                    self.bytes[property_addr] = 32 * (len as u8 - 1) + number;
                    property_addr += 1;
                } else if len == 1 {
                    self.bytes[property_addr] = number;
                    property_addr += 1;
                } else if len == 2 {
                    self.bytes[property_addr] = 0x40 | number;
                    property_addr += 1;
                } else {
                    self.bytes[property_addr] = 0x80 | number;
                    self.bytes[property_addr + 1] = 0x80 | (len as u8 & 0x3F);
                    property_addr += 2;
                }
                self.bytes[property_addr..property_addr + len].copy_from_slice(&data);
                property_addr += len;
            }
            self.bytes[property_addr] = 0;
            property_addr += 1;
        }
        self.objects = objects;
    }

    fn write_dictionary(&mut self) {
        let Some((separators, words)) = self.dictionary.clone() else {
            // An empty dictionary: no separators, 7-byte entries, none of them
            let at = Self::DICTIONARY as usize;
            self.bytes[at..at + 4].copy_from_slice(&[0, 7, 0, 0]);
            return;
        };
        let entry_len: u8 = if self.version <= 3 { 7 } else { 9 };
        let mut at = Self::DICTIONARY as usize;
        self.bytes[at] = separators.len() as u8;
        at += 1;
        self.bytes[at..at + separators.len()].copy_from_slice(&separators);
        at += separators.len();
        self.bytes[at] = entry_len;
        self.bytes[at + 1..at + 3].copy_from_slice(&(words.len() as u16).to_be_bytes());
        at += 3;
        for (encoded, _) in self.sorted_dictionary(&words) {
            self.bytes[at..at + encoded.len()].copy_from_slice(&encoded);
            at += entry_len as usize;
        }
    }

    pub fn build(mut self) -> Vec<u8> {
        let version = self.version;
        let scale = match version {
            1..=3 => 2,
            4 | 5 => 4,
            _ => 8,
        };

        let words = [
            (header::HIGH_MEMORY, Self::INITIAL_PC as u16),
            (
                header::INITIAL_PC,
                if version == 6 {
                    Self::packed(6, Self::INITIAL_PC)
                } else {
                    Self::INITIAL_PC as u16
                },
            ),
            (header::DICTIONARY, Self::DICTIONARY as u16),
            (header::OBJECT_TABLE, Self::OBJECT_TABLE as u16),
            (header::GLOBALS, Self::GLOBALS as u16),
            (header::STATIC_MEMORY, Self::STATIC_BASE as u16),
            (header::ABBREVIATIONS, Self::ABBREVIATIONS as u16),
            (header::FILE_LENGTH, (STORY_SIZE / scale) as u16),
            (header::RELEASE, 1),
        ];
        self.bytes[header::VERSION as usize] = version;
        for (offset, value) in words {
            let at = offset as usize;
            self.bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
        }
        self.bytes[header::SERIAL as usize..header::SERIAL as usize + 6]
            .copy_from_slice(b"260101");
        if version == 6 {
            // Main routine with no locals
            self.bytes[Self::INITIAL_PC as usize] = 0;
        }

        self.write_objects();
        self.write_dictionary();

        for &(offset, value) in &self.header_words {
            let at = offset as usize;
            self.bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
        }

        let checksum = self.bytes[header::HEADER_SIZE..]
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(b as u16));
        let at = header::CHECKSUM as usize;
        self.bytes[at..at + 2].copy_from_slice(&checksum.to_be_bytes());
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_zstring_pads_and_terminates() {
        let encoded = encode_zstring(3, "ab");
        assert_eq!(encoded.len(), 2);
        assert_eq!(u16::from_be_bytes([encoded[0], encoded[1]]), 0x8000 | (6 << 10) | (7 << 5) | 5);
        assert_eq!(encode_zstring(3, "").len(), 2);
    }

    #[test]
    fn test_dictionary_entries_are_sorted() {
        let builder = StoryBuilder::new(3).dictionary(&[b','], &["zebra", "apple"]);
        let apple = builder.dictionary_entry_addr("apple").unwrap();
        let zebra = builder.dictionary_entry_addr("zebra").unwrap();
        assert!(apple < zebra);
        let story = builder.build();
        assert_eq!(story[StoryBuilder::DICTIONARY as usize], 1);
        assert_eq!(&story[apple as usize..apple as usize + 4], &encode_dictionary_word(3, "apple")[..]);
    }
}
