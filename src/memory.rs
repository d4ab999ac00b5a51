use crate::error::{VmError, VmResult};

/// The story image as a flat, byte-addressable buffer.
///
/// Addresses are `u32` because packed addresses in version 4+ stories
/// unpack beyond 16 bits. Memory itself does not enforce the dynamic/static
/// boundary; the VM rejects Z-code writes past `static_mem_base`.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
    /// Untouched copy of the story as loaded, for restart and verify
    original: Vec<u8>,
}

impl Memory {
    pub fn new(bytes: Vec<u8>) -> Self {
        let original = bytes.clone();
        Memory { bytes, original }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn read_byte(&self, addr: u32) -> VmResult<u8> {
        self.bytes
            .get(addr as usize)
            .copied()
            .ok_or(VmError::MemoryOutOfBounds { address: addr })
    }

    /// Read a word (2 bytes, big-endian)
    pub fn read_word(&self, addr: u32) -> VmResult<u16> {
        let high = self.read_byte(addr)? as u16;
        let low = self.read_byte(addr.wrapping_add(1))? as u16;
        Ok((high << 8) | low)
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) -> VmResult<()> {
        match self.bytes.get_mut(addr as usize) {
            Some(byte) => {
                *byte = value;
                Ok(())
            }
            None => Err(VmError::MemoryOutOfBounds { address: addr }),
        }
    }

    pub fn write_word(&mut self, addr: u32, value: u16) -> VmResult<()> {
        self.write_byte(addr, (value >> 8) as u8)?;
        self.write_byte(addr.wrapping_add(1), value as u8)
    }

    /// Borrow `len` bytes starting at `addr`
    pub fn slice(&self, addr: u32, len: usize) -> VmResult<&[u8]> {
        let start = addr as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(VmError::MemoryOutOfBounds {
                address: addr.saturating_add(len as u32),
            })?;
        Ok(&self.bytes[start..end])
    }

    /// Copy `len` bytes from `src` to `dst`; overlapping ranges are safe.
    pub fn copy_within(&mut self, src: u32, dst: u32, len: usize) -> VmResult<()> {
        self.slice(src, len)?;
        self.slice(dst, len)?;
        let src = src as usize;
        self.bytes.copy_within(src..src + len, dst as usize);
        Ok(())
    }

    /// Overwrite the start of memory with `data`
    pub fn load_prefix(&mut self, data: &[u8]) -> VmResult<()> {
        if data.len() > self.bytes.len() {
            return Err(VmError::MemoryOutOfBounds {
                address: data.len() as u32,
            });
        }
        self.bytes[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Rebuild the first `len` bytes from the original image
    pub fn reset_prefix(&mut self, len: usize) {
        let len = len.min(self.original.len()).min(self.bytes.len());
        self.bytes[..len].copy_from_slice(&self.original[..len]);
    }
}
