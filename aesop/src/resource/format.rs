//! On-disk layout of AESOP resource containers. Everything is little-endian
//! and packed.

use bitflags::bitflags;

use crate::ContainerError;

pub const SIGNATURE: &[u8] = b"AESOP/16 V1.00";
pub const SIGNATURE_LEN: usize = 16;
pub const GLOBAL_HEADER_SIZE: usize = SIGNATURE_LEN + 5 * 4;

/// Entries per directory block; a resource id maps to `(id / 128, id % 128)`.
pub const DIRECTORY_ENTRIES: usize = 128;
pub const DIRECTORY_BLOCK_SIZE: usize = 4 + DIRECTORY_ENTRIES + DIRECTORY_ENTRIES * 4;
pub const ENTRY_HEADER_SIZE: usize = 12;

/// Resource 0 holds the name table.
pub const NAME_TABLE_ID: u32 = 0;
pub const NAME_TABLE_SLOTS: usize = 512;
pub const NAME_TABLE_HEADER_SIZE: usize = 2 + NAME_TABLE_SLOTS * 4;

bitflags! {
    /// Storage attributes of a resource entry. Unknown bits are preserved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataAttributes: u32 {
        const FIXED = 1 << 0;
        const MOVEABLE = 1 << 1;
        const PRECIOUS = 1 << 5;
        const DISCARDABLE = 1 << 6;
        const TEMPORARY = 1 << 7;
        const _ = !0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalHeader {
    pub signature: [u8; SIGNATURE_LEN],
    pub file_size: u32,
    pub lost_space: u32,
    pub first_directory_block: u32,
    pub create_time: u32,
    pub modify_time: u32,
}

impl GlobalHeader {
    pub fn new(file_size: u32, first_directory_block: u32) -> Self {
        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        Self {
            signature,
            file_size,
            lost_space: 0,
            first_directory_block,
            create_time: 0,
            modify_time: 0,
        }
    }

    pub fn parse(bytes: &[u8; GLOBAL_HEADER_SIZE]) -> Result<Self, ContainerError> {
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&bytes[..SIGNATURE_LEN]);
        // the signature is a C string: compare up to the first NUL
        let text_len = signature.iter().position(|&b| b == 0).unwrap_or(SIGNATURE_LEN);
        if &signature[..text_len] != SIGNATURE {
            return Err(ContainerError::BadSignature {
                found: String::from_utf8_lossy(&signature[..text_len]).into_owned(),
            });
        }
        let mut r = LeReader::new(&bytes[SIGNATURE_LEN..]);
        Ok(Self {
            signature,
            file_size: r.u32(),
            lost_space: r.u32(),
            first_directory_block: r.u32(),
            create_time: r.u32(),
            modify_time: r.u32(),
        })
    }

    pub fn to_bytes(&self) -> [u8; GLOBAL_HEADER_SIZE] {
        let mut out = [0u8; GLOBAL_HEADER_SIZE];
        out[..SIGNATURE_LEN].copy_from_slice(&self.signature);
        let fields = [
            self.file_size,
            self.lost_space,
            self.first_directory_block,
            self.create_time,
            self.modify_time,
        ];
        for (i, v) in fields.iter().enumerate() {
            let at = SIGNATURE_LEN + i * 4;
            out[at..at + 4].copy_from_slice(&v.to_le_bytes());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryBlock {
    /// File offset of the next block; 0 ends the chain.
    pub next_directory_block: u32,
    pub data_attributes: [u8; DIRECTORY_ENTRIES],
    /// File offset of each entry's header; 0 marks an unused entry.
    pub entry_header_index: [u32; DIRECTORY_ENTRIES],
}

impl Default for DirectoryBlock {
    fn default() -> Self {
        Self {
            next_directory_block: 0,
            data_attributes: [0; DIRECTORY_ENTRIES],
            entry_header_index: [0; DIRECTORY_ENTRIES],
        }
    }
}

impl DirectoryBlock {
    pub fn parse(bytes: &[u8; DIRECTORY_BLOCK_SIZE]) -> Self {
        let mut block = Self::default();
        let mut r = LeReader::new(bytes);
        block.next_directory_block = r.u32();
        block
            .data_attributes
            .copy_from_slice(&bytes[4..4 + DIRECTORY_ENTRIES]);
        r.pos += DIRECTORY_ENTRIES;
        for slot in block.entry_header_index.iter_mut() {
            *slot = r.u32();
        }
        block
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DIRECTORY_BLOCK_SIZE);
        out.extend_from_slice(&self.next_directory_block.to_le_bytes());
        out.extend_from_slice(&self.data_attributes);
        for v in &self.entry_header_index {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub storage_time: u32,
    pub data_attributes: DataAttributes,
    pub data_size: u32,
}

impl EntryHeader {
    pub fn parse(bytes: &[u8; ENTRY_HEADER_SIZE]) -> Self {
        let mut r = LeReader::new(bytes);
        Self {
            storage_time: r.u32(),
            data_attributes: DataAttributes::from_bits_retain(r.u32()),
            data_size: r.u32(),
        }
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_HEADER_SIZE] {
        let mut out = [0u8; ENTRY_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.storage_time.to_le_bytes());
        out[4..8].copy_from_slice(&self.data_attributes.bits().to_le_bytes());
        out[8..12].copy_from_slice(&self.data_size.to_le_bytes());
        out
    }
}

/// Directory position of a resource id.
pub fn locate(id: u32) -> (u32, usize) {
    (id / DIRECTORY_ENTRIES as u32, (id % DIRECTORY_ENTRIES as u32) as usize)
}

/// Parse the name table held by resource 0 into `(name, id)` pairs.
///
/// Each of the 512 slots is a run of length-prefixed strings alternating
/// name and decimal id, closed by a zero length.
pub fn parse_name_table(data: &[u8]) -> Result<Vec<(String, u32)>, ContainerError> {
    let header = data.get(..NAME_TABLE_HEADER_SIZE).ok_or(ContainerError::Truncated {
        what: "name table header",
        offset: 0,
    })?;
    let mut r = LeReader::new(header);
    let _count = r.u16();

    let mut names = Vec::new();
    for _ in 0..NAME_TABLE_SLOTS {
        let mut pos = r.u32() as usize;
        let mut name: Option<String> = None;
        loop {
            let len = read_u16_at(data, pos, "name table slot")? as usize;
            pos += 2;
            if len == 0 {
                break;
            }
            let bytes = data.get(pos..pos + len).ok_or(ContainerError::Truncated {
                what: "name table string",
                offset: pos as u64,
            })?;
            pos += len;
            let text = c_string(bytes);
            match name.take() {
                None => name = Some(text),
                Some(n) => names.push((n, atoi(&text) as u32)),
            }
        }
    }
    Ok(names)
}

/// Strings in the container carry their NUL terminator inside the length.
pub fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// C `atoi`: optional whitespace and sign, then leading digits. Garbage is 0.
pub fn atoi(text: &str) -> i32 {
    let s = text.trim_start();
    let (neg, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut v: i32 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        v = v.wrapping_mul(10).wrapping_add((b - b'0') as i32);
    }
    if neg { v.wrapping_neg() } else { v }
}

fn read_u16_at(data: &[u8], pos: usize, what: &'static str) -> Result<u16, ContainerError> {
    data.get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(ContainerError::Truncated { what, offset: pos as u64 })
}

/// Little-endian field reader over a slice already known to be long enough.
struct LeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn u16(&mut self) -> u16 {
        let b = &self.bytes[self.pos..self.pos + 2];
        self.pos += 2;
        u16::from_le_bytes([b[0], b[1]])
    }

    fn u32(&mut self) -> u32 {
        let b = &self.bytes[self.pos..self.pos + 4];
        self.pos += 4;
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_sizes() {
        assert_eq!(GLOBAL_HEADER_SIZE, 36);
        assert_eq!(DIRECTORY_BLOCK_SIZE, 644);
        assert_eq!(NAME_TABLE_HEADER_SIZE, 2050);
        assert_eq!(locate(0), (0, 0));
        assert_eq!(locate(300), (2, 44));
    }

    #[test]
    fn header_signature_is_checked() {
        let header = GlobalHeader::new(1234, 36);
        let bytes = header.to_bytes();
        assert_eq!(GlobalHeader::parse(&bytes).unwrap(), header);

        let mut bad = bytes;
        bad[6] = b'3';
        assert!(matches!(
            GlobalHeader::parse(&bad),
            Err(ContainerError::BadSignature { found }) if found == "AESOP/36 V1.00"
        ));
    }

    #[test]
    fn directory_block_round_trips() {
        let mut block = DirectoryBlock::default();
        block.next_directory_block = 0x1000;
        block.data_attributes[3] = 0x40;
        block.entry_header_index[127] = 0xdead;
        let bytes: [u8; DIRECTORY_BLOCK_SIZE] = block.to_bytes().try_into().unwrap();
        assert_eq!(DirectoryBlock::parse(&bytes), block);
    }

    #[test]
    fn entry_header_keeps_unknown_attribute_bits() {
        let entry = EntryHeader {
            storage_time: 7,
            data_attributes: DataAttributes::from_bits_retain(0x8000_0040),
            data_size: 99,
        };
        let parsed = EntryHeader::parse(&entry.to_bytes());
        assert!(parsed.data_attributes.contains(DataAttributes::DISCARDABLE));
        assert_eq!(parsed.data_attributes.bits(), 0x8000_0040);
    }

    #[test]
    fn atoi_matches_c() {
        assert_eq!(atoi("42"), 42);
        assert_eq!(atoi("  -17xyz"), -17);
        assert_eq!(atoi("abc"), 0);
        assert_eq!(atoi(""), 0);
    }

    #[test]
    fn c_strings_stop_at_nul() {
        assert_eq!(c_string(b"start\0"), "start");
        assert_eq!(c_string(b"no-nul"), "no-nul");
    }
}
