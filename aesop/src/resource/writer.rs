use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::format::{
    DIRECTORY_BLOCK_SIZE, DataAttributes, DirectoryBlock, ENTRY_HEADER_SIZE, EntryHeader,
    GLOBAL_HEADER_SIZE, GlobalHeader, NAME_TABLE_HEADER_SIZE, NAME_TABLE_ID, NAME_TABLE_SLOTS,
    locate,
};

struct Entry {
    name: Option<String>,
    attributes: DataAttributes,
    data: Vec<u8>,
}

/// Builds an AESOP container in memory.
///
/// Resource 0 is reserved for the name table, which is generated from the
/// names given to [`insert`](Self::insert).
#[derive(Default)]
pub struct ContainerWriter {
    entries: BTreeMap<u32, Entry>,
}

impl ContainerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, name: Option<&str>, data: impl Into<Vec<u8>>) -> io::Result<&mut Self> {
        if id == NAME_TABLE_ID {
            return Err(invalid_input("resource 0 is reserved for the name table"));
        }
        if self.entries.contains_key(&id) {
            return Err(invalid_input("duplicate resource id"));
        }
        self.entries.insert(id, Entry {
            name: name.map(str::to_owned),
            attributes: DataAttributes::MOVEABLE | DataAttributes::DISCARDABLE,
            data: data.into(),
        });
        Ok(self)
    }

    /// Insert under the next unused id and return it.
    pub fn push(&mut self, name: Option<&str>, data: impl Into<Vec<u8>>) -> u32 {
        let id = self.next_id();
        self.entries.insert(id, Entry {
            name: name.map(str::to_owned),
            attributes: DataAttributes::MOVEABLE | DataAttributes::DISCARDABLE,
            data: data.into(),
        });
        id
    }

    pub fn next_id(&self) -> u32 {
        self.entries.keys().next_back().map_or(1, |&id| id + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize: header, entries (name table first), then the directory chain.
    pub fn to_bytes(&self) -> Vec<u8> {
        let table = self.name_table();
        let mut out = vec![0u8; GLOBAL_HEADER_SIZE];

        let max_id = self.entries.keys().next_back().copied().unwrap_or(0);
        let (last_block, _) = locate(max_id);
        let mut blocks = vec![DirectoryBlock::default(); last_block as usize + 1];

        let all = std::iter::once((NAME_TABLE_ID, DataAttributes::PRECIOUS, table.as_slice()))
            .chain(self.entries.iter().map(|(&id, e)| (id, e.attributes, e.data.as_slice())));
        for (id, attributes, data) in all {
            let (block, entry) = locate(id);
            let block = &mut blocks[block as usize];
            block.entry_header_index[entry] = out.len() as u32;
            block.data_attributes[entry] = attributes.bits() as u8;
            let header = EntryHeader {
                storage_time: 0,
                data_attributes: attributes,
                data_size: data.len() as u32,
            };
            out.extend_from_slice(&header.to_bytes());
            out.extend_from_slice(data);
        }

        let first_block = out.len() as u32;
        let count = blocks.len();
        for (i, block) in blocks.iter_mut().enumerate() {
            if i + 1 < count {
                block.next_directory_block = first_block + ((i + 1) * DIRECTORY_BLOCK_SIZE) as u32;
            }
            out.extend_from_slice(&block.to_bytes());
        }

        let header = GlobalHeader::new(out.len() as u32, first_block);
        out[..GLOBAL_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        debug_assert!(out.len() >= GLOBAL_HEADER_SIZE + ENTRY_HEADER_SIZE + NAME_TABLE_HEADER_SIZE);
        out
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_all(&self.to_bytes())?;
        w.flush()
    }

    fn name_table(&self) -> Vec<u8> {
        let mut slots: Vec<Vec<(&str, u32)>> = vec![Vec::new(); NAME_TABLE_SLOTS];
        let mut count = 0u16;
        for (&id, entry) in &self.entries {
            if let Some(name) = &entry.name {
                slots[name_slot(name)].push((name, id));
                count += 1;
            }
        }

        let mut body = Vec::new();
        let mut offsets = Vec::with_capacity(NAME_TABLE_SLOTS);
        for slot in &slots {
            offsets.push((NAME_TABLE_HEADER_SIZE + body.len()) as u32);
            for &(name, id) in slot {
                push_c_string(&mut body, name.as_bytes());
                push_c_string(&mut body, id.to_string().as_bytes());
            }
            body.extend_from_slice(&0u16.to_le_bytes());
        }

        let mut table = Vec::with_capacity(NAME_TABLE_HEADER_SIZE + body.len());
        table.extend_from_slice(&count.to_le_bytes());
        for offset in offsets {
            table.extend_from_slice(&offset.to_le_bytes());
        }
        table.extend_from_slice(&body);
        table
    }
}

/// Length-prefixed string, NUL terminator counted in the length.
pub fn push_c_string(out: &mut Vec<u8>, s: &[u8]) {
    out.extend_from_slice(&(s.len() as u16 + 1).to_le_bytes());
    out.extend_from_slice(s);
    out.push(0);
}

fn name_slot(name: &str) -> usize {
    let hash = name
        .bytes()
        .map(|b| b.to_ascii_lowercase())
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
    hash as usize % NAME_TABLE_SLOTS
}

fn invalid_input(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}
