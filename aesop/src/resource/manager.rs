use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::format::{
    self, DIRECTORY_BLOCK_SIZE, DataAttributes, DirectoryBlock, ENTRY_HEADER_SIZE, EntryHeader,
    GLOBAL_HEADER_SIZE, GlobalHeader, NAME_TABLE_ID,
};
use crate::{ContainerError, ResourceError};

/// Any seekable byte source a container can be read from.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// One resource blob, shared by everything that loaded it.
#[derive(Debug)]
pub struct Resource {
    pub id: u32,
    pub attributes: DataAttributes,
    data: Arc<[u8]>,
}

impl Resource {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the bytes, independent of the cache entry.
    pub fn bytes(&self) -> Arc<[u8]> {
        self.data.clone()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Blobs read from the container.
    pub reads: u64,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Blobs currently cached.
    pub cached: usize,
}

/// File access plus the single cached directory block.
struct Reader {
    source: Box<dyn ReadSeek>,
    directory: Option<(u32, DirectoryBlock)>,
}

impl Reader {
    fn read_at(&mut self, pos: u64, buf: &mut [u8], what: &'static str) -> Result<(), ContainerError> {
        self.source.seek(SeekFrom::Start(pos))?;
        self.source.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ContainerError::Truncated { what, offset: pos },
            _ => ContainerError::Io(e),
        })
    }

    /// Directory block `number`, walking the chain only when it is not the
    /// block already cached.
    fn directory_block(&mut self, first: u32, number: u32, id: u32) -> Result<&DirectoryBlock, ResourceError> {
        if self.directory.as_ref().is_none_or(|(cached, _)| *cached != number) {
            self.directory = None;
            let mut pos = first;
            let mut index = 0;
            let block = loop {
                if pos == 0 {
                    return Err(ResourceError::UnknownId(id));
                }
                let mut buf = [0u8; DIRECTORY_BLOCK_SIZE];
                self.read_at(pos as u64, &mut buf, "directory block")?;
                let block = DirectoryBlock::parse(&buf);
                if index == number {
                    break block;
                }
                pos = block.next_directory_block;
                index += 1;
            };
            log::trace!("directory block {number} loaded");
            self.directory = Some((number, block));
        }
        match &self.directory {
            Some((_, block)) => Ok(block),
            None => Err(ResourceError::UnknownId(id)),
        }
    }

    fn read_entry(&mut self, header: &GlobalHeader, id: u32) -> Result<(EntryHeader, Vec<u8>), ResourceError> {
        let (block_number, entry) = format::locate(id);
        let block = self.directory_block(header.first_directory_block, block_number, id)?;
        let entry_pos = block.entry_header_index[entry];
        if entry_pos == 0 {
            return Err(ResourceError::UnknownId(id));
        }

        let mut buf = [0u8; ENTRY_HEADER_SIZE];
        self.read_at(entry_pos as u64, &mut buf, "entry header")?;
        let entry = EntryHeader::parse(&buf);

        // data follows the entry header directly
        let mut data = vec![0u8; entry.data_size as usize];
        self.read_at(entry_pos as u64 + ENTRY_HEADER_SIZE as u64, &mut data, "resource data")?;
        Ok((entry, data))
    }
}

/// Reads resources out of an AESOP container and memoizes them by id.
///
/// Lookups are safe from several threads: a cache miss re-checks the cache
/// under the reader lock, so each id is read from the container at most
/// once until it is evicted.
pub struct ResourceManager {
    header: GlobalHeader,
    reader: Mutex<Reader>,
    names: HashMap<String, u32, ahash::RandomState>,
    cache: RwLock<HashMap<u32, Arc<Resource>, ahash::RandomState>>,
    reads: AtomicU64,
    hits: AtomicU64,
}

impl ResourceManager {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(ContainerError::from)?;
        log::info!("opening resource container {}", path.display());
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(source: impl Read + Seek + Send + 'static) -> Result<Self, ResourceError> {
        let mut reader = Reader {
            source: Box::new(source),
            directory: None,
        };

        let mut buf = [0u8; GLOBAL_HEADER_SIZE];
        reader.read_at(0, &mut buf, "global header")?;
        let header = GlobalHeader::parse(&buf)?;

        let (_, table) = reader.read_entry(&header, NAME_TABLE_ID)?;
        let mut names = HashMap::default();
        for (name, id) in format::parse_name_table(&table)? {
            names.insert(name.to_ascii_lowercase(), id);
        }
        log::debug!("name table: {} entries", names.len());

        Ok(Self {
            header,
            reader: Mutex::new(reader),
            names,
            cache: RwLock::new(HashMap::default()),
            reads: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        })
    }

    pub fn header(&self) -> &GlobalHeader {
        &self.header
    }

    /// Id of a named resource. Names compare case-insensitively.
    pub fn resource_id(&self, name: &str) -> Result<u32, ResourceError> {
        self.names
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| ResourceError::UnknownName(name.to_owned()))
    }

    /// All `(name, id)` pairs from the name table, sorted by id. Names are
    /// reported lower-cased.
    pub fn names(&self) -> Vec<(&str, u32)> {
        let mut all: Vec<_> = self.names.iter().map(|(n, &id)| (n.as_str(), id)).collect();
        all.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        all
    }

    /// The resource `id`. Repeated calls return the same shared blob.
    pub fn resource(&self, id: u32) -> Result<Arc<Resource>, ResourceError> {
        if let Some(res) = self.cached(id) {
            return Ok(res);
        }

        let mut reader = self.reader.lock();
        // another thread may have finished the read while we waited
        if let Some(res) = self.cached(id) {
            return Ok(res);
        }

        let (entry, data) = reader.read_entry(&self.header, id)?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        log::debug!("read resource {id} ({} bytes)", data.len());

        let res = Arc::new(Resource {
            id,
            attributes: entry.data_attributes,
            data: data.into(),
        });
        self.cache.write().insert(id, res.clone());
        Ok(res)
    }

    pub fn resource_by_name(&self, name: &str) -> Result<Arc<Resource>, ResourceError> {
        self.resource(self.resource_id(name)?)
    }

    fn cached(&self, id: u32) -> Option<Arc<Resource>> {
        let res = self.cache.read().get(&id).cloned()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(res)
    }

    pub fn is_cached(&self, id: u32) -> bool {
        self.cache.read().contains_key(&id)
    }

    /// Drop one cached blob. Holders of the `Arc` keep their copy.
    pub fn evict(&self, id: u32) -> bool {
        self.cache.write().remove(&id).is_some()
    }

    /// Drop every cached blob.
    pub fn flush(&self) {
        let mut cache = self.cache.write();
        log::debug!("flushing {} cached resources", cache.len());
        cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            reads: self.reads.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            cached: self.cache.read().len(),
        }
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("names", &self.names.len())
            .field("stats", &self.stats())
            .finish()
    }
}
