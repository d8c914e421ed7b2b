mod dictionary;
mod format;
mod manager;
mod writer;

pub use dictionary::{DictionaryEntry, build_dictionary, parse_dictionary};
pub use format::{
    DIRECTORY_ENTRIES, DataAttributes, DirectoryBlock, EntryHeader, GlobalHeader, NAME_TABLE_ID,
    SIGNATURE, atoi, c_string, parse_name_table,
};
pub use manager::{CacheStats, ReadSeek, Resource, ResourceManager};
pub use writer::ContainerWriter;

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Seek, SeekFrom};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{ContainerError, ResourceError};

    fn sample() -> ContainerWriter {
        let mut w = ContainerWriter::new();
        w.insert(1, Some("start"), b"hello".to_vec()).unwrap();
        w.insert(2, Some("Menu"), vec![7u8; 300]).unwrap();
        w.insert(3, None, b"anonymous".to_vec()).unwrap();
        // forces a second directory block
        w.insert(200, Some("far_away"), b"block one".to_vec()).unwrap();
        w
    }

    fn open(w: &ContainerWriter) -> ResourceManager {
        ResourceManager::from_reader(Cursor::new(w.to_bytes())).unwrap()
    }

    /// Counts bytes pulled through `read`, to observe container traffic.
    struct Counting {
        inner: Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl Read for Counting {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    impl Seek for Counting {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn names_resolve_case_insensitively() {
        let rm = open(&sample());
        assert_eq!(rm.resource_id("start").unwrap(), 1);
        assert_eq!(rm.resource_id("START").unwrap(), 1);
        assert_eq!(rm.resource_id("menu").unwrap(), 2);
        assert_eq!(rm.resource_id("Far_Away").unwrap(), 200);
        assert!(matches!(rm.resource_id("missing"), Err(ResourceError::UnknownName(n)) if n == "missing"));

        let names = rm.names();
        assert_eq!(names, vec![("start", 1), ("menu", 2), ("far_away", 200)]);
    }

    #[test]
    fn every_named_resource_is_loadable() {
        let rm = open(&sample());
        for (name, id) in rm.names() {
            let res = rm.resource_by_name(name).unwrap();
            assert_eq!(res.id, id);
        }
        assert_eq!(rm.resource(2).unwrap().size(), 300);
        assert_eq!(rm.resource(200).unwrap().data(), b"block one");
        assert_eq!(rm.resource(3).unwrap().data(), b"anonymous");
    }

    #[test]
    fn repeated_lookups_share_one_read() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = Counting {
            inner: Cursor::new(sample().to_bytes()),
            reads: reads.clone(),
        };
        let rm = ResourceManager::from_reader(source).unwrap();

        let first = rm.resource(1).unwrap();
        let after_first = reads.load(Ordering::SeqCst);
        let second = rm.resource(1).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reads.load(Ordering::SeqCst), after_first);
        assert_eq!(rm.stats().reads, 1);
        assert_eq!(rm.stats().hits, 1);
    }

    #[test]
    fn concurrent_lookups_read_once() {
        let rm = Arc::new(open(&sample()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rm = rm.clone();
                std::thread::spawn(move || rm.resource(2).unwrap())
            })
            .collect();
        let blobs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(blobs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(rm.stats().reads, 1);
    }

    #[test]
    fn flush_and_evict_force_rereads() {
        let rm = open(&sample());
        let before = rm.resource(1).unwrap();
        assert!(rm.evict(1));
        assert!(!rm.is_cached(1));
        let after = rm.resource(1).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.data(), after.data());

        rm.resource(2).unwrap();
        rm.flush();
        assert_eq!(rm.stats().cached, 0);
        assert_eq!(rm.stats().reads, 3);
    }

    #[test]
    fn directory_cursor_moves_between_blocks() {
        let rm = open(&sample());
        assert_eq!(rm.resource(200).unwrap().data(), b"block one");
        assert_eq!(rm.resource(1).unwrap().data(), b"hello");
        rm.flush();
        assert_eq!(rm.resource(200).unwrap().data(), b"block one");
    }

    #[test]
    fn unknown_ids_fail() {
        let rm = open(&sample());
        assert!(matches!(rm.resource(4), Err(ResourceError::UnknownId(4))));
        // past the end of the directory chain
        assert!(matches!(rm.resource(5000), Err(ResourceError::UnknownId(5000))));
    }

    #[test]
    fn bad_containers_are_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            ResourceManager::from_reader(Cursor::new(bytes)),
            Err(ResourceError::Container(ContainerError::BadSignature { .. }))
        ));

        let bytes = sample().to_bytes();
        assert!(matches!(
            ResourceManager::from_reader(Cursor::new(bytes[..20].to_vec())),
            Err(ResourceError::Container(ContainerError::Truncated { .. }))
        ));
    }

    #[test]
    fn writer_rejects_reserved_and_duplicate_ids() {
        let mut w = ContainerWriter::new();
        assert!(w.insert(0, None, vec![]).is_err());
        w.insert(5, None, vec![]).unwrap();
        assert!(w.insert(5, None, vec![]).is_err());
        assert_eq!(w.push(Some("next"), vec![1]), 6);
    }

    #[test]
    fn open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eye.res");
        sample().write_to(&path).unwrap();
        let rm = ResourceManager::open(&path).unwrap();
        assert_eq!(rm.resource_by_name("START").unwrap().data(), b"hello");
        assert_eq!(rm.header().file_size as u64, std::fs::metadata(&path).unwrap().len());
    }
}
