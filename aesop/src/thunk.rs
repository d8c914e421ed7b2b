use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytecode::Width;

use crate::resource::{DictionaryEntry, ResourceManager, atoi, parse_dictionary};
use crate::{IntrinsicId, IntrinsicRegistry, LoadError};

pub const PROGRAM_HEADER_SIZE: usize = 14;

const NO_RESOURCE: u32 = u32::MAX;

/// The fixed header at the start of every program resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    /// Bytes of static storage this class adds to an object.
    pub static_size: u16,
    /// Resource id of the import dictionary.
    pub imports: u32,
    /// Resource id of the export dictionary.
    pub exports: u32,
    pub parent: Option<u32>,
}

impl ProgramHeader {
    pub fn parse(program: u32, data: &[u8]) -> Result<Self, LoadError> {
        let bytes = data
            .get(..PROGRAM_HEADER_SIZE)
            .ok_or(LoadError::BadProgramHeader { program })?;
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let parent = u32_at(10);
        Ok(Self {
            static_size: u16::from_le_bytes([bytes[0], bytes[1]]),
            imports: u32_at(2),
            exports: u32_at(6),
            parent: (parent != NO_RESOURCE).then_some(parent),
        })
    }

    pub fn to_bytes(&self) -> [u8; PROGRAM_HEADER_SIZE] {
        let mut out = [0u8; PROGRAM_HEADER_SIZE];
        out[0..2].copy_from_slice(&self.static_size.to_le_bytes());
        out[2..6].copy_from_slice(&self.imports.to_le_bytes());
        out[6..10].copy_from_slice(&self.exports.to_le_bytes());
        out[10..14].copy_from_slice(&self.parent.unwrap_or(NO_RESOURCE).to_le_bytes());
        out
    }
}

/// A static variable a class exports to its descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportedVariable {
    pub width: Width,
    /// Absolute offset in the object's static area.
    pub offset: u32,
}

/// An imported variable, resolved against an ancestor's exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalReference {
    pub name: String,
    pub width: Width,
    /// Program id of the class that exports the variable.
    pub class: u32,
    /// Absolute offset in the object's static area.
    pub offset: u32,
}

/// One entry of a program's import table. Slots are numbered by their
/// position in the import dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSlot {
    Code(IntrinsicId),
    Variable(ExternalReference),
    Unused,
}

/// A loaded program resource, shared by every object of the class and by
/// every subclass that inherits from it.
#[derive(Debug)]
pub struct Thunk {
    id: u32,
    code: Arc<[u8]>,
    header: ProgramHeader,
    imports: Vec<ImportSlot>,
    exports: HashMap<String, ExportedVariable, ahash::RandomState>,
    handlers: BTreeMap<u32, u16>,
    parent: Option<Arc<Thunk>>,
    static_base: u32,
    depth: usize,
    use_count: AtomicUsize,
}

impl Thunk {
    /// Build the thunk for program `id`. `parent` must already be the built
    /// thunk of `header.parent`.
    pub fn build(
        id: u32,
        code: Arc<[u8]>,
        parent: Option<Arc<Thunk>>,
        resources: &ResourceManager,
        intrinsics: &IntrinsicRegistry,
    ) -> Result<Self, LoadError> {
        let header = ProgramHeader::parse(id, &code)?;
        let (static_base, depth) = match &parent {
            Some(p) => (p.static_base + p.header.static_size as u32, p.depth + 1),
            None => (0, 1),
        };

        let mut thunk = Self {
            id,
            code,
            header,
            imports: Vec::new(),
            exports: HashMap::default(),
            handlers: BTreeMap::new(),
            parent,
            static_base,
            depth,
            use_count: AtomicUsize::new(0),
        };

        for entry in dictionary(resources, header.exports)? {
            thunk.add_export(&entry);
        }
        for entry in dictionary(resources, header.imports)? {
            let slot = thunk.resolve_import(&entry, intrinsics)?;
            thunk.imports.push(slot);
        }

        log::debug!(
            "built thunk {id}: {} handlers, {} imports, statics {}+{}",
            thunk.handlers.len(),
            thunk.imports.len(),
            thunk.static_base,
            thunk.header.static_size
        );
        Ok(thunk)
    }

    fn add_export(&mut self, entry: &DictionaryEntry) {
        match entry.kind() {
            Some('M') => {
                let message = atoi(entry.name()) as u32;
                self.handlers.insert(message, atoi(&entry.def) as u16);
            }
            Some(kind @ ('B' | 'W' | 'L')) => {
                let var = ExportedVariable {
                    width: width_of(kind),
                    offset: self.static_base + atoi(&entry.def) as u32,
                };
                self.exports.insert(entry.name().to_owned(), var);
            }
            _ => log::trace!("thunk {}: ignoring export {:?}", self.id, entry.tag),
        }
    }

    fn resolve_import(&self, entry: &DictionaryEntry, intrinsics: &IntrinsicRegistry) -> Result<ImportSlot, LoadError> {
        let unresolved = || LoadError::ImportResolution {
            program: self.id,
            name: entry.tag.clone(),
        };
        match entry.kind() {
            Some('C') => intrinsics.lookup(entry.name()).map(ImportSlot::Code).ok_or_else(unresolved),
            Some(kind @ ('B' | 'W' | 'L')) => {
                let class_text = entry.def.rsplit(',').next().unwrap_or(&entry.def);
                let class = atoi(class_text) as u32;
                let owner = self.class(class).ok_or_else(unresolved)?;
                let var = owner.exports.get(entry.name()).ok_or_else(unresolved)?;
                Ok(ImportSlot::Variable(ExternalReference {
                    name: entry.name().to_owned(),
                    width: width_of(kind),
                    class,
                    offset: var.offset,
                }))
            }
            _ => Ok(ImportSlot::Unused),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// The whole program resource, header included. Code offsets index it.
    pub fn code(&self) -> &Arc<[u8]> {
        &self.code
    }

    pub fn header(&self) -> &ProgramHeader {
        &self.header
    }

    pub fn parent(&self) -> Option<&Arc<Thunk>> {
        self.parent.as_ref()
    }

    /// Classes in the inheritance chain, including this one.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Offset of this class's statics in the object's static area.
    pub fn static_base(&self) -> u32 {
        self.static_base
    }

    /// Size of the static area of an object of this class.
    pub fn object_statics_size(&self) -> usize {
        self.static_base as usize + self.header.static_size as usize
    }

    pub fn imports(&self) -> &[ImportSlot] {
        &self.imports
    }

    pub fn import(&self, slot: usize) -> Option<&ImportSlot> {
        self.imports.get(slot)
    }

    pub fn external_references(&self) -> impl Iterator<Item = &ExternalReference> {
        self.imports.iter().filter_map(|slot| match slot {
            ImportSlot::Variable(xref) => Some(xref),
            _ => None,
        })
    }

    pub fn export(&self, name: &str) -> Option<&ExportedVariable> {
        self.exports.get(name)
    }

    /// Message handlers this class declares itself, ordered by message.
    pub fn handlers(&self) -> &BTreeMap<u32, u16> {
        &self.handlers
    }

    /// This class or the ancestor with program id `class`.
    pub fn class(&self, class: u32) -> Option<&Thunk> {
        let mut cur = Some(self);
        while let Some(t) = cur {
            if t.id == class {
                return Some(t);
            }
            cur = t.parent.as_deref();
        }
        None
    }

    /// Find the handler for `message`, searching this class then its
    /// ancestors. Returns the defining class and the handler offset.
    pub fn find_handler(self: &Arc<Self>, message: u32) -> Option<(Arc<Thunk>, u16)> {
        let mut cur = Some(self);
        while let Some(t) = cur {
            if let Some(&offset) = t.handlers.get(&message) {
                return Some((t.clone(), offset));
            }
            cur = t.parent.as_ref();
        }
        None
    }

    /// Number of live objects running this program directly.
    pub fn use_count(&self) -> usize {
        self.use_count.load(Ordering::Acquire)
    }

    pub(crate) fn acquire(&self) {
        self.use_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&self) {
        self.use_count.fetch_sub(1, Ordering::AcqRel);
    }
}

fn dictionary(resources: &ResourceManager, id: u32) -> Result<Vec<DictionaryEntry>, LoadError> {
    if id == 0 || id == NO_RESOURCE {
        return Ok(Vec::new());
    }
    let res = resources.resource(id)?;
    parse_dictionary(id, res.data())
}

fn width_of(kind: char) -> Width {
    match kind {
        'B' => Width::Byte,
        'W' => Width::Word,
        _ => Width::Dword,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::GameVariant;
    use crate::resource::{ContainerWriter, build_dictionary};

    fn program(static_size: u16, imports: u32, exports: u32, parent: Option<u32>) -> Vec<u8> {
        let mut data = ProgramHeader { static_size, imports, exports, parent }.to_bytes().to_vec();
        data.extend_from_slice(&[0, 0, 0x56]);
        data
    }

    fn fixture() -> ResourceManager {
        let mut w = ContainerWriter::new();
        // base class 10 exports `hp` and handles message 0
        w.insert(10, Some("base"), program(8, 0, 11, None)).unwrap();
        w.insert(11, None, build_dictionary([("M:0", "14"), ("W:hp", "4")])).unwrap();
        // child 20 imports rnd and base's hp
        w.insert(20, Some("child"), program(6, 21, 22, Some(10))).unwrap();
        w.insert(21, None, build_dictionary([("C:RND", ""), ("W:hp", "hp,10"), ("X:skip", "")]))
            .unwrap();
        w.insert(22, None, build_dictionary([("M:5", "14"), ("L:gold", "2")])).unwrap();
        // orphan import
        w.insert(30, Some("broken"), program(0, 31, 0, Some(10))).unwrap();
        w.insert(31, None, build_dictionary([("C:no_such_thing", "")])).unwrap();
        ResourceManager::from_reader(Cursor::new(w.to_bytes())).unwrap()
    }

    fn build(rm: &ResourceManager, id: u32, parent: Option<Arc<Thunk>>) -> Result<Thunk, LoadError> {
        let registry = IntrinsicRegistry::new(GameVariant::Eob3);
        let code = rm.resource(id).unwrap().bytes();
        Thunk::build(id, code, parent, rm, &registry)
    }

    #[test]
    fn header_layout() {
        let header = ProgramHeader { static_size: 0x102, imports: 7, exports: 8, parent: None };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[10..], &[0xff; 4]);
        assert_eq!(ProgramHeader::parse(1, &bytes).unwrap(), header);
        assert!(matches!(
            ProgramHeader::parse(1, &bytes[..13]),
            Err(LoadError::BadProgramHeader { program: 1 })
        ));
    }

    #[test]
    fn child_resolves_against_parent() {
        let rm = fixture();
        let base = Arc::new(build(&rm, 10, None).unwrap());
        let child = Arc::new(build(&rm, 20, Some(base.clone())).unwrap());

        assert_eq!(child.static_base(), 8);
        assert_eq!(child.object_statics_size(), 14);
        assert_eq!(child.depth(), 2);
        assert_eq!(child.export("gold").unwrap().offset, 10);

        assert!(matches!(child.import(0), Some(ImportSlot::Code(_))));
        match child.import(1) {
            Some(ImportSlot::Variable(xref)) => {
                assert_eq!(xref.class, 10);
                assert_eq!(xref.offset, 4);
                assert_eq!(xref.width, Width::Word);
            }
            other => panic!("unexpected slot {other:?}"),
        }
        assert_eq!(child.import(2), Some(&ImportSlot::Unused));
        assert_eq!(child.external_references().count(), 1);

        let (owner, offset) = child.find_handler(0).unwrap();
        assert_eq!(owner.id(), 10);
        assert_eq!(offset, 14);
        assert_eq!(child.find_handler(5).unwrap().0.id(), 20);
        assert!(child.find_handler(6).is_none());
    }

    #[test]
    fn unknown_intrinsic_fails_the_load() {
        let rm = fixture();
        let base = Arc::new(build(&rm, 10, None).unwrap());
        let err = build(&rm, 30, Some(base)).unwrap_err();
        assert!(matches!(err, LoadError::ImportResolution { program: 30, ref name } if name == "C:no_such_thing"));
    }

    #[test]
    fn use_count_tracks_acquire_and_release() {
        let rm = fixture();
        let base = build(&rm, 10, None).unwrap();
        base.acquire();
        base.acquire();
        base.release();
        assert_eq!(base.use_count(), 1);
    }
}
