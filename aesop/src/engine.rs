use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::intrinsics::Rng;
use crate::stack::{ExecutionStateInfo, Frame};
use crate::{
    BOOTSTRAP, BOOTSTRAP_PROGRAM, EngineConfig, EngineError, ExecutionState, IntrinsicRegistry,
    LoadError, MAX_INHERITANCE_DEPTH, MSG_CREATE, MSG_DESTROY, Object, ObjectTable, ProgramHeader,
    ResourceManager, RuntimeError, ScriptError, Thunk, Value, interpreter, memory,
};

/// A program named either by its resource name or its resource id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramRef<'a> {
    Name(&'a str),
    Id(u32),
}

impl<'a> From<&'a str> for ProgramRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl From<u32> for ProgramRef<'_> {
    fn from(id: u32) -> Self {
        Self::Id(id)
    }
}

/// Object table, thunk cache and the entry points that run bytecode.
pub struct Engine {
    resources: Arc<ResourceManager>,
    intrinsics: Arc<IntrinsicRegistry>,
    config: EngineConfig,
    objects: ObjectTable,
    thunks: HashMap<u32, Weak<Thunk>, ahash::RandomState>,
    rng: Rng,
}

impl Engine {
    pub fn new(resources: Arc<ResourceManager>, config: EngineConfig) -> Self {
        let intrinsics = IntrinsicRegistry::new(config.variant);
        Self::with_intrinsics(resources, config, intrinsics)
    }

    /// Use a caller-built registry, e.g. one with host functions registered
    /// for graphics or input.
    pub fn with_intrinsics(resources: Arc<ResourceManager>, config: EngineConfig, intrinsics: IntrinsicRegistry) -> Self {
        Self {
            resources,
            intrinsics: Arc::new(intrinsics),
            objects: ObjectTable::new(config.max_objects),
            thunks: HashMap::default(),
            rng: Rng::new(config.rng_seed),
            config,
        }
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn intrinsics(&self) -> &Arc<IntrinsicRegistry> {
        &self.intrinsics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    pub(crate) fn objects_mut(&mut self) -> &mut ObjectTable {
        &mut self.objects
    }

    pub fn rng_mut(&mut self) -> &mut Rng {
        &mut self.rng
    }

    pub fn object(&self, index: usize) -> Option<&Object> {
        self.objects.get(index)
    }

    pub fn live_objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.iter()
    }

    /// The loaded thunk of `program_id`, if any object or subclass still
    /// holds it.
    pub fn thunk_for(&self, program_id: u32) -> Option<Arc<Thunk>> {
        self.thunks.get(&program_id)?.upgrade()
    }

    /// Number of thunks alive in the cache.
    pub fn loaded_thunks(&self) -> usize {
        self.thunks.values().filter(|t| t.strong_count() > 0).count()
    }

    pub fn new_state(&self) -> ExecutionState {
        ExecutionState::new(&ExecutionStateInfo {
            stack_size: self.config.stack_cells,
            max_frames: self.config.max_call_depth,
            instruction_budget: self.config.instruction_budget,
        })
    }

    /// Build (or reuse) the thunk of `id` and of every ancestor.
    pub fn load_thunk(&mut self, id: u32) -> Result<Arc<Thunk>, LoadError> {
        if let Some(thunk) = self.thunk_for(id) {
            return Ok(thunk);
        }

        let too_deep = || LoadError::InheritanceTooDeep {
            program: id,
            limit: MAX_INHERITANCE_DEPTH,
        };
        let mut pending = Vec::new();
        let mut base = None;
        let mut next = Some(id);
        while let Some(class) = next {
            if let Some(thunk) = self.thunk_for(class) {
                base = Some(thunk);
                break;
            }
            if pending.len() >= MAX_INHERITANCE_DEPTH {
                return Err(too_deep());
            }
            let res = self.resources.resource(class)?;
            next = ProgramHeader::parse(class, res.data())?.parent;
            pending.push((class, res.bytes()));
        }
        if pending.len() + base.as_ref().map_or(0, |b| b.depth()) > MAX_INHERITANCE_DEPTH {
            return Err(too_deep());
        }

        let mut parent = base;
        for (class, code) in pending.into_iter().rev() {
            let thunk = Arc::new(Thunk::build(class, code, parent.take(), &self.resources, &self.intrinsics)?);
            self.thunks.insert(class, Arc::downgrade(&thunk));
            parent = Some(thunk);
        }
        parent.ok_or(LoadError::BadProgramHeader { program: id })
    }

    /// Create the bootstrap object.
    pub fn bootstrap(&mut self) -> Result<usize, EngineError> {
        self.create_program(Some(BOOTSTRAP), ProgramRef::Name(BOOTSTRAP_PROGRAM))
    }

    /// Instantiate `program` at `index`, or at the first free slot above the
    /// entity range when `index` is `None`, and send it `MSG_CREATE`.
    pub fn create_program(&mut self, index: Option<usize>, program: ProgramRef<'_>) -> Result<usize, EngineError> {
        let mut state = self.new_state();
        let result = self.create_program_in(&mut state, index, program);
        if let Err(e) = &result {
            log::error!("{e}");
        }
        result
    }

    pub(crate) fn create_program_in(
        &mut self,
        state: &mut ExecutionState,
        index: Option<usize>,
        program: ProgramRef<'_>,
    ) -> Result<usize, EngineError> {
        let id = match program {
            ProgramRef::Name(name) => self.resources.resource_id(name)?,
            ProgramRef::Id(id) => id,
        };
        let index = match index {
            Some(i) if i >= self.objects.capacity() => {
                return Err(EngineError::InvalidIndex {
                    index: i,
                    capacity: self.objects.capacity(),
                });
            }
            Some(i) => i,
            None => self
                .objects
                .find_free(self.config.entity_limit..self.config.max_objects)
                .ok_or(EngineError::ObjectTableFull)?,
        };

        // a failed load leaves the table untouched
        let thunk = self.load_thunk(id)?;
        if self.objects.is_occupied(index) {
            self.destroy_object_in(state, index)?;
        }

        let has_create = thunk.find_handler(MSG_CREATE).is_some();
        self.objects.insert(Object::new(index, id, thunk));
        log::debug!("created object {index} running program {id}");

        if has_create {
            self.execute_in(state, index, MSG_CREATE, None, Vec::new())?;
        }
        Ok(index)
    }

    /// Run `message` on object `index`. `vector` names the handler offset
    /// directly; `None` looks it up through the class chain.
    pub fn execute(&mut self, index: usize, message: u32, vector: Option<u16>) -> Result<Value, ScriptError> {
        let mut state = self.new_state();
        let result = self.execute_in(&mut state, index, message, vector, Vec::new());
        if let Err(e) = &result {
            log::error!("{e}");
        }
        result
    }

    /// Send `message` with arguments to object `index`.
    pub fn send(&mut self, index: usize, message: u32, args: &[Value]) -> Result<Value, ScriptError> {
        let mut state = self.new_state();
        let result = self.execute_in(&mut state, index, message, None, args.to_vec());
        if let Err(e) = &result {
            log::error!("{e}");
        }
        result
    }

    pub(crate) fn execute_in(
        &mut self,
        state: &mut ExecutionState,
        index: usize,
        message: u32,
        vector: Option<u16>,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        self.dispatch(state, index, message, vector, args)
            .map_err(|source| ScriptError {
                object: index,
                message,
                source,
            })
    }

    /// `SEND` from a running handler. Failures inside the receiver are
    /// wrapped so the caller's error names both objects.
    pub(crate) fn send_in(
        &mut self,
        state: &mut ExecutionState,
        index: usize,
        message: u32,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        self.execute_in(state, index, message, None, args)
            .map_err(|e| RuntimeError::Nested(Box::new(e)))
    }

    fn dispatch(
        &mut self,
        state: &mut ExecutionState,
        index: usize,
        message: u32,
        vector: Option<u16>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let thunk = self
            .objects
            .get(index)
            .ok_or(RuntimeError::UnknownObject { index })?
            .thunk()
            .clone();
        let (owner, offset) = match vector {
            Some(offset) => (thunk, offset),
            None => thunk.find_handler(message).ok_or_else(|| {
                log::warn!("object {index} (program {}) has no handler for message {message}", thunk.id());
                RuntimeError::NoHandler {
                    program: thunk.id(),
                    message,
                }
            })?,
        };
        self.invoke(state, index, owner, message, offset, args)
    }

    /// Enter the handler or subroutine at `offset` of `thunk` for `object`.
    pub(crate) fn invoke(
        &mut self,
        state: &mut ExecutionState,
        object: usize,
        thunk: Arc<Thunk>,
        message: u32,
        offset: u16,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let frame_size = memory::load(thunk.code(), offset as usize, 2, "handler")? as usize;
        let mut autos = vec![0u8; frame_size.max(args.len() * 4)];
        for (i, arg) in args.iter().enumerate() {
            autos[i * 4..i * 4 + 4].copy_from_slice(&arg.as_u32().to_le_bytes());
        }
        log::debug!(
            "object {object}: message {message} -> program {} @{offset:04x} ({} args)",
            thunk.id(),
            args.len()
        );

        let level = state.enter(Frame {
            object,
            thunk,
            message,
            args,
            autos,
            stack_base: 0,
        })?;
        let result = interpreter::run(self, state, level, offset as usize + 2);
        state.leave(level);
        result
    }

    /// Send `MSG_DESTROY` if handled, then remove the object.
    pub fn destroy_object(&mut self, index: usize) -> Result<(), EngineError> {
        let mut state = self.new_state();
        let result = self.destroy_object_in(&mut state, index);
        if let Err(e) = &result {
            log::error!("{e}");
        }
        result
    }

    pub(crate) fn destroy_object_in(&mut self, state: &mut ExecutionState, index: usize) -> Result<(), EngineError> {
        if index >= self.objects.capacity() {
            return Err(EngineError::InvalidIndex {
                index,
                capacity: self.objects.capacity(),
            });
        }
        let Some(object) = self.objects.get(index) else {
            return Ok(());
        };

        let outcome = if object.thunk().find_handler(MSG_DESTROY).is_some() {
            self.execute_in(state, index, MSG_DESTROY, None, Vec::new()).map(drop)
        } else {
            Ok(())
        };

        if let Some(object) = self.objects.remove(index) {
            log::debug!("destroyed object {index} (program {})", object.program_id());
        }
        self.thunks.retain(|_, thunk| thunk.strong_count() > 0);
        Ok(outcome?)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("variant", &self.config.variant)
            .field("objects", &self.objects.len())
            .field("thunks", &self.loaded_thunks())
            .finish()
    }
}
