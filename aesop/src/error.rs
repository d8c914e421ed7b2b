//! Error types, one enum per layer.

use std::io;

use thiserror::Error;

use crate::Address;

/// The container file itself is unreadable or malformed.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("bad container signature {found:?}")]
    BadSignature { found: String },

    #[error("truncated container: {what} at offset {offset}")]
    Truncated { what: &'static str, offset: u64 },
}

/// A resource lookup failed.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("unknown resource id {0}")]
    UnknownId(u32),

    #[error("unknown resource name {0:?}")]
    UnknownName(String),
}

/// Building a program (Thunk) failed. The object table is left untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("program {program}: bad program header")]
    BadProgramHeader { program: u32 },

    #[error("resource {resource}: malformed dictionary ({reason})")]
    BadDictionary { resource: u32, reason: &'static str },

    #[error("program {program}: cannot resolve import {name:?}")]
    ImportResolution { program: u32, name: String },

    #[error("program {program}: inheritance chain deeper than {limit}")]
    InheritanceTooDeep { program: u32, limit: usize },
}

/// A native intrinsic failed.
#[derive(Debug, Error)]
pub enum IntrinsicError {
    #[error("intrinsic {name} is not implemented")]
    Unimplemented { name: &'static str },

    #[error("intrinsic {name} expects {expected} arguments, got {got}")]
    Arity {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Runtime(Box<RuntimeError>),

    #[error(transparent)]
    Engine(Box<EngineError>),
}

impl From<RuntimeError> for IntrinsicError {
    fn from(e: RuntimeError) -> Self {
        Self::Runtime(Box::new(e))
    }
}

impl From<EngineError> for IntrinsicError {
    fn from(e: EngineError) -> Self {
        Self::Engine(Box::new(e))
    }
}

/// Failures while executing bytecode.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unimplemented opcode 0x{opcode:02x} at offset 0x{offset:04x}")]
    UnimplementedOpcode { opcode: u8, offset: usize },

    #[error("truncated instruction at offset 0x{offset:04x}")]
    TruncatedInstruction { offset: usize },

    #[error("stack underflow at offset 0x{offset:04x}")]
    StackUnderflow { offset: usize },

    #[error("value stack overflow ({limit} cells)")]
    StackOverflow { limit: usize },

    #[error("call depth {depth} exceeds the frame budget")]
    FrameOverflow { depth: usize },

    #[error("instruction budget exhausted")]
    BudgetExhausted,

    #[error("division by zero at offset 0x{offset:04x}")]
    DivisionByZero { offset: usize },

    #[error("memory access out of bounds: {what} offset {offset} (size {size})")]
    OutOfBounds {
        what: &'static str,
        offset: usize,
        size: usize,
    },

    #[error("0x{value:08x} is not a valid address")]
    InvalidAddress { value: u32 },

    #[error("address index {index} / offset {offset} out of range")]
    AddressOutOfRange { index: usize, offset: usize },

    #[error("value 0x{value:08x} is not callable")]
    NotCallable { value: u32 },

    #[error("import slot {slot} is not a {expected}")]
    BadImportSlot { slot: usize, expected: &'static str },

    #[error("no handler for message {message} in program {program}")]
    NoHandler { program: u32, message: u32 },

    #[error("program {program} has no parent handler for message {message}")]
    NoParent { program: u32, message: u32 },

    #[error("no object at index {index}")]
    UnknownObject { index: usize },

    #[error("program {program} is not loaded")]
    UnknownProgram { program: u32 },

    #[error("write to read-only memory at {address}")]
    ReadOnly { address: Address },

    #[error(transparent)]
    Intrinsic(#[from] IntrinsicError),

    #[error(transparent)]
    Load(#[from] LoadError),

    /// Raised inside a message sent by the running handler.
    #[error(transparent)]
    Nested(Box<ScriptError>),
}

/// Errors surfaced by the engine façade.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("object table is full")]
    ObjectTableFull,

    #[error("object index {index} outside the table (capacity {capacity})")]
    InvalidIndex { index: usize, capacity: usize },
}

impl From<ResourceError> for EngineError {
    fn from(e: ResourceError) -> Self {
        Self::Load(LoadError::Resource(e))
    }
}

/// A run-time error attributed to the object and message that raised it.
#[derive(Debug, Error)]
#[error("script error in object {object}, message {message}: {source}")]
pub struct ScriptError {
    pub object: usize,
    pub message: u32,
    #[source]
    pub source: RuntimeError,
}

impl ScriptError {
    /// The innermost runtime error, looking through nested sends and
    /// intrinsics.
    pub fn root_cause(&self) -> &RuntimeError {
        let mut err = &self.source;
        loop {
            match err {
                RuntimeError::Nested(inner) => err = &inner.source,
                RuntimeError::Intrinsic(IntrinsicError::Runtime(inner)) => err = &**inner,
                RuntimeError::Intrinsic(IntrinsicError::Engine(inner)) => match inner.as_ref() {
                    EngineError::Script(script) => err = &script.source,
                    _ => return err,
                },
                _ => return err,
            }
        }
    }
}
