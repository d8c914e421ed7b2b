mod config;
mod engine;
mod error;
pub mod intrinsics;
mod interpreter;
pub mod memory;
mod object;
pub mod resource;
mod stack;
mod thunk;
mod value;

pub use config::*;
pub use engine::{Engine, ProgramRef};
pub use error::*;
pub use intrinsics::{IntrinsicContext, IntrinsicDesc, IntrinsicFn, IntrinsicId, IntrinsicRegistry};
pub use object::{Object, ObjectTable};
pub use resource::{ContainerWriter, Resource, ResourceManager};
pub use stack::{ExecutionState, ExecutionStateInfo, Frame};
pub use thunk::*;
pub use value::{Address, Space, Value};
