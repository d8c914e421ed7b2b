use super::{IntrinsicContext, arity};
use crate::{EngineError, IntrinsicError, ProgramRef, Value};

/// Accepted and ignored; answers -1.
pub fn stub_minus_one(_: &mut IntrinsicContext<'_>, _: &[Value]) -> Result<Value, IntrinsicError> {
    Ok(Value::from_i32(-1))
}

/// `create_program(index, program_id)`: index -1 picks a free slot.
/// Answers the slot used, or -1 when the table is full.
pub fn create_program(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("create_program", args, 2)?;
    let index = match args[0].as_i32() {
        -1 => None,
        i => Some(i as u32 as usize),
    };
    let program = ProgramRef::Id(args[1].as_u32());
    match ctx.engine.create_program_in(ctx.state, index, program) {
        Ok(index) => Ok(Value::from_u32(index as u32)),
        Err(EngineError::ObjectTableFull) => Ok(Value::from_i32(-1)),
        Err(e) => Err(e.into()),
    }
}

/// `destroy_object(index)`
pub fn destroy_object(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("destroy_object", args, 1)?;
    ctx.engine.destroy_object_in(ctx.state, args[0].as_u32() as usize)?;
    Ok(Value::from_i32(-1))
}

/// `flush_cache()` and `thrash_cache()`: drop every cached resource.
pub fn flush_cache(ctx: &mut IntrinsicContext<'_>, _: &[Value]) -> Result<Value, IntrinsicError> {
    ctx.engine.resources().flush();
    Ok(Value::from_i32(-1))
}
