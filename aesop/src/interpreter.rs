use std::sync::Arc;

use bytecode::{Area, BinaryOp, BytecodeDecoder, CaseTable, DecodeError, Instruction, Width};

use crate::intrinsics::{IntrinsicContext, IntrinsicId};
use crate::{
    Address, Engine, ExecutionState, ImportSlot, IntrinsicError, RuntimeError, Space, Thunk, Value,
    memory,
};

fn decode_error(e: DecodeError) -> RuntimeError {
    match e {
        DecodeError::UnknownOpcode { opcode, offset } => RuntimeError::UnimplementedOpcode { opcode, offset },
        DecodeError::Truncated { offset } => RuntimeError::TruncatedInstruction { offset },
    }
}

fn branch(code: &[u8], target: u16) -> Result<usize, RuntimeError> {
    let target = target as usize;
    if target >= code.len() {
        return Err(RuntimeError::OutOfBounds {
            what: "branch target",
            offset: target,
            size: code.len(),
        });
    }
    Ok(target)
}

/// Static-area offset of the variable behind import slot `slot_offset / 4`.
fn external(thunk: &Thunk, slot_offset: u16) -> Result<usize, RuntimeError> {
    let slot = slot_offset as usize / 4;
    match thunk.import(slot) {
        Some(ImportSlot::Variable(xref)) => Ok(xref.offset as usize),
        _ => Err(RuntimeError::BadImportSlot {
            slot,
            expected: "variable import",
        }),
    }
}

pub(crate) fn binary(op: BinaryOp, a: Value, b: Value, at: usize) -> Result<Value, RuntimeError> {
    let (x, y) = (a.as_i32(), b.as_i32());
    let v = match op {
        BinaryOp::Add => x.wrapping_add(y),
        BinaryOp::Sub => x.wrapping_sub(y),
        BinaryOp::Mul => x.wrapping_mul(y),
        BinaryOp::Div | BinaryOp::Mod if y == 0 => {
            return Err(RuntimeError::DivisionByZero { offset: at });
        }
        BinaryOp::Div => x.wrapping_div(y),
        BinaryOp::Mod => x.wrapping_rem(y),
        BinaryOp::Exp => (x as f64).powi(b.low() as i32) as i32,
        BinaryOp::Band => x & y,
        BinaryOp::Bor => x | y,
        BinaryOp::Xor => x ^ y,
        BinaryOp::Shl => x.wrapping_shl(b.low() as u32),
        BinaryOp::Shr => x.wrapping_shr(b.low() as u32),
        // Comparisons test the popped cell against the one beneath it.
        BinaryOp::Lt => (y < x) as i32,
        BinaryOp::Le => (y <= x) as i32,
        BinaryOp::Eq => (y == x) as i32,
        BinaryOp::Ne => (y != x) as i32,
        BinaryOp::Ge => (y >= x) as i32,
        BinaryOp::Gt => (y > x) as i32,
    };
    Ok(Value::from_i32(v))
}

/// Call intrinsic `id`. The caller's stack and frames are restored
/// afterwards, whatever the intrinsic did through the engine.
pub(crate) fn call_intrinsic(
    engine: &mut Engine,
    state: &mut ExecutionState,
    id: IntrinsicId,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let registry = engine.intrinsics().clone();
    let desc = registry.get(id).ok_or(RuntimeError::NotCallable { value: id.0 as u32 })?;
    let func = desc.func.ok_or(IntrinsicError::Unimplemented { name: desc.name })?;
    log::debug!("call {}({} args)", desc.name, args.len());

    let (depth, frames) = (state.depth(), state.frame_depth());
    let result = func(&mut IntrinsicContext { engine: &mut *engine, state: &mut *state }, args);
    state.restore(depth, frames);
    Ok(result?)
}

/// Execute the frame at `level` from `entry` until it returns.
pub(crate) fn run(
    engine: &mut Engine,
    state: &mut ExecutionState,
    level: usize,
    entry: usize,
) -> Result<Value, RuntimeError> {
    let (object, message, thunk) = {
        let frame = state.frame(level).ok_or(RuntimeError::FrameOverflow { depth: level })?;
        (frame.object, frame.message, frame.thunk.clone())
    };
    let code: Arc<[u8]> = thunk.code().clone();
    let quirks = engine.config().quirks;
    let static_base = thunk.static_base() as usize;

    state.push(Value::ZERO)?;
    let mut pc = entry;
    loop {
        state.tick()?;
        let at = pc;
        let mut decoder = BytecodeDecoder::at(&code, pc);
        let instr = decoder.decode().map_err(decode_error)?;
        pc = decoder.offset();
        log::trace!("[{object}:{}] {at:04x} {instr}", thunk.id());

        match instr {
            Instruction::BranchTrue { target } => {
                if state.top(at)?.is_true() {
                    pc = branch(&code, target)?;
                }
            }
            Instruction::BranchFalse { target } => {
                if !state.top(at)?.is_true() {
                    pc = branch(&code, target)?;
                }
            }
            Instruction::Branch { target } => pc = branch(&code, target)?,
            Instruction::Case { count, table } => {
                let table = CaseTable::read(&code, table, count).map_err(decode_error)?;
                pc = branch(&code, table.resolve(state.top(at)?.as_i32()))?;
            }
            Instruction::Push => state.push(Value::ZERO)?,
            Instruction::Dup => {
                let top = state.top(at)?;
                state.push(top)?;
            }
            Instruction::Not => {
                let (low, high) = state.top(at)?.as_halves();
                state.set_top(Value::from_halves(low | high, 0), at)?;
            }
            Instruction::SetBool => {
                let (low, high) = state.top(at)?.as_halves();
                state.set_top(Value::from_bool((low | high) == 0), at)?;
            }
            Instruction::Neg => {
                let top = state.top(at)?;
                state.set_top(Value::from_i32(top.as_i32().wrapping_neg()), at)?;
            }
            Instruction::Binary(op) => {
                let b = state.pop(at)?;
                let a = state.top(at)?;
                state.set_top(binary(op, a, b, at)?, at)?;
            }
            Instruction::BitNot => {
                let top = state.top(at)?;
                state.set_top(Value::from_u32(!top.as_u32()), at)?;
            }
            Instruction::Inc => {
                let top = state.top(at)?;
                state.set_top(Value::from_i32(top.as_i32().wrapping_add(1)), at)?;
            }
            Instruction::Dec => {
                let top = state.top(at)?;
                state.set_top(Value::from_i32(top.as_i32().wrapping_sub(1)), at)?;
            }
            Instruction::Constant { value, .. } => state.set_top(Value::from_i32(value), at)?,
            Instruction::CodeResource { slot_offset } => {
                let slot = slot_offset as usize / 4;
                let id = match thunk.import(slot) {
                    Some(ImportSlot::Code(id)) => *id,
                    _ => {
                        return Err(RuntimeError::BadImportSlot {
                            slot,
                            expected: "code import",
                        });
                    }
                };
                let addr = Address::new(Space::Intrinsic, id.0 as u32, 0);
                state.set_top(addr.to_value()?, at)?;
            }
            Instruction::Call { argc } => {
                let args = state.pop_slice(argc as usize, at)?;
                let func = state.top(at)?;
                let id = match func.as_addr() {
                    Ok(Address { space: Space::Intrinsic, index, .. }) => IntrinsicId(index as u16),
                    _ => return Err(RuntimeError::NotCallable { value: func.as_u32() }),
                };
                let result = call_intrinsic(engine, state, id, &args)?;
                state.set_top(result, at)?;
            }
            Instruction::Send { argc, message } => {
                let args = state.pop_slice(argc as usize, at)?;
                let target = state.top(at)?.as_u32() as usize;
                let result = engine.send_in(state, target, message as u32, args)?;
                state.set_top(result, at)?;
            }
            Instruction::Pass => {
                let args = state.frame(level).map(|f| f.args.clone()).unwrap_or_default();
                let (owner, offset) = thunk
                    .parent()
                    .and_then(|parent| parent.find_handler(message))
                    .ok_or(RuntimeError::NoParent { program: thunk.id(), message })?;
                let result = engine.invoke(state, object, owner, message, offset, args)?;
                state.set_top(result, at)?;
            }
            Instruction::Jsr { target } => {
                let result = engine.invoke(state, object, thunk.clone(), message, target, Vec::new())?;
                state.set_top(result, at)?;
            }
            Instruction::Rts | Instruction::End => return state.top(at),
            Instruction::IndexMultiply { factor } => {
                let t = state.pop(at)?;
                let scaled = (t.low() as u32).wrapping_mul(factor as u32) as u16;
                state.set_top(Value::from_u32(scaled as u32), at)?;
            }
            Instruction::IndexShift { shift } => {
                let t = state.pop(at)?;
                let shifted = (t.low() as u32).checked_shl(shift as u32).unwrap_or(0);
                state.set_top(Value::from_u32(shifted), at)?;
            }
            Instruction::Load { area, width, indexed, offset } => {
                let index = if indexed { state.top(at)?.low() as usize } else { 0 };
                let at_offset = offset as usize + index;
                let w = width.bytes();
                let raw = match area {
                    Area::Table => memory::load(&code, at_offset, w, "table")?,
                    Area::Auto => {
                        let frame = state.frame(level).ok_or(RuntimeError::FrameOverflow { depth: level })?;
                        memory::load(&frame.autos, at_offset, w, "autos")?
                    }
                    Area::Static => memory::load(statics(engine, object)?, static_base + at_offset, w, "statics")?,
                    Area::External => {
                        let base = external(&thunk, offset)?;
                        memory::load(statics(engine, object)?, base + index, w, "statics")?
                    }
                };
                // Byte and word loads replace only the low half.
                let loaded = match width {
                    Width::Dword => Value::from_u32(raw),
                    _ => Value::from_halves(raw as u16, state.top(at)?.high()),
                };
                state.set_top(loaded, at)?;
            }
            Instruction::Store { area, width, indexed, offset } => {
                let (value, index) = if indexed {
                    let v = state.pop(at)?;
                    (v, state.top(at)?.low() as usize)
                } else {
                    (state.top(at)?, 0)
                };
                let w = width.bytes();
                match area {
                    Area::Table => return Err(RuntimeError::UnimplementedOpcode { opcode: instr.op() as u8, offset: at }),
                    Area::Auto => {
                        let frame = state.frame_mut(level).ok_or(RuntimeError::FrameOverflow { depth: level })?;
                        memory::store(&mut frame.autos, offset as usize + index, w, value.as_u32(), "autos")?;
                        if quirks.sab_falls_through && width == Width::Byte && !indexed {
                            let next = memory::load(&code, pc, 2, "code")? as usize;
                            memory::store(&mut frame.autos, next, 2, value.low() as u32, "autos")?;
                            pc += 2;
                        }
                    }
                    Area::Static => {
                        let off = static_base + offset as usize + index;
                        memory::store(statics_mut(engine, object)?, off, w, value.as_u32(), "statics")?;
                    }
                    Area::External => {
                        let off = external(&thunk, offset)? + index;
                        memory::store(statics_mut(engine, object)?, off, w, value.as_u32(), "statics")?;
                    }
                }
                if indexed {
                    state.set_top(value, at)?;
                }
            }
            Instruction::Address { area, offset } => {
                let index = state.top(at)?.low() as u32;
                let offset = offset as u32;
                let addr = match area {
                    Area::Table => Address::new(Space::Code, thunk.id(), offset + index),
                    Area::Auto => Address::new(Space::Auto, level as u32, offset + index),
                    Area::Static => Address::new(Space::Static, object as u32, static_base as u32 + offset + index),
                    Area::External => {
                        let base = external(&thunk, offset as u16)? as u32;
                        Address::new(Space::Static, object as u32, base + index)
                    }
                };
                state.set_top(addr.to_value()?, at)?;
            }
            Instruction::CodeAddress { offset } => {
                let addr = Address::new(Space::Code, thunk.id(), offset as u32);
                state.set_top(addr.to_value()?, at)?;
            }
            Instruction::Reserved(op) => {
                return Err(RuntimeError::UnimplementedOpcode { opcode: op as u8, offset: at });
            }
            Instruction::Break => log::warn!("breakpoint in program {} at {at:04x}", thunk.id()),
        }
    }
}

fn statics(engine: &Engine, object: usize) -> Result<&[u8], RuntimeError> {
    engine
        .objects()
        .get(object)
        .map(|o| o.statics.as_slice())
        .ok_or(RuntimeError::UnknownObject { index: object })
}

fn statics_mut(engine: &mut Engine, object: usize) -> Result<&mut [u8], RuntimeError> {
    engine
        .objects_mut()
        .get_mut(object)
        .map(|o| o.statics.as_mut_slice())
        .ok_or(RuntimeError::UnknownObject { index: object })
}
