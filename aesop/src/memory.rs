//! Byte access through [`Address`] values handed to intrinsics.

use crate::{Address, Engine, ExecutionState, RuntimeError, Space};

fn out_of_bounds(what: &'static str, offset: usize, size: usize) -> RuntimeError {
    RuntimeError::OutOfBounds { what, offset, size }
}

fn tail<'a>(what: &'static str, area: &'a [u8], offset: usize) -> Result<&'a [u8], RuntimeError> {
    area.get(offset..)
        .ok_or(out_of_bounds(what, offset, area.len()))
}

/// Run `f` over the bytes from `addr` to the end of its area.
pub fn with_bytes<R>(
    engine: &Engine,
    state: &ExecutionState,
    addr: Address,
    f: impl FnOnce(&[u8]) -> R,
) -> Result<R, RuntimeError> {
    let offset = addr.offset as usize;
    match addr.space {
        Space::Code => {
            let thunk = engine
                .thunk_for(addr.index)
                .ok_or(RuntimeError::UnknownProgram { program: addr.index })?;
            Ok(f(tail("code", &thunk.code()[..], offset)?))
        }
        Space::Auto => {
            let frame = state
                .frame(addr.index as usize)
                .ok_or(out_of_bounds("frame", addr.index as usize, state.frame_depth()))?;
            Ok(f(tail("autos", &frame.autos, offset)?))
        }
        Space::Static => {
            let object = engine
                .objects()
                .get(addr.index as usize)
                .ok_or(RuntimeError::UnknownObject { index: addr.index as usize })?;
            Ok(f(tail("statics", &object.statics, offset)?))
        }
        Space::Intrinsic => Err(RuntimeError::ReadOnly { address: addr }),
    }
}

/// Like [`with_bytes`] for writable areas. Code and intrinsics are read-only.
pub fn with_bytes_mut<R>(
    engine: &mut Engine,
    state: &mut ExecutionState,
    addr: Address,
    f: impl FnOnce(&mut [u8]) -> R,
) -> Result<R, RuntimeError> {
    let offset = addr.offset as usize;
    let area: &mut [u8] = match addr.space {
        Space::Auto => {
            let depth = state.frame_depth();
            state
                .frame_mut(addr.index as usize)
                .ok_or(out_of_bounds("frame", addr.index as usize, depth))?
                .autos
                .as_mut_slice()
        }
        Space::Static => {
            engine
                .objects_mut()
                .get_mut(addr.index as usize)
                .ok_or(RuntimeError::UnknownObject { index: addr.index as usize })?
                .statics
                .as_mut_slice()
        }
        Space::Code | Space::Intrinsic => return Err(RuntimeError::ReadOnly { address: addr }),
    };
    let size = area.len();
    let bytes = area
        .get_mut(offset..)
        .ok_or(out_of_bounds("memory", offset, size))?;
    Ok(f(bytes))
}

/// The NUL-terminated string at `addr`, without the terminator. A string
/// running to the end of its area is cut there.
pub fn read_c_string(engine: &Engine, state: &ExecutionState, addr: Address) -> Result<Vec<u8>, RuntimeError> {
    with_bytes(engine, state, addr, |bytes| {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        bytes[..end].to_vec()
    })
}

/// Store `text` plus a NUL terminator at `addr`.
pub fn write_c_string(
    engine: &mut Engine,
    state: &mut ExecutionState,
    addr: Address,
    text: &[u8],
) -> Result<(), RuntimeError> {
    with_bytes_mut(engine, state, addr, |bytes| {
        if bytes.len() <= text.len() {
            return Err(out_of_bounds("string", addr.offset as usize + text.len(), addr.offset as usize + bytes.len()));
        }
        bytes[..text.len()].copy_from_slice(text);
        bytes[text.len()] = 0;
        Ok(())
    })?
}

/// Little-endian load of `width` bytes at `offset`, zero-extended.
pub fn load(area: &[u8], offset: usize, width: usize, what: &'static str) -> Result<u32, RuntimeError> {
    let bytes = area
        .get(offset..offset + width)
        .ok_or(out_of_bounds(what, offset, area.len()))?;
    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(bytes);
    Ok(u32::from_le_bytes(buf))
}

/// Little-endian store of the low `width` bytes of `value` at `offset`.
pub fn store(area: &mut [u8], offset: usize, width: usize, value: u32, what: &'static str) -> Result<(), RuntimeError> {
    let size = area.len();
    let bytes = area
        .get_mut(offset..offset + width)
        .ok_or(out_of_bounds(what, offset, size))?;
    bytes.copy_from_slice(&value.to_le_bytes()[..width]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_store_are_little_endian() {
        let mut area = [0u8; 6];
        store(&mut area, 1, 4, 0x1122_3344, "t").unwrap();
        assert_eq!(area, [0, 0x44, 0x33, 0x22, 0x11, 0]);
        assert_eq!(load(&area, 1, 2, "t").unwrap(), 0x3344);
        assert_eq!(load(&area, 4, 1, "t").unwrap(), 0x11);
        assert!(matches!(
            load(&area, 4, 4, "t"),
            Err(RuntimeError::OutOfBounds { offset: 4, size: 6, .. })
        ));
        assert!(store(&mut area, 5, 2, 0, "t").is_err());
    }
}
