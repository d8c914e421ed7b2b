use thiserror::Error;

use crate::instruction::{Area, BinaryOp, Instruction, Width};
use crate::op::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode 0x{opcode:02x} at offset 0x{offset:04x}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("instruction at offset 0x{offset:04x} runs past the end of the code")]
    Truncated { offset: usize },
}

/// Bounds-checked decoder over a program's code bytes.
///
/// Offsets are absolute positions in `bytes`, matching the branch targets
/// stored in the instruction stream.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Start decoding at `pos`.
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    /// Current byte offset in the stream.
    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline(always)]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Decode the next instruction, or `None` at end-of-stream.
    pub fn decode_next(&mut self) -> Option<Result<Instruction, DecodeError>> {
        if self.is_at_end() {
            return None;
        }
        Some(self.decode())
    }

    /// Decode one instruction at the current offset. On error the position
    /// is left at the start of the faulty instruction.
    pub fn decode(&mut self) -> Result<Instruction, DecodeError> {
        let start = self.pos;
        let result = self.decode_inner(start);
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    fn decode_inner(&mut self, start: usize) -> Result<Instruction, DecodeError> {
        let byte = self.read_u8(start)?;
        let op = Op::try_from(byte)
            .map_err(|opcode| DecodeError::UnknownOpcode { opcode, offset: start })?;

        let insn = match op {
            Op::Brt => Instruction::BranchTrue { target: self.read_u16(start)? },
            Op::Brf => Instruction::BranchFalse { target: self.read_u16(start)? },
            Op::Bra => Instruction::Branch { target: self.read_u16(start)? },
            Op::Case => {
                let count = self.read_u16(start)?;
                let table = self.pos;
                // entries plus the trailing default target
                let len = count as usize * CASE_ENTRY_LEN + 2;
                if table + len > self.bytes.len() || table > u16::MAX as usize {
                    return Err(DecodeError::Truncated { offset: start });
                }
                self.pos += len;
                Instruction::Case { count, table: table as u16 }
            }
            Op::Push => Instruction::Push,
            Op::Dup => Instruction::Dup,
            Op::Not => Instruction::Not,
            Op::Setb => Instruction::SetBool,
            Op::Neg => Instruction::Neg,
            Op::Add => Instruction::Binary(BinaryOp::Add),
            Op::Sub => Instruction::Binary(BinaryOp::Sub),
            Op::Mul => Instruction::Binary(BinaryOp::Mul),
            Op::Div => Instruction::Binary(BinaryOp::Div),
            Op::Mod => Instruction::Binary(BinaryOp::Mod),
            Op::Exp => Instruction::Binary(BinaryOp::Exp),
            Op::Band => Instruction::Binary(BinaryOp::Band),
            Op::Bor => Instruction::Binary(BinaryOp::Bor),
            Op::Xor => Instruction::Binary(BinaryOp::Xor),
            Op::Bnot => Instruction::BitNot,
            Op::Shl => Instruction::Binary(BinaryOp::Shl),
            Op::Shr => Instruction::Binary(BinaryOp::Shr),
            Op::Lt => Instruction::Binary(BinaryOp::Lt),
            Op::Le => Instruction::Binary(BinaryOp::Le),
            Op::Eq => Instruction::Binary(BinaryOp::Eq),
            Op::Ne => Instruction::Binary(BinaryOp::Ne),
            Op::Ge => Instruction::Binary(BinaryOp::Ge),
            Op::Gt => Instruction::Binary(BinaryOp::Gt),
            Op::Inc => Instruction::Inc,
            Op::Dec => Instruction::Dec,
            Op::Shtc => Instruction::Constant { op, value: self.read_u8(start)? as i8 as i32 },
            Op::Intc => Instruction::Constant { op, value: self.read_u16(start)? as i16 as i32 },
            Op::Lngc => Instruction::Constant { op, value: self.read_u32(start)? as i32 },
            Op::Rcrs => Instruction::CodeResource { slot_offset: self.read_u16(start)? },
            Op::Call => Instruction::Call { argc: self.read_u8(start)? },
            Op::Send => {
                let argc = self.read_u8(start)?;
                let message = self.read_u16(start)?;
                Instruction::Send { argc, message }
            }
            Op::Pass => Instruction::Pass,
            Op::Jsr => Instruction::Jsr { target: self.read_u16(start)? },
            Op::Rts => Instruction::Rts,
            Op::Aim => Instruction::IndexMultiply { factor: self.read_u16(start)? },
            Op::Ais => Instruction::IndexShift { shift: self.read_u8(start)? },
            Op::Ltba => self.load(start, Area::Table, Width::Byte, true)?,
            Op::Ltwa => self.load(start, Area::Table, Width::Word, true)?,
            Op::Ltda => self.load(start, Area::Table, Width::Dword, true)?,
            Op::Leta => Instruction::Address { area: Area::Table, offset: self.read_u16(start)? },
            Op::Leaa => Instruction::Address { area: Area::Auto, offset: self.read_u16(start)? },
            Op::Lesa => Instruction::Address { area: Area::Static, offset: self.read_u16(start)? },
            Op::Lexa => Instruction::Address { area: Area::External, offset: self.read_u16(start)? },
            Op::Leca => Instruction::CodeAddress { offset: self.read_u16(start)? },
            Op::Sxas | Op::Sole => Instruction::Reserved(op),
            Op::End => Instruction::End,
            Op::Brk => Instruction::Break,
            _ => self.memory(start, op)?,
        };
        Ok(insn)
    }

    /// Auto, static and external accesses share one layout per area:
    /// three loads, three stores, three indexed loads, three indexed stores.
    fn memory(&mut self, start: usize, op: Op) -> Result<Instruction, DecodeError> {
        let byte = op as u8;
        let (area, base) = if byte >= Op::Lxb as u8 {
            (Area::External, Op::Lxb as u8)
        } else if byte >= Op::Lsb as u8 {
            (Area::Static, Op::Lsb as u8)
        } else {
            (Area::Auto, Op::Lab as u8)
        };
        let rel = byte - base;
        let width = match rel % 3 {
            0 => Width::Byte,
            1 => Width::Word,
            _ => Width::Dword,
        };
        let store = (rel / 3) % 2 == 1;
        let indexed = rel >= 6;
        let offset = self.read_u16(start)?;
        Ok(if store {
            Instruction::Store { area, width, indexed, offset }
        } else {
            Instruction::Load { area, width, indexed, offset }
        })
    }

    fn load(
        &mut self,
        start: usize,
        area: Area,
        width: Width,
        indexed: bool,
    ) -> Result<Instruction, DecodeError> {
        let offset = self.read_u16(start)?;
        Ok(Instruction::Load { area, width, indexed, offset })
    }

    #[inline(always)]
    fn read_u8(&mut self, start: usize) -> Result<u8, DecodeError> {
        let v = *self
            .bytes
            .get(self.pos)
            .ok_or(DecodeError::Truncated { offset: start })?;
        self.pos += 1;
        Ok(v)
    }

    #[inline(always)]
    fn read_u16(&mut self, start: usize) -> Result<u16, DecodeError> {
        let bytes = self
            .bytes
            .get(self.pos..self.pos + 2)
            .ok_or(DecodeError::Truncated { offset: start })?;
        self.pos += 2;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    #[inline(always)]
    fn read_u32(&mut self, start: usize) -> Result<u32, DecodeError> {
        let bytes = self
            .bytes
            .get(self.pos..self.pos + 4)
            .ok_or(DecodeError::Truncated { offset: start })?;
        self.pos += 4;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl<'a> Iterator for BytecodeDecoder<'a> {
    type Item = Result<(usize, Instruction), DecodeError>;

    /// Yields `(offset, instruction)` pairs. Stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.pos;
        match self.decode_next()? {
            Ok(insn) => Some(Ok((offset, insn))),
            Err(e) => {
                self.pos = self.bytes.len();
                Some(Err(e))
            }
        }
    }
}

const CASE_ENTRY_LEN: usize = 6;

/// The `(value, target)` table of a decoded `CASE` instruction.
#[derive(Debug, Clone, Copy)]
pub struct CaseTable<'a> {
    entries: &'a [u8],
    default: u16,
}

impl<'a> CaseTable<'a> {
    /// Read the table of `count` entries starting at `table`.
    pub fn read(bytes: &'a [u8], table: u16, count: u16) -> Result<Self, DecodeError> {
        let start = table as usize;
        let len = count as usize * CASE_ENTRY_LEN;
        let truncated = DecodeError::Truncated { offset: start };
        let entries = bytes.get(start..start + len).ok_or(truncated)?;
        let default = bytes.get(start + len..start + len + 2).ok_or(truncated)?;
        Ok(Self {
            entries,
            default: u16::from_le_bytes([default[0], default[1]]),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, u16)> + 'a {
        let entries = self.entries;
        entries.chunks_exact(CASE_ENTRY_LEN).map(|e| {
            (
                i32::from_le_bytes([e[0], e[1], e[2], e[3]]),
                u16::from_le_bytes([e[4], e[5]]),
            )
        })
    }

    pub fn default_target(&self) -> u16 {
        self.default
    }

    /// Target for `value`: the first matching entry wins.
    pub fn resolve(&self, value: i32) -> u16 {
        self.iter()
            .find(|&(v, _)| v == value)
            .map(|(_, target)| target)
            .unwrap_or(self.default)
    }
}
