use crate::instruction::{Area, BinaryOp, Width, memory_opcode};
use crate::op::Op;

/// A forward branch whose target has not yet been resolved.
///
/// Created by the branch emitters ([`brt`](BytecodeBuilder::brt),
/// [`brf`](BytecodeBuilder::brf), [`bra`](BytecodeBuilder::bra),
/// [`jsr`](BytecodeBuilder::jsr), [`case`](BytecodeBuilder::case)).
/// Resolve it with [`BytecodeBuilder::bind`].
#[must_use]
#[derive(Debug)]
pub struct Label {
    /// Position of the u16 target bytes in the buffer.
    patch_pos: usize,
}

/// Labels produced by [`BytecodeBuilder::case`], one per value plus the default.
#[derive(Debug)]
pub struct CaseLabels {
    pub arms: Vec<Label>,
    pub default: Label,
}

/// Assembles AESOP bytecode.
///
/// Targets are absolute, so the builder tracks the `origin` at which its
/// bytes will sit inside the program resource (14 for code placed right
/// after the program header).
pub struct BytecodeBuilder {
    buf: Vec<u8>,
    origin: usize,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::with_origin(0)
    }

    pub fn with_origin(origin: usize) -> Self {
        Self {
            buf: Vec::new(),
            origin,
        }
    }

    /// Absolute offset of the next emitted byte.
    pub fn current_offset(&self) -> usize {
        self.origin + self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn emit_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_op(&mut self, op: Op) {
        self.buf.push(op as u8);
    }

    fn here(&self) -> u16 {
        debug_assert!(self.current_offset() <= u16::MAX as usize, "code exceeds 64k");
        self.current_offset() as u16
    }

    fn placeholder(&mut self) -> Label {
        let patch_pos = self.buf.len();
        self.emit_u16(0);
        Label { patch_pos }
    }

    /// Raw bytes, for constant tables and strings embedded in the code.
    pub fn data(&mut self, bytes: &[u8]) -> u16 {
        let at = self.here();
        self.buf.extend_from_slice(bytes);
        at
    }

    /// Start a message handler or subroutine: emits its frame size and
    /// returns the entry offset used in export dictionaries and `JSR`.
    pub fn handler(&mut self, frame_size: u16) -> u16 {
        let at = self.here();
        self.emit_u16(frame_size);
        at
    }

    /// Bind a forward label to the current position.
    pub fn bind(&mut self, label: Label) {
        let target = self.here();
        self.buf[label.patch_pos..label.patch_pos + 2].copy_from_slice(&target.to_le_bytes());
    }

    // ── control flow ───────────────────────────────────────────────

    pub fn brt(&mut self) -> Label {
        self.emit_op(Op::Brt);
        self.placeholder()
    }

    pub fn brf(&mut self) -> Label {
        self.emit_op(Op::Brf);
        self.placeholder()
    }

    pub fn bra(&mut self) -> Label {
        self.emit_op(Op::Bra);
        self.placeholder()
    }

    /// Branch to an already known offset (backward branches).
    pub fn branch_to(&mut self, op: Op, target: u16) {
        debug_assert!(matches!(op, Op::Brt | Op::Brf | Op::Bra | Op::Jsr));
        self.emit_op(op);
        self.emit_u16(target);
    }

    /// `CASE` with one arm per value, in order. The first matching arm wins.
    pub fn case(&mut self, values: &[i32]) -> CaseLabels {
        self.emit_op(Op::Case);
        self.emit_u16(values.len() as u16);
        let mut arms = Vec::with_capacity(values.len());
        for &value in values {
            self.emit_u32(value as u32);
            arms.push(self.placeholder());
        }
        let default = self.placeholder();
        CaseLabels { arms, default }
    }

    pub fn jsr(&mut self) -> Label {
        self.emit_op(Op::Jsr);
        self.placeholder()
    }

    pub fn rts(&mut self) {
        self.emit_op(Op::Rts);
    }

    pub fn end(&mut self) {
        self.emit_op(Op::End);
    }

    pub fn pass(&mut self) {
        self.emit_op(Op::Pass);
    }

    // ── stack and arithmetic ───────────────────────────────────────

    pub fn push(&mut self) {
        self.emit_op(Op::Push);
    }

    /// Any opcode without operands (`DUP`, `NEG`, `ADD`, `BRK`, ...).
    pub fn op(&mut self, op: Op) {
        debug_assert_eq!(op.operand_len(), 0, "{op} takes operands");
        self.emit_op(op);
    }

    pub fn binary(&mut self, op: BinaryOp) {
        self.emit_op(crate::Instruction::Binary(op).op());
    }

    pub fn shtc(&mut self, value: i8) {
        self.emit_op(Op::Shtc);
        self.emit_u8(value as u8);
    }

    pub fn intc(&mut self, value: i16) {
        self.emit_op(Op::Intc);
        self.emit_u16(value as u16);
    }

    pub fn lngc(&mut self, value: i32) {
        self.emit_op(Op::Lngc);
        self.emit_u32(value as u32);
    }

    /// Load a constant using the narrowest encoding that holds it.
    pub fn constant(&mut self, value: i32) {
        if let Ok(v) = i8::try_from(value) {
            self.shtc(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.intc(v);
        } else {
            self.lngc(value);
        }
    }

    pub fn aim(&mut self, factor: u16) {
        self.emit_op(Op::Aim);
        self.emit_u16(factor);
    }

    pub fn ais(&mut self, shift: u8) {
        self.emit_op(Op::Ais);
        self.emit_u8(shift);
    }

    // ── calls ──────────────────────────────────────────────────────

    /// `RCRS` for import slot `slot`.
    pub fn rcrs(&mut self, slot: u16) {
        self.emit_op(Op::Rcrs);
        self.emit_u16(slot * 4);
    }

    pub fn call(&mut self, argc: u8) {
        self.emit_op(Op::Call);
        self.emit_u8(argc);
    }

    pub fn send(&mut self, argc: u8, message: u16) {
        self.emit_op(Op::Send);
        self.emit_u8(argc);
        self.emit_u16(message);
    }

    // ── memory ─────────────────────────────────────────────────────

    /// Load from `area`. For [`Area::External`], `offset` is the import slot.
    pub fn load(&mut self, area: Area, width: Width, indexed: bool, offset: u16) {
        self.emit_op(memory_opcode(area, width, indexed, false));
        self.emit_u16(Self::area_operand(area, offset));
    }

    /// Store into `area`. Tables are read-only and have no store form.
    pub fn store(&mut self, area: Area, width: Width, indexed: bool, offset: u16) {
        debug_assert!(area != Area::Table, "tables are read-only");
        self.emit_op(memory_opcode(area, width, indexed, true));
        self.emit_u16(Self::area_operand(area, offset));
    }

    pub fn address(&mut self, area: Area, offset: u16) {
        let op = match area {
            Area::Table => Op::Leta,
            Area::Auto => Op::Leaa,
            Area::Static => Op::Lesa,
            Area::External => Op::Lexa,
        };
        self.emit_op(op);
        self.emit_u16(Self::area_operand(area, offset));
    }

    pub fn code_address(&mut self, offset: u16) {
        self.emit_op(Op::Leca);
        self.emit_u16(offset);
    }

    fn area_operand(area: Area, offset: u16) -> u16 {
        match area {
            Area::External => offset * 4,
            _ => offset,
        }
    }
}

impl Default for BytecodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
