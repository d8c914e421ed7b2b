use core::fmt;

use crate::op::Op;

/// Binary operators: pop the top cell `b`, then `next = next OP b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Band,
    Bor,
    Xor,
    Shl,
    Shr,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

/// Memory area addressed by a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// Constant tables inside the code segment. Read-only.
    Table,
    /// Auto variables of the current frame.
    Auto,
    /// Static variables of the executing object.
    Static,
    /// Variables reached through an import slot.
    External,
}

/// Access width of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
    Dword,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Dword => 4,
        }
    }
}

/// A decoded instruction.
///
/// Load and store opcodes are folded into [`Load`](Instruction::Load) and
/// [`Store`](Instruction::Store); `offset` is the raw u16 operand (a byte
/// offset, or an import-table byte offset for [`Area::External`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    BranchTrue {
        target: u16,
    },
    BranchFalse {
        target: u16,
    },
    Branch {
        target: u16,
    },
    /// `table` is the absolute offset of the first `(value, target)` entry.
    Case {
        count: u16,
        table: u16,
    },
    Push,
    Dup,
    Not,
    SetBool,
    Neg,
    Binary(BinaryOp),
    BitNot,
    Inc,
    Dec,
    Constant {
        op: Op,
        value: i32,
    },
    CodeResource {
        slot_offset: u16,
    },
    Call {
        argc: u8,
    },
    Send {
        argc: u8,
        message: u16,
    },
    Pass,
    Jsr {
        target: u16,
    },
    Rts,
    IndexMultiply {
        factor: u16,
    },
    IndexShift {
        shift: u8,
    },
    Load {
        area: Area,
        width: Width,
        indexed: bool,
        offset: u16,
    },
    Store {
        area: Area,
        width: Width,
        indexed: bool,
        offset: u16,
    },
    /// LETA, LEAA, LESA and LEXA: the address is indexed by the top cell.
    Address {
        area: Area,
        offset: u16,
    },
    CodeAddress {
        offset: u16,
    },
    /// A declared opcode the machine does not define (SXAS, SOLE).
    Reserved(Op),
    End,
    Break,
}

impl Instruction {
    /// The opcode this instruction was decoded from.
    pub fn op(&self) -> Op {
        match *self {
            Self::BranchTrue { .. } => Op::Brt,
            Self::BranchFalse { .. } => Op::Brf,
            Self::Branch { .. } => Op::Bra,
            Self::Case { .. } => Op::Case,
            Self::Push => Op::Push,
            Self::Dup => Op::Dup,
            Self::Not => Op::Not,
            Self::SetBool => Op::Setb,
            Self::Neg => Op::Neg,
            Self::Binary(op) => binary_opcode(op),
            Self::BitNot => Op::Bnot,
            Self::Inc => Op::Inc,
            Self::Dec => Op::Dec,
            Self::Constant { op, .. } => op,
            Self::CodeResource { .. } => Op::Rcrs,
            Self::Call { .. } => Op::Call,
            Self::Send { .. } => Op::Send,
            Self::Pass => Op::Pass,
            Self::Jsr { .. } => Op::Jsr,
            Self::Rts => Op::Rts,
            Self::IndexMultiply { .. } => Op::Aim,
            Self::IndexShift { .. } => Op::Ais,
            Self::Load { area, width, indexed, .. } => memory_opcode(area, width, indexed, false),
            Self::Store { area, width, indexed, .. } => memory_opcode(area, width, indexed, true),
            Self::Address { area, .. } => match area {
                Area::Table => Op::Leta,
                Area::Auto => Op::Leaa,
                Area::Static => Op::Lesa,
                Area::External => Op::Lexa,
            },
            Self::CodeAddress { .. } => Op::Leca,
            Self::Reserved(op) => op,
            Self::End => Op::End,
            Self::Break => Op::Brk,
        }
    }
}

fn binary_opcode(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Mod => Op::Mod,
        BinaryOp::Exp => Op::Exp,
        BinaryOp::Band => Op::Band,
        BinaryOp::Bor => Op::Bor,
        BinaryOp::Xor => Op::Xor,
        BinaryOp::Shl => Op::Shl,
        BinaryOp::Shr => Op::Shr,
        BinaryOp::Lt => Op::Lt,
        BinaryOp::Le => Op::Le,
        BinaryOp::Eq => Op::Eq,
        BinaryOp::Ne => Op::Ne,
        BinaryOp::Ge => Op::Ge,
        BinaryOp::Gt => Op::Gt,
    }
}

/// Maps a memory access back to its opcode. Each area block is laid out as
/// loads (B, W, D), stores (B, W, D), indexed loads, indexed stores.
pub(crate) fn memory_opcode(area: Area, width: Width, indexed: bool, store: bool) -> Op {
    let lane = match width {
        Width::Byte => 0,
        Width::Word => 1,
        Width::Dword => 2,
    };
    let base = match area {
        // tables only have indexed loads
        Area::Table => return [Op::Ltba, Op::Ltwa, Op::Ltda][lane],
        Area::Auto => Op::Lab as u8,
        Area::Static => Op::Lsb as u8,
        Area::External => Op::Lxb as u8,
    };
    let block = match (indexed, store) {
        (false, false) => 0,
        (false, true) => 3,
        (true, false) => 6,
        (true, true) => 9,
    };
    // every computed byte lands inside the contiguous opcode range
    Op::try_from(base + block + lane as u8).unwrap_or(Op::Brk)
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.op();
        match *self {
            Self::BranchTrue { target }
            | Self::BranchFalse { target }
            | Self::Branch { target }
            | Self::Jsr { target } => write!(f, "{op} {target:04x}"),
            Self::Case { count, table } => write!(f, "{op} {count} @{table:04x}"),
            Self::Constant { value, .. } => write!(f, "{op} {value}"),
            Self::CodeResource { slot_offset } => write!(f, "{op} [{}]", slot_offset / 4),
            Self::Call { argc } => write!(f, "{op} {argc}"),
            Self::Send { argc, message } => write!(f, "{op} {argc}, #{message}"),
            Self::IndexMultiply { factor } => write!(f, "{op} {factor}"),
            Self::IndexShift { shift } => write!(f, "{op} {shift}"),
            Self::Load { area: Area::External, offset, .. }
            | Self::Store { area: Area::External, offset, .. }
            | Self::Address { area: Area::External, offset } => {
                write!(f, "{op} [{}]", offset / 4)
            }
            Self::Load { offset, .. }
            | Self::Store { offset, .. }
            | Self::Address { offset, .. }
            | Self::CodeAddress { offset } => write!(f, "{op} {offset:04x}"),
            _ => write!(f, "{op}"),
        }
    }
}
