/// AESOP opcodes.
///
/// The top cell of the value stack doubles as the accumulator: literals and
/// loads overwrite it, [`Push`](Op::Push) opens a fresh zero cell, and binary
/// operators pop the top cell and fold it into the one below.
///
/// All branch targets and table offsets are absolute byte offsets from the
/// start of the program resource. Multi-byte operands are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Branch if the top cell is non-zero. Does not pop.
    /// Operands: `target:u16`
    Brt = 0x00,
    /// Branch if the top cell is zero. Does not pop.
    /// Operands: `target:u16`
    Brf,
    /// Unconditional branch.
    /// Operands: `target:u16`
    Bra,
    /// Multi-way branch on the top cell.
    /// Operands: `count:u16`, `count × (value:i32, target:u16)`, `default:u16`
    Case,
    /// Open a new zero cell on top of the stack.
    Push,
    /// Push a copy of the top cell.
    Dup,
    /// Logical not of the top cell.
    Not,
    /// Normalize the top cell to 0 or 1.
    Setb,
    /// Two's complement negate.
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Integer power; the exponent is the low half of the popped cell.
    Exp,
    Band,
    Bor,
    Xor,
    /// Bitwise complement of the top cell.
    Bnot,
    Shl,
    Shr,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    Inc,
    Dec,
    /// Short constant.
    /// Operands: `value:i8`
    Shtc,
    /// Integer constant.
    /// Operands: `value:i16`
    Intc,
    /// Long constant.
    /// Operands: `value:i32`
    Lngc,
    /// Load a native code reference from the import table.
    /// Operands: `slot_offset:u16` (byte offset, four bytes per slot)
    Rcrs,
    /// Call the native function below `argc` argument cells.
    /// Operands: `argc:u8`
    Call,
    /// Send a message to the object whose index sits below `argc` argument cells.
    /// Operands: `argc:u8`, `message:u16`
    Send,
    /// Pass the current message on to the parent class.
    Pass,
    /// Call a subroutine inside the same program.
    /// Operands: `target:u16` (frame size at `target`, code at `target + 2`)
    Jsr,
    /// Return the top cell.
    Rts,
    /// Array index multiply.
    /// Operands: `factor:u16`
    Aim,
    /// Array index shift.
    /// Operands: `shift:u8`
    Ais,
    /// Load a byte from a constant table in the code segment, indexed by the top cell.
    /// Operands: `offset:u16`
    Ltba,
    Ltwa,
    Ltda,
    /// Load the effective address of a constant table element.
    /// Operands: `offset:u16`
    Leta,
    /// Load an auto (frame) variable.
    /// Operands: `offset:u16`
    Lab,
    Law,
    Lad,
    /// Store the top cell into an auto variable.
    /// Operands: `offset:u16`
    Sab,
    Saw,
    Sad,
    /// Indexed auto loads. Operands: `offset:u16`
    Laba,
    Lawa,
    Lada,
    /// Indexed auto stores. Operands: `offset:u16`
    Saba,
    Sawa,
    Sada,
    /// Load the effective address of an auto variable.
    /// Operands: `offset:u16`
    Leaa,
    /// Load a static (per-object) variable.
    /// Operands: `offset:u16`
    Lsb,
    Lsw,
    Lsd,
    Ssb,
    Ssw,
    Ssd,
    Lsba,
    Lswa,
    Lsda,
    Ssba,
    Sswa,
    Ssda,
    /// Load the effective address of a static variable.
    /// Operands: `offset:u16`
    Lesa,
    /// Load an external variable through the import table.
    /// Operands: `slot_offset:u16`
    Lxb,
    Lxw,
    Lxd,
    Sxb,
    Sxw,
    Sxd,
    Lxba,
    Lxwa,
    Lxda,
    Sxba,
    Sxwa,
    Sxda,
    /// Load the effective address of an external variable.
    /// Operands: `slot_offset:u16`
    Lexa,
    Sxas,
    /// Load a code address.
    /// Operands: `offset:u16`
    Leca,
    Sole,
    /// End of a message handler.
    End,
    /// Breakpoint.
    Brk,
}

impl Op {
    pub const COUNT: usize = Op::Brk as usize + 1;

    /// Fixed operand bytes following the opcode. `Case` reports only its
    /// `count` field; the table that follows is variable.
    pub const fn operand_len(self) -> usize {
        match self {
            Op::Brt | Op::Brf | Op::Bra | Op::Case => 2,
            Op::Shtc | Op::Call | Op::Ais => 1,
            Op::Intc | Op::Rcrs | Op::Jsr | Op::Aim => 2,
            Op::Lngc => 4,
            Op::Send => 3,
            Op::Push
            | Op::Dup
            | Op::Not
            | Op::Setb
            | Op::Neg
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::Exp
            | Op::Band
            | Op::Bor
            | Op::Xor
            | Op::Bnot
            | Op::Shl
            | Op::Shr
            | Op::Lt
            | Op::Le
            | Op::Eq
            | Op::Ne
            | Op::Ge
            | Op::Gt
            | Op::Inc
            | Op::Dec
            | Op::Pass
            | Op::Rts
            | Op::Sxas
            | Op::Sole
            | Op::End
            | Op::Brk => 0,
            // every remaining opcode addresses memory through a u16 offset
            _ => 2,
        }
    }

    /// Assembler mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        const NAMES: [&str; Op::COUNT] = [
            "BRT", "BRF", "BRA", "CASE", "PUSH", "DUP", "NOT", "SETB", "NEG",
            "ADD", "SUB", "MUL", "DIV", "MOD", "EXP", "BAND", "BOR", "XOR",
            "BNOT", "SHL", "SHR", "LT", "LE", "EQ", "NE", "GE", "GT", "INC",
            "DEC", "SHTC", "INTC", "LNGC", "RCRS", "CALL", "SEND", "PASS",
            "JSR", "RTS", "AIM", "AIS", "LTBA", "LTWA", "LTDA", "LETA", "LAB",
            "LAW", "LAD", "SAB", "SAW", "SAD", "LABA", "LAWA", "LADA", "SABA",
            "SAWA", "SADA", "LEAA", "LSB", "LSW", "LSD", "SSB", "SSW", "SSD",
            "LSBA", "LSWA", "LSDA", "SSBA", "SSWA", "SSDA", "LESA", "LXB",
            "LXW", "LXD", "SXB", "SXW", "SXD", "LXBA", "LXWA", "LXDA", "SXBA",
            "SXWA", "SXDA", "LEXA", "SXAS", "LECA", "SOLE", "END", "BRK",
        ];
        NAMES[self as usize]
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        if byte < Self::COUNT as u8 {
            // SAFETY: Op is repr(u8) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u8, Op>(byte) })
        } else {
            Err(byte)
        }
    }
}

impl core::fmt::Display for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
