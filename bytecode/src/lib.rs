mod op;
mod instruction;
mod builder;
mod decoder;

pub use op::Op;
pub use instruction::{Area, BinaryOp, Instruction, Width};
pub use builder::{BytecodeBuilder, CaseLabels, Label};
pub use decoder::{BytecodeDecoder, CaseTable, DecodeError};

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
        BytecodeDecoder::new(bytes)
            .map(|r| r.map(|(_, insn)| insn))
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn opcode_table_is_contiguous() {
        assert_eq!(Op::COUNT, 0x58);
        assert_eq!(Op::try_from(0x22), Ok(Op::Send));
        assert_eq!(Op::try_from(0x57), Ok(Op::Brk));
        assert_eq!(Op::try_from(0x58), Err(0x58));
        assert_eq!(Op::Lxb as u8, 0x46);
        assert_eq!(Op::Sole.mnemonic(), "SOLE");
    }

    #[test]
    fn constants_are_sign_extended() {
        let mut b = BytecodeBuilder::new();
        b.shtc(-1);
        b.intc(-300);
        b.lngc(i32::MIN);
        b.constant(42);
        b.constant(1000);
        b.constant(100_000);

        let decoded = decode_all(&b.into_bytes());
        let values: Vec<(Op, i32)> = decoded
            .iter()
            .map(|insn| match *insn {
                Instruction::Constant { op, value } => (op, value),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(values, vec![
            (Op::Shtc, -1),
            (Op::Intc, -300),
            (Op::Lngc, i32::MIN),
            (Op::Shtc, 42),
            (Op::Intc, 1000),
            (Op::Lngc, 100_000),
        ]);
    }

    #[test]
    fn memory_opcodes_fold_into_load_store() {
        let mut b = BytecodeBuilder::new();
        b.load(Area::Auto, Width::Byte, false, 4);
        b.store(Area::Auto, Width::Dword, true, 8);
        b.load(Area::Static, Width::Word, true, 2);
        b.store(Area::External, Width::Word, false, 3);
        b.load(Area::Table, Width::Dword, true, 0x40);
        b.address(Area::Static, 6);
        let bytes = b.into_bytes();

        assert_eq!(bytes[0], Op::Lab as u8);
        assert_eq!(bytes[3], Op::Sada as u8);
        assert_eq!(bytes[6], Op::Lswa as u8);
        assert_eq!(bytes[9], Op::Sxw as u8);
        assert_eq!(bytes[12], Op::Ltda as u8);
        assert_eq!(bytes[15], Op::Lesa as u8);

        assert_eq!(decode_all(&bytes), vec![
            Instruction::Load { area: Area::Auto, width: Width::Byte, indexed: false, offset: 4 },
            Instruction::Store { area: Area::Auto, width: Width::Dword, indexed: true, offset: 8 },
            Instruction::Load { area: Area::Static, width: Width::Word, indexed: true, offset: 2 },
            Instruction::Store { area: Area::External, width: Width::Word, indexed: false, offset: 12 },
            Instruction::Load { area: Area::Table, width: Width::Dword, indexed: true, offset: 0x40 },
            Instruction::Address { area: Area::Static, offset: 6 },
        ]);
    }

    #[test]
    fn forward_branch_uses_absolute_targets() {
        let mut b = BytecodeBuilder::with_origin(14);
        b.shtc(0);
        let label = b.brf();
        b.shtc(1);
        b.bind(label);
        b.rts();

        assert_eq!(decode_all(&b.into_bytes()), vec![
            Instruction::Constant { op: Op::Shtc, value: 0 },
            Instruction::BranchFalse { target: 14 + 7 },
            Instruction::Constant { op: Op::Shtc, value: 1 },
            Instruction::Rts,
        ]);
    }

    #[test]
    fn case_table_first_match_wins() {
        let mut b = BytecodeBuilder::new();
        let labels = b.case(&[3, 7, 3]);
        let mut arms = labels.arms.into_iter();
        let first = arms.next().unwrap();
        let second = arms.next().unwrap();
        let third = arms.next().unwrap();
        b.bind(first);
        b.shtc(1);
        b.bind(second);
        b.shtc(2);
        b.bind(third);
        b.shtc(3);
        b.bind(labels.default);
        b.rts();
        let bytes = b.into_bytes();

        let (count, table) = match BytecodeDecoder::new(&bytes).decode().unwrap() {
            Instruction::Case { count, table } => (count, table),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(count, 3);
        assert_eq!(table, 3);

        let cases = CaseTable::read(&bytes, table, count).unwrap();
        let entries: Vec<_> = cases.iter().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(cases.resolve(3), entries[0].1);
        assert_ne!(cases.resolve(3), entries[2].1);
        assert_eq!(cases.resolve(7), entries[1].1);
        assert_eq!(cases.resolve(99), cases.default_target());
        assert_eq!(cases.default_target() as usize, bytes.len() - 1);
    }

    #[test]
    fn unknown_and_truncated_instructions_fail() {
        let mut d = BytecodeDecoder::new(&[Op::Push as u8, 0x9f]);
        assert_eq!(d.decode(), Ok(Instruction::Push));
        assert_eq!(d.decode(), Err(DecodeError::UnknownOpcode { opcode: 0x9f, offset: 1 }));
        assert_eq!(d.offset(), 1);

        let mut d = BytecodeDecoder::new(&[Op::Lngc as u8, 1, 2]);
        assert_eq!(d.decode(), Err(DecodeError::Truncated { offset: 0 }));

        // a CASE table may not run past the end
        let mut d = BytecodeDecoder::new(&[Op::Case as u8, 2, 0, 1, 0, 0, 0]);
        assert_eq!(d.decode(), Err(DecodeError::Truncated { offset: 0 }));
    }

    #[test]
    fn iterator_reports_offsets_and_stops_on_error() {
        let mut b = BytecodeBuilder::new();
        b.push();
        b.send(1, 300);
        b.rcrs(5);
        let mut bytes = b.into_bytes();
        bytes.push(0xff);
        bytes.push(Op::Push as u8);

        let items: Vec<_> = BytecodeDecoder::new(&bytes).collect();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], Ok((0, Instruction::Push)));
        assert_eq!(items[1], Ok((1, Instruction::Send { argc: 1, message: 300 })));
        assert_eq!(items[2], Ok((5, Instruction::CodeResource { slot_offset: 20 })));
        assert!(items[3].is_err());
    }

    #[test]
    fn display_uses_mnemonics() {
        assert_eq!(Instruction::Send { argc: 0, message: 7 }.to_string(), "SEND 0, #7");
        assert_eq!(Instruction::Binary(BinaryOp::Ge).to_string(), "GE");
        assert_eq!(
            Instruction::Load { area: Area::External, width: Width::Dword, indexed: false, offset: 8 }
                .to_string(),
            "LXD [2]"
        );
        assert_eq!(Instruction::BranchTrue { target: 0x20 }.to_string(), "BRT 0020");
    }
}
