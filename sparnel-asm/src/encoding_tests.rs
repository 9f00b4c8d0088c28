use strum::IntoEnumIterator;

use crate::instr::{decode_name, encode_name, pack_args, unpack_args};
use crate::*;

#[test]
fn opcode_byte_round_trip() {
    for op in Opcode::iter() {
        let byte = op as u8;
        assert_eq!(Opcode::try_from(byte), Ok(op));
    }
    // Bytes beyond the closed set must not decode.
    let last = Opcode::iter().last().unwrap() as u8;
    for byte in (last + 1)..=0xff {
        assert!(Opcode::try_from(byte).is_err());
    }
}

#[test]
fn sym_entry_kind_round_trip() {
    for kind in SymEntryKind::iter() {
        assert_eq!(SymEntryKind::try_from(kind as u8), Ok(kind));
    }
    assert!(SymEntryKind::try_from(0x00).is_err());
}

#[test]
fn instr_field_layout() {
    let i = Instr::abc(Opcode::ADD, 1, 2, 3);
    let w = Word::from(i);
    assert_eq!(w & 0xff, Opcode::ADD as Word);
    assert_eq!((w >> 8) & 0xff, 1);
    assert_eq!((w >> 16) & 0xff, 2);
    assert_eq!((w >> 24) & 0xff, 3);
    assert_eq!(Instr::new(w), i);
}

#[test]
fn long_form_uses_upper_24_bits() {
    let i = Instr::long(SymEntryKind::StrConst as u8, 0x00ab_cdef);
    assert_eq!(i.operand24(), 0x00ab_cdef);
    assert_eq!(i.op(), SymEntryKind::StrConst as u8);
}

#[test]
fn ldsym_index_is_16_bits() {
    let i = Instr::sym(Opcode::LDSYM, 7, 0xbeef);
    assert_eq!(i.a(), 7);
    assert_eq!(i.index16(), 0xbeef);
    assert_eq!(i.opcode(), Some(Opcode::LDSYM));
}

#[test]
fn packed_call_arguments() {
    let regs = [3u8, 1, 4, 1, 5, 9];
    let words = pack_args(&regs);
    assert_eq!(words.len(), packed_arg_words(regs.len()));
    assert_eq!(unpack_args(&words, regs.len()), regs);
}

#[test]
fn names_are_nul_terminated_and_aligned() {
    for name in ["x", "foo", "four", "a_longer_name"] {
        let words = encode_name(name);
        assert_eq!(words.len(), name_words(name.len()));
        assert_eq!(decode_name(&words, name.len()).as_deref(), Some(name));
    }
}

#[test]
fn name_length_mismatch_is_rejected() {
    let words = encode_name("abcd");
    // Declared length disagrees with the NUL position.
    assert_eq!(decode_name(&words, 3), None);
    assert_eq!(decode_name(&words, 5), None);
}

#[test]
fn imm_word_counts() {
    assert_eq!(Instr::abc(Opcode::CALL, 0, 1, 6).imm_words(), 2);
    assert_eq!(Instr::abc(Opcode::CALL, 0, 1, 0).imm_words(), 0);
    assert_eq!(Instr::abc(Opcode::JMP, 0, 0, 0).imm_words(), 1);
    assert_eq!(
        Instr::abc(Opcode::LDCONST, 0, ConstKind::Int as u8, 0).imm_words(),
        2
    );
    assert_eq!(
        Instr::abc(Opcode::LDCONST, 0, ConstKind::Nil as u8, 0).imm_words(),
        0
    );
    assert_eq!(Instr::abc(Opcode::FUNCTION, 0, 0, 0).imm_words(), 4);
    assert_eq!(Instr::abc(Opcode::GLBVAL, 0, 3, 0).imm_words(), 1);
    assert_eq!(Instr::abc(Opcode::GLBVAL, 0, 4, 0).imm_words(), 2);
    assert_eq!(Instr::abc(Opcode::CLOSURE, 0, 2, 0).imm_words(), 2);
    assert_eq!(Instr::abc(Opcode::MOV, 0, 1, 0).imm_words(), 0);
}

fn sample_program() -> Program {
    let code = vec![
        Instr::abc(Opcode::LDCONST, 0, ConstKind::Int as u8, 0).into(),
        7,
        0,
        Instr::abc(Opcode::RET, 0, 0, 0).into(),
    ];
    let symbols = vec![
        SymbolEntry::StrConst("hello".into()),
        SymbolEntry::SymStub("print".into()),
        SymbolEntry::FuncDef {
            name: "square".into(),
            offset: 0,
        },
    ];
    Program::new(0, 1, code, symbols)
}

#[test]
fn program_word_round_trip() {
    let program = sample_program();
    let words = program.to_words();
    assert_eq!(Program::from_words(&words), Ok(program));
}

#[test]
fn program_byte_round_trip() {
    let program = sample_program();
    let decoded = Program::from_bytes(&program.to_bytes()).unwrap();
    assert_eq!(decoded, program);
}

#[test]
fn truncated_stream_is_rejected() {
    let words = sample_program().to_words();
    for cut in [1, FunctionHeader::LEN, words.len() - 1] {
        assert!(Program::from_words(&words[..cut]).is_err());
    }
}

#[test]
fn misaligned_bytes_are_rejected() {
    let mut bytes = sample_program().to_bytes();
    bytes.pop();
    assert_eq!(
        Program::from_bytes(&bytes),
        Err(DecodeError::Misaligned(bytes.len()))
    );
}

#[test]
fn corrupted_name_length_is_a_hard_error() {
    let program = sample_program();
    let mut words = program.to_words();
    // The first symbol entry's lead word sits right after the body.
    let lead_at = FunctionHeader::LEN + program.code.len();
    let lead = Instr::new(words[lead_at]);
    words[lead_at] = Instr::long(lead.op(), lead.operand24() + 1).into();
    assert!(matches!(
        Program::from_words(&words),
        Err(DecodeError::MalformedName(_) | DecodeError::Truncated(_))
    ));
}

#[test]
fn symbol_count_mismatch_is_a_hard_error() {
    let mut program = sample_program();
    program.header.symbols = 5;
    let words = program.to_words();
    assert!(matches!(
        Program::from_words(&words),
        Err(DecodeError::SymbolCountMismatch { .. })
    ));
}

#[test]
fn funcdef_offset_is_validated() {
    let mut program = sample_program();
    program.symbols.push(SymbolEntry::FuncDef {
        name: "ghost".into(),
        offset: 999,
    });
    program.header.symbols += 1;
    assert!(matches!(
        Program::from_words(&program.to_words()),
        Err(DecodeError::FuncDefOverrun(_))
    ));
}

#[test]
fn disassembly_names_every_instruction() {
    let text = disassemble(&sample_program());
    assert!(text.contains("ldconst r0, 7"));
    assert!(text.contains("ret     r0"));
    assert!(text.contains("strconst \"hello\""));
    assert!(text.contains("symstub  print"));
    assert!(text.contains("funcdef  square @ 0"));
}
