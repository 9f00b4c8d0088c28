//! Human-readable rendering of compiled programs, consumed by the CLI's
//! `--disasm` mode.

use core::fmt::Write as _;

use crate::instr::{decode_name, name_words, unpack_args};
use crate::{ConstKind, FunctionHeader, Instr, Opcode, Program, SymbolEntry};

/// Render a decoded program one instruction per line, followed by its
/// symbol table.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    let h = program.header;
    let _ = writeln!(
        out,
        "; program: {} body words, {} args, {} registers, {} symbols",
        h.body_len, h.arg_count, h.reg_count, h.symbols
    );

    let code = &program.code;
    let mut pc = 0;
    while pc < code.len() {
        let instr = Instr::new(code[pc]);
        let at = pc;
        pc += 1;
        match instr.opcode() {
            Some(op) => {
                let imms = &code[pc..(pc + instr.imm_words()).min(code.len())];
                let _ = writeln!(out, "{at:6}  {}", render(op, instr, imms, at));
                pc += instr.imm_words();
            }
            None => {
                let _ = writeln!(out, "{at:6}  .word {:#010x}", code[at]);
            }
        }
    }

    if !program.symbols.is_empty() {
        let _ = writeln!(out, "; symbols");
        for (i, entry) in program.symbols.iter().enumerate() {
            let line = match entry {
                SymbolEntry::StrConst(s) => format!("strconst {s:?}"),
                SymbolEntry::SymStub(s) => format!("symstub  {s}"),
                SymbolEntry::FuncDef { name, offset } => {
                    format!("funcdef  {name} @ {offset}")
                }
            };
            let _ = writeln!(out, "{i:6}  {line}");
        }
    }

    out
}

fn render(op: Opcode, instr: Instr, imms: &[crate::Word], at: usize) -> String {
    let (a, b, c) = (instr.a(), instr.b(), instr.c());
    match op {
        Opcode::CALL => {
            let args = unpack_args(imms, c as usize);
            let args: Vec<String> = args.iter().map(|r| format!("r{r}")).collect();
            format!("call    r{a}, r{b} ({})", args.join(", "))
        }
        Opcode::RET => format!("ret     r{a}"),
        Opcode::JMP | Opcode::JZE | Opcode::JNZ => {
            let off = imms.first().copied().unwrap_or_default() as i32;
            // Offsets are measured from the word after the offset itself.
            let target = at as i64 + 2 + off as i64;
            match op {
                Opcode::JMP => format!("jmp     -> {target}"),
                Opcode::JZE => format!("jze     r{a} -> {target}"),
                _ => format!("jnz     r{a} -> {target}"),
            }
        }
        Opcode::LDCONST => match ConstKind::try_from(b) {
            Ok(ConstKind::Nil) => format!("ldconst r{a}, nil"),
            Ok(ConstKind::True) => format!("ldconst r{a}, true"),
            Ok(ConstKind::False) => format!("ldconst r{a}, false"),
            Ok(ConstKind::Int) => {
                let v = payload64(imms) as i64;
                format!("ldconst r{a}, {v}")
            }
            Ok(ConstKind::Float) => {
                let v = f64::from_bits(payload64(imms));
                format!("ldconst r{a}, {v}")
            }
            Err(k) => format!("ldconst r{a}, ?kind={k}"),
        },
        Opcode::LDSYM => format!("ldsym   r{a}, sym[{}]", instr.index16()),
        Opcode::FUNCTION => {
            let h = FunctionHeader::from_words(imms).unwrap_or_default();
            format!(
                "function r{a} ({} args, {} regs, {} body words, sym {})",
                h.arg_count, h.reg_count, h.body_len, h.symbols
            )
        }
        Opcode::GLBVAL => {
            let name = decode_name(&imms[..name_words(b as usize).min(imms.len())], b as usize)
                .unwrap_or_else(|| "?".into());
            format!("glbval  {name} = r{a}")
        }
        Opcode::CLOSURE => {
            let descs: Vec<String> = imms
                .iter()
                .map(|&w| {
                    let d = Instr::new(w);
                    match crate::CaptureKind::try_from(d.op()) {
                        Ok(crate::CaptureKind::Local) => format!("local r{}", d.a()),
                        Ok(crate::CaptureKind::Outer) => format!("outer u{}", d.a()),
                        Err(k) => format!("?kind={k}"),
                    }
                })
                .collect();
            format!("closure r{a} [{}]", descs.join(", "))
        }
        Opcode::LDUPVAL => format!("ldupval r{a}, u{b}"),
        Opcode::MOV => format!("mov     r{a}, r{b}"),
        Opcode::LDARGC => format!("ldargc  r{a}"),
        Opcode::NEWARR => format!("newarr  r{a}"),
        Opcode::ARRGET => format!("arrget  r{a}, r{b}[r{c}]"),
        Opcode::ARRSET => format!("arrset  r{a}[r{b}] = r{c}"),
        Opcode::NTHARG => format!("ntharg  r{a}, r{b}"),
        Opcode::NEG | Opcode::BITNOT | Opcode::LOGNOT | Opcode::SIZEOF | Opcode::TYPEOF => {
            format!("{:7} r{a}, r{b}", lower(op))
        }
        Opcode::INC | Opcode::DEC => format!("{:7} r{a}", lower(op)),
        _ => format!("{:7} r{a}, r{b}, r{c}", lower(op)),
    }
}

fn lower(op: Opcode) -> String {
    format!("{op:?}").to_lowercase()
}

fn payload64(imms: &[crate::Word]) -> u64 {
    let lo = imms.first().copied().unwrap_or_default() as u64;
    let hi = imms.get(1).copied().unwrap_or_default() as u64;
    lo | (hi << 32)
}
