use crate::instr::{decode_name, encode_name, name_words, WORD_BYTES};
use crate::{SymEntryKind, Word};

/// Fixed-size function header: four words preceding every function body.
///
/// For the top-level program the fourth word holds the symbol-table entry
/// count; for nested `FUNCTION` bodies it holds the function's own
/// symbol-table index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHeader {
    /// Body length in words, excluding the header.
    pub body_len: Word,
    /// Number of declared formal arguments.
    pub arg_count: Word,
    /// Number of registers the body needs.
    pub reg_count: Word,
    /// Symbol count (top level) or symbol-table index (nested).
    pub symbols: Word,
}

impl FunctionHeader {
    /// Header size in words.
    pub const LEN: usize = 4;

    /// Serialize into four words.
    pub const fn to_words(self) -> [Word; Self::LEN] {
        [self.body_len, self.arg_count, self.reg_count, self.symbols]
    }

    /// Read a header from the head of `words`.
    pub fn from_words(words: &[Word]) -> Option<Self> {
        let w: &[Word; Self::LEN] = words.get(..Self::LEN)?.try_into().ok()?;
        Some(Self {
            body_len: w[0],
            arg_count: w[1],
            reg_count: w[2],
            symbols: w[3],
        })
    }
}

/// One entry of the local symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolEntry {
    /// Interned string literal, loaded by `LDSYM`.
    StrConst(String),
    /// Name of a global to resolve at first use.
    SymStub(String),
    /// Named function definition.
    FuncDef {
        /// Display name; `<lambda>` when the function was anonymous.
        name: String,
        /// Offset of the function's header in the executable section.
        offset: Word,
    },
}

impl SymbolEntry {
    /// The entry's leading word kind.
    pub const fn kind(&self) -> SymEntryKind {
        match self {
            Self::StrConst(_) => SymEntryKind::StrConst,
            Self::SymStub(_) => SymEntryKind::SymStub,
            Self::FuncDef { .. } => SymEntryKind::FuncDef,
        }
    }

    /// The entry's name.
    pub fn name(&self) -> &str {
        match self {
            Self::StrConst(s) | Self::SymStub(s) => s,
            Self::FuncDef { name, .. } => name,
        }
    }

    fn encode_into(&self, out: &mut Vec<Word>) {
        let name = self.name();
        let lead = crate::Instr::long(self.kind() as u8, name.len() as u32);
        out.push(lead.into());
        if let Self::FuncDef { offset, .. } = self {
            out.push(*offset);
        }
        out.extend(encode_name(name));
    }
}

/// Decoding failures for bytecode streams.
///
/// Any mismatch between a declared length and the actual data is a hard
/// error; a malformed program is never partially loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The stream ended before the declared structure was complete.
    #[error("bytecode stream truncated at word {0}")]
    Truncated(usize),
    /// The byte stream length is not a multiple of the word size.
    #[error("bytecode length {0} is not word-aligned")]
    Misaligned(usize),
    /// The body length in the header exceeds the stream.
    #[error("declared body length {declared} exceeds stream length {available}")]
    BodyOverrun {
        /// Body length from the header.
        declared: usize,
        /// Words actually available.
        available: usize,
    },
    /// A symbol entry's leading kind byte is unknown.
    #[error("unknown symbol entry kind {0:#04x} at word {1}")]
    BadSymbolKind(u8, usize),
    /// A symbol entry's declared name length disagrees with its bytes, or
    /// the name is not UTF-8.
    #[error("malformed name in symbol entry {0}")]
    MalformedName(usize),
    /// Fewer symbol entries than the header declares.
    #[error("symbol table holds {actual} entries, header declares {declared}")]
    SymbolCountMismatch {
        /// Count from the header.
        declared: usize,
        /// Entries actually decoded.
        actual: usize,
    },
    /// A `FUNCDEF` body offset points outside the executable section.
    #[error("function definition {0} points outside the executable section")]
    FuncDefOverrun(usize),
}

/// A compiled top-level unit: function header, executable section, local
/// symbol table. The in-memory and on-disk layouts are identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Top-level function header. `header.symbols` always equals
    /// `symbols.len()`.
    pub header: FunctionHeader,
    /// Executable word stream. `header.body_len` always equals
    /// `code.len()`.
    pub code: Vec<Word>,
    /// Local symbol table.
    pub symbols: Vec<SymbolEntry>,
}

impl Program {
    /// Assemble a program from its sections, filling the redundant header
    /// fields.
    pub fn new(arg_count: Word, reg_count: Word, code: Vec<Word>, symbols: Vec<SymbolEntry>) -> Self {
        Self {
            header: FunctionHeader {
                body_len: code.len() as Word,
                arg_count,
                reg_count,
                symbols: symbols.len() as Word,
            },
            code,
            symbols,
        }
    }

    /// Serialize to the flat word stream.
    pub fn to_words(&self) -> Vec<Word> {
        let mut out = Vec::with_capacity(FunctionHeader::LEN + self.code.len());
        out.extend(self.header.to_words());
        out.extend(&self.code);
        for entry in &self.symbols {
            entry.encode_into(&mut out);
        }
        out
    }

    /// Serialize to little-endian bytes, the `.spo` file content.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_words().iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Decode a program from a word stream, validating every declared
    /// length.
    pub fn from_words(words: &[Word]) -> Result<Self, DecodeError> {
        let header =
            FunctionHeader::from_words(words).ok_or(DecodeError::Truncated(words.len()))?;
        let body_len = header.body_len as usize;
        let rest = &words[FunctionHeader::LEN..];
        if body_len > rest.len() {
            return Err(DecodeError::BodyOverrun {
                declared: body_len,
                available: rest.len(),
            });
        }
        let code = rest[..body_len].to_vec();

        let mut symbols = Vec::with_capacity(header.symbols as usize);
        let mut pos = FunctionHeader::LEN + body_len;
        while pos < words.len() {
            let lead = crate::Instr::new(words[pos]);
            let kind = SymEntryKind::try_from(lead.op())
                .map_err(|b| DecodeError::BadSymbolKind(b, pos))?;
            let len = lead.operand24() as usize;
            pos += 1;

            let offset = if kind == SymEntryKind::FuncDef {
                let off = *words.get(pos).ok_or(DecodeError::Truncated(pos))?;
                pos += 1;
                Some(off)
            } else {
                None
            };

            let nwords = name_words(len);
            let name_slice = words
                .get(pos..pos + nwords)
                .ok_or(DecodeError::Truncated(pos))?;
            let name =
                decode_name(name_slice, len).ok_or(DecodeError::MalformedName(symbols.len()))?;
            pos += nwords;

            symbols.push(match kind {
                SymEntryKind::StrConst => SymbolEntry::StrConst(name),
                SymEntryKind::SymStub => SymbolEntry::SymStub(name),
                SymEntryKind::FuncDef => {
                    let offset = offset.unwrap_or_default();
                    if offset as usize + FunctionHeader::LEN > body_len {
                        return Err(DecodeError::FuncDefOverrun(symbols.len()));
                    }
                    SymbolEntry::FuncDef { name, offset }
                }
            });
        }

        if symbols.len() != header.symbols as usize {
            return Err(DecodeError::SymbolCountMismatch {
                declared: header.symbols as usize,
                actual: symbols.len(),
            });
        }

        Ok(Self {
            header,
            code,
            symbols,
        })
    }

    /// Decode a program from little-endian bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() % WORD_BYTES != 0 {
            return Err(DecodeError::Misaligned(bytes.len()));
        }
        let words: Vec<Word> = bytes
            .chunks_exact(WORD_BYTES)
            .map(|c| Word::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::from_words(&words)
    }
}
