use bitflags::bitflags;

/// Low-byte type tag of the 16-bit wire type word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Tag {
    Nil = 0x00,
    Bool = 0x01,
    Number = 0x02,
    String = 0x03,
    Array = 0x04,
    Hashmap = 0x05,
    Function = 0x06,
    Userinfo = 0x07,
}

impl TryFrom<u8> for Tag {
    type Error = u8;

    fn try_from(b: u8) -> Result<Self, u8> {
        Ok(match b {
            0x00 => Self::Nil,
            0x01 => Self::Bool,
            0x02 => Self::Number,
            0x03 => Self::String,
            0x04 => Self::Array,
            0x05 => Self::Hashmap,
            0x06 => Self::Function,
            0x07 => Self::Userinfo,
            _ => return Err(b),
        })
    }
}

bitflags! {
    /// High-byte flag set of the 16-bit wire type word.
    pub struct TypeFlags: u8 {
        /// The payload is a reference-counted heap object.
        const OBJECT = 0x01;
        /// The number is a double rather than an integer.
        const FLOAT = 0x02;
    }
}

/// The 16-bit type word of the original wire format: a [`Tag`] in the low
/// byte and [`TypeFlags`] in the high byte.
///
/// The runtime re-expresses tag and flags as enum variants; this type
/// survives only where the serialized layout must stay bit-identical and
/// in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeWord(u16);

impl TypeWord {
    /// Compose a type word from tag and flags.
    pub const fn new(tag: Tag, flags: TypeFlags) -> Self {
        Self((tag as u16) | ((flags.bits() as u16) << 8))
    }

    /// The tag byte.
    pub fn tag(self) -> Option<Tag> {
        Tag::try_from((self.0 & 0xff) as u8).ok()
    }

    /// The flag byte.
    pub fn flags(self) -> TypeFlags {
        TypeFlags::from_bits_truncate((self.0 >> 8) as u8)
    }

    /// Raw 16-bit representation.
    pub const fn bits(self) -> u16 {
        self.0
    }
}

impl From<u16> for TypeWord {
    fn from(bits: u16) -> Self {
        Self(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_and_flags_round_trip() {
        let tw = TypeWord::new(Tag::Number, TypeFlags::FLOAT);
        assert_eq!(tw.tag(), Some(Tag::Number));
        assert_eq!(tw.flags(), TypeFlags::FLOAT);

        let tw = TypeWord::new(Tag::String, TypeFlags::OBJECT);
        assert_eq!(tw.bits(), 0x0103);
        assert_eq!(TypeWord::from(tw.bits()), tw);
    }
}
