/// Shared SPRM (Single Property Modifier) opcode layout.
///
/// An SPRM is a 2-byte opcode followed by an operand. The opcode packs three
/// fields: the operand size class (spra, bits 13..15), the property group
/// (sgc, bits 10..12) and the property index. Operand length is never found
/// by scanning; it follows from the size class, or from a length prefix when
/// the class is variable.
use phf::{Map, phf_map};

/// Bit position of the size class
const SPRA_SHIFT: u16 = 13;
/// Bit position of the property group
const SGC_SHIFT: u16 = 10;
/// Three-bit field mask
const FIELD_MASK: u16 = 0b111;
/// Index, special flag and group bits (9 + 1 + 3)
pub const OPCODE_MASK: u16 = (1 << 13) - 1;

/// Property group of paragraph modifiers
pub const SGC_PARAGRAPH: u8 = 1;
/// Property group of table modifiers
pub const SGC_TABLE: u8 = 5;

/// Operand bytes of each fixed size class (class 6 is variable).
pub static FIXED_OPERAND_SIZES: Map<u8, usize> = phf_map! {
    0u8 => 1,
    1u8 => 1,
    2u8 => 2,
    3u8 => 4,
    4u8 => 2,
    5u8 => 2,
    7u8 => 3,
};

/// SPRM operation types based on size code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprmOperation {
    /// Size code 0 - toggle (1 byte operand)
    Toggle,
    /// Size code 1 - 1 byte operand
    Byte,
    /// Size code 2 - 2 byte operand
    Word,
    /// Size code 3 - 4 byte operand
    DWord,
    /// Size code 4 - 2 byte operand
    Word2,
    /// Size code 5 - 2 byte operand
    Word3,
    /// Size code 6 - variable length operand
    Variable,
    /// Size code 7 - 3 byte operand
    ThreeByte,
}

impl SprmOperation {
    /// Decode the three-bit size class.
    pub fn from_size_code(size_code: u8) -> Self {
        match size_code & 0b111 {
            0 => SprmOperation::Toggle,
            1 => SprmOperation::Byte,
            2 => SprmOperation::Word,
            3 => SprmOperation::DWord,
            4 => SprmOperation::Word2,
            5 => SprmOperation::Word3,
            6 => SprmOperation::Variable,
            _ => SprmOperation::ThreeByte,
        }
    }

    pub fn size_code(self) -> u8 {
        match self {
            SprmOperation::Toggle => 0,
            SprmOperation::Byte => 1,
            SprmOperation::Word => 2,
            SprmOperation::DWord => 3,
            SprmOperation::Word2 => 4,
            SprmOperation::Word3 => 5,
            SprmOperation::Variable => 6,
            SprmOperation::ThreeByte => 7,
        }
    }

    /// Operand size for fixed classes, `None` for [`SprmOperation::Variable`].
    #[inline]
    pub fn fixed_operand_size(self) -> Option<usize> {
        FIXED_OPERAND_SIZES.get(&self.size_code()).copied()
    }
}

/// The decoded fields of a 2-byte SPRM opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sprm {
    /// Opcode with the size class stripped (low 13 bits)
    pub opcode: u16,
    /// Property group
    pub group: u8,
    /// Operand size class
    pub operation: SprmOperation,
}

impl Sprm {
    /// Split a raw little-endian opcode into its fields.
    pub fn from_raw(raw: u16) -> Self {
        Self {
            opcode: raw & OPCODE_MASK,
            group: ((raw >> SGC_SHIFT) & FIELD_MASK) as u8,
            operation: SprmOperation::from_size_code(((raw >> SPRA_SHIFT) & FIELD_MASK) as u8),
        }
    }
}
