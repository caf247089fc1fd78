//! Value type tags carried by `OUT` and the typed arithmetic instructions.

use crate::bits::CellRepr;

/// Type tag encoded as a single operand byte. The tag never changes how a
/// cell is stored, only how an instruction reads its low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    Nil = 0,
    Ptr,
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    /// Decode an operand byte. Unknown bytes come from a malformed chunk;
    /// they fold onto `Nil` rather than aborting, matching the
    /// trusted-compiler contract.
    pub fn from_byte(byte: u8) -> ValueType {
        match byte {
            0 => ValueType::Nil,
            1 => ValueType::Ptr,
            2 => ValueType::Bool,
            3 => ValueType::U8,
            4 => ValueType::U16,
            5 => ValueType::U32,
            6 => ValueType::U64,
            7 => ValueType::I8,
            8 => ValueType::I16,
            9 => ValueType::I32,
            10 => ValueType::I64,
            11 => ValueType::F32,
            12 => ValueType::F64,
            _ => ValueType::Nil,
        }
    }
}

/// Render a register cell under the given tag.
pub fn format_cell(ty: ValueType, cell: u64) -> String {
    match ty {
        ValueType::Nil => "NIL".to_string(),
        ValueType::Ptr => format!("0x{cell:x}"),
        ValueType::Bool => {
            let text = if cell == 0 { "FALSE" } else { "TRUE" };
            text.to_string()
        }
        ValueType::U8 => u8::from_cell(cell).to_string(),
        ValueType::U16 => u16::from_cell(cell).to_string(),
        ValueType::U32 => u32::from_cell(cell).to_string(),
        ValueType::U64 => cell.to_string(),
        ValueType::I8 => i8::from_cell(cell).to_string(),
        ValueType::I16 => i16::from_cell(cell).to_string(),
        ValueType::I32 => i32::from_cell(cell).to_string(),
        ValueType::I64 => i64::from_cell(cell).to_string(),
        ValueType::F32 => format!("{:.6}", f32::from_cell(cell)),
        ValueType::F64 => format!("{:.6}", f64::from_cell(cell)),
    }
}

/// The full `OUT` line: formatted value plus the cell's 64-bit binary image.
pub fn out_line(ty: ValueType, cell: u64) -> String {
    format!("{} ({cell:064b})", format_cell(ty, cell))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_formats_by_zeroness() {
        assert_eq!(format_cell(ValueType::Bool, 0), "FALSE");
        assert_eq!(format_cell(ValueType::Bool, 1), "TRUE");
        assert_eq!(format_cell(ValueType::Bool, 0xFFFF), "TRUE");
    }

    #[test]
    fn floats_print_six_fraction_digits() {
        let cell = (-28.0f32).to_bits() as u64;
        assert_eq!(format_cell(ValueType::F32, cell), "-28.000000");
    }

    #[test]
    fn signed_formats_read_low_bits() {
        let cell = (-5i8) as u8 as u64;
        assert_eq!(format_cell(ValueType::I8, cell), "-5");
        // the same cell read unsigned is the raw pattern
        assert_eq!(format_cell(ValueType::U8, cell), "251");
    }

    #[test]
    fn out_line_carries_binary_image() {
        let line = out_line(ValueType::U32, 37);
        assert!(line.starts_with("37 ("));
        assert!(line.ends_with(')'));
        let binary = &line[4..line.len() - 1];
        assert_eq!(binary.len(), 64);
        assert!(binary.ends_with("100101"));
    }

    #[test]
    fn unknown_tag_folds_onto_nil() {
        assert_eq!(ValueType::from_byte(200), ValueType::Nil);
        assert_eq!(format_cell(ValueType::Nil, 42), "NIL");
    }
}
