//! Markup glyphs written in place of paragraph marks and table structure.

use phf::{Map, phf_map};

/// End of an ordinary paragraph (`\r`)
pub const PARAGRAPH_END: char = '¶';
/// Page break (`\x0C`)
pub const PAGE_BREAK: char = '§';
/// End of a table cell or row (`\x07`)
pub const CELL_END: char = '¤';
/// Table terminator row
pub const TABLE_TERMINATOR: char = '╜';
/// First paragraph of a table
pub const TABLE_BEGIN: char = '╤';
/// First paragraph after a table
pub const TABLE_END: char = '╚';

/// The cell mark, which is also the whole text of a terminator row.
pub const CELL_MARK: char = '\u{7}';

/// Paragraph mark character to glyph.
pub static BOUNDARY_GLYPHS: Map<char, char> = phf_map! {
    '\r' => PARAGRAPH_END,
    '\x0C' => PAGE_BREAK,
    '\u{7}' => CELL_END,
};

/// Glyph for a decoded paragraph mark, `None` if it is not one.
#[inline]
pub fn boundary_glyph(mark: &str) -> Option<char> {
    let mut chars = mark.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => BOUNDARY_GLYPHS.get(&c).copied(),
        _ => None,
    }
}

/// Marker for a change of table membership between two paragraphs.
#[inline]
pub fn table_transition(was_in_table: bool, in_table: bool) -> Option<char> {
    match (was_in_table, in_table) {
        (false, true) => Some(TABLE_BEGIN),
        (true, false) => Some(TABLE_END),
        _ => None,
    }
}
