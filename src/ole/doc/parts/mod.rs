/// Internal parts for parsing DOC file structures.
///
/// This module contains parsers for the binary structures used in
/// legacy Word documents, including:
/// - FIB (File Information Block)
/// - Piece table and text runs
/// - Paragraph bin table, PAPX FKP pages and paragraph properties
pub mod fib;
pub mod fkp;
pub mod pap;
pub mod pap_bin_table;
pub mod paragraphs;
pub mod piece_table;
pub mod text;
