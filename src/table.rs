use super::*;

use log::*;
use std::collections::BTreeMap;

/// A named lookup table: fixed-width input bit patterns mapped to output bit
/// vectors.
///
/// Patterns are stored verbatim as written. Output vectors store bit 0 as the
/// rightmost character of the literal (literals are MSB-first). The input
/// width is the length of the first pattern parsed; rows with a different
/// pattern width are accepted for compatibility but logged.
#[derive(Debug, Clone)]
pub struct LookupTable {
    name: String,
    input_width: usize,
    output_width: usize,
    rows: BTreeMap<String, Vec<bool>>,
    pos: Pos,
}

impl LookupTable {
    pub(crate) fn new(name: &str, pos: Pos) -> LookupTable {
        LookupTable {
            name: name.to_string(),
            input_width: 0,
            output_width: 0,
            rows: BTreeMap::new(),
            pos,
        }
    }

    pub(crate) fn add_row(&mut self, pattern: String, bits: Vec<bool>) {
        if self.rows.is_empty() {
            self.input_width = pattern.len();
            self.output_width = bits.len();
        } else if pattern.len() != self.input_width {
            warn!(
                "lookup table {}: pattern {pattern:?} has width {} (first pattern had width {})",
                self.name,
                pattern.len(),
                self.input_width,
            );
        }
        self.rows.insert(pattern, bits);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }

    pub fn rows(&self) -> &BTreeMap<String, Vec<bool>> {
        &self.rows
    }

    pub fn get(&self, key: &str) -> Option<&Vec<bool>> {
        self.rows.get(key)
    }
}

impl HasPos for LookupTable {
    fn pos(&self) -> Pos {
        self.pos
    }
}
