use std::collections::BTreeMap;

use super::font::{Font, Glyph};
use crate::errors::ParseError;

/// Font reduced to the glyphs needed to render a set of chars.
#[derive(Debug)]
pub(crate) struct FontSubset<'a> {
    pub(crate) font: Font<'a>,
    /// Retained chars with their glyph indices in the subset, ordered by char.
    pub(crate) char_map: Vec<(char, u16)>,
    old_to_new_glyph_idx: BTreeMap<u16, u16>,
    /// Retained glyphs; composite glyph components are already remapped to new indices.
    pub(crate) glyphs: Vec<Glyph<'a>>,
}

impl<'a> FontSubset<'a> {
    /// Creates a subset retaining `chars`, which must be sorted in ascending order.
    /// Chars not covered by the font are ignored.
    pub(crate) fn new(
        font: Font<'a>,
        chars: impl IntoIterator<Item = char>,
    ) -> Result<Self, ParseError> {
        let missing_glyph = font.glyph(0)?;
        let mut this = Self {
            font,
            char_map: vec![],
            // The missing glyph always keeps index 0
            old_to_new_glyph_idx: BTreeMap::from([(0, 0)]),
            glyphs: vec![missing_glyph],
        };
        this.remap_components(vec![0])?;

        for ch in chars {
            let old_idx = this.font.map_char(ch);
            if old_idx == 0 {
                continue;
            }
            debug_assert!(this.char_map.last().is_none_or(|&(prev, _)| prev < ch));
            let new_idx = this.ensure_glyph(old_idx)?;
            this.char_map.push((ch, new_idx));
        }
        Ok(this)
    }

    fn ensure_glyph(&mut self, old_idx: u16) -> Result<u16, ParseError> {
        let mut pending = vec![];
        let new_idx = self.register_glyph(old_idx, &mut pending)?;
        self.remap_components(pending)?;
        Ok(new_idx)
    }

    /// Adds a glyph to the subset unless it's already there. Composite glyphs are pushed
    /// to `pending` so that their components are remapped later.
    fn register_glyph(&mut self, old_idx: u16, pending: &mut Vec<u16>) -> Result<u16, ParseError> {
        if let Some(&new_idx) = self.old_to_new_glyph_idx.get(&old_idx) {
            return Ok(new_idx);
        }

        let glyph = self.font.glyph(old_idx)?;
        // Cannot overflow: the subset never has more glyphs than the font.
        let new_idx = u16::try_from(self.glyphs.len()).expect("too many glyphs");
        // Registered before its components are visited, so that reference cycles terminate.
        self.old_to_new_glyph_idx.insert(old_idx, new_idx);
        if !glyph.components.is_empty() {
            pending.push(new_idx);
        }
        self.glyphs.push(glyph);
        Ok(new_idx)
    }

    /// Walks the composite closure of `pending` glyphs (new indices) with an explicit stack;
    /// component nesting in a malformed font may be arbitrarily deep.
    fn remap_components(&mut self, mut pending: Vec<u16>) -> Result<(), ParseError> {
        while let Some(new_idx) = pending.pop() {
            let glyph_pos = usize::from(new_idx);
            for i in 0..self.glyphs[glyph_pos].components.len() {
                let old_component_idx = self.glyphs[glyph_pos].components[i].glyph_idx;
                let new_component_idx = self.register_glyph(old_component_idx, &mut pending)?;
                self.glyphs[glyph_pos].components[i].glyph_idx = new_component_idx;
            }
        }
        Ok(())
    }
}
