//! Serializing font subsets in the OpenType and WOFF2 formats.

use core::{iter, mem};

use super::{
    font::{CmapSubtable, DeltaSegment, Font, Glyph, LocaFormat, MapGroup, TableTag},
    subset::FontSubset,
};

fn write_u16(writer: &mut Vec<u8>, value: u16) {
    writer.extend_from_slice(&value.to_be_bytes());
}

fn write_u32(writer: &mut Vec<u8>, value: u32) {
    writer.extend_from_slice(&value.to_be_bytes());
}

/// Writes a `UIntBase128` value used in WOFF2 table directories.
#[allow(clippy::cast_possible_truncation)] // intentional
fn write_uint_base128(buffer: &mut Vec<u8>, value: u32) {
    let significant_bits = 32 - value.leading_zeros().min(31);
    let len = significant_bits.div_ceil(7);
    for i in (1..len).rev() {
        buffer.push(0x80 | (value >> (7 * i)) as u8);
    }
    buffer.push((value & 0x7f) as u8);
}

/// Glyph-to-char mapping grouped into runs where both chars and glyph indices are sequential.
#[derive(Debug, Default)]
pub(crate) struct CmapBuilder {
    groups: Vec<MapGroup>,
}

impl CmapBuilder {
    /// Creates a builder from a mapping sorted by char.
    pub(crate) fn new(map: &[(char, u16)]) -> Self {
        let mut groups = vec![];
        let mut current: Option<MapGroup> = None;
        for &(ch, glyph_idx) in map {
            let (code, glyph_idx) = (u32::from(ch), u32::from(glyph_idx));
            if let Some(group) = &mut current {
                let continues = code == group.end_char_code + 1
                    && glyph_idx == group.start_glyph_id + (code - group.start_char_code);
                if continues {
                    group.end_char_code = code;
                    continue;
                }
            }
            let next = MapGroup {
                start_char_code: code,
                end_char_code: code,
                start_glyph_id: glyph_idx,
            };
            groups.extend(mem::replace(&mut current, Some(next)));
        }
        groups.extend(current);
        Self { groups }
    }

    fn has_supplementary_chars(&self) -> bool {
        self.groups
            .last()
            .is_some_and(|group| group.end_char_code >= u32::from(u16::MAX))
    }

    /// Restricts groups to the BMP as format 4 segments, terminated by the mandatory `0xffff` segment.
    #[allow(clippy::cast_possible_truncation)] // codes are checked to fit into `u16`
    fn delta_segments(&self) -> Vec<DeltaSegment> {
        let bmp_groups = self
            .groups
            .iter()
            .filter(|group| group.start_char_code < u32::from(u16::MAX));
        let segments = bmp_groups.map(|group| {
            let start_code = group.start_char_code as u16;
            let end_code = group.end_char_code.min(u32::from(u16::MAX) - 1) as u16;
            DeltaSegment {
                start_code,
                end_code,
                id_delta: (group.start_glyph_id as u16).wrapping_sub(start_code),
                id_range_offset: 0,
            }
        });
        segments
            .chain([DeltaSegment {
                start_code: u16::MAX,
                end_code: u16::MAX,
                id_delta: 1, // maps 0xffff to the missing glyph
                id_range_offset: 0,
            }])
            .collect()
    }

    /// Writes a `cmap` table with a format 4 subtable for the BMP, and a format 12 subtable
    /// if the mapping has supplementary-plane chars.
    pub(crate) fn write(&self, writer: &mut Vec<u8>) {
        let segments = self.delta_segments();
        let deltas_len = 16 + 8 * segments.len();
        let mut encodings = vec![(CmapSubtable::UNICODE_BMP_ENCODING, deltas_len)];
        if self.has_supplementary_chars() {
            let coverage_len = 16 + 12 * self.groups.len();
            encodings.push((CmapSubtable::UNICODE_FULL_ENCODING, coverage_len));
        }

        write_u16(writer, 0); // version
        let subtable_count = u16::try_from(encodings.len()).expect("at most 2 subtables");
        write_u16(writer, subtable_count);
        let mut offset = 4 + 8 * encodings.len();
        for &(encoding_id, len) in &encodings {
            write_u16(writer, CmapSubtable::WINDOWS_PLATFORM);
            write_u16(writer, encoding_id);
            write_u32(writer, u32::try_from(offset).expect("cmap offset overflow"));
            offset += len;
        }

        Self::write_deltas(&segments, writer);
        if encodings.len() > 1 {
            self.write_coverage(writer);
        }
    }

    fn write_deltas(segments: &[DeltaSegment], writer: &mut Vec<u8>) {
        write_u16(writer, 4); // format
        let len = u16::try_from(16 + 8 * segments.len()).expect("format 4 subtable overflow");
        write_u16(writer, len);
        write_u16(writer, 0); // language

        let segment_count = u16::try_from(segments.len()).expect("format 4 subtable overflow");
        let entry_selector = u16::try_from(segment_count.ilog2()).expect("`ilog2` of `u16` fits");
        let search_range = 1 << (entry_selector + 1);
        write_u16(writer, 2 * segment_count);
        write_u16(writer, search_range);
        write_u16(writer, entry_selector);
        write_u16(writer, 2 * segment_count - search_range);

        for segment in segments {
            write_u16(writer, segment.end_code);
        }
        write_u16(writer, 0); // reserved padding
        for segment in segments {
            write_u16(writer, segment.start_code);
        }
        for segment in segments {
            write_u16(writer, segment.id_delta);
        }
        for segment in segments {
            write_u16(writer, segment.id_range_offset);
        }
    }

    fn write_coverage(&self, writer: &mut Vec<u8>) {
        write_u16(writer, 12); // format
        write_u16(writer, 0); // reserved
        let len = u32::try_from(16 + 12 * self.groups.len()).expect("format 12 subtable overflow");
        write_u32(writer, len);
        write_u32(writer, 0); // language
        write_u32(writer, u32::try_from(self.groups.len()).expect("too many groups"));
        for group in &self.groups {
            write_u32(writer, group.start_char_code);
            write_u32(writer, group.end_char_code);
            write_u32(writer, group.start_glyph_id);
        }
    }
}

impl Glyph<'_> {
    /// Writes glyph data with component indices patched, padded to an even length.
    fn write(&self, writer: &mut Vec<u8>) {
        let start = writer.len();
        writer.extend_from_slice(self.raw);
        for component in &self.components {
            let pos = start + component.offset;
            writer[pos..pos + 2].copy_from_slice(&component.glyph_idx.to_be_bytes());
        }
        if self.raw.len() % 2 == 1 {
            writer.push(0);
        }
    }
}

fn write_hmtx(glyphs: &[Glyph<'_>], writer: &mut Vec<u8>) -> u16 {
    // Trailing glyphs with the same advance only need to record their left side bearings.
    let mut number_of_h_metrics = glyphs.len();
    while let Some([prev, last]) = glyphs[..number_of_h_metrics].last_chunk::<2>() {
        if prev.advance != last.advance {
            break;
        }
        number_of_h_metrics -= 1;
    }

    for (i, glyph) in glyphs.iter().enumerate() {
        if i < number_of_h_metrics {
            write_u16(writer, glyph.advance);
        }
        write_u16(writer, glyph.lsb);
    }
    u16::try_from(number_of_h_metrics).expect("too many glyphs")
}

fn write_loca(locations: &[usize], writer: &mut Vec<u8>) -> LocaFormat {
    let fits_short = locations
        .last()
        .is_none_or(|&loc| loc <= 2 * usize::from(u16::MAX));
    if fits_short && locations.iter().all(|loc| loc % 2 == 0) {
        for &loc in locations {
            #[allow(clippy::cast_possible_truncation)] // checked above
            write_u16(writer, (loc / 2) as u16);
        }
        LocaFormat::Short
    } else {
        for &loc in locations {
            write_u32(writer, u32::try_from(loc).expect("glyph location overflow"));
        }
        LocaFormat::Long
    }
}

impl FontSubset<'_> {
    /// Serializes this subset to the OpenType format.
    pub(crate) fn to_truetype(&self) -> Vec<u8> {
        self.to_writer().into_opentype()
    }

    /// Serializes this subset to the WOFF2 format.
    pub(crate) fn to_woff2(&self) -> Vec<u8> {
        self.to_writer().into_woff2()
    }

    pub(crate) fn to_writer(&self) -> FontWriter {
        let font = &self.font;
        let mut writer = FontWriter::default();
        writer.write_table(TableTag::CMAP, |buffer| {
            CmapBuilder::new(&self.char_map).write(buffer);
        });
        if let Some(cvt) = font.cvt {
            writer.write_raw_table(TableTag::CVT, cvt);
        }
        if let Some(fpgm) = font.fpgm {
            writer.write_raw_table(TableTag::FPGM, fpgm);
        }

        let number_of_h_metrics =
            writer.write_table(TableTag::HMTX, |buffer| write_hmtx(&self.glyphs, buffer));
        writer.write_table(TableTag::HHEA, |buffer| {
            buffer.extend_from_slice(&font.hhea[..Font::HHEA_LEN - 2]);
            write_u16(buffer, number_of_h_metrics);
        });
        writer.write_table(TableTag::MAXP, |buffer| {
            buffer.extend_from_slice(&font.maxp[..4]);
            write_u16(buffer, u16::try_from(self.glyphs.len()).expect("too many glyphs"));
            buffer.extend_from_slice(&font.maxp[6..]);
        });
        writer.write_raw_table(TableTag::NAME, font.name);
        writer.write_raw_table(TableTag::OS2, font.os2);
        writer.write_table(TableTag::POST, |buffer| {
            // Version 3.0 has no glyph names.
            write_u32(buffer, 0x_0003_0000);
            buffer.extend_from_slice(&font.post[4..32]);
        });
        if let Some(prep) = font.prep {
            writer.write_raw_table(TableTag::PREP, prep);
        }

        let locations = writer.write_table(TableTag::GLYF, |buffer| {
            let start = buffer.len();
            let mut locations = vec![0];
            for glyph in &self.glyphs {
                glyph.write(buffer);
                locations.push(buffer.len() - start);
            }
            locations
        });
        let loca_format = writer.write_table(TableTag::LOCA, |buffer| write_loca(&locations, buffer));
        writer.write_table(TableTag::HEAD, |buffer| {
            write_head(font.head, loca_format, buffer);
        });
        writer
    }
}

fn write_head(original: &[u8], loca_format: LocaFormat, writer: &mut Vec<u8>) {
    let loca_offset = Font::HEAD_LOCA_FORMAT_OFFSET;
    writer.extend_from_slice(&original[..Font::HEAD_CHECKSUM_OFFSET]);
    write_u32(writer, 0); // checksum adjustment; patched once all tables are written
    writer.extend_from_slice(&original[Font::HEAD_CHECKSUM_OFFSET + 4..loca_offset]);
    write_u16(
        writer,
        match loca_format {
            LocaFormat::Short => 0,
            LocaFormat::Long => 1,
        },
    );
    writer.extend_from_slice(&original[loca_offset + 2..]);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TableRecord {
    pub(crate) tag: TableTag,
    checksum: u32,
    /// Offset relative to the start of table data; always 4-byte aligned.
    pub(crate) offset: u32,
    pub(crate) length: u32,
}

impl TableRecord {
    const BYTE_LEN: usize = 16;

    fn directory_checksum(&self, data_offset: u32) -> u32 {
        u32::from_be_bytes(self.tag.0)
            .wrapping_add(self.checksum)
            .wrapping_add(self.offset + data_offset)
            .wrapping_add(self.length)
    }

    fn write_woff2(&self, buffer: &mut Vec<u8>) {
        const NULL_TRANSFORM: u8 = 0b_1100_0000;
        const ARBITRARY_TAG: u8 = 63;

        let known_idx = match self.tag {
            TableTag::CMAP => Some(0),
            TableTag::HEAD => Some(1),
            TableTag::HHEA => Some(2),
            TableTag::HMTX => Some(3),
            TableTag::MAXP => Some(4),
            TableTag::NAME => Some(5),
            TableTag::OS2 => Some(6),
            TableTag::POST => Some(7),
            TableTag::CVT => Some(8),
            TableTag::FPGM => Some(9),
            TableTag::GLYF => Some(10 | NULL_TRANSFORM),
            TableTag::LOCA => Some(11 | NULL_TRANSFORM),
            TableTag::PREP => Some(12),
            _ => None,
        };
        if let Some(flags) = known_idx {
            buffer.push(flags);
        } else {
            buffer.push(ARBITRARY_TAG);
            buffer.extend_from_slice(&self.tag.0);
        }
        write_uint_base128(buffer, self.length);
    }
}

/// Accumulates tables and assembles them into a font file.
#[derive(Debug, Clone, Default)]
pub(crate) struct FontWriter {
    pub(crate) tables: Vec<TableRecord>,
    /// Table data, each table padded to a 4-byte boundary.
    pub(crate) table_data: Vec<u8>,
}

impl FontWriter {
    const SFNT_HEADER_LEN: usize = 12;
    const WOFF2_HEADER_LEN: usize = 48;
    const WOFF2_SIGNATURE: u32 = u32::from_be_bytes(*b"wOF2");

    pub(crate) fn write_table<T>(
        &mut self,
        tag: TableTag,
        with: impl FnOnce(&mut Vec<u8>) -> T,
    ) -> T {
        let offset = self.table_data.len();
        let output = with(&mut self.table_data);
        let length = self.table_data.len() - offset;
        let padding = (4 - length % 4) % 4;
        self.table_data.extend(iter::repeat_n(0_u8, padding));

        self.tables.push(TableRecord {
            tag,
            checksum: Font::checksum(&self.table_data[offset..]),
            offset: u32::try_from(offset).expect("table offset overflow"),
            length: u32::try_from(length).expect("table length overflow"),
        });
        output
    }

    pub(crate) fn write_raw_table(&mut self, tag: TableTag, content: &[u8]) {
        self.write_table(tag, |buffer| buffer.extend_from_slice(content));
    }

    fn sfnt_header(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(Self::SFNT_HEADER_LEN);
        write_u32(&mut buffer, Font::SFNT_VERSION);
        let table_count = u16::try_from(self.tables.len()).expect("too many tables");
        write_u16(&mut buffer, table_count);
        let entry_selector =
            u16::try_from(table_count.max(1).ilog2()).expect("`ilog2` of `u16` fits");
        let search_range = 16 << entry_selector;
        write_u16(&mut buffer, search_range);
        write_u16(&mut buffer, entry_selector);
        write_u16(&mut buffer, (16 * table_count).saturating_sub(search_range));
        buffer
    }

    fn data_offset(&self) -> usize {
        Self::SFNT_HEADER_LEN + self.tables.len() * TableRecord::BYTE_LEN
    }

    /// Fills in `checkSumAdjustment` in the `head` table so that the whole file sums up
    /// to the magic checksum.
    fn adjust_checksum(&mut self, header: &[u8]) {
        let data_offset = u32::try_from(self.data_offset()).expect("data offset overflow");
        let file_checksum = self.tables.iter().fold(Font::checksum(header), |acc, record| {
            acc.wrapping_add(record.directory_checksum(data_offset))
                .wrapping_add(record.checksum)
        });
        let adjustment = Font::SFNT_CHECKSUM.wrapping_sub(file_checksum);

        let head = self.tables.iter().find(|record| record.tag == TableTag::HEAD);
        if let Some(head) = head {
            let pos = head.offset as usize + Font::HEAD_CHECKSUM_OFFSET;
            self.table_data[pos..pos + 4].copy_from_slice(&adjustment.to_be_bytes());
        }
    }

    pub(crate) fn into_opentype(mut self) -> Vec<u8> {
        self.tables.sort_unstable_by_key(|record| record.tag);
        let mut buffer = self.sfnt_header();
        self.adjust_checksum(&buffer);

        let data_offset = u32::try_from(self.data_offset()).expect("data offset overflow");
        for record in &self.tables {
            buffer.extend_from_slice(&record.tag.0);
            write_u32(&mut buffer, record.checksum);
            write_u32(&mut buffer, record.offset + data_offset);
            write_u32(&mut buffer, record.length);
        }
        buffer.extend_from_slice(&self.table_data);
        buffer
    }

    /// Concatenates unpadded table data in the directory order, as WOFF2 requires.
    fn woff2_stream(&self) -> Vec<u8> {
        let mut stream = vec![];
        for record in &self.tables {
            let start = record.offset as usize;
            stream.extend_from_slice(&self.table_data[start..start + record.length as usize]);
        }
        stream
    }

    pub(crate) fn into_woff2(mut self) -> Vec<u8> {
        let header = self.sfnt_header();
        self.adjust_checksum(&header);

        let mut compressed = vec![];
        let params = brotli::enc::BrotliEncoderParams::default();
        brotli::BrotliCompress(&mut self.woff2_stream().as_slice(), &mut compressed, &params)
            .expect("writing to `Vec` never fails");

        let mut directory = vec![];
        for record in &self.tables {
            record.write_woff2(&mut directory);
        }
        let unpadded_len = Self::WOFF2_HEADER_LEN + directory.len() + compressed.len();
        let padding = (4 - unpadded_len % 4) % 4;
        let total_sfnt_size = self.data_offset() + self.table_data.len();

        let mut buffer = Vec::with_capacity(unpadded_len + padding);
        write_u32(&mut buffer, Self::WOFF2_SIGNATURE);
        write_u32(&mut buffer, Font::SFNT_VERSION);
        write_u32(&mut buffer, u32::try_from(unpadded_len + padding).expect("font too large"));
        write_u16(&mut buffer, u16::try_from(self.tables.len()).expect("too many tables"));
        write_u16(&mut buffer, 0); // reserved
        write_u32(&mut buffer, u32::try_from(total_sfnt_size).expect("font too large"));
        write_u32(&mut buffer, u32::try_from(compressed.len()).expect("font too large"));
        write_u32(&mut buffer, 0); // major and minor version
        write_u32(&mut buffer, 0); // metadata offset
        write_u32(&mut buffer, 0); // metadata length
        write_u32(&mut buffer, 0); // original metadata length
        write_u32(&mut buffer, 0); // private block offset
        write_u32(&mut buffer, 0); // private block length
        debug_assert_eq!(buffer.len(), Self::WOFF2_HEADER_LEN);

        buffer.extend_from_slice(&directory);
        buffer.extend_from_slice(&compressed);
        buffer.extend(iter::repeat_n(0_u8, padding));
        buffer
    }
}
