//! OpenType (TrueType outlines) parsing, limited to what subsetting needs.

use core::{fmt, ops};
use std::collections::BTreeMap;

use crate::errors::{ParseError, ParseErrorKind};

/// OpenType table tag, e.g. `cmap` or `OS/2`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableTag(pub(crate) [u8; 4]);

impl fmt::Debug for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "\"{self}\"")
    }
}

impl fmt::Display for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl TableTag {
    pub(crate) const CMAP: Self = Self(*b"cmap");
    pub(crate) const CVT: Self = Self(*b"cvt ");
    pub(crate) const FPGM: Self = Self(*b"fpgm");
    pub(crate) const GLYF: Self = Self(*b"glyf");
    pub(crate) const HEAD: Self = Self(*b"head");
    pub(crate) const HHEA: Self = Self(*b"hhea");
    pub(crate) const HMTX: Self = Self(*b"hmtx");
    pub(crate) const LOCA: Self = Self(*b"loca");
    pub(crate) const MAXP: Self = Self(*b"maxp");
    pub(crate) const NAME: Self = Self(*b"name");
    pub(crate) const OS2: Self = Self(*b"OS/2");
    pub(crate) const POST: Self = Self(*b"post");
    pub(crate) const PREP: Self = Self(*b"prep");

    /// Returns the raw bytes of this tag.
    pub fn as_bytes(&self) -> [u8; 4] {
        self.0
    }
}

/// Read cursor over font data that remembers its position for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    pub(crate) bytes: &'a [u8],
    offset: usize,
    table: Option<TableTag>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            table: None,
        }
    }

    fn for_table(bytes: &'a [u8], table: TableTag) -> Self {
        Self {
            bytes,
            offset: 0,
            table: Some(table),
        }
    }

    pub(crate) fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            offset: self.offset,
            table: self.table,
        }
    }

    /// Splits off the first `len` bytes, advancing this cursor past them.
    pub(crate) fn split_at(&mut self, len: usize) -> Result<Self, ParseError> {
        if self.bytes.len() < len {
            return Err(self.err(ParseErrorKind::UnexpectedEof));
        }
        let (head, tail) = self.bytes.split_at(len);
        let prefix = Self {
            bytes: head,
            ..*self
        };
        self.bytes = tail;
        self.offset += len;
        Ok(prefix)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        self.split_at(len).map(drop)
    }

    /// Returns a sub-cursor for `range` relative to the current position.
    pub(crate) fn range(&self, range: ops::Range<usize>) -> Result<Self, ParseError> {
        let bytes = self.bytes.get(range.clone()).ok_or_else(|| {
            self.err(ParseErrorKind::RangeOutOfBounds {
                range: range.clone(),
                len: self.bytes.len(),
            })
        })?;
        Ok(Self {
            bytes,
            offset: self.offset + range.start,
            table: self.table,
        })
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let prefix = self.split_at(N)?;
        Ok(prefix.bytes.try_into().expect("length is checked by `split_at`"))
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ParseError> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.read_array().map(u32::from_be_bytes)
    }
}

/// Segment of a format 4 `cmap` subtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeltaSegment {
    pub(crate) start_code: u16,
    pub(crate) end_code: u16,
    pub(crate) id_delta: u16,
    pub(crate) id_range_offset: u16,
}

/// Group of a format 12 `cmap` subtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MapGroup {
    pub(crate) start_char_code: u32,
    pub(crate) end_char_code: u32,
    pub(crate) start_glyph_id: u32,
}

#[derive(Debug, Clone)]
pub(crate) enum CmapSubtable<'a> {
    /// Segment mapping to delta values (format 4).
    Deltas {
        segments: Vec<DeltaSegment>,
        glyph_id_array: Cursor<'a>,
    },
    /// Segmented coverage (format 12).
    Coverage(Vec<MapGroup>),
}

impl<'a> CmapSubtable<'a> {
    pub(crate) const WINDOWS_PLATFORM: u16 = 3;
    pub(crate) const UNICODE_BMP_ENCODING: u16 = 1;
    pub(crate) const UNICODE_FULL_ENCODING: u16 = 10;
    const UNICODE_PLATFORM: u16 = 0;

    /// Parses the `cmap` table, preferring a format 12 subtable (which covers all planes)
    /// over a format 4 one.
    fn parse_table(mut cursor: Cursor<'a>) -> Result<Self, ParseError> {
        let table = cursor;
        let version = cursor.read_u16()?;
        if version != 0 {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableVersion(version.into())));
        }

        let num_tables = cursor.read_u16()?;
        let (mut bmp_offset, mut full_offset) = (None, None);
        for _ in 0..num_tables {
            let platform_id = cursor.read_u16()?;
            let encoding_id = cursor.read_u16()?;
            let offset = cursor.read_u32()? as usize;
            match (platform_id, encoding_id) {
                (Self::UNICODE_PLATFORM, 3) | (Self::WINDOWS_PLATFORM, 1) => {
                    bmp_offset.get_or_insert(offset);
                }
                (Self::UNICODE_PLATFORM, 4) | (Self::WINDOWS_PLATFORM, 10) => {
                    full_offset.get_or_insert(offset);
                }
                _ => { /* unsupported encoding */ }
            }
        }

        if let Some(offset) = full_offset {
            Self::parse_coverage(table.range(offset..table.bytes.len())?)
        } else if let Some(offset) = bmp_offset {
            Self::parse_deltas(table.range(offset..table.bytes.len())?)
        } else {
            Err(cursor.err(ParseErrorKind::NoSupportedCmap))
        }
    }

    fn parse_deltas(mut cursor: Cursor<'a>) -> Result<Self, ParseError> {
        let format = cursor.read_u16()?;
        if format != 4 {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableFormat(format)));
        }
        let subtable_len = usize::from(cursor.read_u16()?);
        let body_len = subtable_len
            .checked_sub(4)
            .ok_or_else(|| cursor.err(ParseErrorKind::UnexpectedEof))?;
        // Some fonts declare a length exceeding the table; clamp it.
        let mut cursor = cursor.range(0..body_len.min(cursor.bytes.len()))?;

        cursor.skip(2)?; // language
        let segment_count = usize::from(cursor.read_u16()? / 2);
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift

        let mut end_codes = cursor.split_at(2 * segment_count)?;
        cursor.skip(2)?; // reserved padding
        let mut start_codes = cursor.split_at(2 * segment_count)?;
        let mut id_deltas = cursor.split_at(2 * segment_count)?;
        let mut id_range_offsets = cursor.split_at(2 * segment_count)?;

        let segments = (0..segment_count)
            .map(|_| {
                Ok(DeltaSegment {
                    start_code: start_codes.read_u16()?,
                    end_code: end_codes.read_u16()?,
                    id_delta: id_deltas.read_u16()?,
                    id_range_offset: id_range_offsets.read_u16()?,
                })
            })
            .collect::<Result<_, ParseError>>()?;
        Ok(Self::Deltas {
            segments,
            glyph_id_array: cursor,
        })
    }

    fn parse_coverage(mut cursor: Cursor<'a>) -> Result<Self, ParseError> {
        let format = cursor.read_u16()?;
        if format != 12 {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableFormat(format)));
        }
        cursor.skip(2)?; // reserved
        cursor.skip(8)?; // length, language
        let num_groups = cursor.read_u32()?;
        let groups = (0..num_groups)
            .map(|_| {
                Ok(MapGroup {
                    start_char_code: cursor.read_u32()?,
                    end_char_code: cursor.read_u32()?,
                    start_glyph_id: cursor.read_u32()?,
                })
            })
            .collect::<Result<_, ParseError>>()?;
        Ok(Self::Coverage(groups))
    }

    /// Maps a char to a glyph index. Unmapped chars are mapped to 0 (the missing glyph).
    fn map_char(&self, ch: char) -> u16 {
        match self {
            Self::Deltas {
                segments,
                glyph_id_array,
            } => {
                let Ok(code) = u16::try_from(u32::from(ch)) else {
                    return 0;
                };
                let idx = segments.partition_point(|segment| segment.end_code < code);
                let Some(segment) = segments.get(idx) else {
                    return 0;
                };
                if segment.start_code > code {
                    return 0;
                }
                if segment.id_range_offset == 0 {
                    return segment.id_delta.wrapping_add(code);
                }

                // `idRangeOffset` is counted from its own position in the `idRangeOffsets` array,
                // which directly precedes `glyphIdArray`.
                let byte_offset = usize::from(segment.id_range_offset)
                    + 2 * usize::from(code - segment.start_code)
                    + 2 * idx;
                let Some(byte_offset) = byte_offset.checked_sub(2 * segments.len()) else {
                    return 0;
                };
                let mut glyph_id = match glyph_id_array.range(byte_offset..byte_offset + 2) {
                    Ok(cursor) => cursor,
                    Err(_) => return 0,
                };
                match glyph_id.read_u16() {
                    Ok(0) | Err(_) => 0,
                    Ok(id) => id.wrapping_add(segment.id_delta),
                }
            }
            Self::Coverage(groups) => {
                let code = u32::from(ch);
                let idx = groups.partition_point(|group| group.end_char_code < code);
                groups
                    .get(idx)
                    .filter(|group| group.start_char_code <= code)
                    .and_then(|group| {
                        let glyph_id =
                            (code - group.start_char_code).checked_add(group.start_glyph_id)?;
                        u16::try_from(glyph_id).ok()
                    })
                    .unwrap_or(0)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocaFormat {
    Short,
    Long,
}

#[derive(Debug)]
struct LocaTable<'a> {
    format: LocaFormat,
    cursor: Cursor<'a>,
}

impl LocaTable<'_> {
    fn glyph_range(&self, glyph_idx: u16) -> Result<ops::Range<usize>, ParseError> {
        let idx = usize::from(glyph_idx);
        Ok(match self.format {
            LocaFormat::Short => {
                let mut cursor = self.cursor.range(idx * 2..idx * 2 + 4)?;
                let start = usize::from(cursor.read_u16()?) * 2;
                let end = usize::from(cursor.read_u16()?) * 2;
                start..end
            }
            LocaFormat::Long => {
                let mut cursor = self.cursor.range(idx * 4..idx * 4 + 8)?;
                let start = cursor.read_u32()? as usize;
                let end = cursor.read_u32()? as usize;
                start..end
            }
        })
    }
}

#[derive(Debug)]
struct HmtxTable<'a> {
    cursor: Cursor<'a>,
    number_of_h_metrics: u16,
}

impl HmtxTable<'_> {
    fn advance_and_lsb(&self, glyph_idx: u16) -> Result<(u16, u16), ParseError> {
        let metrics_count = usize::from(self.number_of_h_metrics);
        let idx = usize::from(glyph_idx);
        if idx < metrics_count {
            let mut cursor = self.cursor.range(idx * 4..idx * 4 + 4)?;
            Ok((cursor.read_u16()?, cursor.read_u16()?))
        } else {
            // Glyphs past `numberOfHMetrics` share the last advance.
            let last = (metrics_count - 1) * 4;
            let advance = self.cursor.range(last..last + 2)?.read_u16()?;
            let lsb_offset = metrics_count * 4 + (idx - metrics_count) * 2;
            let lsb = self.cursor.range(lsb_offset..lsb_offset + 2)?.read_u16()?;
            Ok((advance, lsb))
        }
    }
}

/// Reference to a component of a composite glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ComponentRef {
    /// Offset of the `glyphIndex` field from the start of the glyph data.
    pub(crate) offset: usize,
    pub(crate) glyph_idx: u16,
}

/// Glyph data together with its horizontal metrics.
#[derive(Debug, Clone)]
pub(crate) struct Glyph<'a> {
    pub(crate) raw: &'a [u8],
    /// Empty for simple glyphs.
    pub(crate) components: Vec<ComponentRef>,
    pub(crate) advance: u16,
    pub(crate) lsb: u16,
}

impl Glyph<'_> {
    fn parse_components(raw: Cursor<'_>) -> Result<Vec<ComponentRef>, ParseError> {
        const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
        const WE_HAVE_A_SCALE: u16 = 0x0008;
        const MORE_COMPONENTS: u16 = 0x0020;
        const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
        const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

        if raw.bytes.is_empty() {
            return Ok(vec![]);
        }
        let mut cursor = raw;
        let number_of_contours = cursor.read_u16()?;
        if number_of_contours & 0x8000 == 0 {
            return Ok(vec![]); // simple glyph
        }
        cursor.skip(8)?; // xMin, yMin, xMax, yMax

        let mut components = vec![];
        loop {
            let flags = cursor.read_u16()?;
            let offset = raw.bytes.len() - cursor.bytes.len();
            let glyph_idx = cursor.read_u16()?;
            components.push(ComponentRef { offset, glyph_idx });

            let args_len = if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
            let transform_len = if flags & WE_HAVE_A_SCALE != 0 {
                2
            } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
                4
            } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
                8
            } else {
                0
            };
            cursor.skip(args_len + transform_len)?;
            if flags & MORE_COMPONENTS == 0 {
                break Ok(components);
            }
        }
    }
}

/// TrueType-outline font.
#[derive(Debug)]
pub(crate) struct Font<'a> {
    cmap: CmapSubtable<'a>,
    pub(crate) head: &'a [u8],
    pub(crate) hhea: &'a [u8],
    pub(crate) maxp: &'a [u8],
    pub(crate) name: &'a [u8],
    pub(crate) os2: &'a [u8],
    pub(crate) post: &'a [u8],
    pub(crate) cvt: Option<&'a [u8]>,
    pub(crate) fpgm: Option<&'a [u8]>,
    pub(crate) prep: Option<&'a [u8]>,
    hmtx: HmtxTable<'a>,
    loca: LocaTable<'a>,
    glyf: Cursor<'a>,
    glyph_count: u16,
}

impl<'a> Font<'a> {
    pub(crate) const SFNT_VERSION: u32 = 0x_0001_0000;
    /// Alternative version used by legacy Apple fonts.
    const APPLE_SFNT_VERSION: u32 = u32::from_be_bytes(*b"true");
    const CFF_SFNT_VERSION: u32 = u32::from_be_bytes(*b"OTTO");
    /// Checksums of all tables and the table directory must sum up to this value.
    pub(crate) const SFNT_CHECKSUM: u32 = 0x_b1b0_afba;
    pub(crate) const HEAD_CHECKSUM_OFFSET: usize = 8;
    pub(crate) const HEAD_LOCA_FORMAT_OFFSET: usize = 50;
    pub(crate) const HEAD_LEN: usize = 54;
    pub(crate) const HHEA_LEN: usize = 36;
    const POST_HEADER_LEN: usize = 32;

    pub(crate) fn new(bytes: &'a [u8]) -> Result<Self, ParseError> {
        let font = Cursor::new(bytes);
        let mut cursor = font;
        let version = cursor.read_u32()?;
        match version {
            Self::SFNT_VERSION | Self::APPLE_SFNT_VERSION => { /* OK */ }
            Self::CFF_SFNT_VERSION => return Err(cursor.err(ParseErrorKind::CffOutlines)),
            _ => return Err(cursor.err(ParseErrorKind::UnexpectedFontVersion(version))),
        }
        let table_count = cursor.read_u16()?;
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift

        let mut tables = BTreeMap::new();
        for _ in 0..table_count {
            let tag = TableTag(cursor.read_array()?);
            cursor.skip(4)?; // checksum
            let offset = cursor.read_u32()? as usize;
            let len = cursor.read_u32()? as usize;
            let table = font.range(offset..offset + len)?;
            tables.insert(tag, Cursor::for_table(table.bytes, tag));
        }
        let table = |tag| {
            tables
                .get(&tag)
                .copied()
                .ok_or_else(|| ParseError::missing_table(tag))
        };
        let optional_table = |tag| tables.get(&tag).map(|cursor| cursor.bytes);

        let head = Self::checked_len(table(TableTag::HEAD)?, Self::HEAD_LEN)?;
        let loca_format = match u16::from_be_bytes([
            head.bytes[Self::HEAD_LOCA_FORMAT_OFFSET],
            head.bytes[Self::HEAD_LOCA_FORMAT_OFFSET + 1],
        ]) {
            0 => LocaFormat::Short,
            1 => LocaFormat::Long,
            format => return Err(head.err(ParseErrorKind::UnexpectedTableFormat(format))),
        };

        let maxp = Self::checked_len(table(TableTag::MAXP)?, 6)?;
        let glyph_count = maxp.range(4..6)?.read_u16()?;
        let hhea = Self::checked_len(table(TableTag::HHEA)?, Self::HHEA_LEN)?;
        let number_of_h_metrics = hhea
            .range(Self::HHEA_LEN - 2..Self::HHEA_LEN)?
            .read_u16()?;
        if number_of_h_metrics == 0 {
            return Err(hhea.err(ParseErrorKind::UnexpectedTableLen {
                expected: 1,
                actual: 0,
            }));
        }

        Ok(Self {
            cmap: CmapSubtable::parse_table(table(TableTag::CMAP)?)?,
            head: head.bytes,
            hhea: hhea.bytes,
            maxp: maxp.bytes,
            name: table(TableTag::NAME)?.bytes,
            os2: table(TableTag::OS2)?.bytes,
            post: Self::checked_len(table(TableTag::POST)?, Self::POST_HEADER_LEN)?.bytes,
            cvt: optional_table(TableTag::CVT),
            fpgm: optional_table(TableTag::FPGM),
            prep: optional_table(TableTag::PREP),
            hmtx: HmtxTable {
                cursor: table(TableTag::HMTX)?,
                number_of_h_metrics,
            },
            loca: LocaTable {
                format: loca_format,
                cursor: table(TableTag::LOCA)?,
            },
            glyf: table(TableTag::GLYF)?,
            glyph_count,
        })
    }

    fn checked_len(cursor: Cursor<'a>, min_len: usize) -> Result<Cursor<'a>, ParseError> {
        if cursor.bytes.len() < min_len {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: min_len,
                actual: cursor.bytes.len(),
            }));
        }
        Ok(cursor)
    }

    pub(crate) fn glyph_count(&self) -> u16 {
        self.glyph_count
    }

    pub(crate) fn map_char(&self, ch: char) -> u16 {
        self.cmap.map_char(ch)
    }

    pub(crate) fn glyph(&self, glyph_idx: u16) -> Result<Glyph<'a>, ParseError> {
        if glyph_idx >= self.glyph_count {
            return Err(self.glyf.err(ParseErrorKind::GlyphOutOfBounds(glyph_idx)));
        }
        let range = self.loca.glyph_range(glyph_idx)?;
        let raw = self.glyf.range(range)?;
        let (advance, lsb) = self.hmtx.advance_and_lsb(glyph_idx)?;
        Ok(Glyph {
            raw: raw.bytes,
            components: Glyph::parse_components(raw)?,
            advance,
            lsb,
        })
    }

    /// Computes the OpenType checksum: the wrapping sum of big-endian `u32` words,
    /// with the trailing partial word padded with zeros.
    pub(crate) fn checksum(data: &[u8]) -> u32 {
        data.chunks(4).fold(0_u32, |acc, chunk| {
            let mut word = [0_u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            acc.wrapping_add(u32::from_be_bytes(word))
        })
    }
}
