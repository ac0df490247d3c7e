//! Error types.

use std::{any::Any, fmt, io, ops, path::PathBuf};

use thiserror::Error;

use crate::engine::TableTag;

/// Errors that can occur when parsing a unicode-range descriptor such as `U+0020, U+0061-007A`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RangeParseError {
    /// A range does not start with the `U+` prefix.
    #[error("range `{0}` does not start with `U+`")]
    MissingPrefix(String),
    /// The upper bound of a range repeats the `U+` prefix (e.g., `U+0061-U+0064`).
    #[error("upper bound of range `{0}` must not have the `U+` prefix")]
    RepeatedPrefix(String),
    /// A bound is not a hexadecimal number.
    #[error("invalid hex digits in range `{0}`")]
    InvalidHex(String),
    /// A bound is not a Unicode scalar value (e.g., a surrogate).
    #[error("U+{0:04X} is not a Unicode scalar value")]
    NotAScalar(u32),
    /// The lower bound of a range exceeds its upper bound.
    #[error("range U+{first:04X}-{last:04X} is reversed")]
    Reversed {
        /// Lower bound as written.
        first: u32,
        /// Upper bound as written.
        last: u32,
    },
}

/// Kind of a font [`ParseError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseErrorKind {
    /// Unexpected end of the font data.
    #[error("unexpected end of the font data")]
    UnexpectedEof,
    /// Unexpected font version.
    #[error("unexpected font version ({0:#010x})")]
    UnexpectedFontVersion(u32),
    /// Font uses CFF outlines, which are not supported.
    #[error("CFF outlines are not supported")]
    CffOutlines,
    /// Missing required font table (e.g., `head`).
    #[error("missing required font table")]
    MissingTable,
    /// No supported subtable in the `cmap` table.
    #[error("no supported subtable in the `cmap` table")]
    NoSupportedCmap,
    /// Range inferred from the table data is out of bounds.
    #[error("range ({range:?}) inferred from the table data is out of bounds (..{len})")]
    RangeOutOfBounds {
        /// Inferred range.
        range: ops::Range<usize>,
        /// Length of the indexed data.
        len: usize,
    },
    /// Unexpected table version.
    #[error("unexpected table version ({0})")]
    UnexpectedTableVersion(u32),
    /// Unexpected table length.
    #[error("unexpected table length: expected {expected}, got {actual}")]
    UnexpectedTableLen {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// Unexpected table format (e.g., for a `cmap` subtable).
    #[error("unexpected table format ({0})")]
    UnexpectedTableFormat(u16),
    /// Glyph index exceeds the number of glyphs in the font.
    #[error("glyph #{0} is out of bounds")]
    GlyphOutOfBounds(u16),
}

/// Errors that can occur when parsing an OpenType font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub(crate) kind: ParseErrorKind,
    pub(crate) offset: usize,
    pub(crate) table: Option<TableTag>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = self.table {
            write!(formatter, "[{table}] ")?;
        }
        if self.offset > 0 {
            write!(formatter, "{}: ", self.offset)?;
        }
        fmt::Display::fmt(&self.kind, formatter)
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    pub(crate) fn missing_table(tag: TableTag) -> Self {
        Self {
            kind: ParseErrorKind::MissingTable,
            offset: 0,
            table: Some(tag),
        }
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Gets the table this error relates to.
    pub fn table(&self) -> Option<TableTag> {
        self.table
    }

    /// Gets the offset in the font data.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Failure to subset a single font. Such failures are isolated: other fonts in the same batch
/// are still processed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubsetError {
    /// I/O error reading the source font or writing the subset.
    #[error("I/O error on `{}`: {source}", .path.display())]
    Io {
        /// Path of the file being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The source font could not be parsed.
    #[error("cannot parse font: {0}")]
    Font(#[from] ParseError),
    /// The unicode-range descriptor passed to the engine is malformed.
    #[error("invalid unicode ranges: {0}")]
    Ranges(#[from] RangeParseError),
    /// The subsetting engine panicked while processing the font.
    #[error("subsetting engine panicked: {message}")]
    EnginePanicked {
        /// Panic message, if it is a string.
        message: String,
    },
    /// The subsetting engine produced a number of artifacts other than one.
    #[error("subsetting engine produced {count} output files; expected exactly one")]
    UnexpectedOutputs {
        /// Number of produced artifacts.
        count: usize,
    },
}

impl SubsetError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn engine_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(&message) = payload.downcast_ref::<&str>() {
            message.to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "(non-string panic payload)".to_owned()
        };
        Self::EnginePanicked { message }
    }
}

/// Failure of a whole optimisation run, i.e. one that cannot be attributed to a single input
/// file or font.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The output directory cannot be created or is not a directory.
    #[error("cannot use `{}` as the output directory: {source}", .path.display())]
    OutputDir {
        /// Path to the output directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}
