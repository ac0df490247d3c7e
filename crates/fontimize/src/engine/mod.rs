//! Subsetting engines producing font files restricted to a set of code points.
//!
//! The orchestration layer only talks to engines through [`SubsetEngine`]. The built-in
//! [`NativeSubsetter`] handles TrueType-outline fonts and emits WOFF2 or TrueType files.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

pub use self::font::TableTag;
use self::{font::Font, subset::FontSubset};
use crate::{
    errors::{ParseError, SubsetError},
    ranges::RangeSpec,
};

pub(crate) mod font;
pub(crate) mod subset;
pub(crate) mod write;

/// Subsetting request for a single font.
#[derive(Debug, Clone, Copy)]
pub struct SubsetRequest<'a> {
    /// Path to the source font file.
    pub font: &'a Path,
    /// Subset name embedded into the output file name.
    pub name: &'a str,
    /// Comma-separated code point ranges, e.g. `U+0020, U+0041-005A`.
    pub unicode_ranges: &'a str,
    /// Directory to write outputs to. It's guaranteed to exist.
    pub output_dir: &'a Path,
}

impl SubsetRequest<'_> {
    /// Returns the output path `<output_dir>/<font stem>.<name>.<extension>`.
    pub fn output_path(&self, extension: &str) -> PathBuf {
        let mut file_name = self.font.file_stem().map_or_else(OsString::new, ToOwned::to_owned);
        file_name.push(".");
        file_name.push(self.name);
        file_name.push(".");
        file_name.push(extension);
        self.output_dir.join(file_name)
    }
}

/// Engine able to subset a single font file.
///
/// Engines are invoked concurrently for different fonts, hence the `Sync` bound.
pub trait SubsetEngine: Sync {
    /// Extension of produced files (without the leading dot).
    fn output_extension(&self) -> &str;

    /// Subsets the font according to `request` and returns paths to the produced files.
    /// A well-behaved engine produces exactly one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the font cannot be read, parsed or written.
    fn subset(&self, request: &SubsetRequest<'_>) -> Result<Vec<PathBuf>, SubsetError>;
}

/// Format of fonts produced by [`NativeSubsetter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Web Open Font Format 2 with Brotli-compressed table data.
    #[default]
    Woff2,
    /// Uncompressed OpenType font with TrueType outlines.
    TrueType,
}

impl OutputFormat {
    /// Returns the conventional file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Woff2 => "woff2",
            Self::TrueType => "ttf",
        }
    }
}

/// Built-in subsetting engine for fonts with TrueType outlines.
///
/// Retains the glyphs mapped from the requested code points together with all glyphs
/// they reference as composite components. Code points the font doesn't cover are ignored.
/// CFF-based fonts are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSubsetter {
    format: OutputFormat,
}

impl NativeSubsetter {
    /// Creates a subsetter producing fonts in the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Subsets font data in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the font cannot be parsed or is not supported.
    pub fn subset_bytes(&self, font: &[u8], ranges: &RangeSpec) -> Result<Vec<u8>, ParseError> {
        let font = Font::new(font)?;
        let subset = FontSubset::new(font, ranges.chars())?;
        log::trace!(
            "subset retains {} chars and {} glyphs",
            subset.char_map.len(),
            subset.glyphs.len()
        );
        Ok(match self.format {
            OutputFormat::Woff2 => subset.to_woff2(),
            OutputFormat::TrueType => subset.to_truetype(),
        })
    }
}

impl SubsetEngine for NativeSubsetter {
    fn output_extension(&self) -> &str {
        self.format.extension()
    }

    fn subset(&self, request: &SubsetRequest<'_>) -> Result<Vec<PathBuf>, SubsetError> {
        let ranges: RangeSpec = request.unicode_ranges.parse()?;
        let font_bytes = fs::read(request.font).map_err(SubsetError::io(request.font))?;
        let output = self.subset_bytes(&font_bytes, &ranges)?;

        let output_path = request.output_path(self.output_extension());
        fs::write(&output_path, output).map_err(SubsetError::io(&output_path))?;
        Ok(vec![output_path])
    }
}
