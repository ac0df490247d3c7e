//! Web font optimisation: subsets fonts to the characters a site actually uses.
//!
//! The pipeline collects code points from text, HTML documents and plain-text files,
//! compresses them into contiguous [unicode ranges](RangeSpec), discovers fonts referenced
//! from `@font-face` rules in linked or embedded stylesheets, and subsets every font
//! with a [`SubsetEngine`]. The default engine is [`NativeSubsetter`], which writes WOFF2 fonts.
//!
//! # Examples
//!
//! Subsetting fonts for a set of pages:
//!
//! ```no_run
//! use std::path::Path;
//!
//! let result = fontimize::optimise_fonts_for_files(
//!     ["site/index.html", "site/about.html"],
//!     Some(Path::new("site/fonts/subset")),
//!     fontimize::DEFAULT_SUBSET_NAME,
//!     ["site/fonts/Logo.ttf"],
//! )?;
//! for (font, subset) in &result.fonts {
//!     println!("{} -> {}", font.path().display(), subset.display());
//! }
//! for skipped in &result.skipped {
//!     eprintln!("{skipped}");
//! }
//! # Ok::<_, fontimize::Error>(())
//! ```
//!
//! Computing the unicode-range descriptor without subsetting:
//!
//! ```
//! use fontimize::CodepointSet;
//!
//! let chars = CodepointSet::collect("abdefh");
//! assert_eq!(chars.to_ranges().to_string(), "U+0020, U+0061-0062, U+0064-0066, U+0068");
//! ```

// Documentation settings
#![doc(html_root_url = "https://docs.rs/fontimize/0.1.0/")]

mod codepoints;
pub mod css;
mod engine;
mod errors;
pub mod html;
mod optimise;
mod ranges;
#[cfg(test)]
pub(crate) mod tests;

pub use crate::{
    codepoints::CodepointSet,
    css::{FontAsset, FontReferences, SkipReason, SkippedFont},
    engine::{NativeSubsetter, OutputFormat, SubsetEngine, SubsetRequest, TableTag},
    errors::{Error, ParseError, ParseErrorKind, RangeParseError, SubsetError},
    optimise::{
        optimise_fonts, optimise_fonts_for_files, optimise_fonts_for_html,
        optimise_fonts_for_multiple_text, FontOutputs, OptimisationResult, Optimiser, SizeReport,
        DEFAULT_SUBSET_NAME,
    },
    ranges::{CodepointRange, RangeSpec, SubsetSpec},
};

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
