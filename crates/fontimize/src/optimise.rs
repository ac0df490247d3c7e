//! Orchestrating subsetting runs: collecting text, discovering fonts and assembling results.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs, io,
    path::{Path, PathBuf},
    thread,
};

use serde::Serialize;

use crate::{
    codepoints::CodepointSet,
    css::{self, FontAsset, FontReferences, SkippedFont},
    engine::{NativeSubsetter, SubsetEngine, SubsetRequest},
    errors::{Error, SubsetError},
    html::{self, StylesheetSource},
    ranges::SubsetSpec,
};

/// Subset name used when none is specified.
pub const DEFAULT_SUBSET_NAME: &str = "FontimizeSubset";

/// Fonts produced by subsetting a batch.
#[derive(Debug, Default, Serialize)]
#[non_exhaustive]
pub struct FontOutputs {
    /// Source fonts mapped to the produced subset files. Keys serialize to font paths
    /// as they were specified.
    pub fonts: BTreeMap<FontAsset, PathBuf>,
    /// Fonts that could not be subsetted. Failures don't affect other fonts in the batch.
    #[serde(skip)]
    pub failures: BTreeMap<FontAsset, SubsetError>,
}

/// Result of optimising fonts for a set of HTML, CSS and text files.
#[derive(Debug, Default, Serialize)]
#[non_exhaustive]
pub struct OptimisationResult {
    /// Stylesheets with at least one `@font-face` font reference, mapped to the subsetted fonts
    /// they reference. `<style>` elements are keyed by the path of the containing HTML file.
    pub css: BTreeMap<PathBuf, BTreeSet<FontAsset>>,
    /// Source fonts mapped to the produced subset files.
    pub fonts: BTreeMap<FontAsset, PathBuf>,
    /// Fonts that could not be subsetted.
    #[serde(skip)]
    pub failures: BTreeMap<FontAsset, SubsetError>,
    /// Font references that were skipped because they are missing or remote.
    #[serde(skip)]
    pub skipped: Vec<SkippedFont>,
    /// Input files (including linked stylesheets) that could not be read.
    #[serde(skip)]
    pub unreadable: BTreeMap<PathBuf, io::Error>,
}

impl OptimisationResult {
    /// Assembles the result from font references found in stylesheets and subsetting outputs.
    pub fn aggregate(
        stylesheets: BTreeMap<PathBuf, FontReferences>,
        outputs: FontOutputs,
    ) -> Self {
        let mut skipped = vec![];
        let css = stylesheets
            .into_iter()
            .filter(|(_, references)| !references.is_empty())
            .map(|(path, references)| {
                skipped.extend(references.skipped);
                let subsetted = references
                    .found
                    .into_iter()
                    .filter(|font| outputs.fonts.contains_key(font))
                    .collect();
                (path, subsetted)
            })
            .collect();

        Self {
            css,
            fonts: outputs.fonts,
            failures: outputs.failures,
            skipped,
            unreadable: BTreeMap::new(),
        }
    }
}

/// Total sizes of source fonts and their subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    /// Total size of source fonts in bytes.
    pub input_bytes: u64,
    /// Total size of produced subsets in bytes.
    pub output_bytes: u64,
}

impl SizeReport {
    /// Computes sizes for the specified source-to-subset mapping.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if metadata for any of the files cannot be read.
    pub fn for_outputs(fonts: &BTreeMap<FontAsset, PathBuf>) -> io::Result<Self> {
        let mut report = Self {
            input_bytes: 0,
            output_bytes: 0,
        };
        for (font, output) in fonts {
            report.input_bytes += fs::metadata(font.path())?.len();
            report.output_bytes += fs::metadata(output)?.len();
        }
        Ok(report)
    }

    /// Returns the size reduction in percent. Negative if subsets are larger than sources.
    #[allow(clippy::cast_precision_loss)] // fine for reporting
    pub fn reduction_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        let saved = self.input_bytes as f64 - self.output_bytes as f64;
        saved / self.input_bytes as f64 * 100.0
    }
}

impl fmt::Display for SizeReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "Total input font size: {} bytes; total output font size: {} bytes; reduction: {:.1}%",
            self.input_bytes,
            self.output_bytes,
            self.reduction_percent()
        )
    }
}

/// Font optimiser: subsets fonts to the code points used by text.
///
/// # Examples
///
/// ```no_run
/// use fontimize::{CodepointSet, Optimiser};
///
/// let optimiser = Optimiser::new().subset_name("Landing").output_dir("dist/fonts");
/// let chars = CodepointSet::collect("Hello, world!");
/// let outputs = optimiser.optimise_codepoints(&chars, ["fonts/Inter.ttf"])?;
/// for (font, subset) in &outputs.fonts {
///     println!("{} -> {}", font.path().display(), subset.display());
/// }
/// # Ok::<_, fontimize::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Optimiser<E = NativeSubsetter> {
    engine: E,
    subset_name: String,
    output_dir: Option<PathBuf>,
}

impl Default for Optimiser {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimiser {
    /// Creates an optimiser using [`NativeSubsetter`] to produce WOFF2 fonts.
    pub fn new() -> Self {
        Self::with_engine(NativeSubsetter::default())
    }
}

impl<E: SubsetEngine> Optimiser<E> {
    /// Creates an optimiser with a custom subsetting engine.
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            subset_name: DEFAULT_SUBSET_NAME.to_owned(),
            output_dir: None,
        }
    }

    /// Sets the subset name embedded into output file names.
    #[must_use]
    pub fn subset_name(mut self, name: impl Into<String>) -> Self {
        self.subset_name = name.into();
        self
    }

    /// Sets the directory to write subsets to. By default, each subset is written
    /// next to its source font.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Returns the subsetting engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Creates a subset spec for `codepoints` named according to this optimiser.
    pub fn subset_spec(&self, codepoints: &CodepointSet) -> SubsetSpec {
        let ranges = codepoints.to_ranges();
        log::debug!("Characters: {:?}", codepoints.iter().collect::<String>());
        log::debug!("Character ranges: {:?}", ranges.ranges());
        let spec = SubsetSpec::new(&self.subset_name, ranges);
        log::debug!("Unicode ranges: {}", spec.unicode_ranges());
        spec
    }

    fn font_output_dir<'a>(&'a self, font: &'a FontAsset) -> &'a Path {
        self.output_dir
            .as_deref()
            .unwrap_or_else(|| font.path().parent().unwrap_or_else(|| Path::new("")))
    }

    /// Subsets a single font. The output directory is expected to exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails or produces a number of files other than one.
    pub fn subset_font(&self, font: &FontAsset, spec: &SubsetSpec) -> Result<PathBuf, SubsetError> {
        self.subset_font_with_ranges(font, spec.name(), &spec.unicode_ranges())
    }

    fn subset_font_with_ranges(
        &self,
        font: &FontAsset,
        name: &str,
        unicode_ranges: &str,
    ) -> Result<PathBuf, SubsetError> {
        let request = SubsetRequest {
            font: font.path(),
            name,
            unicode_ranges,
            output_dir: self.font_output_dir(font),
        };
        let outputs = self.engine.subset(&request)?;
        let count = outputs.len();
        let [output] = <[PathBuf; 1]>::try_from(outputs)
            .map_err(|_| SubsetError::UnexpectedOutputs { count })?;
        Ok(output)
    }

    /// Subsets all `fonts` concurrently, one thread per font.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created. Failures of individual fonts,
    /// including engine panics, are recorded in [`FontOutputs::failures`] instead.
    pub fn subset_all(
        &self,
        fonts: &BTreeSet<FontAsset>,
        spec: &SubsetSpec,
    ) -> Result<FontOutputs, Error> {
        if let Some(dir) = &self.output_dir {
            fs::create_dir_all(dir).map_err(|source| Error::OutputDir {
                path: dir.clone(),
                source,
            })?;
        }

        let name = spec.name();
        let unicode_ranges = spec.unicode_ranges();
        let unicode_ranges = unicode_ranges.as_str();
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = fonts
                .iter()
                .map(|font| {
                    let handle = scope
                        .spawn(move || self.subset_font_with_ranges(font, name, unicode_ranges));
                    (font, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(font, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|payload| Err(SubsetError::engine_panic(&*payload)));
                    (font, result)
                })
                .collect()
        });

        let mut outputs = FontOutputs::default();
        for (font, result) in results {
            match result {
                Ok(output) => {
                    log::info!("Subsetted {} to {}", font.path().display(), output.display());
                    outputs.fonts.insert(font.clone(), output);
                }
                Err(err) => {
                    log::error!("Failed subsetting {}: {err}", font.path().display());
                    outputs.failures.insert(font.clone(), err);
                }
            }
        }
        Ok(outputs)
    }

    /// Subsets `fonts` to the specified code points.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created.
    pub fn optimise_codepoints<P: AsRef<Path>>(
        &self,
        codepoints: &CodepointSet,
        fonts: impl IntoIterator<Item = P>,
    ) -> Result<FontOutputs, Error> {
        let fonts = fonts.into_iter().map(FontAsset::new).collect();
        let spec = self.subset_spec(codepoints);
        self.subset_all(&fonts, &spec)
    }

    /// Subsets `fonts` to the code points used by `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created.
    pub fn optimise_text<P: AsRef<Path>>(
        &self,
        text: &str,
        fonts: impl IntoIterator<Item = P>,
    ) -> Result<FontOutputs, Error> {
        self.optimise_codepoints(&CodepointSet::collect(text), fonts)
    }

    /// Subsets fonts to the text of a mixed set of HTML, CSS and plain-text files.
    ///
    /// The file kind is determined by the extension: `.html` / `.htm` files contribute
    /// their visible text and their linked or embedded stylesheets, `.css` files contribute
    /// font references, and any other file is treated as plain text. Fonts referenced
    /// by `@font-face` rules are subsetted together with `extra_fonts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created. Unreadable inputs,
    /// missing fonts and fonts failing to subset are recorded in the result instead.
    pub fn optimise_files<P: AsRef<Path>, F: AsRef<Path>>(
        &self,
        files: impl IntoIterator<Item = P>,
        extra_fonts: impl IntoIterator<Item = F>,
    ) -> Result<OptimisationResult, Error> {
        let mut scan = InputScan::default();
        for file in files {
            scan.add_file(file.as_ref());
        }

        let mut fonts: BTreeSet<_> = extra_fonts.into_iter().map(FontAsset::new).collect();
        for references in scan.stylesheets.values() {
            fonts.extend(references.found.iter().cloned());
        }
        let codepoints = CodepointSet::collect_all(scan.texts.iter().map(String::as_str));
        let spec = self.subset_spec(&codepoints);
        let outputs = self.subset_all(&fonts, &spec)?;

        let mut result = OptimisationResult::aggregate(scan.stylesheets, outputs);
        result.unreadable = scan.unreadable;
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Html,
    Css,
    Text,
}

impl InputKind {
    fn for_path(path: &Path) -> Self {
        let extension = path.extension().and_then(|ext| ext.to_str());
        match extension {
            Some(ext) if ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm") => {
                Self::Html
            }
            Some(ext) if ext.eq_ignore_ascii_case("css") => Self::Css,
            _ => Self::Text,
        }
    }
}

/// Text and stylesheets collected from input files.
#[derive(Debug, Default)]
struct InputScan {
    texts: Vec<String>,
    stylesheets: BTreeMap<PathBuf, FontReferences>,
    unreadable: BTreeMap<PathBuf, io::Error>,
}

impl InputScan {
    fn add_file(&mut self, path: &Path) {
        let path = css::normalize_path(path);
        let kind = InputKind::for_path(&path);
        if kind == InputKind::Css && self.stylesheets.contains_key(&path) {
            return;
        }
        let Some(contents) = self.read(&path) else {
            return;
        };
        match kind {
            InputKind::Html => self.add_html(&path, &contents),
            InputKind::Css => self.add_stylesheet(path.clone(), &contents),
            InputKind::Text => self.texts.push(contents),
        }
    }

    fn read(&mut self, path: &Path) -> Option<String> {
        if self.unreadable.contains_key(path) {
            return None;
        }
        match fs::read_to_string(path) {
            Ok(contents) => Some(contents),
            Err(err) => {
                log::warn!("Warning: Cannot read {}; skipping: {err}", path.display());
                self.unreadable.insert(path.to_owned(), err);
                None
            }
        }
    }

    fn add_html(&mut self, path: &Path, html: &str) {
        self.texts.push(html::visible_text(html));

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        for source in html::stylesheets(html) {
            match source {
                StylesheetSource::Embedded(css) => self.add_stylesheet(path.to_owned(), &css),
                StylesheetSource::Linked(href) => {
                    if css::has_scheme(&href) {
                        log::warn!("Warning: Stylesheet is remote, not local; skipping: {href}");
                        continue;
                    }
                    let css_path = css::normalize_path(&base_dir.join(css::strip_query(&href)));
                    if self.stylesheets.contains_key(&css_path) {
                        continue;
                    }
                    if let Some(css) = self.read(&css_path) {
                        self.add_stylesheet(css_path, &css);
                    }
                }
            }
        }
    }

    fn add_stylesheet(&mut self, path: PathBuf, css: &str) {
        let references = css::resolve_font_references(css, &path);
        let entry = self.stylesheets.entry(path).or_default();
        entry.found.extend(references.found);
        for skipped in references.skipped {
            if !entry.skipped.iter().any(|prev| prev.reference == skipped.reference) {
                entry.skipped.push(skipped);
            }
        }
    }
}

fn optimiser(output_dir: Option<&Path>, subset_name: &str) -> Optimiser {
    let optimiser = Optimiser::new().subset_name(subset_name);
    match output_dir {
        Some(dir) => optimiser.output_dir(dir),
        None => optimiser,
    }
}

/// Subsets `fonts` to the code points used by `text` with the default engine.
///
/// If `output_dir` is not specified, subsets are written next to their source fonts.
///
/// # Errors
///
/// Returns an error if the output directory cannot be created.
pub fn optimise_fonts<P: AsRef<Path>>(
    text: &str,
    fonts: impl IntoIterator<Item = P>,
    output_dir: Option<&Path>,
    subset_name: &str,
) -> Result<FontOutputs, Error> {
    optimiser(output_dir, subset_name).optimise_text(text, fonts)
}

/// Subsets `fonts` to the code points used by any of `texts` with the default engine.
///
/// # Errors
///
/// Returns an error if the output directory cannot be created.
pub fn optimise_fonts_for_multiple_text<'a, P: AsRef<Path>>(
    texts: impl IntoIterator<Item = &'a str>,
    fonts: impl IntoIterator<Item = P>,
    output_dir: Option<&Path>,
    subset_name: &str,
) -> Result<FontOutputs, Error> {
    let codepoints = CodepointSet::collect_all(texts);
    optimiser(output_dir, subset_name).optimise_codepoints(&codepoints, fonts)
}

/// Subsets `fonts` to the code points used by visible text of `html_docs` with the default engine.
///
/// # Errors
///
/// Returns an error if the output directory cannot be created.
pub fn optimise_fonts_for_html<'a, P: AsRef<Path>>(
    html_docs: impl IntoIterator<Item = &'a str>,
    fonts: impl IntoIterator<Item = P>,
    output_dir: Option<&Path>,
    subset_name: &str,
) -> Result<FontOutputs, Error> {
    let texts: Vec<_> = html_docs.into_iter().map(html::visible_text).collect();
    let codepoints = CodepointSet::collect_all(texts.iter().map(String::as_str));
    optimiser(output_dir, subset_name).optimise_codepoints(&codepoints, fonts)
}

/// Subsets fonts for a mixed set of HTML, CSS and plain-text files with the default engine.
/// See [`Optimiser::optimise_files()`] for details.
///
/// # Errors
///
/// Returns an error if the output directory cannot be created.
pub fn optimise_fonts_for_files<P: AsRef<Path>, F: AsRef<Path>>(
    files: impl IntoIterator<Item = P>,
    font_output_dir: Option<&Path>,
    subset_name: &str,
    extra_fonts: impl IntoIterator<Item = F>,
) -> Result<OptimisationResult, Error> {
    optimiser(font_output_dir, subset_name).optimise_files(files, extra_fonts)
}
