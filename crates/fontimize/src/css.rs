//! Discovering font files referenced by `@font-face` rules.

use std::{
    cmp,
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
    path::{Component, Path, PathBuf},
};

use serde::Serialize;

/// Font file taking part in an optimisation run.
///
/// The asset keeps its path as specified, which is used for I/O, display and serialization.
/// Identity (equality, ordering and hashing) is the lexically normalized path instead:
/// `.` and `..` segments are folded without touching the file system, so the same file
/// reached via different relative references is a single asset. When such references
/// are deduplicated, the first one wins.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct FontAsset {
    path: PathBuf,
    #[serde(skip)]
    normalized: PathBuf,
}

impl FontAsset {
    /// Creates an asset from a path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            path: path.to_owned(),
            normalized: normalize_path(path),
        }
    }

    /// Returns the path as specified when creating the asset.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the normalized path identifying this asset.
    pub fn normalized_path(&self) -> &Path {
        &self.normalized
    }
}

impl PartialEq for FontAsset {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for FontAsset {}

impl PartialOrd for FontAsset {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FontAsset {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl Hash for FontAsset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl From<FontAsset> for PathBuf {
    fn from(asset: FontAsset) -> Self {
        asset.path
    }
}

pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => { /* skip */ }
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => { /* cannot go above root */ }
                _ => normalized.push(".."),
            },
            other => normalized.push(other),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Reason a font reference was excluded from subsetting.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SkipReason {
    /// The reference is local, but there's no file at the resolved path.
    Missing {
        /// Path the reference was resolved to.
        resolved: PathBuf,
    },
    /// The reference has a URL scheme (e.g., `https:` or `data:`) and is not resolved
    /// against the file system.
    Remote,
}

/// Font reference from a stylesheet that was excluded from subsetting.
///
/// The `Display` implementation renders the single-line warning reported for the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFont {
    /// Location of the stylesheet containing the reference.
    pub stylesheet: PathBuf,
    /// Reference as written in the stylesheet.
    pub reference: String,
    /// Why the reference was skipped.
    pub reason: SkipReason,
}

impl fmt::Display for SkippedFont {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            SkipReason::Missing { resolved } => write!(
                formatter,
                "Warning: Font file not found (may be remote not local?); skipping: {} (resolved to {})",
                self.reference,
                resolved.display()
            ),
            SkipReason::Remote => write!(
                formatter,
                "Warning: Font file is remote, not local; skipping: {}",
                self.reference
            ),
        }
    }
}

/// Font references found in a single stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontReferences {
    /// Local font files that exist on disk.
    pub found: BTreeSet<FontAsset>,
    /// References that were skipped, in the order of their first occurrence.
    pub skipped: Vec<SkippedFont>,
}

impl FontReferences {
    /// Checks whether the stylesheet contained any font references at all.
    pub fn is_empty(&self) -> bool {
        self.found.is_empty() && self.skipped.is_empty()
    }
}

/// Resolves font files referenced by `@font-face` rules in `css`.
///
/// `css_path` is the location of the stylesheet (for a `<style>` element, the HTML document);
/// relative references are resolved against its parent directory. Missing and remote references
/// don't fail resolution. Each distinct one is logged as a warning once and recorded
/// in [`FontReferences::skipped`].
pub fn resolve_font_references(css: &str, css_path: &Path) -> FontReferences {
    let base_dir = css_path.parent().unwrap_or_else(|| Path::new(""));
    let mut references = FontReferences::default();

    for reference in font_face_urls(css) {
        if references
            .skipped
            .iter()
            .any(|skipped| skipped.reference == reference)
        {
            continue;
        }

        let reason = if has_scheme(&reference) {
            SkipReason::Remote
        } else {
            let resolved = normalize_path(&base_dir.join(strip_query(&reference)));
            if resolved.is_file() {
                references.found.insert(FontAsset::new(resolved));
                continue;
            }
            SkipReason::Missing { resolved }
        };

        let skipped = SkippedFont {
            stylesheet: css_path.to_owned(),
            reference,
            reason,
        };
        log::warn!("{skipped}");
        references.skipped.push(skipped);
    }
    references
}

pub(crate) fn has_scheme(reference: &str) -> bool {
    if reference.starts_with("//") {
        return true; // protocol-relative URL
    }
    let Some((scheme, _)) = reference.split_once(':') else {
        return false;
    };
    // Single-letter "schemes" are Windows drive letters.
    scheme.len() > 1
        && scheme.starts_with(|ch: char| ch.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

/// Strips `?query` and `#fragment` suffixes (e.g., `font.eot?#iefix`).
pub(crate) fn strip_query(reference: &str) -> &str {
    reference
        .find(['?', '#'])
        .map_or(reference, |pos| &reference[..pos])
}

/// Extracts `url(...)` references from `src` declarations of all `@font-face` rules,
/// in document order. Quoted and unquoted URLs are supported.
pub fn font_face_urls(css: &str) -> Vec<String> {
    const AT_RULE: &str = "@font-face";

    let css = strip_comments(css);
    let lowercase = css.to_ascii_lowercase();

    let mut urls = vec![];
    let mut pos = 0;
    while let Some(rule_offset) = lowercase[pos..].find(AT_RULE) {
        pos += rule_offset + AT_RULE.len();
        let Some(open_offset) = css[pos..].find('{') else {
            break;
        };
        let block_start = pos + open_offset + 1;
        // An unterminated block extends to the end of the stylesheet.
        let block_end =
            matching_brace(&css[block_start..]).map_or(css.len(), |len| block_start + len);

        for (name, value) in declarations(&css[block_start..block_end]) {
            if name.eq_ignore_ascii_case("src") {
                urls.extend(url_values(value));
            }
        }
        pos = block_end;
    }
    urls
}

fn strip_comments(css: &str) -> String {
    let mut output = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        output.push_str(&rest[..start]);
        output.push(' ');
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    output.push_str(rest);
    output
}

/// Returns the byte length of the block body up to its closing brace.
fn matching_brace(block: &str) -> Option<usize> {
    let mut depth = 0_usize;
    let mut quote = None;
    for (i, ch) in block.char_indices() {
        match (quote, ch) {
            (Some(q), _) if ch == q => quote = None,
            (Some(_), _) => { /* inside a string */ }
            (None, '"' | '\'') => quote = Some(ch),
            (None, '{') => depth += 1,
            (None, '}') if depth == 0 => return Some(i),
            (None, '}') => depth -= 1,
            _ => { /* other chars */ }
        }
    }
    None
}

/// Splits a declaration block into `(name, value)` pairs. Semicolons inside strings
/// and parentheses (e.g., in `data:` URLs) don't terminate a declaration.
fn declarations(block: &str) -> Vec<(&str, &str)> {
    let mut parts = vec![];
    let (mut start, mut depth, mut quote) = (0, 0_usize, None);
    for (i, ch) in block.char_indices() {
        match (quote, ch) {
            (Some(q), _) if ch == q => quote = None,
            (Some(_), _) => { /* inside a string */ }
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                parts.push(&block[start..i]);
                start = i + 1;
            }
            _ => { /* other chars */ }
        }
    }
    parts.push(&block[start..]);

    parts
        .into_iter()
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            Some((name.trim(), value.trim()))
        })
        .collect()
}

fn url_values(value: &str) -> Vec<String> {
    let lowercase = value.to_ascii_lowercase();
    let mut urls = vec![];
    let mut pos = 0;
    while let Some(offset) = lowercase[pos..].find("url(") {
        pos += offset + "url(".len();
        let rest = value[pos..].trim_start();
        let (url, consumed) = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let Some(end) = rest[1..].find(q) else {
                    break;
                };
                (&rest[1..=end], end + 2)
            }
            _ => {
                let Some(end) = rest.find(')') else {
                    break;
                };
                (rest[..end].trim_end(), end)
            }
        };
        if !url.is_empty() {
            urls.push(url.to_owned());
        }
        pos = value.len() - rest.len() + consumed;
    }
    urls
}
