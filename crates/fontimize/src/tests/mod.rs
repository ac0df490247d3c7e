use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use allsorts::{binary::read::ReadScope, font::MatchingPresentation, font_data::FontData};
use test_casing::test_casing;

use crate::{
    engine::{font::Font, write::CmapBuilder, write::FontWriter},
    optimise_fonts, optimise_fonts_for_files, optimise_fonts_for_html,
    optimise_fonts_for_multiple_text, CodepointSet, Error, FontAsset, NativeSubsetter, Optimiser,
    OutputFormat, ParseErrorKind, SkipReason, SubsetEngine, SubsetError, SubsetRequest, TableTag,
};

/// Chars covered by the test font, in ascending order.
const TEST_FONT_CHARS: &str =
    " !,.0123456789?ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz\u{e9}\u{1f600}";
/// Composite glyph built from `e` and an unmapped acute accent.
const COMPOSITE_CHAR: char = '\u{e9}';
/// Index of the unmapped acute accent glyph.
const ACUTE_GLYPH: u16 = 1;

pub(crate) const TEST_SUBSETS: [&str; 4] = [
    "Hello, world!",
    "",
    "\u{e9}t\u{e9} \u{1f600}",
    "0123456789 ABCXYZ",
];

fn write_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

fn write_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

/// Simple glyph with a single on-curve point; `seed` makes glyph data distinct.
fn simple_glyph(seed: u16) -> Vec<u8> {
    let mut glyph = vec![];
    write_u16(&mut glyph, 1); // numberOfContours
    for bound in [0, 0, seed % 1_000, 700] {
        write_u16(&mut glyph, bound);
    }
    write_u16(&mut glyph, 0); // endPtsOfContours[0]
    write_u16(&mut glyph, 0); // instructionLength
    glyph.push(0x01); // flags: ON_CURVE_POINT
    write_u16(&mut glyph, seed); // x
    write_u16(&mut glyph, 0); // y
    glyph
}

fn composite_glyph(components: &[u16]) -> Vec<u8> {
    const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
    const ARGS_ARE_XY_VALUES: u16 = 0x0002;
    const MORE_COMPONENTS: u16 = 0x0020;

    let mut glyph = vec![];
    write_u16(&mut glyph, u16::MAX); // numberOfContours = -1
    glyph.extend_from_slice(&[0; 8]); // bounding box
    for (i, &glyph_idx) in components.iter().enumerate() {
        let mut flags = ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES;
        if i + 1 < components.len() {
            flags |= MORE_COMPONENTS;
        }
        write_u16(&mut glyph, flags);
        write_u16(&mut glyph, glyph_idx);
        write_u32(&mut glyph, 0); // dx, dy
    }
    glyph
}

/// Builds a minimal TrueType font covering [`TEST_FONT_CHARS`].
///
/// Glyph #0 is `.notdef`, #1 is an acute accent not mapped from any char, and the remaining
/// glyphs are mapped from chars in order. `é` is a composite of `e` and the accent.
pub(crate) fn build_test_font() -> Vec<u8> {
    let mut glyphs = vec![simple_glyph(0), simple_glyph(0x301)];
    let mut char_map = vec![];
    for ch in TEST_FONT_CHARS.chars() {
        let glyph_idx = u16::try_from(glyphs.len()).unwrap();
        let glyph = match ch {
            ' ' => vec![],
            COMPOSITE_CHAR => {
                let (_, e_idx) = char_map.iter().find(|(ch, _)| *ch == 'e').unwrap();
                composite_glyph(&[*e_idx, ACUTE_GLYPH])
            }
            _ => simple_glyph(u16::try_from(u32::from(ch) % 0x8000).unwrap()),
        };
        glyphs.push(glyph);
        char_map.push((ch, glyph_idx));
    }
    build_font(&glyphs, &char_map)
}

/// Builds a minimal TrueType font from raw `glyf` entries and a sorted char map.
/// Glyph #1 has zero advance width.
fn build_font(glyphs: &[Vec<u8>], char_map: &[(char, u16)]) -> Vec<u8> {
    let glyph_count = u16::try_from(glyphs.len()).unwrap();

    let mut writer = FontWriter::default();
    writer.write_table(TableTag::CMAP, |buffer| {
        CmapBuilder::new(char_map).write(buffer);
    });
    writer.write_table(TableTag::HMTX, |buffer| {
        for i in 0..glyph_count {
            let advance = match i {
                0 => 500,
                ACUTE_GLYPH => 0,
                _ => 600,
            };
            write_u16(buffer, advance);
            write_u16(buffer, i % 7); // lsb
        }
    });
    writer.write_table(TableTag::HHEA, |buffer| {
        write_u32(buffer, 0x_0001_0000); // version
        for value in [800, 0xff38 /* -200 */, 0, 600, 0, 0, 600, 1, 0, 0] {
            write_u16(buffer, value);
        }
        buffer.extend_from_slice(&[0; 8]); // reserved
        write_u16(buffer, 0); // metricDataFormat
        write_u16(buffer, glyph_count); // numberOfHMetrics
    });
    writer.write_table(TableTag::MAXP, |buffer| {
        write_u32(buffer, 0x_0000_5000); // version 0.5
        write_u16(buffer, glyph_count);
    });
    writer.write_table(TableTag::NAME, |buffer| {
        write_u16(buffer, 0); // format
        write_u16(buffer, 0); // count
        write_u16(buffer, 6); // storage offset
    });
    writer.write_table(TableTag::OS2, |buffer| {
        buffer.extend_from_slice(&[0; 78]); // version 0
    });
    writer.write_table(TableTag::POST, |buffer| {
        write_u32(buffer, 0x_0003_0000);
        buffer.extend_from_slice(&[0; 28]);
    });

    let mut locations = vec![0_u32];
    writer.write_table(TableTag::GLYF, |buffer| {
        let start = buffer.len();
        for glyph in glyphs {
            buffer.extend_from_slice(glyph);
            locations.push(u32::try_from(buffer.len() - start).unwrap());
        }
    });
    writer.write_table(TableTag::LOCA, |buffer| {
        for &location in &locations {
            write_u32(buffer, location);
        }
    });
    writer.write_table(TableTag::HEAD, |buffer| {
        write_u32(buffer, 0x_0001_0000); // version
        write_u32(buffer, 0x_0001_0000); // fontRevision
        write_u32(buffer, 0); // checksumAdjustment
        write_u32(buffer, 0x_5f0f_3cf5); // magicNumber
        write_u16(buffer, 0); // flags
        write_u16(buffer, 1_000); // unitsPerEm
        buffer.extend_from_slice(&[0; 16]); // created, modified
        for bound in [0, 0xff38 /* -200 */, 1_000, 800] {
            write_u16(buffer, bound);
        }
        write_u16(buffer, 0); // macStyle
        write_u16(buffer, 8); // lowestRecPPEM
        write_u16(buffer, 2); // fontDirectionHint
        write_u16(buffer, 1); // indexToLocFormat: long
        write_u16(buffer, 0); // glyphDataFormat
    });
    writer.into_opentype()
}

fn write_test_font(dir: &Path, name: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, build_test_font()).unwrap();
    path
}

fn truetype_optimiser(output_dir: &Path) -> Optimiser {
    Optimiser::with_engine(NativeSubsetter::new(OutputFormat::TrueType))
        .subset_name("TestSubset")
        .output_dir(output_dir)
}

#[test]
fn test_font_is_readable_by_allsorts() {
    let font_bytes = build_test_font();
    let font = Font::new(&font_bytes).unwrap();

    let font_file = ReadScope::new(&font_bytes).read::<FontData<'_>>().unwrap();
    let font_provider = font_file.table_provider(0).unwrap();
    let mut reference_font = allsorts::Font::new(font_provider).unwrap();
    for ch in TEST_FONT_CHARS.chars().chain(['\u{263a}', '\u{301}']) {
        let (expected_idx, _) =
            reference_font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        assert_eq!(font.map_char(ch), expected_idx, "{ch:?}");
    }
}

#[test_casing(4, TEST_SUBSETS)]
fn subset_contains_only_used_glyphs(text: &str) {
    let dir = tempfile::tempdir().unwrap();
    let font_path = write_test_font(dir.path(), "TestSans.ttf");
    let outputs = truetype_optimiser(&dir.path().join("out"))
        .optimise_text(text, [&font_path])
        .unwrap();
    assert!(outputs.failures.is_empty(), "{:?}", outputs.failures);
    let output = &outputs.fonts[&FontAsset::new(&font_path)];
    assert_eq!(output, &dir.path().join("out/TestSans.TestSubset.ttf"));

    let subset_bytes = fs::read(output).unwrap();
    let subset = Font::new(&subset_bytes).unwrap();
    let chars = CodepointSet::collect(text);
    // `.notdef` + one glyph per char; `é` additionally pulls in `e` and the accent.
    let composite_extras = if chars.contains(COMPOSITE_CHAR) {
        usize::from(!chars.contains('e')) + 1
    } else {
        0
    };
    assert_eq!(
        usize::from(subset.glyph_count()),
        1 + chars.len() + composite_extras
    );
    for ch in chars.iter() {
        assert_ne!(subset.map_char(ch), 0, "{ch:?}");
    }
    for ch in ['Q', '?', '\u{263a}'] {
        if !chars.contains(ch) {
            assert_eq!(subset.map_char(ch), 0, "{ch:?}");
        }
    }
}

#[test]
fn empty_text_retains_notdef_and_space() {
    let dir = tempfile::tempdir().unwrap();
    let font_path = write_test_font(dir.path(), "TestSans.ttf");
    let outputs = truetype_optimiser(dir.path()).optimise_text("", [&font_path]).unwrap();

    let subset_bytes = fs::read(&outputs.fonts[&FontAsset::new(&font_path)]).unwrap();
    let subset = Font::new(&subset_bytes).unwrap();
    assert_eq!(subset.glyph_count(), 2);
    assert_eq!(subset.map_char(' '), 1);
}

#[test]
fn composite_glyph_components_are_retained_and_remapped() {
    let font_bytes = build_test_font();
    let font = Font::new(&font_bytes).unwrap();
    let original_e = font.glyph(font.map_char('e')).unwrap();
    let original_acute = font.glyph(ACUTE_GLYPH).unwrap();

    let ranges = CodepointSet::collect("\u{e9}").to_ranges();
    let subset_bytes = NativeSubsetter::new(OutputFormat::TrueType)
        .subset_bytes(&font_bytes, &ranges)
        .unwrap();
    let subset = Font::new(&subset_bytes).unwrap();
    // .notdef, space, é, e, acute
    assert_eq!(subset.glyph_count(), 5);
    assert_eq!(subset.map_char('e'), 0);

    let composite = subset.glyph(subset.map_char(COMPOSITE_CHAR)).unwrap();
    let component_ids: Vec<_> = composite.components.iter().map(|c| c.glyph_idx).collect();
    assert_eq!(component_ids.len(), 2);
    assert!(component_ids.iter().all(|&idx| idx < subset.glyph_count()));

    let e = subset.glyph(component_ids[0]).unwrap();
    assert_eq!(&e.raw[..original_e.raw.len()], original_e.raw);
    assert_eq!(e.advance, original_e.advance);
    let acute = subset.glyph(component_ids[1]).unwrap();
    assert_eq!(&acute.raw[..original_acute.raw.len()], original_acute.raw);
    assert_eq!(acute.advance, 0);
}

/// Glyphs for a font in which `a` maps to the head of a chain of composite glyphs,
/// each referencing the next one.
fn composite_chain_glyphs(len: u16) -> Vec<Vec<u8>> {
    let mut glyphs = vec![simple_glyph(0), simple_glyph(1)];
    for i in 0..len {
        glyphs.push(composite_glyph(&[i + 3]));
    }
    glyphs.push(simple_glyph(2));
    glyphs
}

const DEEP_CHAIN_LEN: u16 = 60_000;

#[test]
fn deeply_nested_composite_glyphs_are_retained() {
    let font_bytes = build_font(&composite_chain_glyphs(DEEP_CHAIN_LEN), &[('a', 2)]);
    let ranges = CodepointSet::collect("a").to_ranges();
    let subset_bytes = NativeSubsetter::new(OutputFormat::TrueType)
        .subset_bytes(&font_bytes, &ranges)
        .unwrap();
    let subset = Font::new(&subset_bytes).unwrap();
    // .notdef, the chain and the simple glyph at its end
    assert_eq!(subset.glyph_count(), DEEP_CHAIN_LEN + 2);

    let mut glyph_idx = subset.map_char('a');
    assert_eq!(glyph_idx, 1);
    for _ in 0..DEEP_CHAIN_LEN {
        let glyph = subset.glyph(glyph_idx).unwrap();
        assert_eq!(glyph.components.len(), 1);
        glyph_idx = glyph.components[0].glyph_idx;
    }
    assert!(subset.glyph(glyph_idx).unwrap().components.is_empty());
}

#[test]
fn composite_glyph_cycles_terminate() {
    let glyphs = vec![
        simple_glyph(0),
        simple_glyph(1),
        composite_glyph(&[3]),
        composite_glyph(&[2, 1]),
    ];
    let font_bytes = build_font(&glyphs, &[('a', 2)]);
    let ranges = CodepointSet::collect("a").to_ranges();
    let subset_bytes = NativeSubsetter::new(OutputFormat::TrueType)
        .subset_bytes(&font_bytes, &ranges)
        .unwrap();
    let subset = Font::new(&subset_bytes).unwrap();
    assert_eq!(subset.glyph_count(), 4);

    let head = subset.glyph(1).unwrap();
    assert_eq!(head.components[0].glyph_idx, 2);
    let tail = subset.glyph(2).unwrap();
    let tail_components: Vec<_> = tail.components.iter().map(|c| c.glyph_idx).collect();
    assert_eq!(tail_components, [1, 3]);
}

#[test]
fn deeply_nested_font_does_not_affect_other_fonts() {
    let dir = tempfile::tempdir().unwrap();
    let deep_path = dir.path().join("Deep.ttf");
    let font_bytes = build_font(&composite_chain_glyphs(DEEP_CHAIN_LEN), &[('a', 2)]);
    fs::write(&deep_path, font_bytes).unwrap();
    let font_path = write_test_font(dir.path(), "TestSans.ttf");

    let outputs = truetype_optimiser(&dir.path().join("out"))
        .optimise_text("a", [&deep_path, &font_path])
        .unwrap();
    assert!(outputs.failures.is_empty(), "{:?}", outputs.failures);
    assert_eq!(outputs.fonts.len(), 2);
    for output in outputs.fonts.values() {
        assert!(output.is_file(), "{output:?}");
    }
}

#[test]
fn cff_fonts_are_rejected() {
    let mut font_bytes = b"OTTO".to_vec();
    font_bytes.extend_from_slice(&[0; 8]);
    let ranges = CodepointSet::collect("a").to_ranges();
    let err = NativeSubsetter::default()
        .subset_bytes(&font_bytes, &ranges)
        .unwrap_err();
    assert_eq!(*err.kind(), ParseErrorKind::CffOutlines);
}

#[test]
fn woff2_output_is_readable_by_allsorts() {
    let dir = tempfile::tempdir().unwrap();
    let font_path = write_test_font(dir.path(), "TestSans.ttf");
    let text = "Hello, w\u{f6}rld! \u{e9}\u{1f600}";
    let out_dir = dir.path().join("out");
    let outputs = optimise_fonts(text, [&font_path], Some(out_dir.as_path()), "Web").unwrap();

    let output = &outputs.fonts[&FontAsset::new(&font_path)];
    assert_eq!(output, &out_dir.join("TestSans.Web.woff2"));
    let woff2 = fs::read(output).unwrap();
    let font_file = ReadScope::new(&woff2).read::<FontData<'_>>().unwrap();
    let font_provider = font_file.table_provider(0).unwrap();
    let mut font = allsorts::Font::new(font_provider).unwrap();
    for ch in text.chars() {
        let (glyph_idx, _) = font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        // `ö` is not covered by the test font
        assert_eq!(glyph_idx == 0, ch == '\u{f6}', "{ch:?}");
    }
}

#[test]
fn subsets_are_written_next_to_fonts_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let fonts_dir = dir.path().join("fonts");
    let font_path = write_test_font(&fonts_dir, "TestSans.ttf");
    let outputs = optimise_fonts("abc", [&font_path], None, crate::DEFAULT_SUBSET_NAME).unwrap();

    let expected_path = fonts_dir.join("TestSans.FontimizeSubset.woff2");
    assert_eq!(outputs.fonts[&FontAsset::new(&font_path)], expected_path);
    assert!(expected_path.is_file());
}

#[test]
fn multiple_texts_and_html_documents() {
    let dir = tempfile::tempdir().unwrap();
    let font_path = write_test_font(dir.path(), "TestSans.ttf");
    let out_dir = dir.path().join("out");

    let texts = ["ab", "ba", "c"];
    let outputs =
        optimise_fonts_for_multiple_text(texts, [&font_path], Some(out_dir.as_path()), "Texts")
            .unwrap();
    let subset_bytes = fs::read(&outputs.fonts[&FontAsset::new(&font_path)]).unwrap();
    assert!(subset_bytes.starts_with(b"wOF2"));

    let html = ["<p>Hi<script>zzz()</script></p>", "<p>yo</p>"];
    let visible_texts = html.map(crate::html::visible_text);
    let codepoints = CodepointSet::collect_all(visible_texts.iter().map(String::as_str));
    let outputs = truetype_optimiser(&out_dir)
        .optimise_codepoints(&codepoints, [&font_path])
        .unwrap();
    let subset_bytes = fs::read(&outputs.fonts[&FontAsset::new(&font_path)]).unwrap();
    let subset = Font::new(&subset_bytes).unwrap();
    // .notdef, space, H, i, o, y
    assert_eq!(subset.glyph_count(), 6);
    assert_eq!(subset.map_char('z'), 0);

    let outputs =
        optimise_fonts_for_html(html, [&font_path], Some(out_dir.as_path()), "Html").unwrap();
    assert_eq!(
        outputs.fonts[&FontAsset::new(&font_path)],
        out_dir.join("TestSans.Html.woff2")
    );
}

#[test]
fn output_dir_that_is_a_file_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let font_path = write_test_font(dir.path(), "TestSans.ttf");
    let not_a_dir = dir.path().join("taken");
    fs::write(&not_a_dir, "").unwrap();

    let err = optimise_fonts("abc", [&font_path], Some(not_a_dir.as_path()), "X").unwrap_err();
    assert!(matches!(&err, Error::OutputDir { path, .. } if *path == not_a_dir), "{err:?}");
}

#[test]
fn missing_explicit_font_fails_in_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let font_path = write_test_font(dir.path(), "TestSans.ttf");
    let missing = dir.path().join("Missing.ttf");
    let outputs = optimise_fonts("abc", [&font_path, &missing], Some(dir.path()), "X").unwrap();

    assert_eq!(outputs.fonts.len(), 1);
    assert!(outputs.fonts.contains_key(&FontAsset::new(&font_path)));
    let err = &outputs.failures[&FontAsset::new(&missing)];
    assert!(matches!(err, SubsetError::Io { path, .. } if *path == missing), "{err:?}");
}

#[derive(Debug, Default)]
struct MockEngine {
    requests: Mutex<Vec<(PathBuf, String)>>,
}

impl SubsetEngine for MockEngine {
    fn output_extension(&self) -> &str {
        "mock"
    }

    fn subset(&self, request: &SubsetRequest<'_>) -> Result<Vec<PathBuf>, SubsetError> {
        let unicode_ranges = request.unicode_ranges.to_owned();
        self.requests
            .lock()
            .unwrap()
            .push((request.font.to_owned(), unicode_ranges));

        let output = request.output_path(self.output_extension());
        let stem = request.font.file_stem().unwrap().to_str().unwrap();
        Ok(match stem {
            "none" => vec![],
            "twice" => vec![output.clone(), output],
            "panics" => panic!("cannot handle {stem}"),
            _ => vec![output],
        })
    }
}

#[test]
fn engine_contract_violations_are_isolated() {
    let optimiser = Optimiser::with_engine(MockEngine::default()).subset_name("Mock");
    let fonts = ["fonts/none.ttf", "fonts/twice.ttf", "fonts/ok.ttf"];
    let outputs = optimiser.optimise_text("Hello", fonts).unwrap();

    assert_eq!(
        outputs.fonts,
        [(FontAsset::new("fonts/ok.ttf"), PathBuf::from("fonts/ok.Mock.mock"))].into()
    );
    assert_eq!(outputs.failures.len(), 2);
    let err = &outputs.failures[&FontAsset::new("fonts/none.ttf")];
    assert!(matches!(err, SubsetError::UnexpectedOutputs { count: 0 }), "{err:?}");
    let err = &outputs.failures[&FontAsset::new("fonts/twice.ttf")];
    assert!(matches!(err, SubsetError::UnexpectedOutputs { count: 2 }), "{err:?}");

    let mut requests = optimiser.engine().requests.lock().unwrap().clone();
    requests.sort();
    assert_eq!(requests.len(), 3);
    for (_, unicode_ranges) in &requests {
        assert_eq!(unicode_ranges, "U+0020, U+0048, U+0065, U+006C, U+006F");
    }
}

#[test]
fn engine_panics_are_isolated() {
    let optimiser = Optimiser::with_engine(MockEngine::default()).subset_name("Mock");
    let fonts = ["fonts/panics.ttf", "fonts/ok.ttf"];
    let outputs = optimiser.optimise_text("x", fonts).unwrap();

    assert_eq!(
        outputs.fonts,
        [(FontAsset::new("fonts/ok.ttf"), PathBuf::from("fonts/ok.Mock.mock"))].into()
    );
    let err = &outputs.failures[&FontAsset::new("fonts/panics.ttf")];
    assert!(
        matches!(err, SubsetError::EnginePanicked { message } if message == "cannot handle panics"),
        "{err:?}"
    );
    assert_eq!(optimiser.engine().requests.lock().unwrap().len(), 2);
}

#[test]
fn results_are_keyed_by_specified_font_paths() {
    let optimiser = Optimiser::with_engine(MockEngine::default()).subset_name("Mock");
    let outputs = optimiser
        .optimise_text("x", ["./fonts/a.ttf", "fonts/b/../a.ttf"])
        .unwrap();

    assert_eq!(outputs.fonts.len(), 1);
    let (font, output) = outputs.fonts.iter().next().unwrap();
    assert_eq!(font.path(), Path::new("./fonts/a.ttf"));
    assert_eq!(font.normalized_path(), Path::new("fonts/a.ttf"));
    assert_eq!(*output, Path::new("./fonts/a.Mock.mock"));
    assert_eq!(
        serde_json::to_value(&outputs).unwrap(),
        serde_json::json!({ "fonts": { "./fonts/a.ttf": "./fonts/a.Mock.mock" } })
    );
}

#[test]
fn engine_is_invoked_once_per_distinct_font() {
    let optimiser = Optimiser::with_engine(MockEngine::default());
    let fonts = ["fonts/a.ttf", "fonts/./a.ttf", "fonts/sub/../a.ttf", "fonts/b.ttf"];
    let outputs = optimiser.optimise_text("x", fonts).unwrap();

    assert_eq!(outputs.fonts.len(), 2);
    assert_eq!(optimiser.engine().requests.lock().unwrap().len(), 2);
    assert_eq!(
        outputs.fonts[&FontAsset::new("fonts/a.ttf")],
        Path::new("fonts/a.FontimizeSubset.mock")
    );
}

struct Site {
    dir: tempfile::TempDir,
}

impl Site {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn font(&self, relative: &str) -> PathBuf {
        let path = self.path(relative);
        write_test_font(path.parent().unwrap(), path.file_name().unwrap().to_str().unwrap())
    }
}

#[test]
fn optimising_fonts_for_files() {
    let site = Site::new();
    let regular = site.font("fonts/Serif-Regular.ttf");
    let italic = site.font("fonts/Serif-Italic.ttf");
    let extra = site.font("extra/Mono.ttf");
    let css_path = site.write(
        "css/site.css",
        r#"
        @font-face { font-family: "Serif"; src: url('../fonts/Serif-Regular.ttf') format('truetype'); }
        @font-face { font-family: "Serif"; font-style: italic; src: url("../fonts/Serif-Italic.ttf"); }
        @font-face { font-family: "Gone"; src: url('DOESNOTEXIST.ttf') format('truetype'); }
        "#,
    );
    let html_path = site.write(
        "index.html",
        r#"<html><head><link rel="stylesheet" href="css/site.css"></head>
        <body><h1>Hello</h1><p>World</p></body></html>"#,
    );
    let text_path = site.write("notes.txt", "0123 \u{e9}");
    let out_dir = site.path("out");

    let result = optimise_fonts_for_files(
        [&html_path, &text_path],
        Some(out_dir.as_path()),
        "TestFilesSubset",
        [&extra],
    )
    .unwrap();

    let expected_fonts = [
        (&regular, "Serif-Regular"),
        (&italic, "Serif-Italic"),
        (&extra, "Mono"),
    ]
    .map(|(font, stem)| {
        let output = out_dir.join(format!("{stem}.TestFilesSubset.woff2"));
        (FontAsset::new(font), output)
    });
    assert_eq!(result.fonts, expected_fonts.into());
    for output in result.fonts.values() {
        assert!(output.is_file(), "{output:?}");
    }
    assert!(result.failures.is_empty(), "{:?}", result.failures);
    assert!(result.unreadable.is_empty(), "{:?}", result.unreadable);

    let css_fonts: BTreeSet<_> = [FontAsset::new(&regular), FontAsset::new(&italic)].into();
    assert_eq!(result.css, [(css_path.clone(), css_fonts)].into());

    assert_eq!(result.skipped.len(), 1);
    let skipped = &result.skipped[0];
    assert_eq!(skipped.stylesheet, css_path);
    assert_eq!(
        skipped.to_string(),
        format!(
            "Warning: Font file not found (may be remote not local?); skipping: DOESNOTEXIST.ttf (resolved to {})",
            site.path("css/DOESNOTEXIST.ttf").display()
        )
    );
}

#[test]
fn fonts_shared_by_stylesheets_are_subsetted_once() {
    let site = Site::new();
    let font = site.font("fonts/Shared.ttf");
    site.write("a.css", "@font-face { src: url(fonts/Shared.ttf); }");
    site.write("nested/b.css", "@font-face { src: url(\"../fonts/./Shared.ttf\"); }");
    let html_path = site.write(
        "page.html",
        r#"<link rel="stylesheet" href="a.css"><link rel="stylesheet" href="nested/b.css">
        <style>@font-face { src: url(fonts/Shared.ttf) }</style><p>abc</p>"#,
    );

    let optimiser = Optimiser::with_engine(MockEngine::default());
    let result = optimiser.optimise_files([&html_path], [&font]).unwrap();

    assert_eq!(result.fonts.len(), 1);
    assert_eq!(optimiser.engine().requests.lock().unwrap().len(), 1);
    let shared: BTreeSet<_> = [FontAsset::new(&font)].into();
    assert_eq!(
        result.css,
        [
            (site.path("a.css"), shared.clone()),
            (site.path("nested/b.css"), shared.clone()),
            (html_path, shared),
        ]
        .into()
    );
}

#[test]
fn unreadable_inputs_and_remote_references_are_recorded() {
    let site = Site::new();
    let font = site.font("Local.ttf");
    let html_path = site.write(
        "index.html",
        r#"<link rel="stylesheet" href="missing.css">
        <link rel="stylesheet" href="https://fonts.example.com/css">
        <style>
          @font-face { src: url(https://cdn.example.com/Remote.woff2) format("woff2"); }
          @font-face { src: url(Local.ttf); }
        </style>"#,
    );
    let missing_input = site.path("nope.txt");

    let optimiser = Optimiser::with_engine(MockEngine::default());
    let result = optimiser
        .optimise_files([&html_path, &missing_input], Vec::<PathBuf>::new())
        .unwrap();

    assert_eq!(
        result.unreadable.keys().collect::<Vec<_>>(),
        [&site.path("missing.css"), &missing_input]
    );
    assert_eq!(result.fonts.len(), 1);
    assert!(result.fonts.contains_key(&FontAsset::new(&font)));
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].reason, SkipReason::Remote);
    assert_eq!(result.skipped[0].stylesheet, html_path);
}

#[test]
fn text_is_collected_from_all_input_kinds() {
    let site = Site::new();
    let html_path = site.write("a.html", "<p>ab</p><script>xyz</script>");
    let text_path = site.write("b.md", "cd");
    let css_path = site.write("c.css", "body { content: 'qqq'; }");

    let optimiser = Optimiser::with_engine(MockEngine::default());
    optimiser
        .optimise_files([&html_path, &text_path, &css_path], ["font.ttf"])
        .unwrap();
    let requests = optimiser.engine().requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1, "U+0020, U+0061-0064");
}
