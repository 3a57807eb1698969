//! End-to-end segmentation scenarios.
//!
//! Each test runs the public API over a small corpus and checks the output
//! the way a caller would see it.

use tabwib::{
    optimize_rules, segment_pages, tokenize, validate_segments, Breakpoint, DebugOptions,
    IssueType, Page, PageId, Rule, Segment, SegmentationOptions, Segmenter, TextPiece, TokenTable,
};

// =============================================================================
// Corpus helpers
// =============================================================================

/// A small book: a chapter heading every third page, unique lines everywhere.
fn book(pages: u32) -> Vec<Page> {
    (1..=pages)
        .map(|i| {
            let mut content = String::new();
            if i % 3 == 1 {
                content.push_str(&format!("باب رقم {i}\n"));
            }
            content.push_str(&format!("حَدَّثَنَا فلان في الصفحة {i} قال.\n"));
            content.push_str(&format!("وفيه فوائد {i}؛ ثم ذكر الحديث {i}."));
            Page::new(i, content)
        })
        .collect()
}

fn contents(segments: &[Segment]) -> Vec<&str> {
    segments.iter().map(|s| s.content.as_str()).collect()
}

fn without_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

// =============================================================================
// Reference scenarios
// =============================================================================

#[test]
fn three_pages_with_one_page_limit() {
    let pages = [
        Page::new(1, "A".repeat(50)),
        Page::new(2, "B".repeat(50)),
        Page::new(3, "C".repeat(50)),
    ];
    let options = SegmentationOptions::default()
        .with_breakpoints(vec![Breakpoint::page_boundary()])
        .with_max_pages(1);

    let segments = segment_pages(&pages, &options).unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!((segments[0].from, segments[0].to), (1, None));
    assert_eq!((segments[1].from, segments[1].to), (2, Some(3)));
    assert_eq!(segments[0].content, "A".repeat(50));
    assert_eq!(segments[1].content, format!("{} {}", "B".repeat(50), "C".repeat(50)));
}

#[test]
fn fuzzy_naql_tokenizes_vocalised_narration() {
    let text = "قَالَ: (حَدَّثَنَا)";
    let pieces = tokenize(text, &TokenTable::new(), &["naql"], true).unwrap();

    let tokens: Vec<&str> = pieces
        .iter()
        .filter_map(|p| match p {
            TextPiece::Token { text, .. } => Some(*text),
            TextPiece::Literal(_) => None,
        })
        .collect();
    assert_eq!(tokens, ["حَدَّثَنَا"]);
    assert_eq!(pieces.first(), Some(&TextPiece::Literal("قَالَ: (")));
    assert_eq!(pieces.last(), Some(&TextPiece::Literal(")")));
}

#[test]
fn line_starts_after_captures_number_and_drops_marker() {
    let options = SegmentationOptions::default()
        .with_rules(vec![Rule::line_starts_after(["{{raqms:num}} {{dash}} "])]);
    let segments = segment_pages(&[Page::new(1, "٣٤ - نص")], &options).unwrap();

    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].content, "نص");
    assert_eq!(segments[0].meta.as_ref().unwrap()["num"], "٣٤");
}

#[test]
fn optimizer_merges_rules_with_same_meta() {
    let out = optimize_rules(vec![
        Rule::line_starts_with(["a"]).with_meta("t", "x"),
        Rule::line_starts_with(["b"]).with_meta("t", "x"),
    ]);
    assert_eq!(out.merged_count, 1);
    assert_eq!(out.rules.len(), 1);
    assert_eq!(out.rules[0].pattern.patterns(), ["a", "b"]);
    assert_eq!(out.rules[0].meta.as_ref().unwrap()["t"], "x");
}

#[test]
fn gapped_ids_on_large_document_stay_single_page() {
    let pages: Vec<Page> = (0..1005u32).map(|i| Page::new(i * 2, format!("صفحة {i}"))).collect();
    let options = SegmentationOptions::default()
        .with_breakpoints(vec![Breakpoint::page_boundary()])
        .with_max_pages(1);

    let segments = segment_pages(&pages, &options).unwrap();
    assert_eq!(segments.len(), 1005);
    assert!(segments.iter().all(|s| s.to.is_none()));
    let froms: Vec<PageId> = segments.iter().map(|s| s.from).collect();
    let ids: Vec<PageId> = pages.iter().map(|p| p.id).collect();
    assert_eq!(froms, ids);
}

#[test]
fn descending_page_ids_respect_page_limit() {
    let pages = [Page::new(3, "c"), Page::new(2, "b"), Page::new(1, "a")];
    let options = SegmentationOptions::default()
        .with_breakpoints(vec![Breakpoint::page_boundary()])
        .with_max_pages(0);

    let segments = segment_pages(&pages, &options).unwrap();
    assert_eq!(contents(&segments), ["c", "b", "a"]);
    assert!(segments.iter().all(|s| s.to.is_none()));
    assert!(validate_segments(&pages, &options, &segments).ok);

    let merged = [Segment::new("c b a", 3, 1)];
    let report = validate_segments(&pages, &options, &merged);
    assert_eq!(report.of_kind(IssueType::MaxPagesViolation).count(), 1);
}

// =============================================================================
// Whole-pipeline properties on a realistic corpus
// =============================================================================

fn book_options() -> SegmentationOptions {
    SegmentationOptions::default()
        .with_rules(vec![Rule::line_starts_with(["{{bab}} "]).with_meta("type", "chapter")])
        .with_breakpoints(vec![Breakpoint::page_boundary()])
        .with_max_pages(1)
}

#[test]
fn chapters_start_segments() {
    let segments = segment_pages(&book(9), &book_options()).unwrap();
    let chapters: Vec<PageId> = segments
        .iter()
        .filter(|s| s.meta.as_ref().is_some_and(|m| m["type"] == "chapter"))
        .map(|s| s.from)
        .collect();
    assert_eq!(chapters, [1, 4, 7]);
    assert!(segments.iter().all(|s| s.last_page() - s.from <= 1));
}

#[test]
fn output_is_deterministic() {
    let pages = book(40);
    let segmenter = Segmenter::new(book_options().with_max_content_length(60)).unwrap();
    assert_eq!(segmenter.segment(&pages), segmenter.segment(&pages));
}

#[test]
fn no_text_is_dropped() {
    let pages = book(25);
    let options = book_options().with_max_content_length(40);
    let segments = segment_pages(&pages, &options).unwrap();

    let input: String = pages.iter().map(|p| without_whitespace(&p.content)).collect();
    let output: String = segments.iter().map(|s| without_whitespace(&s.content)).collect();
    assert_eq!(output, input);
    assert!(segments.iter().all(|s| s.char_len() <= 40));
}

#[test]
fn segments_are_in_document_order() {
    let segments = segment_pages(&book(30), &book_options().with_max_content_length(50)).unwrap();
    for pair in segments.windows(2) {
        assert!(pair[0].from <= pair[1].from);
        assert!(pair[0].last_page() <= pair[1].from);
    }
}

#[test]
fn rule_boundaries_survive_windowing() {
    let pages = [Page::new(1, "مقدمة طويلة"), Page::new(2, "باب أول\nنص"), Page::new(3, "تتمة")];
    let options = SegmentationOptions::default()
        .with_rules(vec![Rule::line_starts_with(["{{bab}} "])])
        .with_breakpoints(vec![Breakpoint::page_boundary()])
        .with_max_pages(5);
    let segments = segment_pages(&pages, &options).unwrap();
    assert_eq!(contents(&segments), ["مقدمة طويلة", "باب أول\nنص تتمة"]);
}

#[test]
fn output_validates_cleanly() {
    let pages = book(30);
    let options = book_options();
    let segments = segment_pages(&pages, &options).unwrap();
    let report = validate_segments(&pages, &options, &segments);
    assert!(report.ok, "{:#?}", report.issues);
}

#[test]
fn validator_flags_tampered_output() {
    let pages = book(6);
    let options = book_options();
    let mut segments = segment_pages(&pages, &options).unwrap();
    segments[1].from = 99;
    segments[2].content.push_str(" زيادة");

    let report = validate_segments(&pages, &options, &segments);
    assert!(!report.ok);
    assert_eq!(report.of_kind(IssueType::PageNotFound).count(), 1);
    assert_eq!(report.of_kind(IssueType::ContentNotFound).count(), 1);
    assert!(report.errors >= 2);
}

#[test]
fn fast_path_parity_at_threshold() {
    let pages: Vec<Page> = (1..=1000u32).map(|i| Page::new(i, format!("نص الصفحة {i}. تتمة {i}"))).collect();
    let base = SegmentationOptions::default()
        .with_breakpoints(vec![Breakpoint::new("{{tarqim}}\\s*"), Breakpoint::page_boundary()])
        .with_max_pages(2);

    let fast = segment_pages(&pages, &base.clone().with_large_document_threshold(1000)).unwrap();
    let accurate = segment_pages(&pages, &base.with_large_document_threshold(usize::MAX)).unwrap();
    assert_eq!(fast, accurate);
}

#[test]
fn content_length_cuts_keep_marks_attached() {
    let pages = [Page::new(1, "كَتَبَ".repeat(30))];
    let options = SegmentationOptions::default().with_max_content_length(7);
    let segments = segment_pages(&pages, &options).unwrap();

    assert!(segments.len() > 1);
    for segment in &segments {
        let first = segment.content.chars().next().unwrap();
        assert!(!tabwib::is_diacritic(first), "segment starts with a mark: {segment}");
        assert!(segment.char_len() <= 7);
    }
}

#[test]
fn debug_records_split_provenance() {
    let pages = [Page::new(1, "aaaa bbbb cccc dddd")];
    let options = SegmentationOptions::default()
        .with_max_content_length(10)
        .with_debug(DebugOptions::default());
    let segments = segment_pages(&pages, &options).unwrap();

    assert_eq!(contents(&segments), ["aaaa bbbb", "cccc dddd"]);
    let meta = segments[1].meta.as_ref().unwrap();
    assert_eq!(meta["_debug"]["contentLengthSplit"]["maxContentLength"], 10);
}

#[test]
fn options_from_json_drive_segmentation() {
    let options = SegmentationOptions::from_json(
        r#"{
            "rules": [{"lineStartsAfter": ["{{raqms:num}} {{dash}} "], "meta": {"type": "entry"}}],
            "preprocess": ["removeZeroWidth"],
            "pageJoiner": "newline"
        }"#,
    )
    .unwrap();
    let pages = [Page::new(7, "١ - أول\u{200B} سطر"), Page::new(8, "تتمة\n٢ - ثان")];
    let segments = segment_pages(&pages, &options).unwrap();

    assert_eq!(contents(&segments), ["أول سطر\nتتمة", "ثان"]);
    assert_eq!((segments[0].from, segments[0].to), (7, Some(8)));
    let meta = segments[1].meta.as_ref().unwrap();
    assert_eq!(meta["num"], "٢");
    assert_eq!(meta["type"], "entry");
}

#[test]
fn custom_tokens_extend_the_table() {
    let options = SegmentationOptions::default()
        .with_token("juz", "جزء")
        .with_rules(vec![Rule::line_starts_with(["{{juz}} "])]);
    let pages = [Page::new(1, "مقدمة\nجزء أول\nجزء ثان")];
    let segments = segment_pages(&pages, &options).unwrap();
    assert_eq!(contents(&segments), ["مقدمة", "جزء أول", "جزء ثان"]);
}
