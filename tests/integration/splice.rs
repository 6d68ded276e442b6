use django_patcher::edit::splice;
use django_patcher::position::LineIndex;
use django_patcher::{ModificationRequest, SourceSpan, SourcePatcher, WorkspaceGuard};
use proptest::prelude::*;
use std::fs;

fn source_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("x"),
            Just(" = "),
            Just("é"),
            Just("🐍"),
            Just("\n"),
            Just("\r\n"),
        ],
        1..40,
    )
    .prop_map(|parts| parts.concat())
}

/// A text plus an ordered pair of valid positions in it.
fn text_and_span() -> impl Strategy<Value = (String, SourceSpan)> {
    source_text().prop_flat_map(|text| {
        let index = LineIndex::new(&text);
        let bytes = text.as_bytes();
        let offsets: Vec<usize> = (0..=text.len())
            .filter(|&b| text.is_char_boundary(b))
            .filter(|&b| !(b > 0 && bytes[b - 1] == b'\r' && bytes.get(b) == Some(&b'\n')))
            .collect();
        let spans: Vec<SourceSpan> = offsets
            .iter()
            .flat_map(|&a| offsets.iter().filter(move |&&b| b >= a).map(move |&b| (a, b)))
            .map(|(a, b)| index.span(a..b))
            .collect();
        (Just(text), prop::sample::select(spans))
    })
}

proptest! {
    #[test]
    fn splice_equation_holds((text, span) in text_and_span(), replacement in "[a-z\u{e9}\n]{0,8}") {
        let resolved = LineIndex::new(&text).resolve(&span).unwrap();
        let out = splice(&text, &resolved, &replacement);

        let chars: Vec<char> = text.chars().collect();
        let expected: String = chars[..resolved.chars.start]
            .iter()
            .chain(replacement.chars().collect::<Vec<_>>().iter())
            .chain(chars[resolved.chars.end..].iter())
            .collect();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn same_text_is_a_no_op((text, span) in text_and_span()) {
        let resolved = LineIndex::new(&text).resolve(&span).unwrap();
        let current = text[resolved.bytes.clone()].to_string();
        prop_assert_eq!(splice(&text, &resolved, &current), text);
    }

    #[test]
    fn replacing_back_restores_original((text, span) in text_and_span(), replacement in "[a-z\n]{0,8}") {
        let resolved = LineIndex::new(&text).resolve(&span).unwrap();
        let original = text[resolved.bytes.clone()].to_string();
        let edited = splice(&text, &resolved, &replacement);

        // Span now covering the replacement.
        let start = resolved.bytes.start;
        let end = start + replacement.len();
        let edited_index = LineIndex::new(&edited);
        let back_span = edited_index.resolve(&edited_index.span(start..end)).unwrap();

        prop_assert_eq!(splice(&edited, &back_span, &original), text);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn patcher_writes_the_splice((text, span) in text_and_span(), replacement in "[a-z]{0,6}") {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("models.py");
        fs::write(&file, &text).unwrap();

        let patcher = SourcePatcher::new(WorkspaceGuard::new(dir.path()).unwrap());
        let result = patcher
            .apply(&ModificationRequest::new(&file, span, replacement.clone()))
            .unwrap();

        let resolved = LineIndex::new(&text).resolve(&span).unwrap();
        let expected = splice(&text, &resolved, &replacement);
        let written = fs::read_to_string(&file).unwrap();
        prop_assert_eq!(&written, &expected);
        prop_assert_eq!(result.new_length, expected.chars().count());
        prop_assert_eq!(result.content_hash, django_patcher::content_hash(&expected));
    }
}
