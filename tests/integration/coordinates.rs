use django_patcher::position::{LineIndex, Position};
use django_patcher::RangeError;
use proptest::prelude::*;

/// Text drawn from a small alphabet that exercises every line-ending style
/// and multi-byte code points.
fn source_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("a"),
            Just(" "),
            Just("é"),
            Just("ß"),
            Just("猫"),
            Just("🐍"),
            Just("\n"),
            Just("\r\n"),
            Just("\r"),
        ],
        0..60,
    )
    .prop_map(|parts| parts.concat())
}

/// Byte offsets that are char boundaries and not inside a `\r\n` pair.
fn positions_of(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    (0..=text.len())
        .filter(|&b| text.is_char_boundary(b))
        .filter(|&b| !(b > 0 && bytes[b - 1] == b'\r' && bytes.get(b) == Some(&b'\n')))
        .collect()
}

proptest! {
    #[test]
    fn byte_to_position_round_trips(text in source_text()) {
        let index = LineIndex::new(&text);
        for byte in positions_of(&text) {
            let pos = index.position(byte);
            let (_, back) = index.offset(pos).unwrap();
            prop_assert_eq!(back, byte, "position {:?}", pos);
        }
    }

    #[test]
    fn char_offsets_count_code_points(text in source_text()) {
        let index = LineIndex::new(&text);
        for byte in positions_of(&text) {
            let (chars, _) = index.offset(index.position(byte)).unwrap();
            prop_assert_eq!(chars, text[..byte].chars().count());
        }
    }

    #[test]
    fn every_line_ending_counts_once(text in source_text()) {
        let index = LineIndex::new(&text);
        let breaks = text.replace("\r\n", "\n").chars().filter(|c| *c == '\n' || *c == '\r').count();
        prop_assert_eq!(index.line_count(), breaks + 1);
    }

    #[test]
    fn column_past_line_end_is_rejected(text in source_text(), extra in 1usize..4) {
        let index = LineIndex::new(&text);
        for line in 1..=index.line_count() {
            let len = index.line_len(line).unwrap();
            let result = index.offset(Position::new(line, len + extra));
            let is_column_error = matches!(result, Err(RangeError::ColumnOutOfRange { .. }));
            prop_assert!(is_column_error);
        }
        let past = index.offset(Position::new(index.line_count() + 1, 0));
        let is_line_error = matches!(past, Err(RangeError::LineOutOfRange { .. }));
        prop_assert!(is_line_error);
    }
}
