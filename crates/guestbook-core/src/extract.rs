use serde::Serialize;

/// Prefix of the line that carries a submission's result.
pub const RESULT_MARKER: &str = "result:";

// Characters dropped after the marker, i.e. the space in "result: value".
const RESULT_SEPARATOR_CHARS: usize = 1;

#[derive(Debug, Clone, Default, Serialize, Eq, PartialEq)]
pub struct ExtractedFields {
    pub device: String,
    pub result: String,
}

/// Derive the listing fields from raw record content.
///
/// `device` is the first line. `result` comes from the first line starting
/// with [`RESULT_MARKER`], minus the marker and one following character.
/// Lines are split on `\n` only; invalid UTF-8 is replaced lossily.
#[must_use]
pub fn extract(content: &[u8]) -> ExtractedFields {
    let text = String::from_utf8_lossy(content);
    let device = text.split('\n').next().unwrap_or_default().to_string();
    let result = text
        .split('\n')
        .find_map(|line| line.strip_prefix(RESULT_MARKER))
        .map(strip_separator)
        .unwrap_or_default();

    ExtractedFields { device, result }
}

fn strip_separator(after_marker: &str) -> String {
    let mut chars = after_marker.chars();
    for _ in 0..RESULT_SEPARATOR_CHARS {
        chars.next();
    }
    chars.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn device_is_first_line() {
        assert_eq!(extract(b"hello\nworld").device, "hello");
    }

    #[test]
    fn empty_content_yields_empty_fields() {
        assert_eq!(extract(b""), ExtractedFields::default());
    }

    #[test]
    fn result_skips_marker_plus_one_character() {
        let fields = extract(b"devA\nresult:OK more text");
        assert_eq!(fields.device, "devA");
        assert_eq!(fields.result, "K more text");

        assert_eq!(extract(b"devA\nresult: 48000Hz 256 frames").result, "48000Hz 256 frames");
    }

    #[test]
    fn missing_marker_yields_empty_result() {
        assert_eq!(extract(b"devA\nno marker here").result, "");
        assert_eq!(extract(b"devA\n  result: indented").result, "");
        assert_eq!(extract(b"devA\nRESULT: upper").result, "");
    }

    #[test]
    fn bare_marker_line_yields_empty_result() {
        assert_eq!(extract(b"devA\nresult:").result, "");
        assert_eq!(extract(b"devA\nresult:x").result, "");
    }

    #[test]
    fn first_matching_line_wins() {
        let fields = extract(b"devA\nresult: first\nresult: second");
        assert_eq!(fields.result, "first");
    }

    #[test]
    fn marker_on_first_line_is_both_device_and_result() {
        let fields = extract(b"result: solo");
        assert_eq!(fields.device, "result: solo");
        assert_eq!(fields.result, "solo");
    }

    #[test]
    fn carriage_returns_are_kept() {
        let fields = extract(b"devA\r\nresult: ok\r\n");
        assert_eq!(fields.device, "devA\r");
        assert_eq!(fields.result, "ok\r");
    }

    #[test]
    fn multibyte_character_after_marker_is_skipped_whole() {
        assert_eq!(extract("dev\nresult:\u{e9}t\u{e9}".as_bytes()).result, "t\u{e9}");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let fields = extract(b"dev\xff\nresult: ok");
        assert_eq!(fields.device, "dev\u{fffd}");
        assert_eq!(fields.result, "ok");
    }

    proptest! {
        #[test]
        fn property_device_never_contains_newline(content in proptest::collection::vec(any::<u8>(), 0..256)) {
            let fields = extract(&content);
            prop_assert!(!fields.device.contains('\n'));
            prop_assert!(!fields.result.contains('\n'));
        }

        #[test]
        fn property_extract_is_deterministic(content in "\\PC{0,200}") {
            prop_assert_eq!(extract(content.as_bytes()), extract(content.as_bytes()));
        }
    }
}
