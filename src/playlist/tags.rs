//! Tolerant M3U8 tokenizer (spec §4.1): splits playlist text into a
//! sequence of classified lines with 1-based line numbers, which the
//! parser then folds into the playlist value types.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Line<'a> {
    /// `#EXT-X-FOO:attr=val,...` or a bare `#EXT-X-FOO` tag. `value` is the
    /// text after the first `:`, or empty if there was none.
    Tag { name: &'a str, value: &'a str },
    /// A non-`#` line: a segment/variant URI.
    Uri(&'a str),
    /// A `#` comment that isn't a recognized `#EXT-*` tag — ignored per §4.1
    /// ("any other tag is ignored").
    Comment,
    Blank,
}

/// Classify every line of `text`, pairing each with its 1-based line number.
pub(crate) fn tokenize(text: &str) -> Vec<(usize, Line<'_>)> {
    text.lines()
        .enumerate()
        .map(|(i, raw)| (i + 1, classify(raw)))
        .collect()
}

fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim_end_matches('\r');
    if line.trim().is_empty() {
        return Line::Blank;
    }
    if let Some(rest) = line.strip_prefix('#') {
        if rest.starts_with("EXT") {
            return match rest.split_once(':') {
                Some((name, value)) => Line::Tag { name, value },
                None => Line::Tag {
                    name: rest,
                    value: "",
                },
            };
        }
        return Line::Comment;
    }
    Line::Uri(line.trim())
}
