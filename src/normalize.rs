//! Text normalizer: raw extracted text → bounded [`ContextWindow`].
//!
//! Extraction output is noisy: page footers, stray page numbers, control
//! characters, hard-wrapped lines. The normalizer cleans that up and splits
//! the text into logical units (paragraphs and numbered clauses) kept in
//! source order, since the meaning of a legal document depends on it.
//!
//! When the units do not fit the character budget, the window keeps units
//! from the head and the tail of the document (definitions up front,
//! signatures and termination clauses at the back) and drops the middle.
//! A dropped range is rendered as an omission marker and the window is
//! flagged `truncated` so the answer can carry a partial-context caveat.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{render_units, ContextUnit, ContextWindow};

/// `Page 3 of 12` anywhere in a line.
static PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpage\s+\d+\s+of\s+\d+\b").unwrap());

/// A line that is only a page number: `7`, `- 7 -`, `Page 7`.
static PAGE_NUMBER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:-\s*)?(?:page\s+)?\d{1,4}(?:\s*-)?$").unwrap());

/// Start of a numbered clause: `1.`, `2.3`, `4)`, `(a)`, `(iv)`, `Section 5`.
static CLAUSE_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:\d{1,3}(?:\.\d{1,3})*[.)]|\d{1,3}(?:\.\d{1,3})+|\((?:[a-z]{1,4}|\d{1,3})\))\s+\S|(?i:(?:section|article|clause|schedule)\s+[0-9ivxlc]+)\b)",
    )
    .unwrap()
});

/// Appended to a unit that had to be cut to fit.
const CUT_SUFFIX: &str = " [...]";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("document contains no usable text")]
    NoContent,
}

/// Cleans raw text into blank-line separated units.
///
/// Idempotent: `normalize_text(&normalize_text(t)) == normalize_text(t)`.
pub fn normalize_text(raw: &str) -> String {
    segment(raw).join("\n\n")
}

/// Splits raw text into cleaned logical units, in source order.
///
/// A blank line ends a unit; a line that opens a numbered clause starts a
/// new one. Text without either boundary comes back as a single unit.
pub fn segment(raw: &str) -> Vec<String> {
    let text = raw.replace("\r\n", "\n").replace(['\r', '\x0c'], "\n");

    let mut units = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in text.split('\n') {
        let cleaned = clean_fragment(line);
        if cleaned.is_empty() {
            flush_unit(&mut current, &mut units);
            continue;
        }
        if is_page_artifact(&cleaned) {
            continue;
        }
        if CLAUSE_START.is_match(&cleaned) {
            flush_unit(&mut current, &mut units);
        }
        current.push(cleaned);
    }
    flush_unit(&mut current, &mut units);

    units
}

/// Normalizes raw text into a [`ContextWindow`] of at most `max_chars` rendered characters.
pub fn normalize(raw: &str, max_chars: usize) -> Result<ContextWindow, NormalizeError> {
    let units: Vec<ContextUnit> = segment(raw)
        .into_iter()
        .enumerate()
        .map(|(index, text)| ContextUnit { index, text })
        .collect();

    if units.is_empty() {
        return Err(NormalizeError::NoContent);
    }

    let total = units.len();
    let window = fit_units(&units, total, max_chars);
    if window.truncated {
        tracing::debug!(
            kept = window.units.len(),
            total,
            max_chars,
            "context window truncated"
        );
    }
    Ok(window)
}

/// Selects units so the rendered window fits in `max_chars`.
///
/// Alternates between the next unit from the head and the next from the
/// tail (head first), stopping at the first one that does not fit. If not
/// even the first unit fits, it is cut at a word boundary.
pub fn fit_units(units: &[ContextUnit], total_units: usize, max_chars: usize) -> ContextWindow {
    if render_units(units, total_units).chars().count() <= max_chars {
        return ContextWindow {
            units: units.to_vec(),
            total_units,
            truncated: units.len() < total_units,
        };
    }

    let mut head = 0usize;
    let mut tail = units.len();
    let mut take_head = true;

    while head < tail {
        let (next_head, next_tail) = if take_head {
            (head + 1, tail)
        } else {
            (head, tail - 1)
        };
        let candidate: Vec<ContextUnit> = units[..next_head]
            .iter()
            .chain(units[next_tail..].iter())
            .cloned()
            .collect();
        if render_units(&candidate, total_units).chars().count() > max_chars {
            break;
        }
        head = next_head;
        tail = next_tail;
        take_head = !take_head;
    }

    let selected: Vec<ContextUnit> = units[..head]
        .iter()
        .chain(units[tail..].iter())
        .cloned()
        .collect();

    let selected = if selected.is_empty() {
        cut_first_unit(&units[0], total_units, max_chars)
            .into_iter()
            .collect()
    } else {
        selected
    };

    ContextWindow {
        units: selected,
        total_units,
        truncated: true,
    }
}

fn cut_first_unit(unit: &ContextUnit, total_units: usize, max_chars: usize) -> Option<ContextUnit> {
    let shell = ContextUnit {
        index: unit.index,
        text: String::new(),
    };
    let overhead = render_units(std::slice::from_ref(&shell), total_units)
        .chars()
        .count()
        + CUT_SUFFIX.chars().count();
    let room = max_chars.checked_sub(overhead).filter(|r| *r > 0)?;

    let prefix: String = unit.text.chars().take(room).collect();
    // Prefer cutting at a word boundary
    let cut = match prefix.rfind(' ') {
        Some(pos) if pos > 0 => prefix[..pos].trim_end().to_string(),
        _ => prefix,
    };
    Some(ContextUnit {
        index: unit.index,
        text: format!("{}{}", cut, CUT_SUFFIX),
    })
}

fn flush_unit(current: &mut Vec<String>, units: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    // Joining wrapped lines can complete a page marker split across them
    let unit = clean_fragment(&current.join(" "));
    current.clear();
    if !unit.is_empty() && !is_page_artifact(&unit) {
        units.push(unit);
    }
}

/// Strips invisible characters and page markers and collapses whitespace.
/// Runs to a fixpoint so that cleaning cleaned text is a no-op.
fn clean_fragment(s: &str) -> String {
    let mut out: String = s
        .chars()
        .filter(|c| c.is_whitespace() || !is_invisible(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    loop {
        let stripped = PAGE_MARKER.replace_all(&out, " ");
        let next = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if next == out {
            return out;
        }
        out = next;
    }
}

fn is_invisible(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '\u{00AD}' | '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}'
        )
}

fn is_page_artifact(cleaned: &str) -> bool {
    PAGE_NUMBER_LINE.is_match(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units_of(len: usize, count: usize) -> String {
        (0..count)
            .map(|i| format!("{:02} {}", i, "x".repeat(len - 3)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn indices(window: &ContextWindow) -> Vec<usize> {
        window.units.iter().map(|u| u.index).collect()
    }

    #[test]
    fn empty_input_is_no_content() {
        assert_eq!(normalize("", 100), Err(NormalizeError::NoContent));
        assert_eq!(normalize(" \n\t\n ", 100), Err(NormalizeError::NoContent));
        assert_eq!(
            normalize("Page 1 of 2\n\n2\n\x0c", 100),
            Err(NormalizeError::NoContent)
        );
    }

    #[test]
    fn collapses_whitespace_and_strips_controls() {
        let raw = "This   Agreement\u{0007} is made\u{200B}   between\tthe parties.";
        assert_eq!(
            normalize_text(raw),
            "This Agreement is made between the parties."
        );
    }

    #[test]
    fn joins_wrapped_lines_into_one_unit() {
        let raw = "The Tenant shall pay rent\non the first day of\neach month.";
        assert_eq!(
            segment(raw),
            vec!["The Tenant shall pay rent on the first day of each month."]
        );
    }

    #[test]
    fn removes_page_markers_and_numbers() {
        let raw = "Definitions apply.\nPage 1 of 3\n\n2\n\nTerm is one year. Page 2 of 3";
        assert_eq!(
            segment(raw),
            vec!["Definitions apply.", "Term is one year."]
        );
    }

    #[test]
    fn page_marker_split_across_lines_is_removed() {
        let raw = "Rent is due. Page 4\nof 9 Late fees apply.";
        assert_eq!(segment(raw), vec!["Rent is due. Late fees apply."]);
    }

    #[test]
    fn numbered_clauses_start_new_units() {
        let raw = "1. Term. The lease runs one year.\n2. Rent. Payable monthly.\n(a) by transfer;\n(b) by cheque.\nSection 3 Deposit held in trust.\nARTICLE IV Notices.";
        assert_eq!(
            segment(raw),
            vec![
                "1. Term. The lease runs one year.",
                "2. Rent. Payable monthly.",
                "(a) by transfer;",
                "(b) by cheque.",
                "Section 3 Deposit held in trust.",
                "ARTICLE IV Notices.",
            ]
        );
    }

    #[test]
    fn text_without_boundaries_is_one_unit() {
        let raw = "no paragraph breaks here just a long run of text";
        assert_eq!(segment(raw).len(), 1);
    }

    #[test]
    fn form_feed_acts_as_line_break() {
        let raw = "first page ends\x0csecond page begins";
        assert_eq!(segment(raw), vec!["first page ends second page begins"]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "",
            "Plain.",
            "  1.  Term\n\n\n2.   Rent\r\n(a) monthly\x0cPage 1 of 2\n7\n",
            "A\u{FEFF}B  C\n\nPage 3\n\n- 4 -\n\nSection 9 Notices. PagPage 1 of 2e 1 of 2 end",
            "Clause 4 Liability\n\n\u{0000}\u{0001}\n\nArticle IV Governing law",
            "word Page\n1 of 2\n\n12",
        ];
        for raw in samples {
            let once = normalize_text(raw);
            let twice = normalize_text(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn fits_without_truncation() {
        let raw = units_of(100, 5);
        let window = normalize(&raw, 10_000).unwrap();
        assert!(!window.truncated);
        assert_eq!(indices(&window), vec![0, 1, 2, 3, 4]);
        assert_eq!(window.render(), normalize_text(&raw));
    }

    #[test]
    fn keeps_head_and_tail_units_in_order() {
        // 10 units of 500 chars (5000 chars) into a 2000 char budget
        let raw = units_of(500, 10);
        let window = normalize(&raw, 2000).unwrap();
        assert!(window.truncated);
        assert_eq!(indices(&window), vec![0, 1, 9]);
        assert!(window.char_len() <= 2000);
        assert!(window.render().contains("[... 7 sections omitted ...]"));
    }

    #[test]
    fn first_four_and_last_four() {
        let raw = units_of(230, 10);
        let window = normalize(&raw, 2000).unwrap();
        assert!(window.truncated);
        assert_eq!(indices(&window), vec![0, 1, 2, 3, 6, 7, 8, 9]);
        assert!(window.char_len() <= 2000);
    }

    #[test]
    fn truncation_is_deterministic() {
        let raw = units_of(300, 12);
        let a = normalize(&raw, 1500).unwrap();
        let b = normalize(&raw, 1500).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn oversized_single_unit_is_cut_at_word_boundary() {
        let raw = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let window = normalize(raw, 30).unwrap();
        assert!(window.truncated);
        assert_eq!(window.units.len(), 1);
        let text = &window.units[0].text;
        assert!(text.ends_with(" [...]"));
        assert!(text.starts_with("alpha beta"));
        assert!(window.char_len() <= 30);
    }

    #[test]
    fn budget_too_small_for_anything_yields_empty_window() {
        let window = normalize(&units_of(100, 3), 5).unwrap();
        assert!(window.is_empty());
        assert!(window.truncated);
    }

    #[test]
    fn refit_keeps_original_indices() {
        let raw = units_of(100, 6);
        let window = normalize(&raw, 10_000).unwrap();
        let refit = fit_units(&window.units, window.total_units, 350);
        assert!(refit.truncated);
        assert_eq!(indices(&refit), vec![0, 1, 5]);
        assert!(refit.char_len() <= 350);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let raw = "§ ".repeat(20);
        let window = normalize(&raw, 39).unwrap();
        assert!(!window.truncated);
    }

    mod generated {
        use super::*;
        use proptest::prelude::*;

        /// Fragments extraction output is made of, page furniture included.
        const PIECES: &[&str] = &[
            "\n",
            "\n\n",
            "\r\n",
            "\r",
            "\x0c",
            "\u{200B}",
            "\u{FEFF}",
            "\u{00AD}",
            "\t",
            "  ",
            "Page ",
            " of ",
            "Page 1 of 2",
            "page 3",
            "- 4 -",
            "12",
            "7\n",
            "1. ",
            "2.3 ",
            "4) ",
            "(a) ",
            "(iv) ",
            "Section 5 ",
            "ARTICLE IV ",
            "Term.",
            "The Tenant shall pay rent.",
            "terminates after 12 months",
        ];

        fn piece() -> impl Strategy<Value = String> {
            prop_oneof![
                4 => prop::sample::select(PIECES).prop_map(str::to_string),
                2 => "[a-zA-Z0-9 .()-]{0,12}",
                1 => any::<char>().prop_map(String::from),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(2000))]

            #[test]
            fn normalize_text_is_idempotent(pieces in prop::collection::vec(piece(), 0..60)) {
                let once = normalize_text(&pieces.concat());
                prop_assert_eq!(normalize_text(&once), once);
            }

            #[test]
            fn segments_are_clean_single_lines(pieces in prop::collection::vec(piece(), 0..60)) {
                for unit in segment(&pieces.concat()) {
                    prop_assert!(!unit.is_empty());
                    prop_assert!(!unit.contains('\n'));
                    prop_assert_eq!(unit.trim(), unit.as_str());
                    prop_assert!(!unit.contains("  "));
                    prop_assert!(!is_page_artifact(&unit));
                }
            }
        }
    }
}
