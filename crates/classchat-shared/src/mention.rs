//! Mention highlighting.
//!
//! Message text is split on whitespace and every token containing
//! `@<self name>` is tagged as a mention. The substring test is deliberate:
//! `@bob,` and `(@bob)` are mentions too. Whitespace is kept in the
//! neighbouring plain runs so the runs concatenate back to the input.

use crate::constants::MENTION_PREFIX;
use crate::types::{RunKind, TextRun};

/// Split `content` into plain and mention runs for `self_name`.
///
/// The needle is always `@<self_name>`, so an empty name flags every token
/// containing `@`. Empty content yields no runs.
pub fn tag(content: &str, self_name: &str) -> Vec<TextRun> {
    let mut runs: Vec<TextRun> = Vec::new();
    let needle = format!("{MENTION_PREFIX}{self_name}");
    for (segment, is_space) in segments(content) {
        let kind = if !is_space && segment.contains(&needle) {
            RunKind::Mention
        } else {
            RunKind::Plain
        };
        push_run(&mut runs, segment, kind);
    }
    runs
}

/// Whether any token of `content` mentions `self_name`.
pub fn mentions(content: &str, self_name: &str) -> bool {
    tag(content, self_name).iter().any(TextRun::is_mention)
}

/// Join runs back into display text.
pub fn concat(runs: &[TextRun]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect()
}

fn push_run(runs: &mut Vec<TextRun>, text: &str, kind: RunKind) {
    // Plain text merges into a preceding plain run; mentions stay separate.
    if kind == RunKind::Plain {
        if let Some(last) = runs.last_mut() {
            if last.kind == RunKind::Plain {
                last.text.push_str(text);
                return;
            }
        }
    }
    runs.push(TextRun {
        text: text.to_string(),
        kind,
    });
}

/// Alternating whitespace / non-whitespace slices covering all of `s`.
fn segments(s: &str) -> impl Iterator<Item = (&str, bool)> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let is_space = first.is_whitespace();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_whitespace() != is_space)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (segment, tail) = rest.split_at(end);
        rest = tail;
        Some((segment, is_space))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_mention_in_middle() {
        let runs = tag("hi @bob how are you", "bob");
        assert_eq!(
            runs,
            vec![
                TextRun::plain("hi "),
                TextRun::mention("@bob"),
                TextRun::plain(" how are you"),
            ]
        );
        assert_eq!(concat(&runs), "hi @bob how are you");
    }

    #[test]
    fn test_tag_keeps_trailing_punctuation() {
        let runs = tag("thanks @bob!", "bob");
        assert_eq!(
            runs,
            vec![TextRun::plain("thanks "), TextRun::mention("@bob!")]
        );
    }

    #[test]
    fn test_tag_substring_match_inside_token() {
        // Longer names that start with the self name are still flagged.
        let runs = tag("ping @bobby", "bob");
        assert_eq!(runs[1], TextRun::mention("@bobby"));
    }

    #[test]
    fn test_tag_adjacent_mentions() {
        let runs = tag("@bob @bob", "bob");
        assert_eq!(
            runs,
            vec![
                TextRun::mention("@bob"),
                TextRun::plain(" "),
                TextRun::mention("@bob"),
            ]
        );
    }

    #[test]
    fn test_tag_no_mention_is_single_plain_run() {
        let runs = tag("hello  there\tclass", "bob");
        assert_eq!(runs, vec![TextRun::plain("hello  there\tclass")]);
    }

    #[test]
    fn test_tag_preserves_irregular_whitespace() {
        let input = "  @bob\n\nsee   you ";
        let runs = tag(input, "bob");
        assert_eq!(concat(&runs), input);
        assert_eq!(runs[0], TextRun::plain("  "));
        assert_eq!(runs[1], TextRun::mention("@bob"));
    }

    #[test]
    fn test_tag_other_users_are_plain() {
        assert!(!mentions("hey @alice", "bob"));
        assert!(mentions("hey @alice and @bob", "bob"));
    }

    #[test]
    fn test_tag_empty_content() {
        assert!(tag("", "bob").is_empty());
        assert!(tag("", "").is_empty());
    }

    #[test]
    fn test_tag_empty_name_flags_bare_at_tokens() {
        assert_eq!(
            tag("email me @ noon", ""),
            vec![
                TextRun::plain("email me "),
                TextRun::mention("@"),
                TextRun::plain(" noon"),
            ]
        );
        assert!(mentions("ask@school", ""));
        assert!(!mentions("no handles here", ""));
    }

    #[test]
    fn test_tag_is_deterministic() {
        let input = "@bob: can you check @bob's work?";
        assert_eq!(tag(input, "bob"), tag(input, "bob"));
    }
}
