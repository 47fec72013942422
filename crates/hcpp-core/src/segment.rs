//! Line-aligned splitting of policy text into word-budgeted segments.

/// Default word budget per policy segment.
pub const DEFAULT_MAX_WORDS: usize = 250;

/// Group the lines of `text` into runs whose word count stays within `max_words`.
///
/// Lines are never split. A line that would push the running count over the
/// budget closes the current group and opens the next one, so a single line
/// longer than the budget yields an over-budget group of its own.
pub fn group_lines(text: &str, max_words: usize) -> Vec<Vec<&str>> {
    let mut groups = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut word_count = 0usize;

    for line in text.split('\n') {
        let words = line.split_whitespace().count();
        if word_count + words > max_words && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
            word_count = 0;
        }
        current.push(line);
        word_count += words;
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Split policy text into segments, joining each group's lines with single spaces.
pub fn segment_policy(text: &str, max_words: usize) -> Vec<String> {
    group_lines(text, max_words)
        .into_iter()
        .map(|lines| lines.join(" "))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    #[test]
    fn fits_in_one_segment() {
        let text = "We collect steps.\nWe never sell data.";
        assert_eq!(
            segment_policy(text, 250),
            vec!["We collect steps. We never sell data."]
        );
    }

    #[test]
    fn closes_segment_when_budget_exceeded() {
        let text = format!("{}\n{}\n{}", words(3), words(2), words(2));
        let segs = segment_policy(&text, 5);
        assert_eq!(segs, vec![format!("{} {}", words(3), words(2)), words(2)]);
    }

    #[test]
    fn exact_budget_stays_in_segment() {
        let text = format!("{}\n{}", words(2), words(3));
        assert_eq!(segment_policy(&text, 5).len(), 1);
    }

    #[test]
    fn oversized_line_is_not_clamped() {
        let text = format!("{}\n{}\n{}", words(1), words(10), words(1));
        let groups = group_lines(&text, 4);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1][0].split_whitespace().count(), 10);
    }

    #[test]
    fn leading_oversized_line_has_no_empty_segment() {
        let text = format!("{}\nshort", words(10));
        let segs = segment_policy(&text, 4);
        assert_eq!(segs, vec![words(10), "short".to_string()]);
    }

    #[test]
    fn empty_text_is_one_empty_segment() {
        assert_eq!(segment_policy("", 250), vec![String::new()]);
    }

    proptest! {
        #[test]
        fn rejoining_groups_restores_lines(
            lines in proptest::collection::vec("[a-z ]{0,40}", 1..30),
            max_words in 1usize..20,
        ) {
            let text = lines.join("\n");
            let groups = group_lines(&text, max_words);
            let flat: Vec<&str> = groups.iter().flatten().copied().collect();
            let original: Vec<&str> = text.split('\n').collect();
            prop_assert_eq!(&flat, &original);

            let segs = segment_policy(&text, max_words);
            prop_assert_eq!(segs.join(" "), original.join(" "));
        }

        #[test]
        fn multi_line_groups_respect_budget(
            lines in proptest::collection::vec("[a-z ]{0,40}", 1..30),
            max_words in 1usize..20,
        ) {
            let text = lines.join("\n");
            for group in group_lines(&text, max_words) {
                let total: usize = group.iter().map(|l| l.split_whitespace().count()).sum();
                prop_assert!(group.len() == 1 || total <= max_words);
            }
        }
    }
}
