//! Text helpers for slugs and keyword matching.

const MAX_SLUG_LEN: usize = 80;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "you", "your", "are", "from", "this", "that", "how", "what",
    "why", "best", "top", "all", "new", "our", "can", "will", "into", "about", "its", "not",
    "but", "has", "have", "was", "were", "who", "guide", "tips", "ways",
];

/// Lowercase ASCII slug: runs of non-alphanumerics collapse to a single `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    slug
}

/// Append `-2`, `-3`, ... to `base` until `taken` reports it free.
pub fn unique_slug(base: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    let base = if base.is_empty() { "article" } else { base };
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Lowercase keyword tokens with stop words and short tokens removed.
/// Order of first occurrence is kept, duplicates dropped.
pub fn keywords(input: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in input.split(|c: char| !c.is_alphanumeric()) {
        if raw.chars().count() < 3 {
            continue;
        }
        let token = raw.to_lowercase();
        if STOP_WORDS.contains(&token.as_str()) || out.contains(&token) {
            continue;
        }
        out.push(token);
    }
    out
}

/// Split a comma separated list, trimming and dropping empty entries.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("  10 Best Running Shoes -- 2024!  "), "10-best-running-shoes-2024");
        assert_eq!(slugify("Café & Crème"), "caf-cr-me");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_truncates_without_trailing_dash() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_unique_slug_appends_counter() {
        let existing = ["shoes", "shoes-2"];
        let slug = unique_slug("shoes", |s| existing.contains(&s));
        assert_eq!(slug, "shoes-3");
        assert_eq!(unique_slug("bags", |s| existing.contains(&s)), "bags");
        assert_eq!(unique_slug("", |_| false), "article");
    }

    #[test]
    fn test_keywords_drops_stop_words_and_duplicates() {
        let tokens = keywords("The Best Running shoes for running on a TRAIL");
        assert_eq!(tokens, vec!["running", "shoes", "trail"]);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
