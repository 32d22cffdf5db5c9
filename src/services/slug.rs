//! Slug derivation for post titles
//!
//! Slugs are plain ASCII: other scripts are transliterated first, so
//! `Привет мир` becomes `privet-mir`.

use deunicode::deunicode;

/// Longest slug the posts table accepts
pub const MAX_SLUG_LEN: usize = 150;

/// Substituted in place, with no separator added around the word
const REPLACEMENTS: &[(char, &str)] = &[('|', "or"), ('%', "percent")];

/// Derive a URL slug from a title.
///
/// Applies [`REPLACEMENTS`], transliterates to ASCII and lowercases. Runs of
/// anything other than ASCII letters and digits become one hyphen, with none
/// at either end. The result is cut to [`MAX_SLUG_LEN`] characters.
///
/// ```ignore
/// assert_eq!(slugify("Rust | Go: 100% fun"), "rust-or-go-100percent-fun");
/// ```
pub fn slugify(title: &str) -> String {
    let mut replaced = String::with_capacity(title.len());
    for c in title.chars() {
        match REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            Some((_, word)) => replaced.push_str(word),
            None => replaced.push(c),
        }
    }

    let ascii = deunicode(&replaced).to_ascii_lowercase();
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_hyphen = false;
    for c in ascii.chars() {
        if !c.is_ascii_alphanumeric() {
            pending_hyphen = true;
            continue;
        }
        if pending_hyphen && !slug.is_empty() {
            slug.push('-');
        }
        pending_hyphen = false;
        slug.push(c);
    }

    truncate(slug)
}

fn truncate(mut slug: String) -> String {
    // ASCII only, so bytes and chars agree
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug.truncate(slug.trim_end_matches('-').len());
    }
    slug
}
