//! Path filter utilities for the walk.

use std::path::Path;

/// OS metadata files (Finder, Explorer, desktop environments) that are never worth hashing.
pub fn is_os_hidden_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    matches!(
        name,
        ".DS_Store" | ".AppleDouble" | ".LSOverride" | "Thumbs.db" | "ehthumbs.db" | "Desktop.ini"
    ) || name.starts_with("._")
        || name.starts_with(".Trash-")
}

/// True if `path` should be handed to the hashing stage.
/// Patterns are matched against the file name and the full path.
pub fn should_hash(path: &Path, exclude_patterns: &[String]) -> bool {
    if is_os_hidden_file(path) {
        return false;
    }
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return true,
    };
    let path_str = path.to_str().unwrap_or("");
    !exclude_patterns
        .iter()
        .any(|pattern| glob_match(pattern, name) || glob_match(pattern, path_str))
}

/// Minimal glob matching: `*` for any run of characters, `?` for one character.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_chars(&p, &t)
}

fn glob_match_chars(p: &[char], t: &[char]) -> bool {
    match p.split_first() {
        None => t.is_empty(),
        Some(('*', rest)) => (0..=t.len()).any(|skip| glob_match_chars(rest, &t[skip..])),
        Some(('?', rest)) => !t.is_empty() && glob_match_chars(rest, &t[1..]),
        Some((c, rest)) => t.first() == Some(c) && glob_match_chars(rest, &t[1..]),
    }
}
