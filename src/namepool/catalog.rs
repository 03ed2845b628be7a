//! Custom, file-backed name catalogs.
//!
//! A catalog is a text file under `<rig>/settings/themes/<theme>.txt` with one
//! name per line. Blank lines and `#` comments are skipped.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::NamePoolError;
use super::themes::is_reserved;

/// Directory holding custom catalogs, relative to the rig root.
pub const THEMES_DIR: &str = "settings/themes";

/// Raw line budget for a catalog file.
pub const MAX_CATALOG_LINES: usize = 1000;

/// Lowercase alphanumerics and hyphens, starting with a letter, longer than 3.
pub fn is_valid_name(name: &str) -> bool {
    name.len() > 3
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Theme names double as file stems, so they get the same character rules.
fn is_valid_theme_name(theme: &str) -> bool {
    !theme.is_empty()
        && theme
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

pub fn catalog_path(rig_root: &Path, theme: &str) -> PathBuf {
    rig_root.join(THEMES_DIR).join(format!("{theme}.txt"))
}

/// Load a custom catalog. `Ok(None)` when no catalog file exists for `theme`.
pub fn load_catalog(rig_root: &Path, theme: &str) -> Result<Option<Vec<String>>, NamePoolError> {
    if !is_valid_theme_name(theme) {
        return Ok(None);
    }
    let path = catalog_path(rig_root, theme);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path).map_err(|source| NamePoolError::Io {
        path: path.clone(),
        source,
    })?;
    parse_catalog(theme, &contents).map(Some)
}

/// Validate and normalize catalog text into an ordered, de-duplicated name list.
pub fn parse_catalog(theme: &str, contents: &str) -> Result<Vec<String>, NamePoolError> {
    let lines = contents.lines().count();
    if lines > MAX_CATALOG_LINES {
        return Err(NamePoolError::CatalogTooLarge {
            theme: theme.to_string(),
            lines,
            max: MAX_CATALOG_LINES,
        });
    }

    normalize_names(theme, contents.lines())
}

/// Trim, lowercase, validate, and de-duplicate candidate names in order.
///
/// Blank entries and `#` comments are skipped; invalid and reserved names are
/// dropped. `EmptyTheme` when nothing usable remains.
pub fn normalize_names<'a>(
    theme: &str,
    raw: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<String>, NamePoolError> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for entry in raw {
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        let name = entry.to_lowercase();
        if !is_valid_name(&name) {
            tracing::debug!(theme, name, "skipping invalid name");
            continue;
        }
        if is_reserved(&name) {
            tracing::warn!(theme, name, "name is reserved for infrastructure; skipping");
            continue;
        }
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }

    if names.is_empty() {
        return Err(NamePoolError::EmptyTheme(theme.to_string()));
    }
    Ok(names)
}

/// Custom catalogs present on disk for this rig, sorted.
pub fn list_custom_themes(rig_root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(rig_root.join(THEMES_DIR)) else {
        return Vec::new();
    };
    let mut themes: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .filter(|stem| is_valid_theme_name(stem))
        .collect();
    themes.sort();
    themes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(is_valid_name("alpha"));
        assert!(is_valid_name("war-rig2"));
        assert!(!is_valid_name("abc"));
        assert!(!is_valid_name("2fast"));
        assert!(!is_valid_name("-dash"));
        assert!(!is_valid_name("Upper"));
        assert!(!is_valid_name("under_score"));
        assert!(!is_valid_name("with space"));
    }

    #[test]
    fn parse_normalizes_and_filters() {
        let text = "# crew for the night shift\n\nAlpha\nbravo\nalpha\nabc\nwitness\n  charlie-2  \nbad_name\n";
        let names = parse_catalog("night", text).unwrap();
        assert_eq!(names, vec!["alpha", "bravo", "charlie-2"]);
    }

    #[test]
    fn parse_rejects_empty_catalog() {
        let err = parse_catalog("void", "# nothing here\n\nxy\nmayor\n").unwrap_err();
        assert!(matches!(err, NamePoolError::EmptyTheme(ref t) if t == "void"));
    }

    #[test]
    fn numeric_names_never_enter_a_theme() {
        let names = normalize_names("inline", ["alpha", "4", "17", "Bravo"]).unwrap();
        assert_eq!(names, vec!["alpha", "bravo"]);
        assert!(matches!(
            normalize_names("inline", ["4", "5"]),
            Err(NamePoolError::EmptyTheme(_))
        ));
    }

    #[test]
    fn parse_rejects_oversized_catalog() {
        let text = "name\n".repeat(MAX_CATALOG_LINES + 1);
        let err = parse_catalog("huge", &text).unwrap_err();
        assert!(matches!(err, NamePoolError::CatalogTooLarge { lines, .. } if lines == MAX_CATALOG_LINES + 1));
    }

    #[test]
    fn load_from_rig_settings() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_catalog(dir.path(), "birds").unwrap().is_none());

        std::fs::create_dir_all(dir.path().join(THEMES_DIR)).unwrap();
        std::fs::write(catalog_path(dir.path(), "birds"), "heron\nkestrel\n").unwrap();
        std::fs::write(dir.path().join(THEMES_DIR).join("notes.md"), "ignored").unwrap();

        let names = load_catalog(dir.path(), "birds").unwrap().unwrap();
        assert_eq!(names, vec!["heron", "kestrel"]);
        assert_eq!(list_custom_themes(dir.path()), vec!["birds"]);
    }

    #[test]
    fn theme_names_cannot_escape_settings_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_catalog(dir.path(), "../secrets").unwrap().is_none());
        assert!(load_catalog(dir.path(), "").unwrap().is_none());
    }
}
