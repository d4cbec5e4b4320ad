use crate::config::LanguagePreference;
use crate::error::{Error, Result};
use crate::queries::Queries;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const TEXT_DIR: &str = "t";
const FILE_PREFIX: &str = "0001";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileNumber {
    /// `0001.xml`, the language-neutral base file.
    Wildcard,
    Number(String),
    Unknown,
}

impl fmt::Display for FileNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileNumber::Wildcard => f.write_str("*"),
            FileNumber::Number(number) => f.write_str(number),
            FileNumber::Unknown => f.write_str("Unknown"),
        }
    }
}

impl FileNumber {
    pub fn from_file_name(name: &str, queries: &Queries) -> Self {
        if name == "0001.xml" {
            return FileNumber::Wildcard;
        }
        queries
            .language_files
            .iter()
            .find_map(|pattern| pattern.captures(name))
            .and_then(|captures| captures.get(1))
            .map(|digits| {
                let trimmed = digits.as_str().trim_start_matches('0');
                FileNumber::Number(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
            })
            .unwrap_or(FileNumber::Unknown)
    }

    fn is(&self, number: &str) -> bool {
        matches!(self, FileNumber::Number(own) if own == number)
    }
}

/// Either `<language><page>...` or `<diff><add><page>...`.
#[derive(Debug, Default, Deserialize)]
struct LanguageDocument {
    #[serde(default)]
    page: Vec<Page>,
    #[serde(default)]
    add: Vec<DiffAdd>,
}

#[derive(Debug, Deserialize)]
struct DiffAdd {
    #[serde(default)]
    page: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(rename = "@id")]
    id: String,
    #[serde(default)]
    t: Vec<TextEntry>,
}

#[derive(Debug, Deserialize)]
struct TextEntry {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "$text", default)]
    body: String,
}

#[derive(Debug)]
pub struct LanguageFile {
    number: FileNumber,
    pages: HashMap<String, HashMap<String, String>>,
}

impl LanguageFile {
    pub fn parse(path: &Path, text: &str, queries: &Queries) -> Result<Self> {
        let document: LanguageDocument =
            quick_xml::de::from_str(text).map_err(|err| Error::deserialize(path, err))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut pages: HashMap<String, HashMap<String, String>> = HashMap::new();
        let all_pages = document
            .page
            .into_iter()
            .chain(document.add.into_iter().flat_map(|add| add.page));
        for page in all_pages {
            let texts = pages.entry(page.id).or_default();
            for entry in page.t {
                texts.entry(entry.id).or_insert(entry.body);
            }
        }

        Ok(Self {
            number: FileNumber::from_file_name(&name, queries),
            pages,
        })
    }

    pub fn number(&self) -> &FileNumber {
        &self.number
    }

    pub fn text(&self, page_id: &str, text_id: &str) -> Option<&str> {
        self.pages.get(page_id)?.get(text_id).map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct LanguageStore {
    files: Vec<LanguageFile>,
}

impl LanguageStore {
    /// Reads `<root>/t` and `<extensions>/*/t`. Unreadable files are pushed
    /// to `problems` and skipped.
    pub fn load(
        root: Option<&Path>,
        extensions: Option<&Path>,
        queries: &Queries,
        problems: &mut Vec<Error>,
    ) -> Self {
        let mut text_dirs = Vec::new();
        if let Some(root) = root {
            text_dirs.push(root.join(TEXT_DIR));
        }
        if let Some(extensions) = extensions {
            text_dirs.extend(
                WalkDir::new(extensions)
                    .min_depth(1)
                    .max_depth(1)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_dir())
                    .map(|entry| entry.into_path().join(TEXT_DIR)),
            );
        }

        let mut store = Self::default();
        let mut scanned = 0;
        for dir in text_dirs.iter().filter(|dir| dir.is_dir()) {
            scanned += 1;
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
            {
                let name = entry.file_name().to_string_lossy();
                if !entry.file_type().is_file()
                    || !name.starts_with(FILE_PREFIX)
                    || !name.ends_with(".xml")
                {
                    continue;
                }
                match store.read_file(entry.path(), queries) {
                    Ok(()) => debug!(path = %entry.path().display(), "loaded language file"),
                    Err(err) => {
                        warn!(error = %err, "skipping language file");
                        problems.push(err);
                    }
                }
            }
        }

        info!(
            files = store.files.len(),
            directories = scanned,
            "loaded language files"
        );
        store
    }

    fn read_file(&mut self, path: &Path, queries: &Queries) -> Result<()> {
        let text = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        self.insert(LanguageFile::parse(path, &text, queries)?);
        Ok(())
    }

    pub fn insert(&mut self, file: LanguageFile) {
        self.files.push(file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every translation of `{page_id,text_id}`, one block per file with each
    /// line tagged by the file's number. Empty when nothing matches.
    pub fn lookup(&self, page_id: &str, text_id: &str, preference: &LanguagePreference) -> String {
        let mut matches: Vec<(&FileNumber, &str)> = self
            .files
            .iter()
            .filter_map(|file| Some((file.number(), file.text(page_id, text_id)?)))
            .collect();

        if preference.limit {
            let preferred: Vec<_> = matches
                .iter()
                .copied()
                .filter(|(number, _)| number.is(&preference.preferred))
                .collect();
            matches = if preferred.is_empty() {
                matches
                    .into_iter()
                    .filter(|(number, _)| **number == FileNumber::Wildcard)
                    .collect()
            } else {
                preferred
            };
        }

        matches.sort_by(|(a, _), (b, _)| {
            match (a.is(&preference.preferred), b.is(&preference.preferred)) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => a.to_string().cmp(&b.to_string()),
            }
        });

        matches
            .iter()
            .map(|(number, body)| {
                body.split('\n')
                    .map(|line| format!("{number}: {line}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn language_file(name: &str, body: &str) -> LanguageFile {
        let xml = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<language id="44"><page id="1001" title="Interface"><t id="7">{body}</t></page></language>"#
        );
        LanguageFile::parse(Path::new(name), &xml, &Queries::new()).unwrap()
    }

    fn preference(preferred: &str, limit: bool) -> LanguagePreference {
        LanguagePreference {
            preferred: preferred.into(),
            limit,
        }
    }

    fn number(name: &str) -> FileNumber {
        FileNumber::from_file_name(name, &Queries::new())
    }

    #[test]
    fn derives_file_numbers() {
        assert_eq!(number("0001.xml"), FileNumber::Wildcard);
        assert_eq!(
            number("0001-l049.xml"),
            FileNumber::Number("49".into())
        );
        assert_eq!(
            number("0001-0086.xml"),
            FileNumber::Number("86".into())
        );
        assert_eq!(
            number("0001-l044-patch.xml"),
            FileNumber::Number("44".into())
        );
        assert_eq!(number("0001-en.xml"), FileNumber::Unknown);
    }

    #[test]
    fn orders_wildcard_before_other_numbers() {
        let mut store = LanguageStore::default();
        store.insert(language_file("0001-49.xml", "Bonjour"));
        store.insert(language_file("0001.xml", "Hello"));

        assert_eq!(
            store.lookup("1001", "7", &preference("44", false)),
            "*: Hello\n\n49: Bonjour"
        );
    }

    #[test]
    fn preferred_language_sorts_first() {
        let mut store = LanguageStore::default();
        store.insert(language_file("0001.xml", "Hello"));
        store.insert(language_file("0001-l049.xml", "Hallo"));

        assert_eq!(
            store.lookup("1001", "7", &preference("49", false)),
            "49: Hallo\n\n*: Hello"
        );
    }

    #[test]
    fn limiting_keeps_only_preferred_language() {
        let mut store = LanguageStore::default();
        store.insert(language_file("0001.xml", "Hello"));
        store.insert(language_file("0001-49.xml", "Bonjour"));

        assert_eq!(store.lookup("1001", "7", &preference("49", true)), "49: Bonjour");
        assert_eq!(store.lookup("1001", "7", &preference("33", true)), "*: Hello");
    }

    #[test]
    fn prefixes_every_line_and_misses_are_empty() {
        let mut store = LanguageStore::default();
        store.insert(language_file("0001-l007.xml", "first\nsecond"));

        assert_eq!(
            store.lookup("1001", "7", &preference("44", false)),
            "7: first\n7: second"
        );
        assert_eq!(store.lookup("1001", "8", &preference("44", false)), "");
        assert_eq!(store.lookup("2000", "7", &preference("44", false)), "");
    }

    #[test]
    fn reads_diff_shaped_files() {
        let xml = r#"<diff><add sel="/language"><page id="90000"><t id="1">Mod text</t></page></add></diff>"#;
        let file = LanguageFile::parse(Path::new("0001-l044.xml"), xml, &Queries::new()).unwrap();
        assert_eq!(file.text("90000", "1"), Some("Mod text"));
        assert_eq!(file.number(), &FileNumber::Number("44".into()));
    }

    #[test]
    fn loads_root_and_extension_directories() {
        let root = tempfile::tempdir().unwrap();
        let extensions = tempfile::tempdir().unwrap();
        let root_t = root.path().join("t");
        let ext_t = extensions.path().join("my_mod").join("t");
        std::fs::create_dir_all(&root_t).unwrap();
        std::fs::create_dir_all(&ext_t).unwrap();

        std::fs::write(
            root_t.join("0001-l044.xml"),
            r#"<language id="44"><page id="1"><t id="1">Base</t></page></language>"#,
        )
        .unwrap();
        std::fs::write(root_t.join("0002-l044.xml"), "<language/>").unwrap();
        std::fs::write(root_t.join("0001-l049.xml"), "<language><page").unwrap();
        std::fs::write(
            ext_t.join("0001.xml"),
            r#"<diff><add sel="/language"><page id="1"><t id="1">Mod</t></page></add></diff>"#,
        )
        .unwrap();

        let mut problems = Vec::new();
        let store = LanguageStore::load(
            Some(root.path()),
            Some(extensions.path()),
            &Queries::new(),
            &mut problems,
        );

        assert_eq!(store.len(), 2);
        assert_eq!(problems.len(), 1);
        assert_eq!(
            store.lookup("1", "1", &preference("44", false)),
            "44: Base\n\n*: Mod"
        );
    }
}
