use regex::Regex;

/// `$name` inside an attribute value.
const VARIABLE_PATTERN: &str = r"\$[A-Za-z_][A-Za-z0-9_]*";

/// `key="value"` or `key='value'` inside a raw start tag.
const ATTRIBUTE_PATTERN: &str = r#"([A-Za-z_][\w:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#;

/// Every way a script can point at a localized text entry. Each pattern
/// captures `page` and `line`.
const READ_TEXT_PATTERNS: [&str; 4] = [
    r"\{\s*(?P<page>\d+)\s*,\s*(?P<line>\d+)\s*\}",
    r"readtext\.\{(?P<page>\d+)\}\.\{(?P<line>\d+)\}",
    r#"page="(?P<page>\d+)"\s+line="(?P<line>\d+)""#,
    r"ReadText\s*\(\s*(?P<page>\d+)\s*,\s*(?P<line>\d+)\s*\)",
];

/// Language number from a localized text file name, most specific first.
const LANGUAGE_FILE_PATTERNS: [&str; 3] = [
    r"^0001-[a-zA-Z](\d+)\.xml$",
    r"^0001-(\d+)\.xml$",
    r"0001-?[a-zA-Z]?(\d+)",
];

pub struct Queries {
    pub variables: Regex,
    pub attributes: Regex,
    pub read_text: Vec<Regex>,
    pub language_files: Vec<Regex>,
}

impl Queries {
    pub fn new() -> Self {
        Self {
            variables: Regex::new(VARIABLE_PATTERN).expect("Bad variable pattern"),
            attributes: Regex::new(ATTRIBUTE_PATTERN).expect("Bad attribute pattern"),
            read_text: READ_TEXT_PATTERNS
                .iter()
                .map(|pattern| Regex::new(pattern).expect("Bad read-text pattern"))
                .collect(),
            language_files: LANGUAGE_FILE_PATTERNS
                .iter()
                .map(|pattern| Regex::new(pattern).expect("Bad language file pattern"))
                .collect(),
        }
    }
}

impl Default for Queries {
    fn default() -> Self {
        Self::new()
    }
}
