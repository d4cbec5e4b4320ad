use crate::text::Document;
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range as ByteRange;
use tower_lsp::lsp_types::{Location, Url};
use tracing::warn;

/// From the start of the matched tag's line to its closing `>`. The tag starts at `decl` if captured.
pub fn locate(pattern: &Regex, text: &str) -> Option<ByteRange<usize>> {
    let captures = pattern.captures(text)?;
    let tag_start = captures
        .name("decl")
        .or_else(|| captures.get(0))?
        .start();

    let line_start = text[..tag_start].rfind('\n').map_or(0, |idx| idx + 1);
    let tag_end = text[tag_start..]
        .find('>')
        .map_or(text.len(), |idx| tag_start + idx + 1);
    Some(line_start..tag_end)
}

fn element_pattern(tag: &str, name: &str) -> Option<Regex> {
    Regex::new(&format!(
        r#"<{}\s+name="{}""#,
        regex::escape(tag),
        regex::escape(name)
    ))
    .ok()
}

fn property_pattern(tag: &str, parent: &str, property: &str) -> Option<Regex> {
    Regex::new(&format!(
        r#"(?s)<{}\s+name="{}"[^>]*>.*?(?P<decl><property\s+name="{}")"#,
        regex::escape(tag),
        regex::escape(parent),
        regex::escape(property)
    ))
    .ok()
}

/// Runs `find` on `name`, then on what follows each successive `.`,
/// returning the first hit: `a.b.c`, then `b.c`, then `c`.
pub fn longest_suffix<T>(name: &str, mut find: impl FnMut(&str) -> Option<T>) -> Option<T> {
    let mut current = name;
    loop {
        if let Some(found) = find(current) {
            return Some(found);
        }
        let (_, rest) = current.split_once('.')?;
        current = rest;
    }
}

pub struct SchemaSource {
    uri: Url,
    document: Document,
}

impl SchemaSource {
    pub fn new(uri: Url, text: String) -> Self {
        Self {
            uri,
            document: Document::new(text, "xml"),
        }
    }

    fn location(&self, pattern: &Regex) -> Option<Location> {
        let span = locate(pattern, self.document.text())?;
        Some(Location {
            uri: self.uri.clone(),
            range: self.document.range_of(span),
        })
    }
}

#[derive(Debug, Default)]
pub struct DefinitionLocator {
    locations: HashMap<String, Location>,
}

impl DefinitionLocator {
    pub fn insert(&mut self, name: String, location: Location) {
        self.locations.insert(name, location);
    }

    pub fn add_element(&mut self, source: &SchemaSource, tag: &str, name: &str) -> bool {
        match element_pattern(tag, name).and_then(|pattern| source.location(&pattern)) {
            Some(location) => {
                self.insert(name.to_string(), location);
                true
            }
            None => {
                warn!(tag, name, "declaration not found in schema text");
                false
            }
        }
    }

    pub fn add_property(
        &mut self,
        source: &SchemaSource,
        tag: &str,
        parent: &str,
        property: &str,
    ) -> bool {
        match property_pattern(tag, parent, property).and_then(|pattern| source.location(&pattern)) {
            Some(location) => {
                self.insert(format!("{parent}.{property}"), location);
                true
            }
            None => {
                warn!(tag, parent, property, "property declaration not found, skipping");
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Location> {
        self.locations.get(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&Location> {
        longest_suffix(name, |candidate| self.locations.get(candidate))
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
