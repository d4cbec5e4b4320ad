use dashmap::DashMap;
use tower_lsp::lsp_types::{Location, Position, Range, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceKind {
    /// `<param name="...">` inside `<params>`.
    Declaration,
    Reference,
}

/// One place a script variable appears. The range covers the name only,
/// never the `$` sigil, so renames replace it with a bare name.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableOccurrence {
    pub uri: Url,
    pub range: Range,
    pub kind: OccurrenceKind,
}

impl VariableOccurrence {
    pub fn location(&self) -> Location {
        Location {
            uri: self.uri.clone(),
            range: self.range,
        }
    }

    pub fn contains(&self, uri: &Url, position: Position) -> bool {
        self.uri == *uri && range_contains(&self.range, position)
    }
}

pub(crate) fn range_contains(range: &Range, position: Position) -> bool {
    if position.line < range.start.line || position.line > range.end.line {
        return false;
    }
    if position.line == range.start.line && position.character < range.start.character {
        return false;
    }
    if position.line == range.end.line && position.character > range.end.character {
        return false;
    }
    true
}

pub fn normalize_variable(name: &str) -> &str {
    name.strip_prefix('$').unwrap_or(name)
}

#[derive(Debug, Default)]
pub struct VariableTracker {
    variables: DashMap<String, Vec<VariableOccurrence>>,
}

impl VariableTracker {
    pub fn clear_document(&self, uri: &Url) {
        for mut entry in self.variables.iter_mut() {
            entry
                .value_mut()
                .retain(|occurrence| occurrence.uri != *uri);
        }
        self.variables.retain(|_, occurrences| !occurrences.is_empty());
    }

    pub fn add(&self, name: &str, occurrence: VariableOccurrence) {
        self.variables
            .entry(normalize_variable(name).to_string())
            .or_default()
            .push(occurrence);
    }

    pub fn occurrences(&self, name: &str) -> Vec<VariableOccurrence> {
        self.variables
            .get(normalize_variable(name))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// The parameter declaration if there is one, else the first occurrence.
    pub fn declaration(&self, name: &str) -> Option<VariableOccurrence> {
        let entry = self.variables.get(normalize_variable(name))?;
        let occurrences = entry.value();
        occurrences
            .iter()
            .find(|occurrence| occurrence.kind == OccurrenceKind::Declaration)
            .or_else(|| occurrences.first())
            .cloned()
    }

    pub fn at_position(&self, uri: &Url, position: Position) -> Option<(String, VariableOccurrence)> {
        self.variables.iter().find_map(|entry| {
            entry
                .value()
                .iter()
                .find(|occurrence| occurrence.contains(uri, position))
                .map(|occurrence| (entry.key().clone(), occurrence.clone()))
        })
    }

    /// Moves all occurrences of `old` under `new`, appending to any that
    /// already exist there. Returns how many occurrences moved.
    pub fn rename(&self, old: &str, new: &str) -> usize {
        let (old, new) = (normalize_variable(old), normalize_variable(new));
        if old == new {
            return 0;
        }
        let Some((_, moved)) = self.variables.remove(old) else {
            return 0;
        };
        let count = moved.len();
        self.variables
            .entry(new.to_string())
            .or_default()
            .extend(moved);
        count
    }

    #[cfg(test)]
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}
