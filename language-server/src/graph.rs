use std::collections::{BTreeSet, HashMap};

/// The synthetic type that carries the boolean comparison literals.
pub const BOOLEAN: &str = "boolean";

const DATATYPE_MARKER: &str = "datatype";

const PRIMITIVE_NAMES: [&str; 6] = ["", "boolean", "int", "string", "list", DATATYPE_MARKER];

/// How a declared type name takes part in expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName<'a> {
    Primitive,
    Named(&'a str),
}

impl<'a> TypeName<'a> {
    pub fn classify(name: &'a str) -> Self {
        if PRIMITIVE_NAMES.contains(&name) {
            TypeName::Primitive
        } else {
            TypeName::Named(name)
        }
    }
}

pub fn escape_name(name: &str) -> String {
    name.replace('<', "&lt;").replace('>', "&gt;")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeEntry {
    properties: Vec<(String, String)>,
    supertype: Option<String>,
    literals: BTreeSet<String>,
}

impl TypeEntry {
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(name, ty)| (name.as_str(), ty.as_str()))
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, ty)| ty.as_str())
    }

    pub fn supertype(&self) -> Option<&str> {
        self.supertype.as_deref()
    }

    pub fn literals(&self) -> impl Iterator<Item = &str> {
        self.literals.iter().map(String::as_str)
    }

    fn set_property(&mut self, name: &str, ty: &str) {
        match self.properties.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, existing_ty)) => *existing_ty = ty.to_string(),
            None => self.properties.push((name.to_string(), ty.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolGraph {
    types: HashMap<String, TypeEntry>,
}

impl SymbolGraph {
    pub fn with_builtins() -> Self {
        let mut graph = Self::default();
        graph.add_literal(BOOLEAN, "==true");
        graph.add_literal(BOOLEAN, "==false");
        graph
    }

    fn entry_mut(&mut self, name: &str) -> &mut TypeEntry {
        self.types.entry(name.to_string()).or_default()
    }

    pub fn add_type(&mut self, name: &str, supertype: Option<&str>) {
        let entry = self.entry_mut(name);
        if let Some(supertype) = supertype.filter(|s| !s.is_empty() && *s != DATATYPE_MARKER) {
            entry.supertype = Some(supertype.to_string());
        }
    }

    /// Registers `type_name.property`; re-registering replaces the declared type.
    pub fn add_property(&mut self, type_name: &str, property: &str, property_type: Option<&str>) {
        self.entry_mut(type_name)
            .set_property(property, property_type.unwrap_or_default());
    }

    pub fn add_literal(&mut self, type_name: &str, value: &str) {
        self.entry_mut(type_name).literals.insert(value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&TypeEntry> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn property_type(&self, type_name: &str, property: &str) -> Option<&str> {
        self.get(type_name)?.property(property)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_round_trip_and_overwrite() {
        let mut graph = SymbolGraph::default();
        graph.add_property("ship", "pilot", Some("entity"));
        graph.add_property("ship", "hull", Some("largefloat"));
        assert_eq!(graph.property_type("ship", "pilot"), Some("entity"));

        graph.add_property("ship", "pilot", Some("npc"));
        let entry = graph.get("ship").unwrap();
        let properties: Vec<_> = entry.properties().collect();
        assert_eq!(properties, vec![("pilot", "npc"), ("hull", "largefloat")]);
    }

    #[test]
    fn absent_property_type_is_empty() {
        let mut graph = SymbolGraph::default();
        graph.add_property("player", "age", None);
        assert_eq!(graph.property_type("player", "age"), Some(""));
        assert_eq!(graph.property_type("player", "name"), None);
        assert_eq!(graph.property_type("nobody", "age"), None);
    }

    #[test]
    fn datatype_marker_is_not_a_supertype() {
        let mut graph = SymbolGraph::default();
        graph.add_type("component", Some("datatype"));
        graph.add_type("ship", Some("component"));
        assert_eq!(graph.get("component").unwrap().supertype(), None);
        assert_eq!(graph.get("ship").unwrap().supertype(), Some("component"));
    }

    #[test]
    fn literals_have_set_semantics() {
        let mut graph = SymbolGraph::with_builtins();
        graph.add_literal(BOOLEAN, "==true");
        graph.add_literal("race", "argon");
        graph.add_literal("race", "argon");

        let literals: Vec<_> = graph.get(BOOLEAN).unwrap().literals().collect();
        assert_eq!(literals, vec!["==false", "==true"]);
        assert_eq!(graph.get("race").unwrap().literals().count(), 1);
    }

    #[test]
    fn classifies_primitive_names() {
        assert_eq!(TypeName::classify("int"), TypeName::Primitive);
        assert_eq!(TypeName::classify(""), TypeName::Primitive);
        assert_eq!(TypeName::classify("ship"), TypeName::Named("ship"));
        assert_eq!(escape_name("<ship>"), "&lt;ship&gt;");
    }
}
