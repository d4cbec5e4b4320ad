use crate::graph::{SymbolGraph, TypeName};
use std::collections::HashSet;

/// Expansion stops once it is asked to go deeper than this.
const MAX_DEPTH: u32 = 1;

/// Hard bound on candidates produced by one completion request.
pub const MAX_CANDIDATES: usize = 1000;

const MIN_BARE_TOKEN_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Type,
    Property,
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub label: String,
    pub detail: Option<String>,
    pub kind: CandidateKind,
}

#[derive(Debug, Default)]
pub struct Candidates {
    items: Vec<Candidate>,
    seen: HashSet<String>,
}

impl Candidates {
    fn push(&mut self, candidate: Candidate) {
        if self.is_full() || self.seen.contains(&candidate.label) {
            return;
        }
        self.seen.insert(candidate.label.clone());
        self.items.push(candidate);
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= MAX_CANDIDATES
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.items
    }
}

/// Splits the text before the cursor into `(previous, new)` tokens.
///
/// The cut points are the last two `.` or `"` characters. A quote in the very
/// last position is ignored so that a just-closed string still resolves.
pub fn resolve_prefix(text: &str) -> Option<(&str, &str)> {
    let last_char = text.char_indices().next_back().map_or(0, |(idx, _)| idx);
    let dot = text.rfind('.');
    let quote = text[..last_char].rfind('"');
    let pos = dot.max(quote)?;

    let new = &text[pos + 1..];
    let new = new.strip_suffix('"').unwrap_or(new);

    let previous_cut = text[..pos].rfind(|c: char| c == '.' || c == '"');
    if previous_cut.is_none() && text.len() - pos > 3 {
        return Some(("", new));
    }
    let start = previous_cut.map_or(0, |cut| cut + 1);
    Some((&text[start..pos], new))
}

pub struct Resolver<'g> {
    graph: &'g SymbolGraph,
}

impl<'g> Resolver<'g> {
    pub fn new(graph: &'g SymbolGraph) -> Self {
        Self { graph }
    }

    pub fn complete(&self, line_prefix: &str) -> Candidates {
        let mut out = Candidates::default();
        let Some((previous, new)) = resolve_prefix(line_prefix) else {
            return out;
        };

        if let Some(placeholder) = previous.strip_prefix('{') {
            if let Some(entry) = self.graph.get(placeholder) {
                for literal in entry.literals() {
                    out.push(Candidate {
                        label: format!("{literal}}}"),
                        detail: Some(placeholder.to_string()),
                        kind: CandidateKind::Literal,
                    });
                }
            }
        } else if !previous.is_empty() {
            // No backtracking: an unknown context simply has no completions.
            if self.graph.contains(previous) {
                self.expand("", previous, 0, &mut out);
            }
            return out;
        }

        if new.len() < MIN_BARE_TOKEN_LEN {
            return out;
        }
        for name in self.graph.type_names() {
            if out.is_full() {
                break;
            }
            if name.starts_with(new) {
                self.expand("", name, 0, &mut out);
            }
        }
        out
    }

    /// Flattens `type_name` (its properties, their types and its supertypes)
    /// into `out`, two levels deep at most.
    pub fn expand(&self, prefix: &str, type_name: &str, depth: u32, out: &mut Candidates) {
        let TypeName::Named(name) = TypeName::classify(type_name) else {
            return;
        };
        let Some(entry) = self.graph.get(name) else {
            return;
        };
        if depth > MAX_DEPTH {
            return;
        }
        if !prefix.is_empty() {
            out.push(Candidate {
                label: name.to_string(),
                detail: None,
                kind: CandidateKind::Type,
            });
        }
        if out.is_full() {
            return;
        }

        for (property, property_type) in entry.properties() {
            let completion = if prefix.is_empty() {
                property.to_string()
            } else {
                format!("{prefix}.{property}")
            };
            out.push(Candidate {
                label: completion.clone(),
                detail: Some(format!("{name}.{property}")),
                kind: CandidateKind::Property,
            });
            self.expand(&completion, property_type, depth + 1, out);
        }

        if let Some(supertype) = entry.supertype() {
            self.expand(prefix, supertype, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BOOLEAN;

    fn labels(candidates: &Candidates) -> Vec<&str> {
        candidates.iter().map(|c| c.label.as_str()).collect()
    }

    fn sample_graph() -> SymbolGraph {
        let mut graph = SymbolGraph::with_builtins();
        graph.add_type("ship", Some("controllable"));
        graph.add_property("ship", "pilot", Some("entity"));
        graph.add_property("ship", "isdocked", Some("boolean"));
        graph.add_type("controllable", Some("component"));
        graph.add_property("controllable", "sector", Some("sector"));
        graph.add_type("component", Some("datatype"));
        graph.add_property("component", "exists", Some("boolean"));
        graph.add_property("entity", "name", Some("string"));
        graph.add_property("entity", "age", Some("int"));
        graph.add_property("sector", "owner", Some("faction"));
        graph.add_literal("faction", "argon");
        graph.add_literal("faction", "paranid");
        graph
    }

    #[test]
    fn splits_on_dot() {
        assert_eq!(resolve_prefix("\"foo.bar"), Some(("foo", "bar")));
        assert_eq!(resolve_prefix("value=\"foo.bar"), Some(("foo", "bar")));
        assert_eq!(resolve_prefix("value=\"player.ship."), Some(("ship", "")));
    }

    #[test]
    fn bare_token_keeps_context_only_for_short_gaps() {
        assert_eq!(resolve_prefix("foo.bar"), Some(("", "bar")));
        assert_eq!(resolve_prefix("ab.c"), Some(("ab", "c")));
    }

    #[test]
    fn splits_on_quote() {
        assert_eq!(resolve_prefix("value=\"ship"), Some(("", "ship")));
        assert_eq!(resolve_prefix("value=\"ship\""), Some(("", "ship")));
        assert_eq!(resolve_prefix("x=\"a"), Some(("x=", "a")));
        assert_eq!(resolve_prefix("<do_all/>"), None);
    }

    #[test]
    fn known_context_lists_direct_properties() {
        let graph = sample_graph();
        let candidates = Resolver::new(&graph).complete("value=\"entity.");
        assert_eq!(labels(&candidates), vec!["name", "age"]);
        assert_eq!(
            candidates.iter().next().unwrap().detail.as_deref(),
            Some("entity.name")
        );
    }

    #[test]
    fn unknown_context_has_no_completions() {
        let graph = sample_graph();
        assert!(Resolver::new(&graph).complete("value=\"station.").is_empty());
    }

    #[test]
    fn short_bare_token_has_no_completions() {
        let graph = sample_graph();
        assert!(Resolver::new(&graph).complete("value=\".s").is_empty());
        assert!(!Resolver::new(&graph).complete("value=\".sh").is_empty());
    }

    #[test]
    fn inherits_supertype_properties_once_up_to_depth_cap() {
        let graph = sample_graph();
        let mut out = Candidates::default();
        Resolver::new(&graph).expand("", "ship", 0, &mut out);
        let labels = labels(&out);

        for expected in ["pilot", "isdocked", "sector"] {
            assert_eq!(labels.iter().filter(|l| **l == expected).count(), 1);
        }
        assert!(labels.contains(&"pilot.name"));
        // component is the third link of the chain and lies past the cap.
        assert!(!labels.contains(&"exists"));
        // sector.owner would sit three levels below ship.
        assert!(!labels.iter().any(|l| l.contains("owner")));
    }

    #[test]
    fn prefix_search_expands_matching_types() {
        let graph = sample_graph();
        let candidates = Resolver::new(&graph).complete("value=\"sec");
        assert_eq!(labels(&candidates), vec!["owner", "faction"]);
    }

    #[test]
    fn placeholder_lists_literals() {
        let graph = sample_graph();
        let candidates = Resolver::new(&graph).complete("value=\"{faction.");
        assert_eq!(labels(&candidates), vec!["argon}", "paranid}"]);

        let booleans = Resolver::new(&graph).complete(&format!("x=\"{{{BOOLEAN}."));
        assert_eq!(labels(&booleans), vec!["==false}", "==true}"]);
    }

    #[test]
    fn never_exceeds_candidate_cap() {
        let mut graph = SymbolGraph::default();
        for ty in 0..5 {
            for prop in 0..400 {
                graph.add_property(&format!("wide{ty}"), &format!("p{prop}"), Some("wide0"));
            }
        }
        let candidates = Resolver::new(&graph).complete("value=\"wide");
        assert_eq!(candidates.len(), MAX_CANDIDATES);
    }
}
