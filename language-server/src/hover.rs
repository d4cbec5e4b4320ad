use crate::queries::Queries;
use crate::schema::Declaration;
use crate::symbols::{OccurrenceKind, VariableOccurrence};
use std::ops::Range as ByteRange;

/// A `(page, line)` reference into the localized text files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReference {
    pub page: String,
    pub line: String,
    pub span: ByteRange<usize>,
}

/// Finds a localized-text reference on `line` whose match covers `column`
/// (a byte offset into the line). Patterns are tried in table order.
pub fn text_reference_at(line: &str, column: usize, queries: &Queries) -> Option<TextReference> {
    queries.read_text.iter().find_map(|pattern| {
        pattern.captures_iter(line).find_map(|captures| {
            let whole = captures.get(0)?;
            if column < whole.start() || column > whole.end() {
                return None;
            }
            Some(TextReference {
                page: captures.name("page")?.as_str().to_string(),
                line: captures.name("line")?.as_str().to_string(),
                span: whole.range(),
            })
        })
    })
}

pub(crate) fn sanitize_markdown(value: &str) -> String {
    value.trim().replace('|', "\\|").replace('\n', "<br>")
}

fn push_field(lines: &mut Vec<String>, label: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
        lines.push(format!("- {}: {}", label, sanitize_markdown(value)));
    }
}

pub fn format_declaration(declaration: &Declaration) -> String {
    match declaration {
        Declaration::Keyword {
            name,
            description,
            result,
            type_name,
            suffix,
            pseudo,
            import,
        } => {
            let mut lines = vec![format!("**Keyword:** {}", sanitize_markdown(name))];
            push_field(&mut lines, "Description", description.as_deref());
            push_field(&mut lines, "Result", result.as_deref());
            push_field(&mut lines, "Type", type_name.as_deref());
            push_field(&mut lines, "Suffix", suffix.as_deref());
            if *pseudo {
                lines.push("- Pseudo keyword".to_string());
            }
            push_field(&mut lines, "Values imported from", import.as_deref());
            lines.join("\n")
        }
        Declaration::Datatype {
            name,
            supertype,
            description,
            suffix,
            pseudo,
            property_count,
        } => {
            let mut lines = vec![format!("**Datatype:** {}", sanitize_markdown(name))];
            push_field(&mut lines, "Description", description.as_deref());
            push_field(&mut lines, "Base type", supertype.as_deref());
            push_field(&mut lines, "Suffix", suffix.as_deref());
            if *pseudo {
                lines.push("- Pseudo datatype".to_string());
            }
            lines.push(format!("- Properties: {}", property_count));
            lines.join("\n")
        }
        Declaration::Property {
            owner,
            name,
            result,
            type_name,
        } => {
            let mut lines = vec![format!(
                "**Property:** {}.{}",
                sanitize_markdown(owner),
                sanitize_markdown(name)
            )];
            push_field(&mut lines, "Result", Some(result));
            push_field(&mut lines, "Type", type_name.as_deref());
            lines.join("\n")
        }
    }
}

/// Localized text goes in a plaintext block so markup in game strings is shown verbatim.
pub fn format_localized_text(reference: &TextReference, body: &str) -> String {
    format!(
        "**Text {{{}, {}}}**\n```plaintext\n{}\n```",
        reference.page, reference.line, body
    )
}

pub fn format_variable(name: &str, occurrences: &[VariableOccurrence]) -> String {
    let mut lines = vec![format!("**Variable:** ${}", sanitize_markdown(name))];
    let declared = occurrences
        .iter()
        .find(|occurrence| occurrence.kind == OccurrenceKind::Declaration);
    match declared {
        Some(declaration) => lines.push(format!(
            "- Parameter declared on line {}",
            declaration.range.start.line + 1
        )),
        None => lines.push("- Not declared as a parameter".to_string()),
    }
    lines.push(format!("- Occurrences: {}", occurrences.len()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::{Position, Range, Url};

    #[test]
    fn finds_reference_under_cursor() {
        let queries = Queries::new();
        let line = r#"<set_value name="$t" exact="{1015, 7}" />"#;
        let column = line.find("1015").unwrap();

        let reference = text_reference_at(line, column, &queries).unwrap();
        assert_eq!(reference.page, "1015");
        assert_eq!(reference.line, "7");
        assert!(text_reference_at(line, 2, &queries).is_none());
    }

    #[test]
    fn recognizes_every_reference_shape() {
        let queries = Queries::new();
        for line in [
            "{20203,201}",
            "readtext.{20203}.{201}",
            r#"<text page="20203" line="201"/>"#,
            "ReadText(20203, 201)",
        ] {
            let column = line.find("20203").unwrap();
            let reference = text_reference_at(line, column, &queries)
                .unwrap_or_else(|| panic!("no match in {line}"));
            assert_eq!((reference.page.as_str(), reference.line.as_str()), ("20203", "201"));
        }
    }

    #[test]
    fn formats_keyword_hover_markdown() {
        let declaration = Declaration::Keyword {
            name: "player".to_string(),
            description: Some("The player | entity".to_string()),
            result: None,
            type_name: Some("entity".to_string()),
            suffix: None,
            pseudo: false,
            import: None,
        };
        let markdown = format_declaration(&declaration);
        assert!(markdown.starts_with("**Keyword:** player"));
        assert!(markdown.contains("- Description: The player \\| entity"));
        assert!(markdown.contains("- Type: entity"));
        assert!(!markdown.contains("Result"));
    }

    #[test]
    fn formats_property_hover_markdown() {
        let declaration = Declaration::Property {
            owner: "faction".to_string(),
            name: "relation".to_string(),
            result: "Relation to player".to_string(),
            type_name: Some("float".to_string()),
        };
        assert_eq!(
            format_declaration(&declaration),
            "**Property:** faction.relation\n- Result: Relation to player\n- Type: float"
        );
    }

    #[test]
    fn localized_text_is_fenced() {
        let reference = TextReference {
            page: "1001".to_string(),
            line: "2".to_string(),
            span: 0..9,
        };
        let markdown = format_localized_text(&reference, "44: Hull");
        assert_eq!(markdown, "**Text {1001, 2}**\n```plaintext\n44: Hull\n```");
    }

    #[test]
    fn variable_hover_mentions_declaration_line() {
        let occurrence = |line, kind| VariableOccurrence {
            uri: Url::parse("file:///md/a.xml").unwrap(),
            range: Range {
                start: Position { line, character: 1 },
                end: Position { line, character: 4 },
            },
            kind,
        };
        let markdown = format_variable(
            "ship",
            &[
                occurrence(4, OccurrenceKind::Declaration),
                occurrence(9, OccurrenceKind::Reference),
            ],
        );
        assert!(markdown.contains("**Variable:** $ship"));
        assert!(markdown.contains("line 5"));
        assert!(markdown.contains("Occurrences: 2"));
    }
}
