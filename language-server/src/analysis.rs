use crate::backend::Backend;
use crate::completion::{Candidates, Resolver};
use crate::error::Error;
use crate::hover::{format_declaration, format_localized_text, format_variable, text_reference_at};
use crate::locator::longest_suffix;
use crate::queries::Queries;
use crate::session::Session;
use crate::symbols::{normalize_variable, OccurrenceKind, VariableOccurrence};
use crate::text::Document;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::ops::Range as ByteRange;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Location, Position, Range, Url};
use tracing::{debug, warn};

const PARAMS_TAG: &str = "params";
const PARAM_TAG: &str = "param";
const PARAM_NAME_ATTRIBUTE: &str = "name";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScannedVariable {
    pub name: String,
    pub range: Range,
    pub kind: OccurrenceKind,
}

/// Variables found in one document. `error` is set when the scan stopped
/// early; everything before the error is kept.
#[derive(Debug)]
pub(crate) struct VariableScan {
    pub variables: Vec<ScannedVariable>,
    pub error: Option<Error>,
}

impl Backend {
    /// Stores the document and rebuilds its variable occurrences. Returns
    /// the diagnostics to publish for it.
    pub(crate) fn analyze_document(&self, uri: &Url, text: String, language_id: &str) -> Vec<Diagnostic> {
        let document = Document::new(text, language_id);
        self.variables.clear_document(uri);

        let mut diagnostics = Vec::new();
        if tracks_variables(uri, &document) {
            let scan = scan_variables(&document, &self.queries);
            debug!(%uri, variables = scan.variables.len(), "scanned document");
            for variable in scan.variables {
                self.variables.add(
                    &variable.name,
                    VariableOccurrence {
                        uri: uri.clone(),
                        range: variable.range,
                        kind: variable.kind,
                    },
                );
            }
            if let Some(err) = scan.error {
                warn!(%uri, error = %err, "variable scan aborted");
                diagnostics.push(scan_diagnostic(&document, &err));
            }
        }

        self.documents.insert(uri.to_string(), document);
        diagnostics
    }

    pub(crate) fn forget_document(&self, uri: &Url) {
        self.documents.remove(uri.as_str());
        self.variables.clear_document(uri);
    }

    pub(crate) fn completion_candidates(
        &self,
        session: &Session,
        uri: &Url,
        position: Position,
    ) -> Option<Candidates> {
        let doc = self.documents.get(uri.as_str())?;
        let prefix = doc.line_prefix(position)?;
        let candidates = Resolver::new(&session.schema.graph).complete(prefix);
        debug!(prefix, candidates = candidates.len(), "completion");
        Some(candidates)
    }

    pub(crate) fn hover_markdown(
        &self,
        session: &Session,
        uri: &Url,
        position: Position,
    ) -> Option<(String, Range)> {
        let doc = self.documents.get(uri.as_str())?;

        let line_start = doc.line_start(position.line)?;
        let column = doc.offset(position)? - line_start;
        if let Some(reference) = text_reference_at(doc.line(position.line)?, column, &self.queries) {
            let body = session.localized_text(&reference.page, &reference.line);
            if !body.is_empty() {
                let span = line_start + reference.span.start..line_start + reference.span.end;
                return Some((format_localized_text(&reference, &body), doc.range_of(span)));
            }
        }

        if let Some((name, occurrence)) = self.variables.at_position(uri, position) {
            let occurrences = self.variables.occurrences(&name);
            return Some((format_variable(&name, &occurrences), occurrence.range));
        }

        let (quoted, range) = doc.quoted_at(position)?;
        let declaration = longest_suffix(quoted, |name| session.schema.declaration(name))?;
        Some((format_declaration(declaration), range))
    }

    pub(crate) fn variable_definition(&self, uri: &Url, position: Position) -> Option<Location> {
        let (name, _) = self.variables.at_position(uri, position)?;
        self.variables
            .declaration(&name)
            .map(|occurrence| occurrence.location())
    }

    pub(crate) fn schema_definition(
        &self,
        session: &Session,
        uri: &Url,
        position: Position,
    ) -> Option<Location> {
        let doc = self.documents.get(uri.as_str())?;
        let (quoted, _) = doc.quoted_at(position)?;
        session.schema.locator.lookup(quoted).cloned()
    }
}

fn tracks_variables(uri: &Url, document: &Document) -> bool {
    document.language_id().eq_ignore_ascii_case("xml") || uri.path().ends_with(".xml")
}

fn scan_diagnostic(document: &Document, err: &Error) -> Diagnostic {
    let offset = match err {
        Error::MalformedDocument { offset, .. } => (*offset).min(document.text().len()),
        _ => 0,
    };
    let position = document.position_at(offset);
    Diagnostic {
        range: Range {
            start: position,
            end: position,
        },
        severity: Some(DiagnosticSeverity::ERROR),
        code: None,
        code_description: None,
        source: Some("x4-lsp".to_string()),
        message: format!("Variable tracking stopped: {}", err),
        related_information: None,
        tags: None,
        data: None,
    }
}

/// Walks the document tag by tag. `<param name="...">` directly inside
/// `<params>` declares a variable; any other attribute value contributes
/// its `$name` references.
pub(crate) fn scan_variables(document: &Document, queries: &Queries) -> VariableScan {
    let text = document.text();
    let mut reader = Reader::from_str(text);
    let mut open_tags: Vec<String> = Vec::new();
    let mut variables = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                let span = tag_span(text, reader.buffer_position());
                let parent = open_tags.last().map(String::as_str);
                scan_tag(document, queries, span, &name, parent, &mut variables);
                open_tags.push(name);
            }
            Ok(Event::Empty(tag)) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                let span = tag_span(text, reader.buffer_position());
                let parent = open_tags.last().map(String::as_str);
                scan_tag(document, queries, span, &name, parent, &mut variables);
            }
            Ok(Event::End(_)) => {
                open_tags.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return VariableScan {
                    variables,
                    error: Some(Error::malformed(reader.buffer_position(), err)),
                };
            }
        }
    }

    let error = open_tags
        .last()
        .map(|tag| Error::malformed(text.len(), format!("<{}> is never closed", tag)));
    VariableScan { variables, error }
}

/// The raw `<...>` text of the tag that ends at `end`. Attribute values
/// cannot contain `<`, so the nearest one before `end` opens the tag.
fn tag_span(text: &str, end: usize) -> ByteRange<usize> {
    let end = end.min(text.len());
    let start = text[..end].rfind('<').unwrap_or(0);
    start..end
}

fn scan_tag(
    document: &Document,
    queries: &Queries,
    span: ByteRange<usize>,
    tag: &str,
    parent: Option<&str>,
    out: &mut Vec<ScannedVariable>,
) {
    let text = document.text();
    let raw = &text[span.clone()];
    let declares = tag == PARAM_TAG && parent == Some(PARAMS_TAG);

    for attribute in queries.attributes.captures_iter(raw) {
        let (Some(key), Some(value)) = (attribute.get(1), attribute.get(2).or_else(|| attribute.get(3)))
        else {
            continue;
        };
        let value_start = span.start + value.start();
        let value_end = span.start + value.end();

        if declares && key.as_str() == PARAM_NAME_ATTRIBUTE {
            let name = normalize_variable(value.as_str());
            if !name.is_empty() {
                out.push(ScannedVariable {
                    name: name.to_string(),
                    range: document.range_of(value_end - name.len()..value_end),
                    kind: OccurrenceKind::Declaration,
                });
            }
            continue;
        }

        for found in queries.variables.find_iter(value.as_str()) {
            let start = value_start + found.start();
            if text[..start].ends_with('.') {
                continue;
            }
            out.push(ScannedVariable {
                name: found.as_str()[1..].to_string(),
                range: document.range_of(start + 1..value_start + found.end()),
                kind: OccurrenceKind::Reference,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::{ClientSocket, LspService};
    use tracing_subscriber::reload;

    const SCRIPT: &str = r#"<mdscript name="Test">
  <cues>
    <library name="Spawn">
      <params>
        <param name="ship" default="null"/>
        <param name="$count"/>
      </params>
      <actions>
        <set_value name="$total" exact="$count + $ship.$count"/>
        <do_if value="$total gt 0">
          <debug_text text="'%s'.[$ship.knownname]"/>
        </do_if>
      </actions>
    </library>
  </cues>
</mdscript>"#;

    fn scan(text: &str) -> VariableScan {
        let document = Document::new(text.to_string(), "xml");
        scan_variables(&document, &Queries::new())
    }

    fn named<'a>(scan: &'a VariableScan, name: &str) -> Vec<&'a ScannedVariable> {
        scan.variables.iter().filter(|v| v.name == name).collect()
    }

    #[test]
    fn params_declare_and_attributes_reference() {
        let scan = scan(SCRIPT);
        assert!(scan.error.is_none());

        let ship = named(&scan, "ship");
        assert_eq!(ship.len(), 3);
        assert_eq!(ship[0].kind, OccurrenceKind::Declaration);
        assert_eq!(ship[0].range.start, Position { line: 4, character: 21 });
        assert_eq!(ship[0].range.end, Position { line: 4, character: 25 });
        assert!(ship[1..].iter().all(|v| v.kind == OccurrenceKind::Reference));

        let total = named(&scan, "total");
        assert_eq!(total.len(), 2);
        assert_eq!(total[0].range.start, Position { line: 8, character: 26 });
    }

    #[test]
    fn declaration_strips_sigil_and_dotted_access_is_skipped() {
        let scan = scan(SCRIPT);
        let count = named(&scan, "count");
        // `$ship.$count` is property access, not the variable.
        assert_eq!(count.len(), 2);
        assert_eq!(count[0].kind, OccurrenceKind::Declaration);
        assert_eq!(count[0].range.start, Position { line: 5, character: 22 });
    }

    #[test]
    fn param_outside_params_is_a_reference_scan() {
        let scan = scan(r#"<cue><param name="plain" value="$used"/></cue>"#);
        assert!(named(&scan, "plain").is_empty());
        assert_eq!(named(&scan, "used").len(), 1);
    }

    #[test]
    fn mismatched_tags_abort_but_keep_earlier_variables() {
        let scan = scan("<a x=\"$first\">\n<b></a>\n<c y=\"$second\"/>");
        assert!(matches!(scan.error, Some(Error::MalformedDocument { .. })));
        assert_eq!(named(&scan, "first").len(), 1);
        assert!(named(&scan, "second").is_empty());
    }

    #[test]
    fn unclosed_tags_are_reported() {
        let scan = scan("<a x=\"$first\"><b/>");
        assert!(scan.error.unwrap().to_string().contains("<a> is never closed"));
        assert_eq!(scan.variables.len(), 1);
    }

    #[test]
    fn single_quoted_values_are_scanned() {
        let scan = scan("<a x='$quoted'/>");
        let quoted = named(&scan, "quoted");
        assert_eq!(quoted.len(), 1);
        assert_eq!(quoted[0].range.start, Position { line: 0, character: 7 });
    }

    fn service() -> (LspService<Backend>, ClientSocket) {
        let (_, log_level) = reload::Layer::new(tracing_subscriber::filter::LevelFilter::INFO);
        LspService::new(|client| Backend::new(client, log_level))
    }

    fn uri(path: &str) -> Url {
        Url::parse(&format!("file:///md/{}", path)).unwrap()
    }

    #[tokio::test]
    async fn rescans_replace_only_the_changed_document() {
        let (service, _socket) = service();
        let backend = service.inner();
        let (a, b) = (uri("a.xml"), uri("b.xml"));
        let script_a = r#"<cue><params><param name="x"/></params><set_value exact="$x"/></cue>"#;

        assert!(backend.analyze_document(&a, script_a.to_string(), "xml").is_empty());
        assert!(backend.analyze_document(&a, script_a.to_string(), "xml").is_empty());
        assert_eq!(backend.variables.occurrences("x").len(), 2);

        backend.analyze_document(&b, r#"<cue><do_if value="$x gt 0"/></cue>"#.to_string(), "xml");
        assert_eq!(backend.variables.occurrences("x").len(), 3);

        assert_eq!(backend.variables.rename("x", "y"), 3);
        assert!(backend.variables.occurrences("x").is_empty());
        assert_eq!(backend.variables.occurrences("y").len(), 3);

        let diagnostics = backend.analyze_document(&b, "<cue></do_if>".to_string(), "xml");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::ERROR));
        let remaining = backend.variables.occurrences("y");
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|occurrence| occurrence.uri == a));
    }

    #[tokio::test]
    async fn closing_forgets_text_and_variables() {
        let (service, _socket) = service();
        let backend = service.inner();
        let a = uri("a.xml");

        backend.analyze_document(&a, r#"<cue value="$ship"/>"#.to_string(), "xml");
        assert!(backend.documents.contains_key(a.as_str()));
        backend.forget_document(&a);

        assert!(!backend.documents.contains_key(a.as_str()));
        assert!(backend.variables.occurrences("ship").is_empty());
    }
}
