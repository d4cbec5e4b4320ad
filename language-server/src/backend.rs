use crate::completion::{Candidate, CandidateKind};
use crate::config::Settings;
use crate::language::LanguageStore;
use crate::queries::Queries;
use crate::schema::SchemaIndex;
use crate::session::Session;
use crate::symbols::{normalize_variable, OccurrenceKind, VariableTracker};
use crate::text::DocumentStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower_lsp::jsonrpc::{Error as RpcError, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{reload, Registry};

/// Switches the stderr log level at runtime.
pub type LogLevelHandle = reload::Handle<LevelFilter, Registry>;

pub struct Backend {
    pub(crate) client: Client,
    pub(crate) settings: Arc<parking_lot::RwLock<Settings>>,
    pub(crate) session: OnceCell<Session>,
    pub(crate) documents: Arc<DocumentStore>,
    pub(crate) variables: Arc<VariableTracker>,
    pub(crate) queries: Arc<Queries>,
    log_level: LogLevelHandle,
}

impl Backend {
    pub fn new(client: Client, log_level: LogLevelHandle) -> Self {
        Self {
            client,
            settings: Arc::new(parking_lot::RwLock::new(Settings::default())),
            session: OnceCell::new(),
            documents: Arc::new(DocumentStore::default()),
            variables: Arc::new(VariableTracker::default()),
            queries: Arc::new(Queries::new()),
            log_level,
        }
    }

    /// The loaded game data. The first caller starts the load and everyone
    /// else waits for it. `None` when the settings are incomplete.
    async fn session(&self) -> Option<&Session> {
        let configured = self.settings.read().validate().is_empty();
        if !configured {
            return None;
        }
        Some(self.session.get_or_init(|| self.load_session()).await)
    }

    async fn load_session(&self) -> Session {
        let settings = self.settings.read().clone();
        let fallback = settings.clone();
        let queries = Arc::clone(&self.queries);
        let (session, problems) = match tokio::task::spawn_blocking(move || Session::load(&settings, &queries)).await {
            Ok(loaded) => loaded,
            Err(err) => {
                error!(error = %err, "session load panicked");
                (
                    Session {
                        schema: SchemaIndex::new(),
                        texts: LanguageStore::default(),
                        preference: fallback.language_preference(),
                    },
                    Vec::new(),
                )
            }
        };

        for problem in &problems {
            self.client
                .show_message(MessageType::ERROR, problem.to_string())
                .await;
        }
        self.client
            .log_message(
                MessageType::INFO,
                format!(
                    "Loaded {} script types and {} language files",
                    session.schema.graph.len(),
                    session.texts.len()
                ),
            )
            .await;
        session
    }

    fn set_log_level(&self, level: LevelFilter) {
        if let Err(err) = self.log_level.modify(|filter| *filter = level) {
            warn!(error = %err, "could not change log level");
        }
    }

    async fn publish_analysis(&self, uri: Url, text: String, language_id: &str, version: Option<i32>) {
        let diagnostics = self.analyze_document(&uri, text, language_id);
        self.client
            .publish_diagnostics(uri, diagnostics, version)
            .await;
    }

    fn collect_rename_edits(&self, name: &str, new_name: &str) -> HashMap<Url, Vec<TextEdit>> {
        let mut edits: HashMap<Url, Vec<TextEdit>> = HashMap::new();
        for occurrence in self.variables.occurrences(name) {
            edits.entry(occurrence.uri).or_default().push(TextEdit {
                range: occurrence.range,
                new_text: new_name.to_string(),
            });
        }
        edits
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn completion_item(candidate: Candidate) -> CompletionItem {
    let kind = match candidate.kind {
        CandidateKind::Type => CompletionItemKind::CLASS,
        CandidateKind::Property => CompletionItemKind::PROPERTY,
        CandidateKind::Literal => CompletionItemKind::VALUE,
    };
    CompletionItem {
        label: candidate.label,
        kind: Some(kind),
        detail: candidate.detail,
        ..Default::default()
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let settings = Settings::from_initialization_options(params.initialization_options.as_ref());
        if settings.exceedingly_verbose {
            self.set_log_level(LevelFilter::DEBUG);
        }
        let enabled = settings.validate().is_empty();
        info!(?settings, enabled, "initialize");
        *self.settings.write() = settings;

        let mut capabilities = ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(
                TextDocumentSyncKind::FULL,
            )),
            ..Default::default()
        };
        if enabled {
            capabilities.completion_provider = Some(CompletionOptions {
                trigger_characters: Some(vec![".".into(), "\"".into(), "{".into()]),
                ..Default::default()
            });
            capabilities.hover_provider = Some(HoverProviderCapability::Simple(true));
            capabilities.definition_provider = Some(OneOf::Left(true));
            capabilities.references_provider = Some(OneOf::Left(true));
            capabilities.rename_provider = Some(OneOf::Right(RenameOptions {
                prepare_provider: Some(true),
                work_done_progress_options: Default::default(),
            }));
        }

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "x4-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities,
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "X4 LSP server initialized")
            .await;

        let missing = self.settings.read().validate();
        if !missing.is_empty() {
            for err in missing {
                self.client
                    .show_message(MessageType::ERROR, err.to_string())
                    .await;
            }
            return;
        }
        self.session().await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        self.publish_analysis(
            document.uri,
            document.text,
            &document.language_id,
            Some(document.version),
        )
        .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let language_id = self
            .documents
            .get(uri.as_str())
            .map(|doc| doc.language_id().to_string())
            .unwrap_or_default();

        if let Some(change) = params.content_changes.into_iter().last() {
            self.publish_analysis(uri, change.text, &language_id, Some(params.text_document.version))
                .await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.forget_document(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(session) = self.session().await else {
            return Ok(None);
        };

        Ok(self
            .hover_markdown(session, &uri, position)
            .map(|(value, range)| Hover {
                contents: HoverContents::Markup(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value,
                }),
                range: Some(range),
            }))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        Ok(self
            .variables
            .at_position(&params.text_document.uri, params.position)
            .map(|(name, occurrence)| PrepareRenameResponse::RangeWithPlaceholder {
                range: occurrence.range,
                placeholder: name,
            }))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let new_name = normalize_variable(params.new_name.trim());

        if new_name.is_empty() {
            return Ok(None);
        }
        if !is_identifier(new_name) {
            return Err(RpcError::invalid_params(format!(
                "'{}' is not a valid variable name",
                new_name
            )));
        }

        if let Some((name, _)) = self.variables.at_position(&uri, position) {
            let edits = self.collect_rename_edits(&name, new_name);
            let moved = self.variables.rename(&name, new_name);
            info!(from = %name, to = %new_name, occurrences = moved, "renamed variable");
            return Ok(Some(WorkspaceEdit {
                changes: Some(edits),
                ..WorkspaceEdit::default()
            }));
        }

        Ok(None)
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        if let Some(location) = self.variable_definition(&uri, position) {
            return Ok(Some(GotoDefinitionResponse::Scalar(location)));
        }
        let Some(session) = self.session().await else {
            return Ok(None);
        };
        Ok(self
            .schema_definition(session, &uri, position)
            .map(GotoDefinitionResponse::Scalar))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some((name, _)) = self.variables.at_position(&uri, position) else {
            return Ok(None);
        };
        let locations = self
            .variables
            .occurrences(&name)
            .into_iter()
            .filter(|occurrence| {
                params.context.include_declaration || occurrence.kind == OccurrenceKind::Reference
            })
            .map(|occurrence| occurrence.location())
            .collect();
        Ok(Some(locations))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(session) = self.session().await else {
            return Ok(None);
        };

        let Some(candidates) = self.completion_candidates(session, &uri, position) else {
            return Ok(None);
        };
        if candidates.is_empty() {
            return Ok(None);
        }
        let is_incomplete = candidates.is_full();
        let items = candidates.into_vec().into_iter().map(completion_item).collect();
        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete,
            items,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_new_variable_names() {
        assert!(is_identifier("ship"));
        assert!(is_identifier("_count2"));
        assert!(!is_identifier("2count"));
        assert!(!is_identifier("my-ship"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn maps_candidates_to_items() {
        let item = completion_item(Candidate {
            label: "player.age".to_string(),
            detail: Some("player.age".to_string()),
            kind: CandidateKind::Property,
        });
        assert_eq!(item.kind, Some(CompletionItemKind::PROPERTY));
        assert_eq!(item.detail.as_deref(), Some("player.age"));
    }
}
