use crate::config::{LanguagePreference, Settings};
use crate::error::{Error, Result};
use crate::language::LanguageStore;
use crate::locator::SchemaSource;
use crate::queries::Queries;
use crate::schema::{LibraryImports, Schema, SchemaIndex};
use std::io;
use std::path::Path;
use std::time::Instant;
use tower_lsp::lsp_types::Url;
use tracing::info;

pub struct Session {
    pub schema: SchemaIndex,
    pub texts: LanguageStore,
    pub preference: LanguagePreference,
}

impl Session {
    /// Loads the schema and the language files. Recoverable failures come
    /// back as problems next to a session holding whatever did load.
    pub fn load(settings: &Settings, queries: &Queries) -> (Self, Vec<Error>) {
        let started = Instant::now();
        let mut problems = Vec::new();

        let schema = match (settings.schema_path(), settings.libraries_dir()) {
            (Some(schema_path), Some(libraries)) => {
                load_schema(&schema_path, &libraries, &mut problems).unwrap_or_else(|err| {
                    problems.push(err);
                    SchemaIndex::new()
                })
            }
            _ => SchemaIndex::new(),
        };
        let texts = LanguageStore::load(settings.root(), settings.extensions(), queries, &mut problems);

        info!(
            types = schema.graph.len(),
            definitions = schema.locator.len(),
            language_files = texts.len(),
            problems = problems.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session loaded"
        );

        let session = Self {
            schema,
            texts,
            preference: settings.language_preference(),
        };
        (session, problems)
    }

    pub fn localized_text(&self, page_id: &str, text_id: &str) -> String {
        self.texts.lookup(page_id, text_id, &self.preference)
    }
}

fn load_schema(path: &Path, libraries: &Path, problems: &mut Vec<Error>) -> Result<SchemaIndex> {
    let text = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    let schema = Schema::parse(&text, path)?;
    let uri = Url::from_file_path(path).map_err(|()| {
        Error::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "schema path must be absolute"),
        )
    })?;

    let mut index = SchemaIndex::new();
    let source = SchemaSource::new(uri, text);
    index.ingest(&source, &schema, &LibraryImports::new(libraries), problems);
    Ok(index)
}
