use crate::error::{Error, Result};
use crate::graph::{escape_name, SymbolGraph};
use crate::locator::{DefinitionLocator, SchemaSource};
use crate::select::PathQuery;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const KEYWORD_TAG: &str = "keyword";
const DATATYPE_TAG: &str = "datatype";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(rename = "keyword", default)]
    pub keywords: Vec<Keyword>,
    #[serde(rename = "datatype", default)]
    pub datatypes: Vec<Datatype>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Keyword {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type", default)]
    pub type_name: Option<String>,
    #[serde(rename = "@result", default)]
    pub result: Option<String>,
    #[serde(rename = "@description", default)]
    pub description: Option<String>,
    #[serde(rename = "@suffix", default)]
    pub suffix: Option<String>,
    #[serde(rename = "@pseudo", default)]
    pub pseudo: bool,
    #[serde(rename = "property", default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub import: Option<Import>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Datatype {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type", default)]
    pub supertype: Option<String>,
    #[serde(rename = "@description", default)]
    pub description: Option<String>,
    #[serde(rename = "@suffix", default)]
    pub suffix: Option<String>,
    #[serde(rename = "@pseudo", default)]
    pub pseudo: bool,
    #[serde(rename = "property", default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Property {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@result", default)]
    pub result: String,
    #[serde(rename = "@type", default)]
    pub type_name: Option<String>,
}

/// Fills a keyword's literal values from another document.
#[derive(Debug, Clone, Deserialize)]
pub struct Import {
    #[serde(rename = "@source")]
    pub source: String,
    #[serde(rename = "@select")]
    pub select: String,
    pub property: ImportTarget,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportTarget {
    #[serde(rename = "@name")]
    pub name: String,
}

impl Import {
    /// `select` joined with the target attribute, e.g. `/factions/faction/@id`.
    pub fn query(&self) -> String {
        format!(
            "{}/{}",
            self.select.trim_end_matches('/'),
            self.property.name
        )
    }
}

impl Schema {
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        quick_xml::de::from_str(text).map_err(|err| Error::deserialize(path, err))
    }
}

/// Resolves the documents named by `<import source="...">`.
pub trait ImportResolver {
    fn literals(&self, import: &Import) -> Result<Vec<String>>;
}

pub struct LibraryImports {
    dir: PathBuf,
}

impl LibraryImports {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ImportResolver for LibraryImports {
    fn literals(&self, import: &Import) -> Result<Vec<String>> {
        let path = self.dir.join(&import.source);
        debug!(path = %path.display(), "reading schema import");
        let text = std::fs::read_to_string(&path).map_err(|err| Error::io(&path, err))?;
        PathQuery::parse(&import.query())?
            .select(&text)
            .map_err(|err| Error::xml(&path, err))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Keyword {
        name: String,
        description: Option<String>,
        result: Option<String>,
        type_name: Option<String>,
        suffix: Option<String>,
        pseudo: bool,
        import: Option<String>,
    },
    Datatype {
        name: String,
        supertype: Option<String>,
        description: Option<String>,
        suffix: Option<String>,
        pseudo: bool,
        property_count: usize,
    },
    Property {
        owner: String,
        name: String,
        result: String,
        type_name: Option<String>,
    },
}

#[derive(Debug, Default)]
pub struct SchemaIndex {
    pub graph: SymbolGraph,
    pub locator: DefinitionLocator,
    declarations: HashMap<String, Declaration>,
}

impl SchemaIndex {
    pub fn new() -> Self {
        Self {
            graph: SymbolGraph::with_builtins(),
            ..Self::default()
        }
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }

    /// Adds every declaration of `schema`. Import failures are pushed to
    /// `problems` and leave the keyword without literals.
    pub fn ingest(
        &mut self,
        source: &SchemaSource,
        schema: &Schema,
        imports: &dyn ImportResolver,
        problems: &mut Vec<Error>,
    ) {
        for keyword in &schema.keywords {
            self.ingest_keyword(source, keyword, imports, problems);
        }
        for datatype in &schema.datatypes {
            self.ingest_datatype(source, datatype);
        }
        info!(
            keywords = schema.keywords.len(),
            datatypes = schema.datatypes.len(),
            types = self.graph.len(),
            locations = self.locator.len(),
            "schema indexed"
        );
    }

    fn ingest_keyword(
        &mut self,
        source: &SchemaSource,
        keyword: &Keyword,
        imports: &dyn ImportResolver,
        problems: &mut Vec<Error>,
    ) {
        let name = escape_name(&keyword.name);
        self.locator.add_element(source, KEYWORD_TAG, &name);
        self.declarations.insert(
            name.clone(),
            Declaration::Keyword {
                name: name.clone(),
                description: keyword.description.clone(),
                result: keyword.result.clone(),
                type_name: keyword.type_name.clone(),
                suffix: keyword.suffix.clone(),
                pseudo: keyword.pseudo,
                import: keyword.import.as_ref().map(|import| import.source.clone()),
            },
        );

        if let Some(import) = &keyword.import {
            match imports.literals(import) {
                Ok(values) => {
                    debug!(keyword = %name, count = values.len(), "imported literals");
                    for value in values {
                        self.graph.add_literal(&name, &value);
                    }
                }
                Err(err) => {
                    warn!(keyword = %name, error = %err, "import failed");
                    problems.push(err);
                }
            }
            return;
        }

        for property in &keyword.properties {
            self.ingest_property(source, KEYWORD_TAG, &name, property);
        }
    }

    fn ingest_datatype(&mut self, source: &SchemaSource, datatype: &Datatype) {
        let name = escape_name(&datatype.name);
        self.locator.add_element(source, DATATYPE_TAG, &name);
        self.declarations.insert(
            name.clone(),
            Declaration::Datatype {
                name: name.clone(),
                supertype: datatype.supertype.clone(),
                description: datatype.description.clone(),
                suffix: datatype.suffix.clone(),
                pseudo: datatype.pseudo,
                property_count: datatype.properties.len(),
            },
        );

        if datatype.properties.is_empty() {
            return;
        }
        self.graph.add_type(&name, datatype.supertype.as_deref());
        for property in &datatype.properties {
            self.ingest_property(source, DATATYPE_TAG, &name, property);
        }
    }

    fn ingest_property(&mut self, source: &SchemaSource, tag: &str, owner: &str, property: &Property) {
        let name = escape_name(&property.name);
        self.locator.add_property(source, tag, owner, &name);
        self.graph
            .add_property(owner, &name, property.type_name.as_deref());
        self.declarations.insert(
            format!("{owner}.{name}"),
            Declaration::Property {
                owner: owner.to_string(),
                name,
                result: property.result.clone(),
                type_name: property.type_name.clone(),
            },
        );
    }
}
