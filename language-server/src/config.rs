use crate::error::Error;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Key under which editors that namespace their settings nest ours.
const SETTINGS_SECTION: &str = "x4CodeComplete";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub unpacked_file_location: Option<PathBuf>,
    pub extensions_folder: Option<PathBuf>,
    pub exceedingly_verbose: bool,
    pub language_number: String,
    pub limit_language_output: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unpacked_file_location: None,
            extensions_folder: None,
            exceedingly_verbose: false,
            language_number: "44".to_string(),
            limit_language_output: false,
        }
    }
}

/// How localized text lookups choose between language files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePreference {
    pub preferred: String,
    pub limit: bool,
}

impl Settings {
    pub fn from_initialization_options(options: Option<&Value>) -> Self {
        let Some(options) = options else {
            return Self::default();
        };
        let section = options.get(SETTINGS_SECTION).unwrap_or(options);

        match serde_json::from_value::<Settings>(section.clone()) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable initialization options");
                Self::default()
            }
        }
    }

    /// Lists every required setting that is absent or empty.
    pub fn validate(&self) -> Vec<Error> {
        let mut missing = Vec::new();
        if non_empty(&self.unpacked_file_location).is_none() {
            missing.push(Error::MissingSetting("unpackedFileLocation"));
        }
        if non_empty(&self.extensions_folder).is_none() {
            missing.push(Error::MissingSetting("extensionsFolder"));
        }
        missing
    }

    pub fn root(&self) -> Option<&Path> {
        non_empty(&self.unpacked_file_location)
    }

    pub fn extensions(&self) -> Option<&Path> {
        non_empty(&self.extensions_folder)
    }

    pub fn libraries_dir(&self) -> Option<PathBuf> {
        self.root().map(|root| root.join("libraries"))
    }

    pub fn schema_path(&self) -> Option<PathBuf> {
        self.libraries_dir()
            .map(|dir| dir.join("scriptproperties.xml"))
    }

    pub fn language_preference(&self) -> LanguagePreference {
        LanguagePreference {
            preferred: self.language_number.trim().to_string(),
            limit: self.limit_language_output,
        }
    }
}

fn non_empty(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref()
        .filter(|path| !path.as_os_str().is_empty())
}
