//! The schema generator's own configuration file.
//!
//! Only the parts the orchestrator needs are modelled: the schema globs and
//! the generated files. The generated filenames are used to recognise
//! filesystem events caused by the generator itself.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use figment::{
    providers::{Format as _, Yaml},
    Figment,
};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Schema globs; the file may give a single string or a list.
    #[serde(default, deserialize_with = "string_or_list")]
    pub schema: Vec<String>,

    #[serde(default)]
    pub exec: OutputFile,

    #[serde(default)]
    pub model: OutputFile,

    #[serde(default)]
    pub resolver: OutputFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputFile {
    #[serde(default)]
    pub filename: String,

    #[serde(default)]
    pub package: Option<String>,
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringList {
        One(String),
        Many(Vec<String>),
    }

    Ok(match StringList::deserialize(deserializer)? {
        StringList::One(one) => vec![one],
        StringList::Many(many) => many,
    })
}

impl GeneratorConfig {
    /// Load the generator config from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` when the file is missing and
    /// `ConfigError::InvalidValue` when it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        Ok(Figment::new().merge(Yaml::file(path)).extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_reads_exec_and_model_filenames() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(
            &path,
            "schema:\n  - pkg/graphql/schema/*.gql\nexec:\n  filename: pkg/graphql/generated/generated.go\n  package: generated\nmodel:\n  filename: pkg/graphql/model/models_gen.go\n",
        )
        .unwrap();

        let config = GeneratorConfig::load(&path).unwrap();
        assert_eq!(config.exec.filename, "pkg/graphql/generated/generated.go");
        assert_eq!(config.exec.package.as_deref(), Some("generated"));
        assert_eq!(config.model.filename, "pkg/graphql/model/models_gen.go");
        assert_eq!(config.schema, vec!["pkg/graphql/schema/*.gql".to_string()]);
        assert!(config.resolver.filename.is_empty());
    }

    #[test]
    fn load_accepts_single_schema_string() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(&path, "schema: schema.graphql
autobind: []
").unwrap();

        let config = GeneratorConfig::load(&path).unwrap();
        assert_eq!(config.schema, vec!["schema.graphql".to_string()]);
        assert_eq!(config.exec, OutputFile::default());
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = GeneratorConfig::load(&temp.path().join("config.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn load_rejects_wrong_types() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(&path, "exec:\n  filename: [1, 2]\n").unwrap();

        let err = GeneratorConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
