//! Chain file loader
//!
//! Load chain definitions from YAML files and directories.

use std::path::{Path, PathBuf};

use super::ChainDefinition;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },
}

pub struct ChainLoader;

impl ChainLoader {
    /// Load every `*.yaml` / `*.yml` chain in `dir`, sorted by file name
    pub fn load_directory(dir: &Path) -> Result<Vec<ChainDefinition>, LoadError> {
        Self::chain_files(dir)?
            .iter()
            .map(|path| Self::load_file(path))
            .collect()
    }

    /// Chain files in `dir`, sorted by file name
    pub fn chain_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
        let mut files = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let ext = path.extension().and_then(|e| e.to_str());
            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

            // runner.yaml is configuration, not a chain
            if filename == "runner.yaml" || filename == "runner.yml" {
                continue;
            }

            if ext == Some("yaml") || ext == Some("yml") {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    pub fn load_file(path: &Path) -> Result<ChainDefinition, LoadError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
            file: path.display().to_string(),
            error: e,
        })
    }

    pub fn load_str(yaml: &str) -> Result<ChainDefinition, LoadError> {
        serde_yaml::from_str(yaml).map_err(|e| LoadError::Yaml {
            file: "<inline>".to_string(),
            error: e,
        })
    }
}
