//! Compiler configuration: where the addon lives and where output goes

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

fn default_source_file() -> String {
    "addon.xq".to_string()
}

fn default_tree_template() -> PathBuf {
    PathBuf::from("target").join("tree-template.xq")
}

/// Paths of one addon compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Directory holding the addon source and the framework descriptor
    pub addon_dir: PathBuf,
    /// Descriptor name, without the `.framework` extension
    pub framework_id: String,
    /// Directory receiving the auxiliary artifacts
    pub target_dir: PathBuf,
    /// Source file name, relative to `addon_dir`
    #[serde(default = "default_source_file")]
    pub source_file: String,
    /// Tree-generator template skeleton, relative to `addon_dir` unless absolute
    #[serde(default = "default_tree_template")]
    pub tree_template: PathBuf,
}

impl CompilerConfig {
    pub fn new(
        addon_dir: impl Into<PathBuf>,
        framework_id: impl Into<String>,
        target_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            addon_dir: addon_dir.into(),
            framework_id: framework_id.into(),
            target_dir: target_dir.into(),
            source_file: default_source_file(),
            tree_template: default_tree_template(),
        }
    }

    /// Read a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.framework_id.trim().is_empty() {
            return Err(Error::Config("frameworkId must not be empty".to_string()));
        }
        if self.source_file.trim().is_empty() {
            return Err(Error::Config("sourceFile must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn source_path(&self) -> PathBuf {
        self.addon_dir.join(&self.source_file)
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.addon_dir.join(format!("{}.framework", self.framework_id))
    }

    pub fn tree_template_path(&self) -> PathBuf {
        self.addon_dir.join(&self.tree_template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let config = CompilerConfig::new("/addons/dict", "dictionary", "/out");
        assert_eq!(config.source_path(), PathBuf::from("/addons/dict/addon.xq"));
        assert_eq!(
            config.descriptor_path(),
            PathBuf::from("/addons/dict/dictionary.framework")
        );
        assert_eq!(
            config.tree_template_path(),
            PathBuf::from("/addons/dict/target/tree-template.xq")
        );
    }

    #[test]
    fn test_from_file_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addon-builder.json");
        fs::write(
            &path,
            r#"{"addonDir": "/a", "frameworkId": "dict", "targetDir": "/t", "sourceFile": "main.xq"}"#,
        )
        .unwrap();

        let config = CompilerConfig::from_file(&path).unwrap();
        assert_eq!(config.source_file, "main.xq");
        assert_eq!(config.tree_template, PathBuf::from("target/tree-template.xq"));
    }

    #[test]
    fn test_invalid_configs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");

        fs::write(&path, r#"{"addonDir": "/a"}"#).unwrap();
        assert!(matches!(CompilerConfig::from_file(&path), Err(Error::Config(_))));

        fs::write(&path, r#"{"addonDir": "/a", "frameworkId": " ", "targetDir": "/t"}"#).unwrap();
        assert!(matches!(CompilerConfig::from_file(&path), Err(Error::Config(_))));

        assert!(matches!(
            CompilerConfig::from_file(&dir.path().join("missing.json")),
            Err(Error::Io { .. })
        ));
    }
}
