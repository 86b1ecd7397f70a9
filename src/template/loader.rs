//! Template loader module.
//!
//! Pages ship embedded in the binary. A configured directory may override
//! any of them with a `<name>.html` file.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Result, TemplateEngine, TemplateError};

/// Name of the listing page template.
pub const INDEX: &str = "index";

/// Templates compiled into the binary.
const BUILTIN: &[(&str, &str)] = &[(INDEX, include_str!("../../templates/index.html"))];

/// Resolves template sources, preferring an override directory.
#[derive(Debug, Clone, Default)]
pub struct TemplateLoader {
    override_dir: Option<PathBuf>,
}

impl TemplateLoader {
    /// Loader that only uses the embedded templates.
    pub fn builtin() -> Self {
        Self { override_dir: None }
    }

    /// Loader that checks `dir` before the embedded templates.
    pub fn with_override<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            override_dir: Some(dir.as_ref().to_path_buf()),
        }
    }

    /// Source of template `name`.
    pub fn source(&self, name: &str) -> Result<String> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{name}.html"));
            if path.is_file() {
                return fs::read_to_string(&path).map_err(|e| {
                    TemplateError::Render(format!("failed to read template {}: {e}", path.display()))
                });
            }
        }

        BUILTIN
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, source)| (*source).to_string())
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    /// Parse every known template into a fresh engine.
    ///
    /// Parse errors in an override surface here, at startup.
    pub fn load_engine(&self) -> Result<TemplateEngine> {
        let mut engine = TemplateEngine::new();
        for (name, _) in BUILTIN {
            let source = self.source(name)?;
            engine.load(*name, &source)?;
        }
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_index_exists() {
        let source = TemplateLoader::builtin().source(INDEX).unwrap();
        assert!(source.contains("{{#each files"));
    }

    #[test]
    fn test_unknown_template() {
        let result = TemplateLoader::builtin().source("missing");
        assert!(matches!(result, Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_override_directory_wins() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("index.html"), "custom {{title}}").unwrap();

        let loader = TemplateLoader::with_override(temp_dir.path());
        assert_eq!(loader.source(INDEX).unwrap(), "custom {{title}}");
    }

    #[test]
    fn test_override_falls_back_to_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let loader = TemplateLoader::with_override(temp_dir.path());
        assert_eq!(
            loader.source(INDEX).unwrap(),
            TemplateLoader::builtin().source(INDEX).unwrap()
        );
    }

    #[test]
    fn test_load_engine_parses_builtin() {
        let engine = TemplateLoader::builtin().load_engine().unwrap();
        assert!(engine.has_template(INDEX));
    }

    #[test]
    fn test_load_engine_reports_broken_override() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("index.html"), "{{#if open}}").unwrap();

        let result = TemplateLoader::with_override(temp_dir.path()).load_engine();
        assert!(matches!(result, Err(TemplateError::Parse(_))));
    }
}
