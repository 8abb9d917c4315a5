use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub reference_image: Option<PathBuf>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub default_size: Option<String>,
}

impl Template {
    pub fn new(title: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            prompt: prompt.into(),
            reference_image: None,
            active: true,
            default_size: None,
        }
    }

    pub fn with_reference_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_image = Some(path.into());
        self
    }

    pub fn with_default_size(mut self, size: impl Into<String>) -> Self {
        self.default_size = Some(size.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    fn matches_title(&self, title: &str) -> bool {
        self.active && self.title.trim().to_lowercase() == title.trim().to_lowercase()
    }
}

/// Read-only template lookup. Writes happen through the admin surface.
pub trait TemplateStore: Send + Sync {
    fn find_by_title(&self, title: &str) -> anyhow::Result<Option<Template>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateStore {
    templates: Vec<Template>,
}

impl MemoryTemplateStore {
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.push(template);
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn find_by_title(&self, title: &str) -> anyhow::Result<Option<Template>> {
        Ok(self
            .templates
            .iter()
            .find(|template| template.matches_title(title))
            .cloned())
    }
}

/// Template records kept in a JSON file, either a bare array or
/// `{"templates": [...]}`. The file is re-read on every lookup so edits made
/// by the admin tooling are picked up without a restart. Relative
/// `reference_image` paths resolve against the file's directory.
#[derive(Debug, Clone)]
pub struct JsonTemplateStore {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TemplateFile {
    List(Vec<Template>),
    Wrapped { templates: Vec<Template> },
}

impl JsonTemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Vec<Template>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        let parsed: TemplateFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid template file {}", self.path.display()))?;
        let templates = match parsed {
            TemplateFile::List(templates) => templates,
            TemplateFile::Wrapped { templates } => templates,
        };
        let base_dir = self.path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(templates
            .into_iter()
            .map(|mut template| {
                template.reference_image = template
                    .reference_image
                    .take()
                    .filter(|path| !path.as_os_str().is_empty())
                    .map(|path| {
                        if path.is_relative() {
                            base_dir.join(path)
                        } else {
                            path
                        }
                    });
                template
            })
            .collect())
    }
}

impl TemplateStore for JsonTemplateStore {
    fn find_by_title(&self, title: &str) -> anyhow::Result<Option<Template>> {
        Ok(self
            .load()?
            .into_iter()
            .find(|template| template.matches_title(title)))
    }
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{JsonTemplateStore, MemoryTemplateStore, Template, TemplateStore};

    #[test]
    fn memory_store_matches_titles_case_insensitively() -> anyhow::Result<()> {
        let store = MemoryTemplateStore::new(vec![Template::new("Wedding", "rings and doves")]);
        let found = store.find_by_title("wedding")?;
        assert_eq!(found.map(|template| template.prompt), Some("rings and doves".to_string()));
        assert!(store.find_by_title("funeral")?.is_none());
        Ok(())
    }

    #[test]
    fn inactive_templates_are_skipped() -> anyhow::Result<()> {
        let mut store = MemoryTemplateStore::default();
        store.insert(Template::new("wedding", "old prompt").inactive());
        assert!(store.find_by_title("wedding")?.is_none());

        store.insert(Template::new("WEDDING", "new prompt"));
        let found = store.find_by_title("Wedding")?;
        assert_eq!(found.map(|template| template.prompt), Some("new prompt".to_string()));
        Ok(())
    }

    #[test]
    fn json_store_reads_wrapped_file_and_resolves_relative_images() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("templates.json");
        fs::write(
            &path,
            r#"{"templates": [
                {"title": "Anniversary", "prompt": "hearts", "reference_image": "refs/anniversary.png"},
                {"title": "retirement", "prompt": "beach chairs", "default_size": "1792x1024"}
            ]}"#,
        )?;

        let store = JsonTemplateStore::new(&path);
        let anniversary = store.find_by_title("anniversary")?.unwrap();
        assert_eq!(
            anniversary.reference_image,
            Some(temp.path().join("refs/anniversary.png"))
        );
        assert!(anniversary.active);

        let retirement = store.find_by_title("Retirement")?.unwrap();
        assert_eq!(retirement.reference_image, None);
        assert_eq!(retirement.default_size.as_deref(), Some("1792x1024"));
        Ok(())
    }

    #[test]
    fn json_store_accepts_bare_arrays() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("templates.json");
        fs::write(&path, r#"[{"title": "promo", "prompt": "sale banner", "active": false}]"#)?;

        let store = JsonTemplateStore::new(&path);
        assert_eq!(store.load()?.len(), 1);
        assert!(store.find_by_title("promo")?.is_none());
        Ok(())
    }

    #[test]
    fn json_store_surfaces_unreadable_files() {
        let store = JsonTemplateStore::new("/nonexistent/cardforge/templates.json");
        assert!(store.find_by_title("birthday").is_err());
    }
}
