use std::path::{Path, PathBuf};
use std::sync::Arc;

use cardforge_contracts::templates::{default_template, TemplateStore, DEFAULT_SIZE};
use tracing::{debug, warn};

/// Which lookup tier produced a resolved template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSource {
    Store,
    Default,
    Fallback,
}

impl TemplateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateSource::Store => "store",
            TemplateSource::Default => "default",
            TemplateSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub title: String,
    pub prompt: String,
    pub reference_image: Option<PathBuf>,
    pub default_size: String,
    pub source: TemplateSource,
}

impl ResolvedTemplate {
    /// The reference image, only if it is actually present on disk.
    pub fn existing_reference_image(&self) -> Option<&Path> {
        self.reference_image
            .as_deref()
            .filter(|path| path.is_file())
    }
}

/// Maps a template title to a prompt and optional reference image:
/// store record, then built-in default, then a synthesized prompt.
#[derive(Clone)]
pub struct TemplateResolver {
    store: Arc<dyn TemplateStore>,
}

impl TemplateResolver {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    /// Never fails. Lookup errors are logged and resolution continues with
    /// the built-in tiers.
    pub fn resolve(&self, title: &str) -> ResolvedTemplate {
        match self.store.find_by_title(title) {
            Ok(Some(template)) if template.active => {
                debug!(title = %template.title, "template resolved from store");
                return ResolvedTemplate {
                    title: template.title,
                    prompt: template.prompt,
                    reference_image: template.reference_image,
                    default_size: template
                        .default_size
                        .filter(|size| !size.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_SIZE.to_string()),
                    source: TemplateSource::Store,
                };
            }
            Ok(_) => warn!(title, "template not found"),
            Err(err) => warn!(title, "error fetching template: {err:#}"),
        }

        if let Some(template) = default_template(title) {
            return ResolvedTemplate {
                title: template.title,
                prompt: template.prompt,
                reference_image: None,
                default_size: template
                    .default_size
                    .unwrap_or_else(|| DEFAULT_SIZE.to_string()),
                source: TemplateSource::Default,
            };
        }

        ResolvedTemplate {
            title: title.to_string(),
            prompt: format!("Create a beautiful card design for {title}"),
            reference_image: None,
            default_size: DEFAULT_SIZE.to_string(),
            source: TemplateSource::Fallback,
        }
    }
}
