mod defaults;
mod store;

pub use defaults::{default_template, size_for_category, DEFAULT_SIZE};
pub use store::{JsonTemplateStore, MemoryTemplateStore, Template, TemplateStore};
