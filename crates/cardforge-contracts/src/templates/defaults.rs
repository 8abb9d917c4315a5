use indexmap::IndexMap;

use super::store::Template;

pub const DEFAULT_SIZE: &str = "1024x1024";

/// Built-in templates used when the store has no record for a title.
pub fn default_template(title: &str) -> Option<Template> {
    default_templates().swap_remove(title.trim().to_lowercase().as_str())
}

/// Output size for well-known card categories.
pub fn size_for_category(category: &str) -> Option<&'static str> {
    let size = match category.trim().to_lowercase().as_str() {
        "business" | "greeting" | "congratulation" | "birthday" | "square" => "1024x1024",
        "postcard" | "portrait" => "1024x1792",
        "landscape" | "wide" => "1792x1024",
        "instagram" => "1080x1080",
        "story" => "1080x1920",
        _ => return None,
    };
    Some(size)
}

fn default_templates() -> IndexMap<String, Template> {
    let mut map = IndexMap::new();

    let mut insert = |title: &str, prompt: &str| {
        map.insert(
            title.to_string(),
            Template {
                title: title.to_string(),
                prompt: prompt.to_string(),
                reference_image: None,
                active: true,
                default_size: Some(DEFAULT_SIZE.to_string()),
            },
        );
    };

    insert(
        "greeting",
        "Create a beautiful greeting card with warm colors and elegant typography",
    );
    insert(
        "congratulation",
        "Design a congratulatory card with celebratory elements and golden accents",
    );
    insert(
        "birthday",
        "Create a festive birthday card with balloons, cake, and party elements",
    );
    insert(
        "business",
        "Design a professional business card with clean layout and corporate style",
    );

    map
}
