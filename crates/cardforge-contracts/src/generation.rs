use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generation mode, chosen from which input images are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Template image is the base, user image is the mask.
    EditWithMask,
    VariationFromTemplate,
    VariationFromUserImage,
    GenerateFromPrompt,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::EditWithMask => "edit_with_mask",
            Strategy::VariationFromTemplate => "variation_from_template",
            Strategy::VariationFromUserImage => "variation_from_user_image",
            Strategy::GenerateFromPrompt => "generate_from_prompt",
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Strategy::EditWithMask => Operation::Edit,
            Strategy::VariationFromTemplate | Strategy::VariationFromUserImage => {
                Operation::Variation
            }
            Strategy::GenerateFromPrompt => Operation::Generation,
        }
    }
}

/// Provider operation behind a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Generation,
    Variation,
    Edit,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Generation => "generation",
            Operation::Variation => "variation",
            Operation::Edit => "edit",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub template_title: String,
    pub user_text: Option<String>,
    pub user_image: Option<Vec<u8>>,
    pub user_image_format: Option<String>,
    pub requested_size: Option<String>,
}

impl GenerationRequest {
    pub fn new(template_title: impl Into<String>) -> Self {
        Self {
            template_title: template_title.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.user_text = Some(text.into());
        self
    }

    pub fn with_image(mut self, bytes: Vec<u8>, format: Option<String>) -> Self {
        self.user_image = Some(bytes);
        self.user_image_format = format;
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.requested_size = Some(size.into());
        self
    }
}

/// Inbound wire form: the image travels as base64 text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPayload {
    #[serde(alias = "template_type")]
    pub template_title: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub image_format: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub image_base64: String,
    pub image_url: String,
    #[serde(rename = "image_format")]
    pub format: String,
    pub size_bytes: usize,
    pub prompt_used: String,
    pub strategy: Strategy,
    pub operation: Operation,
    pub provider_model: String,
    pub template_title: String,
    pub resolved_template_title: String,
    pub size: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Input,
    Provider,
    Transport,
    Staging,
}

/// The only failure shape callers ever see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub success: bool,
    pub error: String,
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_title: Option<String>,
}

impl GenerationFailure {
    pub fn new(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            kind,
            template_title: None,
        }
    }

    pub fn with_template(mut self, title: impl Into<String>) -> Self {
        self.template_title = Some(title.into());
        self
    }
}

impl std::fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)
    }
}

impl std::error::Error for GenerationFailure {}

pub fn outcome_payload(
    outcome: &Result<GenerationResult, GenerationFailure>,
) -> serde_json::Result<Value> {
    match outcome {
        Ok(result) => serde_json::to_value(result),
        Err(failure) => serde_json::to_value(failure),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strategies_map_to_provider_operations() {
        assert_eq!(Strategy::EditWithMask.operation(), Operation::Edit);
        assert_eq!(Strategy::VariationFromTemplate.operation(), Operation::Variation);
        assert_eq!(Strategy::VariationFromUserImage.operation(), Operation::Variation);
        assert_eq!(Strategy::GenerateFromPrompt.operation(), Operation::Generation);
    }

    #[test]
    fn payload_accepts_template_type_alias() -> anyhow::Result<()> {
        let payload: GenerationPayload = serde_json::from_value(json!({
            "template_type": "birthday",
            "text": "for grandma",
        }))?;
        assert_eq!(payload.template_title, "birthday");
        assert_eq!(payload.text.as_deref(), Some("for grandma"));
        assert!(payload.image_data.is_none());
        Ok(())
    }

    #[test]
    fn failure_payload_is_structured() -> anyhow::Result<()> {
        let failure = GenerationFailure::new(FailureKind::Transport, "Download failed: HTTP 404")
            .with_template("birthday");
        let value = outcome_payload(&Err(failure))?;
        assert_eq!(
            value,
            json!({
                "success": false,
                "error": "Download failed: HTTP 404",
                "kind": "transport",
                "template_title": "birthday",
            })
        );
        Ok(())
    }

    #[test]
    fn success_payload_uses_wire_names() -> anyhow::Result<()> {
        let result = GenerationResult {
            success: true,
            image_base64: "iVBORw0KGgo=".to_string(),
            image_url: "https://cdn.example/img.png".to_string(),
            format: "image/png".to_string(),
            size_bytes: 8,
            prompt_used: "balloons".to_string(),
            strategy: Strategy::GenerateFromPrompt,
            operation: Operation::Generation,
            provider_model: "dall-e-3".to_string(),
            template_title: "Birthday".to_string(),
            resolved_template_title: "birthday".to_string(),
            size: "1024x1024".to_string(),
        };
        let value = outcome_payload(&Ok(result))?;
        assert_eq!(value["image_format"], json!("image/png"));
        assert_eq!(value["strategy"], json!("generate_from_prompt"));
        assert_eq!(value["operation"], json!("generation"));
        assert_eq!(value["success"], json!(true));
        Ok(())
    }
}
