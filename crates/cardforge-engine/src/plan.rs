use std::path::Path;

use cardforge_contracts::generation::Strategy;

/// The provider run selected for a request, holding the images that run
/// consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPlan<'a> {
    /// Template image is the base, user image is the mask.
    EditWithMask { template: &'a Path, mask: &'a [u8] },
    VariationFromTemplate { template: &'a Path },
    VariationFromUserImage { image: &'a [u8] },
    GenerateFromPrompt,
}

impl<'a> GenerationPlan<'a> {
    /// A template + user pairing wins over a single-image variation, which
    /// wins over text-only generation. No I/O.
    pub fn select(template_image: Option<&'a Path>, user_image: Option<&'a [u8]>) -> Self {
        match (template_image, user_image) {
            (Some(template), Some(mask)) => GenerationPlan::EditWithMask { template, mask },
            (Some(template), None) => GenerationPlan::VariationFromTemplate { template },
            (None, Some(image)) => GenerationPlan::VariationFromUserImage { image },
            (None, None) => GenerationPlan::GenerateFromPrompt,
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            GenerationPlan::EditWithMask { .. } => Strategy::EditWithMask,
            GenerationPlan::VariationFromTemplate { .. } => Strategy::VariationFromTemplate,
            GenerationPlan::VariationFromUserImage { .. } => Strategy::VariationFromUserImage,
            GenerationPlan::GenerateFromPrompt => Strategy::GenerateFromPrompt,
        }
    }
}
