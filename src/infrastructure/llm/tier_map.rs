//! Maps a closed `ModelTier` onto a concrete Anthropic model name. Kept as
//! its own module so swapping model revisions never touches call sites.

use crate::domain::models::ModelTier;

pub fn model_name(tier: ModelTier) -> &'static str {
    match tier {
        ModelTier::Cheap => "claude-3-5-haiku-20241022",
        ModelTier::Medium => "claude-3-5-sonnet-20241022",
        ModelTier::Expensive => "claude-3-opus-20240229",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tier_maps_to_a_distinct_model() {
        let names: Vec<&str> = [ModelTier::Cheap, ModelTier::Medium, ModelTier::Expensive]
            .into_iter()
            .map(model_name)
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| !n.is_empty()));
    }
}
