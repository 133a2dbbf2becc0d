//! Generation models a request may select. Anything else is rejected at the boundary.

use serde::Serialize;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub display_name: &'static str,
}

pub const AVAILABLE_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gpt-4o-mini",
        display_name: "GPT-4o Mini (recommended)",
    },
    ModelInfo {
        id: "gpt-3.5-turbo",
        display_name: "GPT-3.5 Turbo (economy)",
    },
    ModelInfo {
        id: "gpt-4.1-mini",
        display_name: "GPT-4.1 Mini",
    },
    ModelInfo {
        id: "gpt-4.1",
        display_name: "GPT-4.1",
    },
    ModelInfo {
        id: "gpt-4o",
        display_name: "GPT-4o",
    },
];

pub fn find(id: &str) -> Option<&'static ModelInfo> {
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_is_in_catalog() {
        assert!(find(DEFAULT_MODEL).is_some());
    }

    #[test]
    fn test_lookup_is_exact() {
        assert!(find("gpt-4o").is_some());
        assert!(find("GPT-4O").is_none());
        assert!(find("gpt-5").is_none());
    }
}
