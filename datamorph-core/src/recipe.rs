//! The in-memory shape of a recipe document. Serialization to/from disk is
//! an external collaborator's concern; this crate only owns the shape and
//! its round trip through `serde_json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::MorphAction;
use crate::error::{DataMorphError, DataMorphResult};

/// A named, ordered action stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(default)]
    pub actions: Vec<MorphAction>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Recipe {
    pub fn new(name: impl Into<String>) -> DataMorphResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DataMorphError::ArgumentInvalid("recipe name must be non-empty".into()));
        }
        Ok(Self {
            name,
            description: None,
            actions: Vec::new(),
            last_modified: None,
        })
    }

    pub fn with_action(mut self, action: MorphAction) -> Self {
        self.actions.push(action);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ColumnType;

    #[test]
    fn round_trips_through_json_with_camel_case_fields() {
        let recipe = Recipe::new("clean-up")
            .unwrap()
            .with_action(MorphAction::Rename {
                old: "a".into(),
                new: "b".into(),
            })
            .with_action(MorphAction::Cast {
                name: "b".into(),
                target_type: ColumnType::WholeNumber,
            });
        let json = serde_json::to_string(&recipe).unwrap();
        assert!(json.contains("\"name\":\"clean-up\""));
        assert!(!json.contains("lastModified"));
        let back: Recipe = serde_json::from_str(&json).unwrap();
        assert_eq!(back, recipe);
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(Recipe::new("").is_err());
    }
}
