//! The in-memory action model: the tagged union the lazy transformer folds
//! over a base schema, and the filter comparison operators it supports.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::format::ColumnType;

/// A column- or row-level transformation in a recipe's action stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MorphAction {
    Rename {
        old: String,
        new: String,
    },
    Delete {
        name: String,
    },
    Cast {
        name: String,
        #[serde(rename = "targetType")]
        target_type: ColumnType,
    },
    Filter {
        name: String,
        op: Operator,
        value: String,
    },
}

/// Comparison operator for a [`MorphAction::Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

/// A [`MorphAction::Filter`] resolved to a concrete source column index and
/// effective type, produced by projecting the filter through every
/// preceding rename/delete/cast action.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub source_column_index: usize,
    pub effective_type: ColumnType,
    pub op: Operator,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn morph_action_round_trips_camel_case_json() {
        let action = MorphAction::Cast {
            name: "age".into(),
            target_type: ColumnType::WholeNumber,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"cast\""));
        assert!(json.contains("\"targetType\":\"wholeNumber\""));
        let back: MorphAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn unknown_type_tag_is_a_deserialization_error() {
        let err = serde_json::from_str::<MorphAction>(r#"{"type":"explode"}"#);
        assert!(err.is_err());
    }
}
