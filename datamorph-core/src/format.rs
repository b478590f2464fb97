//! Source-format and column-type tags shared across the schema, scanner and
//! transformer modules.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The on-disk shape of a table's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SourceFormat {
    Csv,
    JsonLines,
    JsonArray,
    JsonObject,
}

/// Inferred or declared type of a column's values.
///
/// Ordered here the way the type lattice in [`crate::schema_scanner`] expects
/// to reason about it; the order itself carries no meaning for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ColumnType {
    Null,
    Boolean,
    WholeNumber,
    FloatingPoint,
    Timestamp,
    Text,
    JsonObject,
    JsonArray,
}

impl Default for ColumnType {
    /// `Null` is the identity element of [`ColumnType::merge`]'s lattice.
    fn default() -> Self {
        ColumnType::Null
    }
}

impl ColumnType {
    /// Merges two observed types for the same column into one, per the
    /// commutative, idempotent priority lattice:
    /// `Boolean ∨ WholeNumber → Text`, `WholeNumber ∨ FloatingPoint →
    /// FloatingPoint`, `Boolean ∨ anything non-Boolean → Text`, `T ∨ T → T`,
    /// `Text ∨ anything → Text`.
    pub fn merge(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        if self == other {
            return self;
        }
        match (self, other) {
            (Null, other) | (other, Null) => other,
            (Text, _) | (_, Text) => Text,
            (WholeNumber, FloatingPoint) | (FloatingPoint, WholeNumber) => FloatingPoint,
            (Boolean, _) | (_, Boolean) => Text,
            (JsonObject, JsonObject) => JsonObject,
            (JsonArray, JsonArray) => JsonArray,
            _ => Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ColumnType::*;

    #[test]
    fn merge_is_commutative_for_known_pairs() {
        let pairs = [
            (Boolean, WholeNumber),
            (WholeNumber, FloatingPoint),
            (Text, Timestamp),
            (Null, Text),
        ];
        for (a, b) in pairs {
            assert_eq!(a.merge(b), b.merge(a));
        }
    }

    #[test]
    fn merge_matches_lattice_table() {
        assert_eq!(Boolean.merge(WholeNumber), Text);
        assert_eq!(WholeNumber.merge(FloatingPoint), FloatingPoint);
        assert_eq!(Text.merge(WholeNumber), Text);
        assert_eq!(WholeNumber.merge(WholeNumber), WholeNumber);
        assert_eq!(Null.merge(Boolean), Boolean);
    }
}
