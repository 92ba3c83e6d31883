//! Area type.

use serde::{Deserialize, Serialize};

use super::ids::{AreaId, CountryId};

/// Named region grouping nodes on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// Unique area identifier.
    pub id: AreaId,
    /// Display name.
    pub name: String,
    /// Parent country.
    pub country_id: CountryId,
}

impl Area {
    /// Create an area with a fresh id.
    pub fn new(name: impl Into<String>, country_id: CountryId) -> Self {
        Self {
            id: AreaId::generate(),
            name: name.into(),
            country_id,
        }
    }
}
