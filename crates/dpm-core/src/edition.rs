//! The distribution edition an installation is pinned to. Chooses which
//! SDK-manifests repository `update`/`bootstrap` resolve against.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Edition {
    #[default]
    OpenSource,
    Enterprise,
    Private,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid edition {0:?}: must be one of 'open-source', 'enterprise', 'private'")]
pub struct InvalidEdition(String);

impl FromStr for Edition {
    type Err = InvalidEdition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open-source" => Ok(Edition::OpenSource),
            "enterprise" => Ok(Edition::Enterprise),
            "private" => Ok(Edition::Private),
            other => Err(InvalidEdition(other.to_string())),
        }
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Edition::OpenSource => "open-source",
            Edition::Enterprise => "enterprise",
            Edition::Private => "private",
        };
        write!(f, "{s}")
    }
}

impl Edition {
    /// The OCI repository holding this edition's SDK manifests.
    pub fn sdk_manifests_repo(&self) -> &'static str {
        match self {
            Edition::OpenSource => "dpm/sdk-manifests-open-source",
            Edition::Enterprise => "dpm/sdk-manifests-enterprise",
            Edition::Private => "dpm/sdk-manifests-private",
        }
    }
}

impl Serialize for Edition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Edition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for Edition {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "Edition".into()
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        String::json_schema(generator)
    }
}
