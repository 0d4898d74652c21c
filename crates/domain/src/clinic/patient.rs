use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Patient record, maintained outside this service.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    /// Passed through as stored; records hold numbers or strings here.
    #[serde(default)]
    pub age: Option<Value>,
    #[serde(default)]
    pub phase: Option<Value>,
    #[serde(default, deserialize_with = "specialty_list")]
    pub specialties: Vec<String>,
}

// Older records keep specialties as one comma-separated string.
fn specialty_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    let names = match Option::<Raw>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::List(names)) => names,
        Some(Raw::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
    };

    Ok(names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}
