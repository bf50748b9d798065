//! Shared serde default functions used across the metadata model.

/// Serde default function that returns `true`.
///
/// Used for the active/include flags, which default to enabled.
pub fn default_true() -> bool {
    true
}

/// Default precedence group for source mappings.
pub fn default_precedence_group() -> String {
    "1".to_string()
}

/// Default rule precedence (base contributor).
pub fn default_precedence() -> u32 {
    1
}

/// Scalar YAML/JSON value accepted where the model stores text.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Deserialize a string field that may be written as a bare number
/// (`source_uid: 4000`).
pub fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Scalar as serde::Deserialize>::deserialize(deserializer).map(Scalar::into_text)
}

/// Optional variant of [`scalar_string`].
pub fn opt_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Option<Scalar> as serde::Deserialize>::deserialize(deserializer)
        .map(|v| v.map(Scalar::into_text))
}

/// Deserialize a list whose items may be bare numbers (`[1, 2]`).
pub fn scalar_string_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Vec<Scalar> as serde::Deserialize>::deserialize(deserializer)
        .map(|items| items.into_iter().map(Scalar::into_text).collect())
}
