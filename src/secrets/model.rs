//! Secret and folder payloads returned by the secrets API.

// crates.io
use serde::Deserializer;
// self
use crate::{_prelude::*, auth::SecretString};

/// Secret record returned by the secrets API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretValue {
	/// Remote identifier.
	#[serde(default, alias = "ID", deserialize_with = "de_id")]
	pub id: String,
	/// Display title; folder listings are keyed by it.
	#[serde(default)]
	pub title: String,
	/// Associated account name, when the secret is a credential.
	#[serde(default)]
	pub username: Option<String>,
	/// Secret material; empty when the record carries none.
	#[serde(default)]
	pub password: SecretString,
	/// Folder containing the secret.
	#[serde(default, deserialize_with = "de_opt_id")]
	pub folder_id: Option<String>,
}
impl SecretValue {
	/// Returns the secret material. Callers must avoid logging it.
	pub fn value(&self) -> &str {
		self.password.expose()
	}
}

/// Folder record returned by the secrets API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Folder {
	/// Remote identifier (spelled `Id` or `ID` depending on the API version).
	#[serde(alias = "ID", deserialize_with = "de_id")]
	pub id: String,
	/// Folder name.
	pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
	Text(String),
	Number(i64),
}
impl From<RawId> for String {
	fn from(raw: RawId) -> Self {
		match raw {
			RawId::Text(value) => value,
			RawId::Number(value) => value.to_string(),
		}
	}
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	RawId::deserialize(deserializer).map(String::from)
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
}
