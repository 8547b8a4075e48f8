//! Serde helpers for category-keyed tables.

use fleet_types::ServiceCategory;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Deserializes a table keyed by category name, rejecting unknown names.
pub fn deserialize_category_map<'de, D, T>(
	deserializer: D,
) -> Result<BTreeMap<ServiceCategory, T>, D::Error>
where
	D: Deserializer<'de>,
	T: Deserialize<'de>,
{
	let map = BTreeMap::<String, T>::deserialize(deserializer)?;

	map.into_iter()
		.map(|(k, v)| {
			k.parse::<ServiceCategory>()
				.map(|category| (category, v))
				.map_err(serde::de::Error::custom)
		})
		.collect()
}

/// Serializes a category-keyed table with the category names as keys.
pub fn serialize_category_map<S, T>(
	map: &BTreeMap<ServiceCategory, T>,
	serializer: S,
) -> Result<S::Ok, S::Error>
where
	S: Serializer,
	T: Serialize,
{
	let string_map: BTreeMap<&'static str, &T> =
		map.iter().map(|(k, v)| (k.as_str(), v)).collect();

	string_map.serialize(serializer)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, Deserialize, Serialize)]
	struct Ports {
		#[serde(
			deserialize_with = "deserialize_category_map",
			serialize_with = "serialize_category_map"
		)]
		ports: BTreeMap<ServiceCategory, u16>,
	}

	#[test]
	fn test_deserialize_category_map() {
		let toml = r#"
            [ports]
            wisdom = 8200
            silicon_sage = 8700
        "#;

		let result: Ports = toml::from_str(toml).unwrap();
		assert_eq!(result.ports[&ServiceCategory::Wisdom], 8200);
		assert_eq!(result.ports[&ServiceCategory::SiliconSage], 8700);
	}

	#[test]
	fn test_unknown_category_is_rejected() {
		let toml = r#"
            [ports]
            astrology = 1
        "#;

		let err = toml::from_str::<Ports>(toml).unwrap_err();
		assert!(err.to_string().contains("unknown service category"));
	}

	#[test]
	fn test_serialize_category_map() {
		let mut ports = BTreeMap::new();
		ports.insert(ServiceCategory::MeaningMaking, 8500);

		let toml = toml::to_string(&Ports { ports }).unwrap();
		assert!(toml.contains("meaning_making = 8500"));
	}
}
