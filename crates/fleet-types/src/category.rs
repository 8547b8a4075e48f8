//! Service categories.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of processing capability an instance provides.
///
/// The set is closed: adding a category is a code change here, while
/// attaching behaviour to a category is a registration in the capability
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
	Relevance,
	Wisdom,
	Rationality,
	Phenomenology,
	MeaningMaking,
	Integration,
	SiliconSage,
}

impl ServiceCategory {
	/// All categories in declaration order.
	pub const ALL: [ServiceCategory; 7] = [
		ServiceCategory::Relevance,
		ServiceCategory::Wisdom,
		ServiceCategory::Rationality,
		ServiceCategory::Phenomenology,
		ServiceCategory::MeaningMaking,
		ServiceCategory::Integration,
		ServiceCategory::SiliconSage,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Relevance => "relevance",
			Self::Wisdom => "wisdom",
			Self::Rationality => "rationality",
			Self::Phenomenology => "phenomenology",
			Self::MeaningMaking => "meaning_making",
			Self::Integration => "integration",
			Self::SiliconSage => "silicon_sage",
		}
	}
}

impl fmt::Display for ServiceCategory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ServiceCategory {
	type Err = UnknownCategory;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.iter()
			.copied()
			.find(|c| c.as_str() == s)
			.ok_or_else(|| UnknownCategory(s.to_string()))
	}
}

/// Returned when a string does not name a known category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service category: {0}")]
pub struct UnknownCategory(pub String);
