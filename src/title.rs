//! Minimal title normalization.
//!
//! Full MediaWiki normalization (namespace casing, whitespace collapsing) is deferred; this
//! implements only: underscores become spaces, embedded newlines are stripped, and the first
//! character is uppercased. The rest is preserved verbatim.

/// Normalize a page title per the rules above.
pub fn normalize(title: &str) -> String {
	let without_newlines: String = title.chars().filter(|c| *c != '\n').collect();
	let spaced = without_newlines.replace('_', " ");
	let mut chars = spaced.chars();

	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => spaced,
	}
}
