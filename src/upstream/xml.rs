//! Event-driven parser for the `export=1&exportnowrap=1` XML document.
//!
//! Walked with [`quick_xml::Reader`] rather than a serde derive because the document must be
//! validated as it is walked: an unexpected element directly under the root is a fatal protocol
//! violation, not something a lenient deserializer should silently ignore.

// crates.io
use quick_xml::{Reader, events::Event};
// self
use crate::{
	_prelude::*,
	upstream::types::ExportedPage,
};

fn fatal(reason: impl Into<String>) -> Error {
	Error::UpstreamFatal { group: "export".into(), reason: reason.into() }
}

/// Parse an export document into the pages it contains.
pub fn parse_export(bytes: &[u8]) -> Result<Vec<ExportedPage>> {
	let mut reader = Reader::from_reader(bytes);
	reader.config_mut().trim_text = true;

	let mut buf = Vec::new();
	let mut path: Vec<String> = Vec::new();
	let mut pages = Vec::new();

	let mut title: Option<String> = None;
	let mut revid: Option<i64> = None;
	let mut text: Option<String> = None;

	loop {
		match reader.read_event_into(&mut buf)? {
			Event::Start(start) => {
				let name = local_name(start.name().as_ref());

				if path.is_empty() {
					if name != "mediawiki" {
						return Err(fatal(format!("unexpected root element <{name}>")));
					}
				} else if path.len() == 1 && name != "siteinfo" && name != "page" {
					return Err(fatal(format!("unexpected top-level element <{name}>")));
				}

				if name == "page" {
					title = None;
					revid = None;
					text = None;
				}

				path.push(name);
			},
			Event::Empty(start) => {
				// A self-closing tag never carries text; only relevant for validation.
				let name = local_name(start.name().as_ref());

				if path.is_empty() && name != "mediawiki" {
					return Err(fatal(format!("unexpected root element <{name}>")));
				}
				if path.len() == 1 && name != "siteinfo" && name != "page" {
					return Err(fatal(format!("unexpected top-level element <{name}>")));
				}
			},
			Event::End(_) => {
				let closed = path.pop();

				if closed.as_deref() == Some("page") {
					let title = title.take().ok_or_else(|| fatal("page element missing title"))?;
					let revid =
						revid.take().ok_or_else(|| fatal("page element missing revision id"))?;
					let text = text.take().unwrap_or_default();

					pages.push(ExportedPage { title, revid, text });
				}
			},
			Event::Text(bytes_text) => {
				let content = bytes_text.unescape()?.into_owned();
				let parent = parent_of(&path);

				match (path.last().map(String::as_str), parent) {
					(Some("title"), Some("page")) => title = Some(content),
					(Some("id"), Some("revision")) => {
						revid = Some(content.parse::<i64>().map_err(|_| {
							fatal(format!("revision id '{content}' is not an integer"))
						})?);
					},
					(Some("text"), Some("revision")) => text = Some(content),
					_ => {},
				}
			},
			Event::Eof => break,
			_ => {},
		}

		buf.clear();
	}

	Ok(pages)
}

fn local_name(raw: &[u8]) -> String {
	let text = String::from_utf8_lossy(raw);

	match text.rsplit_once(':') {
		Some((_, local)) => local.to_owned(),
		None => text.into_owned(),
	}
}

fn parent_of(path: &[String]) -> Option<&str> {
	path.len().checked_sub(2).map(|i| path[i].as_str())
}

#[cfg(test)]
mod tests {
	use super::*;

	const DOC: &str = r#"<mediawiki>
		<siteinfo><sitename>Test</sitename></siteinfo>
		<page>
			<title>Example</title>
			<revision>
				<id>42</id>
				<contributor><username>Alice</username><id>1</id></contributor>
				<text>hello world</text>
			</revision>
		</page>
	</mediawiki>"#;

	#[test]
	fn parses_title_revision_and_text() {
		let pages = parse_export(DOC.as_bytes()).unwrap();
		assert_eq!(pages.len(), 1);
		assert_eq!(pages[0].title, "Example");
		assert_eq!(pages[0].revid, 42);
		assert_eq!(pages[0].text, "hello world");
	}

	#[test]
	fn contributor_id_does_not_override_revision_id() {
		let pages = parse_export(DOC.as_bytes()).unwrap();
		assert_eq!(pages[0].revid, 42);
	}

	#[test]
	fn unexpected_top_level_element_is_fatal() {
		let doc = "<mediawiki><bogus/></mediawiki>";
		let err = parse_export(doc.as_bytes()).unwrap_err();
		assert!(matches!(err, Error::UpstreamFatal { .. }));
	}

	#[test]
	fn unexpected_root_element_is_fatal() {
		let doc = "<notmediawiki></notmediawiki>";
		let err = parse_export(doc.as_bytes()).unwrap_err();
		assert!(matches!(err, Error::UpstreamFatal { .. }));
	}

	#[test]
	fn multiple_pages_are_all_parsed() {
		let doc = r#"<mediawiki>
			<page><title>A</title><revision><id>1</id><text>a</text></revision></page>
			<page><title>B</title><revision><id>2</id><text>b</text></revision></page>
		</mediawiki>"#;
		let pages = parse_export(doc.as_bytes()).unwrap();
		assert_eq!(pages.len(), 2);
		assert_eq!(pages[1].title, "B");
	}
}
