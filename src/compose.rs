//! Live preview composition: splice the CSS and JS buffers into the HTML
//! buffer to form one renderable document.
//!
//! The transform is pure and performs no escaping. Markers are matched
//! case-sensitively and only the first occurrence is used. The style block is
//! inserted first and the script marker is then searched in the result.

use serde::Serialize;

use crate::buffer::Snapshot;

pub const HEAD_CLOSE: &str = "</head>";
pub const BODY_CLOSE: &str = "</body>";

/// A single merged page, ready to be written into a render target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ComposedDocument(String);

impl ComposedDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ComposedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ComposedDocument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn style_block(css: &str) -> String {
    format!("<style>{css}</style>")
}

pub fn script_block(js: &str) -> String {
    format!("<script>{js}</script>")
}

/// Insert `block` before the first `marker`, or fall back to `prepend`/append.
fn splice(doc: String, marker: &str, block: &str, prepend: bool) -> String {
    let mut out = String::with_capacity(doc.len() + block.len());
    match doc.find(marker) {
        Some(idx) => {
            out.push_str(&doc[..idx]);
            out.push_str(block);
            out.push_str(&doc[idx..]);
        }
        None if prepend => {
            out.push_str(block);
            out.push_str(&doc);
        }
        None => {
            out.push_str(&doc);
            out.push_str(block);
        }
    }
    out
}

/// Merge the three sources into one document.
///
/// Empty `css` or `js` adds nothing for that source.
pub fn compose(html: &str, css: &str, js: &str) -> ComposedDocument {
    let mut doc = html.to_string();
    if !css.is_empty() {
        doc = splice(doc, HEAD_CLOSE, &style_block(css), true);
    }
    if !js.is_empty() {
        doc = splice(doc, BODY_CLOSE, &script_block(js), false);
    }
    ComposedDocument(doc)
}

pub fn compose_snapshot(snapshot: &Snapshot) -> ComposedDocument {
    compose(&snapshot.html, &snapshot.css, &snapshot.js)
}
