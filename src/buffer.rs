//! Source buffers: the editable HTML, CSS and JS text of one workspace.
//!
//! A buffer is the server-side stand-in for an editor widget. Anything that
//! implements [`SourceEditor`] can back a pane: it exposes the current text,
//! accepts replacement text, and notifies subscribers after each mutation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// The three kinds of source a workspace holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Html,
    Css,
    Js,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Html, SourceKind::Css, SourceKind::Js];

    /// Parse a wire name (`html`, `css`, `js`), case-insensitively.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Some(SourceKind::Html),
            "css" => Some(SourceKind::Css),
            "js" | "javascript" => Some(SourceKind::Js),
            _ => None,
        }
    }

    /// Map a file name to a kind by its last extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.').map(|(_, ext)| ext)?;
        match ext.to_ascii_lowercase().as_str() {
            "html" | "htm" => Some(SourceKind::Html),
            "css" => Some(SourceKind::Css),
            "js" => Some(SourceKind::Js),
            _ => None,
        }
    }

    /// File name used when the buffer is exported on its own.
    pub fn default_file_name(&self) -> &'static str {
        match self {
            SourceKind::Html => "index.html",
            SourceKind::Css => "style.css",
            SourceKind::Js => "script.js",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Html => write!(f, "html"),
            SourceKind::Css => write!(f, "css"),
            SourceKind::Js => write!(f, "js"),
        }
    }
}

// ---------------------------------------------------------------------------
// Editor contract
// ---------------------------------------------------------------------------

/// Emitted to subscribers after a buffer mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferChange {
    pub kind: SourceKind,
    pub revision: u64,
    pub len: usize,
}

pub type ChangeListener = Box<dyn FnMut(&BufferChange) + Send>;

/// Handle returned by [`SourceEditor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What the composer needs from an editor pane.
pub trait SourceEditor {
    /// Current text, read synchronously.
    fn text(&self) -> &str;
    /// Replace the whole text and notify subscribers.
    fn set_text(&mut self, text: String);
    /// Register a change listener.
    fn subscribe(&mut self, listener: ChangeListener) -> ListenerId;
    /// Remove a listener. Returns false if the id was unknown.
    fn unsubscribe(&mut self, id: ListenerId) -> bool;
}

// ---------------------------------------------------------------------------
// SourceBuffer
// ---------------------------------------------------------------------------

pub struct SourceBuffer {
    kind: SourceKind,
    text: String,
    revision: u64,
    next_listener: u64,
    listeners: Vec<(ListenerId, ChangeListener)>,
}

impl SourceBuffer {
    pub fn new(kind: SourceKind) -> Self {
        Self::with_text(kind, String::new())
    }

    pub fn with_text(kind: SourceKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            revision: 0,
            next_listener: 0,
            listeners: Vec::new(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Number of mutations applied since creation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl SourceEditor for SourceBuffer {
    fn text(&self) -> &str {
        &self.text
    }

    fn set_text(&mut self, text: String) {
        self.text = text;
        self.revision += 1;
        let change = BufferChange {
            kind: self.kind,
            revision: self.revision,
            len: self.text.len(),
        };
        for (_, listener) in self.listeners.iter_mut() {
            listener(&change);
        }
    }

    fn subscribe(&mut self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }
}

impl std::fmt::Debug for SourceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBuffer")
            .field("kind", &self.kind)
            .field("len", &self.text.len())
            .field("revision", &self.revision)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BufferSet
// ---------------------------------------------------------------------------

/// Owned copy of the three buffer texts, handed to the composer and the
/// package generators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub html: String,
    pub css: String,
    pub js: String,
}

impl Snapshot {
    pub fn new(html: impl Into<String>, css: impl Into<String>, js: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            css: css.into(),
            js: js.into(),
        }
    }

    pub fn get(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::Html => &self.html,
            SourceKind::Css => &self.css,
            SourceKind::Js => &self.js,
        }
    }
}

/// The HTML, CSS and JS buffers of one workspace.
#[derive(Debug)]
pub struct BufferSet {
    html: SourceBuffer,
    css: SourceBuffer,
    js: SourceBuffer,
}

impl Default for BufferSet {
    fn default() -> Self {
        Self {
            html: SourceBuffer::new(SourceKind::Html),
            css: SourceBuffer::new(SourceKind::Css),
            js: SourceBuffer::new(SourceKind::Js),
        }
    }
}

impl BufferSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            html: SourceBuffer::with_text(SourceKind::Html, snapshot.html),
            css: SourceBuffer::with_text(SourceKind::Css, snapshot.css),
            js: SourceBuffer::with_text(SourceKind::Js, snapshot.js),
        }
    }

    pub fn get(&self, kind: SourceKind) -> &SourceBuffer {
        match kind {
            SourceKind::Html => &self.html,
            SourceKind::Css => &self.css,
            SourceKind::Js => &self.js,
        }
    }

    pub fn get_mut(&mut self, kind: SourceKind) -> &mut SourceBuffer {
        match kind {
            SourceKind::Html => &mut self.html,
            SourceKind::Css => &mut self.css,
            SourceKind::Js => &mut self.js,
        }
    }

    pub fn text(&self, kind: SourceKind) -> &str {
        self.get(kind).text()
    }

    pub fn set(&mut self, kind: SourceKind, text: impl Into<String>) {
        self.get_mut(kind).set_text(text.into());
    }

    /// Replace all three buffers; each one notifies its own listeners.
    pub fn replace_all(&mut self, snapshot: Snapshot) {
        self.html.set_text(snapshot.html);
        self.css.set_text(snapshot.css);
        self.js.set_text(snapshot.js);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            html: self.html.text().to_string(),
            css: self.css.text().to_string(),
            js: self.js.text().to_string(),
        }
    }
}
