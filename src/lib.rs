//! livepad: a local live-preview server for HTML/CSS/JS sketches.
//!
//! Three source buffers are composed into one document (`<style>` before
//! `</head>`, `<script>` before `</body>`) and pushed into a render target
//! whenever an edit, a live-mode toggle, the fallback tick or a manual
//! trigger asks for it. The [`session`] module owns that state machine; the
//! [`web`] module drives it from a browser editor.
//!
//! ```
//! use livepad::compose;
//!
//! let doc = compose("<html><head></head><body></body></html>", "p{}", "go()");
//! assert_eq!(
//!     doc.as_str(),
//!     "<html><head><style>p{}</style></head><body><script>go()</script></body></html>"
//! );
//! ```

pub mod archive;
pub mod assistant;
pub mod buffer;
pub mod cli;
pub mod cloud;
pub mod compose;
pub mod config;
pub mod convert;
pub mod cover;
pub mod error;
pub mod render;
pub mod review;
pub mod session;
pub mod templates;
pub mod web;

pub use buffer::{BufferSet, Snapshot, SourceBuffer, SourceEditor, SourceKind};
pub use compose::{compose, ComposedDocument};
pub use config::LivepadConfig;
pub use error::{LivepadError, Result};
pub use render::{FileTarget, MemoryTarget, RenderTarget};
pub use session::{LiveSession, Notice, NoticeLevel, SessionStore, TickPolicy};
