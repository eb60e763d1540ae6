//! Live sessions: the context object that owns one workspace's buffers,
//! live-mode flag and render target.
//!
//! ## Design
//! - `SessionStore`: `Arc<Mutex<HashMap<String, LiveSession>>>` shared by all
//!   connections. Every session operation runs under the lock and completes
//!   synchronously, so render passes never overlap and apply in the order
//!   their triggers arrived.
//! - The session subscribes to its own buffers. Each mutation event queues a
//!   [`BufferChange`]; when live mode is on, every queued event produces one
//!   compose + render pass.
//! - Bulk actions (template load, import, cover, new project) discard the
//!   queued events and perform exactly one manual render instead.
//! - A fallback tick re-renders live sessions on a fixed period. It runs as a
//!   tokio task behind a [`TickHandle`] that cancels it on drop.
//!
//! ## Session lifecycle
//! 1. `create_session` registers a session with a 6-char code
//! 2. Browser views subscribe to the session's event channel
//! 3. Edits, toggles, ticks and manual triggers drive render passes
//! 4. `remove_if_idle` tears it down when the last view leaves
//! 5. `reap_idle` removes sessions no view ever attached to once they pass
//!    the idle TTL

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::archive;
use crate::buffer::{BufferChange, BufferSet, Snapshot, SourceEditor, SourceKind};
use crate::compose::{compose, ComposedDocument};
use crate::cover::{CoverPage, CoverTheme};
use crate::error::{LivepadError, Result};
use crate::render::{render, ChannelTarget, MemoryTarget, RenderTarget};
use crate::templates::ProjectTemplate;

/// Capacity of each session's event channel.
pub const EVENT_CHANNEL_CAP: usize = 256;

/// Shared session store: session code → LiveSession.
pub type SessionStore = Arc<Mutex<HashMap<String, LiveSession>>>;

// ---------------------------------------------------------------------------
// Notices and tick policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warn,
}

/// A transient user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// What the fallback tick does for a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// Re-render on every tick, changed or not.
    #[default]
    Always,
    /// Re-render only if the buffers changed since the last applied render
    /// or the last pass failed.
    WhenStale,
}

// ---------------------------------------------------------------------------
// LiveSession
// ---------------------------------------------------------------------------

pub struct LiveSession {
    code: String,
    buffers: BufferSet,
    live_mode: bool,
    tick_policy: TickPolicy,
    target: Box<dyn RenderTarget>,
    current: Option<ComposedDocument>,
    rendered_revisions: Option<[u64; 3]>,
    render_count: u64,
    pending: Arc<Mutex<Vec<BufferChange>>>,
    notices: Vec<Notice>,
    events: broadcast::Sender<serde_json::Value>,
    created_at: Instant,
}

impl LiveSession {
    /// Create a session rendering into `target`, starting from `sources`.
    ///
    /// No render happens here; callers trigger the first pass.
    pub fn new(code: impl Into<String>, sources: Snapshot, target: Box<dyn RenderTarget>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAP);
        Self::with_events(code.into(), sources, target, events)
    }

    /// Create a session whose render target publishes on its own event
    /// channel, for browser views.
    pub fn broadcasting(code: impl Into<String>, sources: Snapshot) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAP);
        let target = Box::new(ChannelTarget::new(events.clone()));
        Self::with_events(code.into(), sources, target, events)
    }

    /// A session backed by a [`MemoryTarget`].
    pub fn in_memory(code: impl Into<String>, sources: Snapshot) -> Self {
        Self::new(code, sources, Box::new(MemoryTarget::new()))
    }

    fn with_events(
        code: String,
        sources: Snapshot,
        target: Box<dyn RenderTarget>,
        events: broadcast::Sender<serde_json::Value>,
    ) -> Self {
        let mut buffers = BufferSet::from_snapshot(sources);
        let pending = Arc::new(Mutex::new(Vec::new()));
        for kind in SourceKind::ALL {
            let queue = Arc::clone(&pending);
            buffers.get_mut(kind).subscribe(Box::new(move |change: &BufferChange| {
                if let Ok(mut q) = queue.lock() {
                    q.push(*change);
                }
            }));
        }
        Self {
            code,
            buffers,
            live_mode: true,
            tick_policy: TickPolicy::default(),
            target,
            current: None,
            rendered_revisions: None,
            render_count: 0,
            pending,
            notices: Vec::new(),
            events,
            created_at: Instant::now(),
        }
    }

    pub fn with_live_mode(mut self, live: bool) -> Self {
        self.live_mode = live;
        self
    }

    pub fn with_tick_policy(mut self, policy: TickPolicy) -> Self {
        self.tick_policy = policy;
        self
    }

    // -- accessors --------------------------------------------------------

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn live_mode(&self) -> bool {
        self.live_mode
    }

    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    pub fn snapshot(&self) -> Snapshot {
        self.buffers.snapshot()
    }

    /// The document last applied to the render target.
    pub fn current_document(&self) -> Option<&ComposedDocument> {
        self.current.as_ref()
    }

    /// Number of render passes that reached the target.
    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// True while no browser view is subscribed to the event channel.
    pub fn is_unwatched(&self) -> bool {
        self.events.receiver_count() == 0
    }

    pub fn events(&self) -> &broadcast::Sender<serde_json::Value> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.events.subscribe()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // -- render triggers --------------------------------------------------

    fn revisions(&self) -> [u64; 3] {
        SourceKind::ALL.map(|kind| self.buffers.get(kind).revision())
    }

    fn is_stale(&self) -> bool {
        self.rendered_revisions != Some(self.revisions())
    }

    fn take_pending(&self) -> Vec<BufferChange> {
        self.pending
            .lock()
            .map(|mut q| std::mem::take(&mut *q))
            .unwrap_or_default()
    }

    /// Queue a notice. A repeat of the last queued notice is dropped.
    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        if self
            .notices
            .last()
            .is_some_and(|n| n.level == level && n.message == message)
        {
            return;
        }
        match level {
            NoticeLevel::Info => debug!(session = %self.code, %message, "notice"),
            NoticeLevel::Warn => warn!(session = %self.code, %message, "notice"),
        }
        self.notices.push(Notice { level, message });
    }

    /// Compose the current buffers and push the result into the target.
    ///
    /// Returns whether the render was applied. A failure leaves the buffers
    /// and the previous document untouched and queues a warning notice.
    pub fn trigger_recompose(&mut self) -> bool {
        let doc = compose(
            self.buffers.text(SourceKind::Html),
            self.buffers.text(SourceKind::Css),
            self.buffers.text(SourceKind::Js),
        );
        match render(self.target.as_mut(), &doc) {
            Ok(()) => {
                self.render_count += 1;
                debug!(
                    session = %self.code,
                    target = self.target.label(),
                    renders = self.render_count,
                    bytes = doc.len(),
                    "render applied"
                );
                self.current = Some(doc);
                self.rendered_revisions = Some(self.revisions());
                true
            }
            Err(e) => {
                self.notify(NoticeLevel::Warn, e.to_string());
                false
            }
        }
    }

    /// Buffer mutation event from an editor pane.
    ///
    /// Returns the number of render passes applied.
    pub fn edit(&mut self, kind: SourceKind, text: impl Into<String>) -> usize {
        self.buffers.set(kind, text);
        let events = self.take_pending();
        if !self.live_mode {
            return 0;
        }
        let mut applied = 0;
        for _ in &events {
            if self.trigger_recompose() {
                applied += 1;
            }
        }
        applied
    }

    /// Flip the live-mode flag. Turning it on renders once with the latest
    /// buffers; any other transition renders nothing.
    pub fn set_live_mode(&mut self, enabled: bool) -> bool {
        let was = self.live_mode;
        self.live_mode = enabled;
        info!(session = %self.code, live = enabled, "live mode");
        if enabled && !was {
            return self.trigger_recompose();
        }
        false
    }

    /// Fallback timer event.
    pub fn tick(&mut self) -> bool {
        if !self.live_mode {
            return false;
        }
        match self.tick_policy {
            TickPolicy::Always => self.trigger_recompose(),
            TickPolicy::WhenStale if self.is_stale() => self.trigger_recompose(),
            TickPolicy::WhenStale => false,
        }
    }

    /// Manual render: one pass regardless of live mode.
    pub fn render_now(&mut self) -> bool {
        self.trigger_recompose()
    }

    // -- bulk actions -----------------------------------------------------

    /// Apply `mutate` to the buffers, then render exactly once.
    fn mutate_then_render(&mut self, mutate: impl FnOnce(&mut BufferSet)) -> bool {
        mutate(&mut self.buffers);
        self.take_pending();
        self.render_now()
    }

    pub fn load_template(&mut self, template: ProjectTemplate) -> bool {
        self.mutate_then_render(|b| b.replace_all(template.snapshot()))
    }

    /// Clear all three buffers.
    pub fn new_project(&mut self) -> bool {
        let rendered = self.load_template(ProjectTemplate::Blank);
        self.notify(NoticeLevel::Info, "New project created!");
        rendered
    }

    /// Import a single source file, dispatched on its extension.
    pub fn import_file(&mut self, file_name: &str, content: &str) -> Result<SourceKind> {
        let Some(kind) = SourceKind::from_file_name(file_name) else {
            let err = LivepadError::UnsupportedImportFormat(file_name.to_string());
            self.notify(NoticeLevel::Warn, err.to_string());
            return Err(err);
        };
        self.mutate_then_render(|b| b.set(kind, content));
        self.notify(NoticeLevel::Info, "Code imported successfully!");
        Ok(kind)
    }

    /// Pasted text replaces the HTML buffer.
    pub fn import_text(&mut self, content: &str) -> bool {
        let rendered = self.mutate_then_render(|b| b.set(SourceKind::Html, content));
        self.notify(NoticeLevel::Info, "Code imported successfully!");
        rendered
    }

    /// Import a zipped project. Kinds missing from the archive keep their
    /// current text.
    pub fn import_archive(&mut self, bytes: &[u8]) -> Result<()> {
        let found = match archive::read_project(bytes) {
            Ok(found) => found,
            Err(e) => {
                self.notify(NoticeLevel::Warn, e.to_string());
                return Err(e);
            }
        };
        self.mutate_then_render(|b| {
            for kind in SourceKind::ALL {
                let text = found.get(kind);
                if !text.is_empty() {
                    b.set(kind, text);
                }
            }
        });
        self.notify(NoticeLevel::Info, "Project archive imported!");
        Ok(())
    }

    /// Prepend a themed cover block to the HTML buffer.
    pub fn apply_cover(&mut self, theme: CoverTheme, cover: &CoverPage) -> bool {
        let markup = cover.render(theme);
        let html = format!("{markup}{}", self.buffers.text(SourceKind::Html));
        let rendered = self.mutate_then_render(|b| b.set(SourceKind::Html, html));
        self.notify(NoticeLevel::Info, "Cover page generated!");
        rendered
    }
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("code", &self.code)
            .field("live_mode", &self.live_mode)
            .field("tick_policy", &self.tick_policy)
            .field("target", &self.target.label())
            .field("render_count", &self.render_count)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Store helpers
// ---------------------------------------------------------------------------

/// Create a new empty SessionStore.
pub fn new_session_store() -> SessionStore {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Generate a random 6-character uppercase alphanumeric session code.
pub fn generate_code() -> String {
    use rand::Rng;
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// Session codes are uppercase; accept any case and stray whitespace.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Register a session built by `build` under a fresh code and return the code.
pub fn create_session(store: &SessionStore, build: impl FnOnce(String) -> LiveSession) -> Result<String> {
    let mut guard = store.lock().map_err(|_| LivepadError::StoreUnavailable)?;
    let mut code = generate_code();
    while guard.contains_key(&code) {
        code = generate_code();
    }
    let session = build(code.clone());
    guard.insert(code.clone(), session);
    info!(session = %code, "session created");
    Ok(code)
}

/// Run `f` against the session under the store lock.
pub fn with_session<R>(
    store: &SessionStore,
    code: &str,
    f: impl FnOnce(&mut LiveSession) -> R,
) -> Result<R> {
    let mut guard = store.lock().map_err(|_| LivepadError::StoreUnavailable)?;
    let session = guard
        .get_mut(code)
        .ok_or_else(|| LivepadError::UnknownSession(code.to_string()))?;
    Ok(f(session))
}

pub fn remove_session(store: &SessionStore, code: &str) -> Option<LiveSession> {
    let removed = store.lock().ok()?.remove(code);
    if removed.is_some() {
        info!(session = %code, "session torn down");
    }
    removed
}

/// Tear the session down if no browser view is subscribed any more.
pub fn remove_if_idle(store: &SessionStore, code: &str) -> bool {
    let Ok(mut guard) = store.lock() else {
        return false;
    };
    let idle = guard.get(code).is_some_and(LiveSession::is_unwatched);
    if idle {
        guard.remove(code);
        info!(session = %code, "session torn down");
    }
    idle
}

/// Remove every session with no attached view that is at least `ttl` old.
/// Returns the number removed.
pub fn reap_idle(store: &SessionStore, ttl: Duration) -> usize {
    let Ok(mut guard) = store.lock() else {
        return 0;
    };
    let before = guard.len();
    guard.retain(|code, s| {
        let keep = !s.is_unwatched() || s.age() < ttl;
        if !keep {
            info!(session = %code, age_ms = s.age().as_millis() as u64, "idle session reaped");
        }
        keep
    });
    before - guard.len()
}

/// Tick every session once. Returns the number of renders applied.
pub fn tick_all(store: &SessionStore) -> usize {
    let Ok(mut guard) = store.lock() else {
        return 0;
    };
    guard.values_mut().map(|s| s.tick()).filter(|applied| *applied).count()
}

// ---------------------------------------------------------------------------
// Fallback tick
// ---------------------------------------------------------------------------

/// Cancellation handle for the fallback tick task. Dropping it cancels.
#[derive(Debug)]
pub struct TickHandle {
    task: JoinHandle<()>,
}

impl TickHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `job` every `period`, the first time one full period after the call.
fn spawn_periodic(period: Duration, mut job: impl FnMut() + Send + 'static) -> TickHandle {
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            job();
        }
    });
    TickHandle { task }
}

/// Spawn the periodic fallback tick over every session in `store`.
///
/// The first tick fires one full period after the call.
pub fn spawn_fallback_tick(store: SessionStore, period: Duration) -> TickHandle {
    spawn_periodic(period, move || {
        let renders = tick_all(&store);
        if renders > 0 {
            debug!(renders, "fallback tick");
        }
    })
}

/// Spawn the idle reaper: every `ttl`, drop sessions that no view has
/// attached to for at least `ttl`. A session can therefore linger unwatched
/// for up to twice the TTL.
pub fn spawn_idle_reaper(store: SessionStore, ttl: Duration) -> TickHandle {
    spawn_periodic(ttl, move || {
        let reaped = reap_idle(&store, ttl);
        if reaped > 0 {
            debug!(reaped, "idle reaper");
        }
    })
}
