//! Session-level behaviour through the public API: live-mode gating,
//! full-replace rendering, bulk actions and the session store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use livepad::buffer::{Snapshot, SourceKind};
use livepad::render::render;
use livepad::session::{self, TickPolicy};
use livepad::templates::ProjectTemplate;
use livepad::{compose, FileTarget, LiveSession, MemoryTarget, NoticeLevel, RenderTarget, Result};

const PAGE: &str = "<html><head></head><body></body></html>";

/// Records every call a render pass makes.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn renders(&self) -> usize {
        self.calls().iter().filter(|c| *c == "close").count()
    }
}

impl RenderTarget for Recorder {
    fn open(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("open".into());
        Ok(())
    }

    fn write(&mut self, chunk: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("write:{chunk}"));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("close".into());
        Ok(())
    }

    fn label(&self) -> &str {
        "recorder"
    }
}

fn recorded(live: bool) -> (LiveSession, Recorder) {
    let rec = Recorder::default();
    let s = LiveSession::new("REC001", Snapshot::new(PAGE, "", ""), Box::new(rec.clone()))
        .with_live_mode(live);
    (s, rec)
}

// ---------------------------------------------------------------------------
// Live-mode gating
// ---------------------------------------------------------------------------

#[test]
fn test_gated_edits_then_one_render_on_enable() {
    let (mut s, rec) = recorded(false);
    for i in 0..10 {
        s.edit(SourceKind::Css, format!("p{{margin:{i}px}}"));
    }
    assert_eq!(rec.renders(), 0);

    assert!(s.set_live_mode(true));
    assert_eq!(rec.renders(), 1);
    let calls = rec.calls();
    assert_eq!(calls.first().map(String::as_str), Some("open"));
    assert!(calls[1].contains("p{margin:9px}"));
}

#[test]
fn test_each_live_edit_renders_once() {
    let (mut s, rec) = recorded(true);
    s.edit(SourceKind::Html, PAGE);
    s.edit(SourceKind::Js, "a()");
    s.edit(SourceKind::Js, "b()");
    assert_eq!(rec.renders(), 3);
    assert!(s.current_document().unwrap().as_str().contains("<script>b()</script>"));
}

#[test]
fn test_manual_trigger_while_gated() {
    let (mut s, rec) = recorded(false);
    s.edit(SourceKind::Css, "x{}");
    assert!(s.render_now());
    assert_eq!(rec.renders(), 1);
    assert!(!s.live_mode());
}

#[test]
fn test_disable_then_enable_renders_once() {
    let (mut s, rec) = recorded(true);
    s.set_live_mode(false);
    s.set_live_mode(true);
    s.set_live_mode(true);
    assert_eq!(rec.renders(), 1);
}

// ---------------------------------------------------------------------------
// Full replace
// ---------------------------------------------------------------------------

#[test]
fn test_memory_target_holds_only_last_document() {
    let mut target = MemoryTarget::new();
    let long = compose(PAGE, "body{background:url(very-long-name.png)}", "init()");
    let short = compose("<p>x</p>", "", "");
    render(&mut target, &long).unwrap();
    render(&mut target, &short).unwrap();
    assert_eq!(target.content(), Some("<p>x</p>"));
}

#[test]
fn test_file_target_holds_only_last_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preview.html");
    let mut s = LiveSession::new("FILE01", Snapshot::new(PAGE, "a{}", "one()"), Box::new(FileTarget::new(&path)));
    assert!(s.render_now());
    s.edit(SourceKind::Js, "");
    s.edit(SourceKind::Css, "");
    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk, PAGE);
}

#[test]
fn test_file_target_missing_directory_is_notice() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("preview.html");
    let mut s = LiveSession::new("FILE02", Snapshot::new(PAGE, "", ""), Box::new(FileTarget::new(path)));
    assert!(!s.render_now());
    let notices = s.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warn);
}

// ---------------------------------------------------------------------------
// Bulk actions
// ---------------------------------------------------------------------------

#[test]
fn test_template_load_renders_once_even_when_gated() {
    let (mut s, rec) = recorded(false);
    s.load_template(ProjectTemplate::AssistantSample);
    assert_eq!(rec.renders(), 1);
    assert_eq!(s.snapshot(), ProjectTemplate::AssistantSample.snapshot());
}

#[test]
fn test_import_then_edit_keeps_render_ordering() {
    let (mut s, rec) = recorded(true);
    s.import_file("page.html", "<main></main>").unwrap();
    s.edit(SourceKind::Css, "main{}");
    assert_eq!(rec.renders(), 2);
    assert_eq!(
        s.current_document().unwrap().as_str(),
        "<style>main{}</style><main></main>"
    );
}

// ---------------------------------------------------------------------------
// Store and fallback tick
// ---------------------------------------------------------------------------

#[test]
fn test_store_isolates_sessions() {
    let store = session::new_session_store();
    let a = session::create_session(&store, |c| LiveSession::in_memory(c, Snapshot::default())).unwrap();
    let b = session::create_session(&store, |c| LiveSession::in_memory(c, Snapshot::default())).unwrap();
    assert_ne!(a, b);
    session::with_session(&store, &a, |s| s.edit(SourceKind::Html, "<p>a</p>")).unwrap();
    let b_html = session::with_session(&store, &b, |s| s.snapshot().html).unwrap();
    assert_eq!(b_html, "");
}

#[tokio::test(start_paused = true)]
async fn test_stale_policy_tick_follows_edits() {
    let store = session::new_session_store();
    let code = session::create_session(&store, |c| {
        LiveSession::in_memory(c, Snapshot::new(PAGE, "", "")).with_tick_policy(TickPolicy::WhenStale)
    })
    .unwrap();
    let tick = session::spawn_fallback_tick(store.clone(), Duration::from_millis(100));

    tokio::time::sleep(Duration::from_millis(550)).await;
    assert_eq!(session::with_session(&store, &code, |s| s.render_count()).unwrap(), 1);

    drop(tick);
    tokio::time::sleep(Duration::from_millis(500)).await;
    session::with_session(&store, &code, |s| {
        s.set_live_mode(false);
        s.edit(SourceKind::Css, "p{}");
        s.set_live_mode(true);
    })
    .unwrap();
    assert_eq!(session::with_session(&store, &code, |s| s.render_count()).unwrap(), 2);
}
