//! HTTP + WebSocket front end.
//!
//! One TCP listener serves the embedded editor page, a handful of JSON and
//! download routes, and `/ws/{code}` upgrades. Each WebSocket connection is a
//! browser view of one [`LiveSession`]; everything the session publishes on
//! its event channel is forwarded to every attached view.

use std::collections::HashMap;
use std::sync::Arc;

use colored::*;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::archive;
use crate::assistant;
use crate::buffer::{Snapshot, SourceKind};
use crate::cloud::{self, UploadRequest};
use crate::config::{LivepadConfig, SimulationConfig};
use crate::convert::{self, AppMeta, ConversionTarget};
use crate::cover::{CoverPage, CoverTheme};
use crate::error::LivepadError;
use crate::review;
use crate::session::{self, LiveSession, Notice, NoticeLevel, SessionStore};
use crate::templates::ProjectTemplate;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Largest request head accepted.
const MAX_HEAD_BYTES: usize = 16 * 1024;
/// Largest request body accepted (project archives).
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

const PYTHON_SCRIPT_NAME: &str = "generated_script.py";

/// The embedded single-page editor.
pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>livepad</title>
<style>
*{box-sizing:border-box}
body{margin:0;font-family:system-ui,sans-serif;background:#1e1e24;color:#ddd;display:flex;flex-direction:column;height:100vh}
header{display:flex;flex-wrap:wrap;gap:6px;align-items:center;padding:6px 10px;background:#2a2a33;border-bottom:1px solid #444}
header h1{font-size:16px;margin:0 12px 0 0;color:#8bd5ff}
button,select,input{background:#33333d;color:#ddd;border:1px solid #555;border-radius:4px;padding:3px 8px;font-size:13px}
button:hover{background:#41414d;cursor:pointer}
main{flex:1;display:grid;grid-template-columns:1fr 1fr;min-height:0}
#editors{display:grid;grid-template-rows:1fr 1fr 1fr;min-height:0}
.pane{display:flex;flex-direction:column;min-height:0;border-right:1px solid #444;border-bottom:1px solid #444}
.pane label{font-size:11px;text-transform:uppercase;padding:2px 8px;background:#2a2a33;color:#999}
textarea{flex:1;resize:none;background:#18181d;color:#e8e8e8;border:0;padding:8px;font:13px/1.45 ui-monospace,monospace;outline:none}
#right{display:grid;grid-template-rows:1fr auto;min-height:0}
#preview{width:100%;height:100%;border:0;background:#fff}
#chat{border-top:1px solid #444;max-height:34vh;display:flex;flex-direction:column}
#chat-log{flex:1;overflow:auto;padding:6px 10px;font-size:13px}
#chat-log .me{color:#8bd5ff}
#chat-log .bot{color:#b8e986}
#chat form{display:flex;gap:6px;padding:6px}
#chat input{flex:1}
#review-out{white-space:pre;font:12px ui-monospace,monospace;background:#18181d;padding:8px;display:none;max-height:30vh;overflow:auto}
#toasts{position:fixed;right:12px;bottom:12px;display:flex;flex-direction:column;gap:6px;z-index:10}
.toast{padding:8px 12px;border-radius:4px;background:#2f6f3e;color:#fff;font-size:13px;box-shadow:0 2px 6px #0008}
.toast.warn{background:#8a3b2e}
#status{margin-left:auto;font-size:12px;color:#999}
</style>
</head>
<body>
<header>
  <h1>livepad</h1>
  <label><input type="checkbox" id="live" checked> live</label>
  <button id="render-btn">Render</button>
  <button id="new-btn">New</button>
  <select id="template">
    <option value="">template…</option>
    <option value="default">default</option>
    <option value="assistant_sample">assistant sample</option>
    <option value="blank">blank</option>
  </select>
  <input type="file" id="import-file" accept=".html,.htm,.css,.js,.zip">
  <button id="download-btn">Download</button>
  <button id="html-btn">index.html</button>
  <button id="python-btn">Python</button>
  <select id="convert-kind">
    <option value="">convert to…</option>
    <option value="web">web</option>
    <option value="exe">exe</option>
    <option value="apk">apk</option>
    <option value="ios">ios</option>
  </select>
  <input id="app-name" placeholder="MyApp" size="8">
  <input id="app-version" placeholder="1.0.0" size="5">
  <button id="convert-btn">Convert</button>
  <select id="cover-theme">
    <option value="modern">modern</option>
    <option value="light">light</option>
    <option value="gradient">gradient</option>
    <option value="minimal">minimal</option>
  </select>
  <input id="cover-title" placeholder="cover title" size="10">
  <button id="cover-btn">Cover</button>
  <button id="review-btn">Review</button>
  <select id="provider">
    <option value="github">GitHub</option>
    <option value="gitlab">GitLab</option>
    <option value="bitbucket">Bitbucket</option>
  </select>
  <input id="repo" placeholder="repository" size="10">
  <button id="upload-btn">Upload</button>
  <button id="deploy-btn">Deploy</button>
  <span id="status">connecting…</span>
</header>
<div id="review-out"></div>
<main>
  <div id="editors">
    <div class="pane"><label>HTML</label><textarea id="html" spellcheck="false"></textarea></div>
    <div class="pane"><label>CSS</label><textarea id="css" spellcheck="false"></textarea></div>
    <div class="pane"><label>JS</label><textarea id="js" spellcheck="false"></textarea></div>
  </div>
  <div id="right">
    <iframe id="preview" sandbox="allow-scripts" title="preview"></iframe>
    <div id="chat">
      <div id="chat-log"></div>
      <form id="chat-form"><input id="chat-input" placeholder="ask the assistant…"><button>Send</button></form>
    </div>
  </div>
</main>
<div id="toasts"></div>
<script>
const $=s=>document.querySelector(s);
const KINDS=['html','css','js'];
let ws=null,code=null,clientId=null,lastSeq=0;

function toast(message,level){
  const t=document.createElement('div');
  t.className='toast'+(level==='warn'?' warn':'');
  t.textContent=message;
  $('#toasts').appendChild(t);
  setTimeout(()=>t.remove(),3000);
}
function send(msg){if(ws&&ws.readyState===1)ws.send(JSON.stringify(msg))}
function setBuffers(b){KINDS.forEach(k=>{const el=$('#'+k);if(el.value!==b[k])el.value=b[k]})}
function chatLine(cls,text){
  const d=document.createElement('div');d.className=cls;d.textContent=text;
  $('#chat-log').appendChild(d);$('#chat-log').scrollTop=1e9;
}

function onMessage(ev){
  const m=JSON.parse(ev.data);
  switch(m.type){
    case 'welcome':
      clientId=m.client_id;setBuffers(m.buffers);$('#live').checked=m.live;
      $('#status').textContent='session '+m.session;break;
    case 'render':
      if(m.seq>lastSeq){lastSeq=m.seq;$('#preview').srcdoc=m.document}break;
    case 'buffers':
      if(m.origin!==clientId)setBuffers(m.buffers);
      $('#live').checked=m.live;break;
    case 'notice':toast(m.message,m.level);break;
    case 'chat_reply':chatLine('bot',m.text);break;
    case 'review':$('#review-out').textContent=m.report;$('#review-out').style.display='block';break;
    case 'error':toast(m.message,'warn');break;
  }
}

async function connect(){
  const r=await fetch('/session/create',{method:'POST'});
  const s=await r.json();
  code=s.code;
  const proto=location.protocol==='https:'?'wss://':'ws://';
  ws=new WebSocket(proto+location.host+s.ws_url);
  ws.onmessage=onMessage;
  ws.onclose=()=>{$('#status').textContent='disconnected'};
  setInterval(()=>send({type:'ping'}),25000);
}

KINDS.forEach(k=>$('#'+k).addEventListener('input',e=>send({type:'edit',kind:k,text:e.target.value})));
$('#live').addEventListener('change',e=>send({type:'live',enabled:e.target.checked}));
$('#render-btn').onclick=()=>send({type:'render'});
$('#new-btn').onclick=()=>send({type:'new_project'});
$('#template').onchange=e=>{if(e.target.value)send({type:'template',name:e.target.value});e.target.value=''};
$('#import-file').onchange=async e=>{
  const f=e.target.files[0];if(!f)return;
  if(f.name.toLowerCase().endsWith('.zip')){
    const r=await fetch('/import/'+code+'?name='+encodeURIComponent(f.name),{method:'POST',body:await f.arrayBuffer()});
    const j=await r.json();if(!j.ok)toast(j.message,'warn');
  }else{
    send({type:'import',name:f.name,content:await f.text()});
  }
  e.target.value='';
};
$('#download-btn').onclick=()=>{location.href='/download/'+code+'?kind=project'};
$('#html-btn').onclick=()=>{location.href='/download/'+code+'?kind=html'};
$('#python-btn').onclick=()=>{
  const packages=prompt('pip packages (comma separated)','requests');
  if(packages===null)return;
  const q=new URLSearchParams({kind:'python',packages:packages.split(',').join('\n'),script:'def main():\n    pass'});
  location.href='/download/'+code+'?'+q;
};
$('#convert-btn').onclick=()=>{
  const kind=$('#convert-kind').value;
  if(!kind){toast('please select a conversion type','warn');return}
  toast('Converting…','info');
  const q=new URLSearchParams({kind,name:$('#app-name').value,version:$('#app-version').value});
  location.href='/download/'+code+'?'+q;
};
$('#cover-btn').onclick=()=>send({type:'cover',theme:$('#cover-theme').value,title:$('#cover-title').value});
$('#review-btn').onclick=()=>send({type:'review'});
$('#upload-btn').onclick=()=>send({type:'upload',provider:$('#provider').value,repo:$('#repo').value});
$('#deploy-btn').onclick=()=>send({type:'deploy'});
$('#chat-form').onsubmit=e=>{
  e.preventDefault();const text=$('#chat-input').value.trim();if(!text)return;
  chatLine('me',text);send({type:'chat',text});$('#chat-input').value='';
};
connect();
</script>
</body>
</html>"##;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a connection handler needs.
#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub config: Arc<LivepadConfig>,
    /// Buffers every new session starts from.
    pub initial: Arc<Snapshot>,
}

impl AppState {
    pub fn new(config: LivepadConfig, initial: Snapshot) -> Self {
        Self {
            store: session::new_session_store(),
            config: Arc::new(config),
            initial: Arc::new(initial),
        }
    }

    /// Register a browser-backed session seeded with the initial buffers.
    pub fn create_session(&self) -> crate::error::Result<String> {
        let preview = &self.config.preview;
        session::create_session(&self.store, |code| {
            LiveSession::broadcasting(code, (*self.initial).clone())
                .with_live_mode(preview.live_mode)
                .with_tick_policy(preview.tick_policy)
        })
    }
}

// ---------------------------------------------------------------------------
// WebSocket protocol
// ---------------------------------------------------------------------------

/// A message from a browser view.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Edit {
        kind: SourceKind,
        text: String,
    },
    Live {
        enabled: bool,
    },
    Render,
    /// A named source file; a blank name is pasted text for the HTML pane.
    Import {
        #[serde(default)]
        name: String,
        content: String,
    },
    NewProject,
    Template {
        name: String,
    },
    Cover {
        #[serde(default)]
        theme: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        subtitle: String,
        #[serde(default)]
        author: String,
    },
    Chat {
        text: String,
    },
    Review,
    Upload(UploadRequest),
    Deploy,
    Ping,
}

/// Work left over after a message was applied under the store lock.
#[derive(Debug)]
pub enum Followup {
    None,
    /// Sent to the originating view only.
    Reply(Value),
    /// Assistant reply, published after the chat delay.
    Chat(&'static str),
    Upload(UploadRequest),
    Deploy,
}

fn notice_event(notice: &Notice) -> Value {
    json!({
        "type": "notice",
        "level": notice.level,
        "message": notice.message,
    })
}

fn buffers_event(session: &LiveSession, origin: Option<&str>) -> Value {
    json!({
        "type": "buffers",
        "buffers": session.snapshot(),
        "live": session.live_mode(),
        "origin": origin,
    })
}

/// Publish the session's queued notices to all of its views.
fn publish_notices(session: &mut LiveSession) {
    for notice in session.drain_notices() {
        let _ = session.events().send(notice_event(&notice));
    }
}

fn publish_buffers(session: &LiveSession, origin: Option<&str>) {
    let _ = session.events().send(buffers_event(session, origin));
}

/// Apply one client message to its session.
///
/// Runs synchronously under the store lock; anything that has to wait is
/// returned as a [`Followup`].
pub fn apply_message(
    session: &mut LiveSession,
    msg: ClientMessage,
    client_id: &str,
    config: &LivepadConfig,
) -> Followup {
    let followup = match msg {
        ClientMessage::Edit { kind, text } => {
            session.edit(kind, text);
            publish_buffers(session, Some(client_id));
            Followup::None
        }
        ClientMessage::Live { enabled } => {
            session.set_live_mode(enabled);
            publish_buffers(session, Some(client_id));
            Followup::None
        }
        ClientMessage::Render => {
            session.render_now();
            Followup::None
        }
        ClientMessage::Import { name, content } => {
            if name.trim().is_empty() {
                session.import_text(&content);
            } else {
                // the failure is already queued as a notice
                let _ = session.import_file(&name, &content);
            }
            publish_buffers(session, None);
            Followup::None
        }
        ClientMessage::NewProject => {
            session.new_project();
            publish_buffers(session, None);
            Followup::None
        }
        ClientMessage::Template { name } => {
            match ProjectTemplate::from_str_loose(&name) {
                Some(template) => {
                    session.load_template(template);
                    publish_buffers(session, None);
                }
                None => session.notify(
                    NoticeLevel::Warn,
                    LivepadError::MissingSelection("template").to_string(),
                ),
            }
            Followup::None
        }
        ClientMessage::Cover {
            theme,
            title,
            subtitle,
            author,
        } => {
            let theme = if theme.trim().is_empty() {
                Some(CoverTheme::default())
            } else {
                CoverTheme::from_str_loose(&theme)
            };
            match theme {
                Some(theme) => {
                    let cover = CoverPage::new(&title, &subtitle, &author, &config.package.author);
                    session.apply_cover(theme, &cover);
                    publish_buffers(session, None);
                }
                None => session.notify(
                    NoticeLevel::Warn,
                    LivepadError::MissingSelection("cover theme").to_string(),
                ),
            }
            Followup::None
        }
        ClientMessage::Chat { text } => match assistant::respond(&text) {
            Some(reply) => Followup::Chat(reply),
            None => Followup::None,
        },
        ClientMessage::Review => {
            let report = review::review(&session.snapshot());
            Followup::Reply(json!({
                "type": "review",
                "report": report.to_string(),
                "review": report,
            }))
        }
        ClientMessage::Upload(request) => Followup::Upload(request),
        ClientMessage::Deploy => Followup::Deploy,
        ClientMessage::Ping => Followup::Reply(json!({"type": "pong"})),
    };
    publish_notices(session);
    followup
}

/// Run a delayed followup in the background and publish its outcome.
fn spawn_followup(
    followup: Followup,
    events: broadcast::Sender<Value>,
    simulation: &SimulationConfig,
) {
    match followup {
        Followup::None | Followup::Reply(_) => {}
        Followup::Chat(reply) => {
            let delay = simulation.chat_delay();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(json!({"type": "chat_reply", "text": reply}));
            });
        }
        Followup::Upload(request) => {
            let delay = simulation.upload_delay();
            tokio::spawn(async move {
                let notice = match cloud::upload(&request, delay).await {
                    Ok(report) => Notice {
                        level: NoticeLevel::Info,
                        message: report.message,
                    },
                    Err(e) => Notice {
                        level: NoticeLevel::Warn,
                        message: e.to_string(),
                    },
                };
                let _ = events.send(notice_event(&notice));
            });
        }
        Followup::Deploy => {
            let delay = simulation.deploy_delay();
            tokio::spawn(async move {
                let report = cloud::deploy(delay).await;
                let notice = Notice {
                    level: NoticeLevel::Info,
                    message: report.message,
                };
                let _ = events.send(notice_event(&notice));
            });
        }
    }
}

async fn send_json<S>(sink: &mut S, msg: &Value) -> bool
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(text) => sink.send(WsMessage::Text(text)).await.is_ok(),
        Err(_) => true,
    }
}

/// Drive one browser view of session `code` until it disconnects.
pub async fn handle_ws(
    ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    state: AppState,
    code: String,
) {
    let (mut ws_sink, mut ws_source) = ws_stream.split();

    let joined = session::with_session(&state.store, &code, |s| {
        (s.subscribe(), s.events().clone(), s.snapshot(), s.live_mode())
    });
    let (mut rx, events, buffers, live) = match joined {
        Ok(parts) => parts,
        Err(e) => {
            send_json(&mut ws_sink, &json!({"type": "error", "message": e.to_string()})).await;
            return;
        }
    };

    let client_id = uuid::Uuid::new_v4().to_string();
    info!(session = %code, client = %client_id, "view attached");

    let welcome = json!({
        "type": "welcome",
        "session": code,
        "client_id": client_id,
        "live": live,
        "buffers": buffers,
    });
    if !send_json(&mut ws_sink, &welcome).await {
        drop(rx);
        session::remove_if_idle(&state.store, &code);
        return;
    }

    // First paint for this view.
    let _ = session::with_session(&state.store, &code, |s| {
        s.render_now();
        publish_notices(s);
    });

    loop {
        tokio::select! {
            msg = ws_source.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let parsed: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                debug!(session = %code, error = %e, "bad client message");
                                let err = json!({"type": "error", "message": format!("invalid message: {e}")});
                                if !send_json(&mut ws_sink, &err).await {
                                    break;
                                }
                                continue;
                            }
                        };
                        let applied = session::with_session(&state.store, &code, |s| {
                            apply_message(s, parsed, &client_id, &state.config)
                        });
                        match applied {
                            Ok(Followup::Reply(reply)) => {
                                if !send_json(&mut ws_sink, &reply).await {
                                    break;
                                }
                            }
                            Ok(followup) => {
                                spawn_followup(followup, events.clone(), &state.config.simulation);
                            }
                            Err(e) => {
                                send_json(&mut ws_sink, &json!({"type": "error", "message": e.to_string()})).await;
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }

            bcast = rx.recv() => {
                match bcast {
                    Ok(msg) => {
                        if !send_json(&mut ws_sink, &msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session = %code, skipped = n, "view lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!(session = %code, client = %client_id, "view detached");
    drop(rx);
    session::remove_if_idle(&state.store, &code);
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Percent-decode a query component. `+` is a space; invalid escapes are
/// kept literally and invalid UTF-8 is replaced.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let decoded = s
                    .get(i + 1..i + 3)
                    .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match decoded {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse a query string into key-value pairs.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let val = parts.next().unwrap_or("");
            Some((url_decode(key), url_decode(val)))
        })
        .collect()
}

/// Parsed request line and the headers we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub query: String,
    pub content_length: usize,
    /// Byte length of the head including the blank line.
    pub head_len: usize,
}

/// Parse a request head from the bytes read so far.
///
/// `Ok(None)` means the head is not complete yet.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut req = httparse::Request::new(&mut headers);
    let head_len = match req.parse(buf)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };
    let content_length = req
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let target = req.path.unwrap_or("/");
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };
    Ok(Some(RequestHead {
        method: req.method.unwrap_or("GET").to_string(),
        path: path.to_string(),
        query: query.to_string(),
        content_length,
        head_len,
    }))
}

async fn read_request(stream: &mut TcpStream) -> Result<Option<(RequestHead, Vec<u8>)>, BoxError> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let head = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head) = parse_head(&buf)? {
            break head;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err("request head too large".into());
        }
    };
    if head.content_length > MAX_BODY_BYTES {
        return Err(format!("request body too large: {} bytes", head.content_length).into());
    }
    let mut body = buf.split_off(head.head_len);
    while body.len() < head.content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(head.content_length);
    Ok(Some((head, body)))
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    fn new(status: u16, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    fn json(status: u16, value: &Value) -> Self {
        Self::new(status, "application/json", value.to_string())
    }

    fn text(status: u16, text: impl Into<String>) -> Self {
        Self::new(status, "text/plain; charset=utf-8", text.into())
    }

    fn not_found() -> Self {
        Self::text(404, "Not Found")
    }

    /// A download. The file name is reduced to header-safe characters.
    fn attachment(content_type: &'static str, file_name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let mut resp = Self::new(200, content_type, bytes);
        resp.headers.push((
            "Content-Disposition".to_string(),
            format!("attachment; filename=\"{}\"", convert::safe_file_name(file_name)),
        ));
        resp
    }

    fn zip(file_name: &str, bytes: Vec<u8>) -> Self {
        Self::attachment("application/zip", file_name, bytes)
    }

    /// Map a library error onto a status code.
    fn from_error(err: &LivepadError) -> Self {
        let status = match err {
            LivepadError::UnknownSession(_) => 404,
            e if e.is_recoverable() => 400,
            _ => 500,
        };
        Self::json(status, &json!({"ok": false, "message": err.to_string()}))
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len(),
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

fn download(state: &AppState, code: &str, params: &HashMap<String, String>) -> Result<HttpResponse, LivepadError> {
    let sources = session::with_session(&state.store, code, |s| s.snapshot())?;
    let field = |key: &str| params.get(key).map(String::as_str).unwrap_or("");
    let kind = field("kind");
    if kind.eq_ignore_ascii_case("project") {
        let bytes = archive::project_archive(&sources)?;
        return Ok(HttpResponse::zip(archive::PROJECT_ARCHIVE_NAME, bytes));
    }
    if kind.eq_ignore_ascii_case("html") {
        return Ok(HttpResponse::attachment(
            "text/html; charset=utf-8",
            SourceKind::Html.default_file_name(),
            sources.html,
        ));
    }
    if kind.eq_ignore_ascii_case("python") {
        let script = convert::python_script(field("packages"), field("script"));
        info!(session = %code, bytes = script.len(), "python script generated");
        return Ok(HttpResponse::attachment(
            "text/x-python; charset=utf-8",
            PYTHON_SCRIPT_NAME,
            script,
        ));
    }
    let meta = AppMeta::new(field("name"), field("version"), field("description"));
    let pkg = convert::convert(
        ConversionTarget::from_str_loose(kind),
        &meta,
        &sources,
        &state.config.package.settings(),
    )?;
    let bytes = archive::write_package(&pkg)?;
    info!(session = %code, target = %pkg.target, bytes = bytes.len(), "package generated");
    Ok(HttpResponse::zip(&pkg.archive_name(), bytes))
}

fn import(state: &AppState, code: &str, name: &str, body: &[u8]) -> Result<HttpResponse, LivepadError> {
    let result = session::with_session(&state.store, code, |s| {
        let result = if name.to_ascii_lowercase().ends_with(".zip") {
            s.import_archive(body).map(|()| "Project archive imported!".to_string())
        } else {
            s.import_file(name, &String::from_utf8_lossy(body))
                .map(|kind| format!("Imported {kind}"))
        };
        if result.is_ok() {
            publish_buffers(s, None);
        }
        publish_notices(s);
        result
    })?;
    let message = result?;
    Ok(HttpResponse::json(200, &json!({"ok": true, "message": message})))
}

/// Route one plain HTTP request.
pub async fn route(state: &AppState, method: &str, path: &str, query: &str, body: &[u8]) -> HttpResponse {
    let params = parse_query(query);
    if path == "/" {
        return HttpResponse::new(200, "text/html; charset=utf-8", INDEX_HTML);
    }
    if path == "/health" {
        return HttpResponse::text(200, "ok");
    }
    if path == "/session/create" {
        let code = match state.create_session() {
            Ok(code) => code,
            Err(e) => return HttpResponse::from_error(&e),
        };
        return HttpResponse::json(
            200,
            &json!({
                "code": code,
                "ws_url": format!("/ws/{code}"),
                "preview_url": format!("/preview/{code}"),
            }),
        );
    }
    if let Some(code) = path.strip_prefix("/preview/") {
        let code = session::normalize_code(code);
        let doc = session::with_session(&state.store, &code, |s| {
            s.current_document().map(|d| d.as_str().to_string())
        });
        return match doc {
            Ok(Some(doc)) => HttpResponse::new(200, "text/html; charset=utf-8", doc),
            _ => HttpResponse::not_found(),
        };
    }
    if let Some(code) = path.strip_prefix("/download/") {
        let code = session::normalize_code(code);
        let is_conversion = params
            .get("kind")
            .is_some_and(|k| ConversionTarget::from_str_loose(k).is_some());
        if is_conversion {
            tokio::time::sleep(state.config.simulation.convert_delay()).await;
        }
        return download(state, &code, &params).unwrap_or_else(|e| HttpResponse::from_error(&e));
    }
    if let Some(code) = path.strip_prefix("/import/") {
        let code = session::normalize_code(code);
        if method != "POST" {
            return HttpResponse::text(405, "Method Not Allowed");
        }
        let name = params.get("name").map(String::as_str).unwrap_or("");
        return import(state, &code, name, body).unwrap_or_else(|e| HttpResponse::from_error(&e));
    }
    HttpResponse::not_found()
}

async fn handle_connection(mut stream: TcpStream, state: AppState) -> Result<(), BoxError> {
    // Peek at the first bytes to detect WebSocket upgrade requests.
    let mut peek_buf = [0u8; 1024];
    let peek_n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    let peek_str = String::from_utf8_lossy(&peek_buf[..peek_n]).to_ascii_lowercase();

    if peek_str.contains("upgrade: websocket") {
        let path = peek_str
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("/");
        if let Some(code) = path.strip_prefix("/ws/") {
            let code = session::normalize_code(code);
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws_stream) => handle_ws(ws_stream, state, code).await,
                Err(e) => warn!(error = %e, "websocket handshake failed"),
            }
            return Ok(());
        }
    }

    let Some((head, body)) = read_request(&mut stream).await? else {
        return Ok(());
    };
    debug!(method = %head.method, path = %head.path, "request");
    let response = route(&state, &head.method, &head.path, &head.query, &body).await;
    stream.write_all(&response.to_bytes()).await?;
    Ok(())
}

fn open_browser(url: &str) {
    #[cfg(target_os = "windows")]
    {
        let _ = std::process::Command::new("cmd")
            .args(["/C", &format!("start {url}")])
            .spawn();
    }
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
}

/// Accept connections on `listener` forever, with the fallback tick and
/// the idle-session reaper running.
pub async fn run(listener: TcpListener, state: AppState) -> Result<(), BoxError> {
    let _tick = state
        .config
        .preview
        .tick_period()
        .map(|period| session::spawn_fallback_tick(state.store.clone(), period));
    let _reaper = state
        .config
        .server
        .idle_ttl()
        .map(|ttl| session::spawn_idle_reaper(state.store.clone(), ttl));

    loop {
        let (stream, addr) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                warn!(peer = %addr, error = %e, "connection error");
            }
        });
    }
}

/// Bind the configured address, print the banner and serve.
pub async fn serve(config: LivepadConfig, initial: Snapshot) -> Result<(), BoxError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    let local = listener.local_addr()?;
    let url = format!("http://{local}");

    eprintln!("{}", format!("  livepad running at {url}").bright_green());
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());
    info!(%local, live = config.preview.live_mode, tick_ms = config.preview.tick_ms, "listening");

    if config.server.open_browser {
        open_browser(&url);
    }

    run(listener, AppState::new(config, initial)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        let mut config = LivepadConfig::default();
        config.simulation = SimulationConfig {
            convert_delay_ms: 0,
            upload_delay_ms: 0,
            deploy_delay_ms: 0,
            chat_delay_ms: 0,
        };
        AppState::new(config, ProjectTemplate::Default.snapshot())
    }

    fn attached(state: &AppState) -> (String, broadcast::Receiver<Value>) {
        let code = state.create_session().unwrap();
        let rx = session::with_session(&state.store, &code, |s| s.subscribe()).unwrap();
        (code, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<Value>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(v) = rx.try_recv() {
            out.push(v);
        }
        out
    }

    fn apply(state: &AppState, code: &str, raw: &str) -> Followup {
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        session::with_session(&state.store, code, |s| apply_message(s, msg, "me", &state.config)).unwrap()
    }

    // -- url_decode / parse_query --

    #[test]
    fn test_url_decode_basic() {
        assert_eq!(url_decode("hello+world"), "hello world");
        assert_eq!(url_decode("hello%20world"), "hello world");
        assert_eq!(url_decode("a%26b"), "a&b");
        assert_eq!(url_decode("plain"), "plain");
        assert_eq!(url_decode(""), "");
    }

    #[test]
    fn test_url_decode_multibyte() {
        assert_eq!(url_decode("caf%C3%A9"), "café");
    }

    #[test]
    fn test_url_decode_bad_escape_kept() {
        assert_eq!(url_decode("100%"), "100%");
        assert_eq!(url_decode("%zz"), "%zz");
        assert_eq!(url_decode("%+1"), "% 1");
    }

    #[test]
    fn test_parse_query() {
        let q = parse_query("kind=apk&name=My+App&version=");
        assert_eq!(q.get("kind").unwrap(), "apk");
        assert_eq!(q.get("name").unwrap(), "My App");
        assert_eq!(q.get("version").unwrap(), "");
        assert!(parse_query("").is_empty());
    }

    // -- parse_head --

    #[test]
    fn test_parse_head_partial() {
        assert_eq!(parse_head(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap(), None);
    }

    #[test]
    fn test_parse_head_with_body() {
        let raw = b"POST /import/ABC123?name=a.zip HTTP/1.1\r\nContent-Length: 4\r\n\r\nPK..";
        let head = parse_head(raw).unwrap().unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.path, "/import/ABC123");
        assert_eq!(head.query, "name=a.zip");
        assert_eq!(head.content_length, 4);
        assert_eq!(&raw[head.head_len..], b"PK..");
    }

    #[test]
    fn test_parse_head_garbage() {
        assert!(parse_head(b"\x00\x01 nonsense\r\n\r\n").is_err());
    }

    // -- INDEX_HTML --

    #[test]
    fn test_index_html_has_panes_and_sandbox() {
        for id in ["id=\"html\"", "id=\"css\"", "id=\"js\"", "id=\"live\"", "id=\"render-btn\""] {
            assert!(INDEX_HTML.contains(id), "missing {id}");
        }
        assert!(INDEX_HTML.contains("sandbox=\"allow-scripts\""));
        assert!(!INDEX_HTML.contains("allow-same-origin"));
        assert!(INDEX_HTML.contains("srcdoc"));
    }

    // -- client messages --

    #[test]
    fn test_client_message_parse() {
        let m: ClientMessage = serde_json::from_str(r#"{"type":"edit","kind":"css","text":"a{}"}"#).unwrap();
        assert!(matches!(m, ClientMessage::Edit { kind: SourceKind::Css, .. }));
        let m: ClientMessage = serde_json::from_str(r#"{"type":"new_project"}"#).unwrap();
        assert!(matches!(m, ClientMessage::NewProject));
        let m: ClientMessage =
            serde_json::from_str(r#"{"type":"upload","provider":"gitlab","repo":"site"}"#).unwrap();
        assert!(matches!(m, ClientMessage::Upload(ref r) if r.repo == "site"));
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"edit","kind":"md","text":""}"#).is_err());
    }

    #[test]
    fn test_edit_publishes_render_and_buffers() {
        let state = state();
        let (code, mut rx) = attached(&state);
        let f = apply(&state, &code, r#"{"type":"edit","kind":"js","text":"go()"}"#);
        assert!(matches!(f, Followup::None));
        let events = drain(&mut rx);
        let render = events.iter().find(|e| e["type"] == "render").unwrap();
        assert!(render["document"].as_str().unwrap().contains("<script>go()</script>"));
        let buffers = events.iter().find(|e| e["type"] == "buffers").unwrap();
        assert_eq!(buffers["origin"], "me");
        assert_eq!(buffers["buffers"]["js"], "go()");
    }

    #[test]
    fn test_unsupported_import_is_a_warn_notice() {
        let state = state();
        let (code, mut rx) = attached(&state);
        apply(&state, &code, r#"{"type":"import","name":"notes.txt","content":"x"}"#);
        let events = drain(&mut rx);
        assert!(events.iter().all(|e| e["type"] != "render"));
        let notice = events.iter().find(|e| e["type"] == "notice").unwrap();
        assert_eq!(notice["level"], "warn");
        assert_eq!(notice["message"], "unsupported file format: notes.txt");
    }

    #[test]
    fn test_new_project_notice() {
        let state = state();
        let (code, mut rx) = attached(&state);
        apply(&state, &code, r#"{"type":"new_project"}"#);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| e["type"] == "notice" && e["message"] == "New project created!"));
        let snap = session::with_session(&state.store, &code, |s| s.snapshot()).unwrap();
        assert_eq!(snap, Snapshot::default());
    }

    #[test]
    fn test_unknown_template_warns() {
        let state = state();
        let (code, mut rx) = attached(&state);
        apply(&state, &code, r#"{"type":"template","name":"nope"}"#);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["message"], "please select a template");
    }

    #[test]
    fn test_cover_uses_configured_author() {
        let state = state();
        let (code, _rx) = attached(&state);
        apply(&state, &code, r#"{"type":"cover","theme":"light","title":"Atlas"}"#);
        let html = session::with_session(&state.store, &code, |s| s.snapshot().html).unwrap();
        assert!(html.starts_with("<!-- Cover Page -->"));
        assert!(html.contains("Atlas"));
        assert!(html.contains("livepad"));
    }

    #[test]
    fn test_review_and_ping_reply_directly() {
        let state = state();
        let (code, _rx) = attached(&state);
        match apply(&state, &code, r#"{"type":"review"}"#) {
            Followup::Reply(v) => {
                assert_eq!(v["type"], "review");
                assert!(v["report"].as_str().unwrap().starts_with("PROJECT REVIEW"));
                assert_eq!(v["review"]["html"]["has_doctype"], true);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            apply(&state, &code, r#"{"type":"ping"}"#),
            Followup::Reply(ref v) if v["type"] == "pong"
        ));
    }

    #[test]
    fn test_chat_followup() {
        let state = state();
        let (code, _rx) = attached(&state);
        assert!(matches!(
            apply(&state, &code, r#"{"type":"chat","text":"Tell me about CSS"}"#),
            Followup::Chat(_)
        ));
        assert!(matches!(
            apply(&state, &code, r#"{"type":"chat","text":"   "}"#),
            Followup::None
        ));
    }

    #[tokio::test]
    async fn test_upload_followup_publishes_notice() {
        let state = state();
        let (code, mut rx) = attached(&state);
        let events = session::with_session(&state.store, &code, |s| s.events().clone()).unwrap();
        let f = apply(&state, &code, r#"{"type":"upload","provider":"github","repo":""}"#);
        spawn_followup(f, events, &state.config.simulation);
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg["level"], "warn");
        assert_eq!(msg["message"], "please select a repository name");
    }

    // -- routes --

    #[tokio::test]
    async fn test_route_index_and_health() {
        let state = state();
        let resp = route(&state, "GET", "/", "", b"").await;
        assert_eq!(resp.status, 200);
        assert!(resp.content_type.starts_with("text/html"));
        let resp = route(&state, "GET", "/health", "", b"").await;
        assert_eq!(resp.body, b"ok");
        assert_eq!(route(&state, "GET", "/nope", "", b"").await.status, 404);
    }

    #[tokio::test]
    async fn test_route_create_session() {
        let state = state();
        let resp = route(&state, "POST", "/session/create", "", b"").await;
        let v: Value = serde_json::from_slice(&resp.body).unwrap();
        let code = v["code"].as_str().unwrap();
        assert_eq!(v["ws_url"], format!("/ws/{code}"));
        assert!(session::with_session(&state.store, code, |_| ()).is_ok());
    }

    #[tokio::test]
    async fn test_route_preview_before_and_after_render() {
        let state = state();
        let (code, _rx) = attached(&state);
        let path = format!("/preview/{code}");
        assert_eq!(route(&state, "GET", &path, "", b"").await.status, 404);
        session::with_session(&state.store, &code, |s| s.render_now()).unwrap();
        let resp = route(&state, "GET", &path, "", b"").await;
        assert_eq!(resp.status, 200);
        assert!(String::from_utf8(resp.body).unwrap().contains("<style>"));
    }

    #[tokio::test]
    async fn test_route_download_project_and_conversion() {
        let state = state();
        let code = state.create_session().unwrap();
        let path = format!("/download/{code}");

        let resp = route(&state, "GET", &path, "kind=project", b"").await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, "application/zip");
        assert!(resp.headers[0].1.contains("project.zip"));

        let resp = route(&state, "GET", &path, "kind=apk&name=Atlas", b"").await;
        assert_eq!(resp.status, 200);
        assert!(resp.headers[0].1.contains("Atlas-apk.zip"));

        let resp = route(&state, "GET", &path, "", b"").await;
        assert_eq!(resp.status, 400);
        let v: Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["message"], "please select a conversion type");

        let resp = route(&state, "GET", "/download/NOPE00", "kind=project", b"").await;
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn test_route_download_name_cannot_inject_headers() {
        let state = state();
        let code = state.create_session().unwrap();
        let query = "kind=web&name=x%0D%0ASet-Cookie:%20pwned=1%0D%0AX%22";
        let resp = route(&state, "GET", &format!("/download/{code}"), query, b"").await;
        assert_eq!(resp.status, 200);

        let bytes = resp.to_bytes();
        let split = bytes.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8_lossy(&bytes[..split]);
        assert!(!head.contains("\r\nSet-Cookie"));
        let disposition = head
            .lines()
            .find(|l| l.starts_with("Content-Disposition:"))
            .unwrap();
        assert_eq!(disposition, "Content-Disposition: attachment; filename=\"x__Set-Cookie__pwned_1__X_-web.zip\"");
    }

    #[tokio::test]
    async fn test_route_download_html_and_python() {
        let state = state();
        let code = state.create_session().unwrap();
        let path = format!("/download/{code}");

        let resp = route(&state, "GET", &path, "kind=html", b"").await;
        assert_eq!(resp.status, 200);
        assert!(resp.content_type.starts_with("text/html"));
        assert!(resp.headers[0].1.ends_with("filename=\"index.html\""));
        assert_eq!(resp.body, ProjectTemplate::Default.snapshot().html.into_bytes());

        let query = "kind=python&packages=requests%0Anumpy%3D%3D1.26&script=def+main%28%29%3A%0A++++pass";
        let resp = route(&state, "GET", &path, query, b"").await;
        assert_eq!(resp.status, 200);
        assert!(resp.headers[0].1.ends_with("filename=\"generated_script.py\""));
        let script = String::from_utf8(resp.body).unwrap();
        assert!(script.starts_with("#!/usr/bin/env python3"));
        assert!(script.contains("import requests\nimport numpy\n"));
        assert!(script.contains("def main():\n    pass"));
    }

    #[tokio::test]
    async fn test_routes_accept_lowercase_codes() {
        let state = state();
        let (code, _rx) = attached(&state);
        session::with_session(&state.store, &code, |s| s.render_now()).unwrap();
        let lower = code.to_ascii_lowercase();

        let resp = route(&state, "GET", &format!("/preview/{lower}"), "", b"").await;
        assert_eq!(resp.status, 200);
        let resp = route(&state, "GET", &format!("/download/{lower}"), "kind=project", b"").await;
        assert_eq!(resp.status, 200);
        let resp = route(&state, "POST", &format!("/import/{lower}"), "name=a.css", b"p{}").await;
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn test_route_create_session_on_poisoned_store_is_500() {
        let state = state();
        let store = state.store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = store.lock().unwrap();
            panic!("poison the store");
        })
        .join();
        let resp = route(&state, "POST", "/session/create", "", b"").await;
        assert_eq!(resp.status, 500);
        let v: Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["message"], "session store unavailable");
    }

    #[tokio::test]
    async fn test_route_import_archive() {
        let state = state();
        let code = state.create_session().unwrap();
        let bytes = archive::project_archive(&Snapshot::new("<p>zip</p>", "", "")).unwrap();
        let path = format!("/import/{code}");
        let resp = route(&state, "POST", &path, "name=site.zip", &bytes).await;
        assert_eq!(resp.status, 200);
        let html = session::with_session(&state.store, &code, |s| s.snapshot().html).unwrap();
        assert_eq!(html, "<p>zip</p>");

        let resp = route(&state, "POST", &path, "name=notes.txt", b"x").await;
        assert_eq!(resp.status, 400);
        assert_eq!(route(&state, "GET", &path, "name=a.css", b"").await.status, 405);
    }

    #[test]
    fn test_response_bytes() {
        let resp = HttpResponse::zip("a.zip", vec![1, 2, 3]);
        let bytes = resp.to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.contains("Content-Disposition: attachment; filename=\"a.zip\"\r\n"));
        assert!(bytes.ends_with(&[1, 2, 3]));
    }
}
