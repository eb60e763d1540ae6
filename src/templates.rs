//! Canned starter projects loaded into a workspace.

use serde::{Deserialize, Serialize};

use crate::buffer::Snapshot;

/// A named starter project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectTemplate {
    /// Loaded into every new session.
    Default,
    /// The assistant's "generate code" result.
    AssistantSample,
    /// Three empty buffers.
    Blank,
}

impl ProjectTemplate {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "default" => Some(ProjectTemplate::Default),
            "assistant_sample" | "assistant" | "ai" => Some(ProjectTemplate::AssistantSample),
            "blank" | "empty" => Some(ProjectTemplate::Blank),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        match self {
            ProjectTemplate::Default => Snapshot::new(DEFAULT_HTML, DEFAULT_CSS, DEFAULT_JS),
            ProjectTemplate::AssistantSample => {
                Snapshot::new(ASSISTANT_HTML, ASSISTANT_CSS, ASSISTANT_JS)
            }
            ProjectTemplate::Blank => Snapshot::default(),
        }
    }
}

pub const DEFAULT_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>My Page</title>
</head>
<body>
    <div class="container">
        <h1>Hello from livepad</h1>
        <p>Edit the HTML, CSS and JS panes and watch this page update.</p>
        <a href="#" class="button">Click me</a>
    </div>
</body>
</html>"##;

pub const DEFAULT_CSS: &str = r#"body {
    font-family: system-ui, sans-serif;
    margin: 0;
    padding: 20px;
    background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
    min-height: 100vh;
    display: flex;
    justify-content: center;
    align-items: center;
}

.container {
    background: white;
    padding: 40px;
    border-radius: 10px;
    box-shadow: 0 10px 30px rgba(0, 0, 0, 0.3);
    text-align: center;
    max-width: 600px;
}

.button {
    display: inline-block;
    padding: 12px 30px;
    background: #0078d4;
    color: white;
    text-decoration: none;
    border-radius: 5px;
}

.button:hover {
    background: #106ebe;
}"#;

pub const DEFAULT_JS: &str = r#"document.addEventListener('DOMContentLoaded', function () {
    const button = document.querySelector('.button');
    if (button) {
        button.addEventListener('click', function (e) {
            e.preventDefault();
            alert('Hello from livepad!');
        });
    }
});"#;

pub const ASSISTANT_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Generated Page</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: system-ui, sans-serif;
            background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%);
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
        }
        .hero { text-align: center; color: white; padding: 60px 40px; }
        .hero h1 { font-size: 3em; margin-bottom: 20px; color: #00bfff; }
        .hero p { font-size: 1.2em; color: #a0a0a0; margin-bottom: 30px; }
        .btn {
            display: inline-block;
            padding: 15px 40px;
            background: linear-gradient(135deg, #00bfff 0%, #00ff88 100%);
            color: white;
            text-decoration: none;
            border-radius: 50px;
            font-weight: bold;
        }
    </style>
</head>
<body>
    <div class="hero">
        <h1>Generated Page</h1>
        <p>Produced by the livepad assistant</p>
        <a href="#" class="btn">Explore More</a>
    </div>
</body>
</html>"##;

pub const ASSISTANT_CSS: &str = r#".hero {
    animation: fadeInUp 1s ease;
}

@keyframes fadeInUp {
    from { opacity: 0; transform: translateY(30px); }
    to { opacity: 1; transform: translateY(0); }
}"#;

pub const ASSISTANT_JS: &str = r#"document.addEventListener('DOMContentLoaded', function () {
    const btn = document.querySelector('.btn');
    btn.addEventListener('click', function (e) {
        e.preventDefault();
        alert('Generated code is working!');
    });
});"#;
