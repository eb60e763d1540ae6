//! Static project review: line counts and a handful of presence checks.

use serde::Serialize;

use crate::buffer::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HtmlReview {
    pub lines: usize,
    pub has_doctype: bool,
    pub has_viewport: bool,
    pub has_title: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CssReview {
    pub lines: usize,
    pub has_media_queries: bool,
    pub uses_custom_properties: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsReview {
    pub lines: usize,
    pub has_event_listeners: bool,
    pub uses_modern_syntax: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReview {
    pub html: HtmlReview,
    pub css: CssReview,
    pub js: JsReview,
}

/// Number of `\n`-separated lines; an empty buffer counts as one line.
fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

pub fn review(sources: &Snapshot) -> ProjectReview {
    let Snapshot { html, css, js } = sources;
    ProjectReview {
        html: HtmlReview {
            lines: line_count(html),
            has_doctype: html.contains("<!DOCTYPE html>"),
            has_viewport: html.contains("viewport"),
            has_title: html.contains("<title>"),
        },
        css: CssReview {
            lines: line_count(css),
            has_media_queries: css.contains("@media"),
            uses_custom_properties: css.contains("--"),
        },
        js: JsReview {
            lines: line_count(js),
            has_event_listeners: js.contains("addEventListener"),
            uses_modern_syntax: js.contains("const") || js.contains("let") || js.contains("=>"),
        },
    }
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "yes"
    } else {
        "no"
    }
}

impl std::fmt::Display for ProjectReview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "PROJECT REVIEW")?;
        writeln!(f, "==============")?;
        writeln!(f)?;
        writeln!(f, "HTML Analysis:")?;
        writeln!(f, "- Lines of code: {}", self.html.lines)?;
        writeln!(f, "- Contains DOCTYPE: {}", mark(self.html.has_doctype))?;
        writeln!(f, "- Contains meta viewport: {}", mark(self.html.has_viewport))?;
        writeln!(f, "- Title tag present: {}", mark(self.html.has_title))?;
        writeln!(f)?;
        writeln!(f, "CSS Analysis:")?;
        writeln!(f, "- Lines of code: {}", self.css.lines)?;
        writeln!(f, "- Contains responsive design: {}", mark(self.css.has_media_queries))?;
        writeln!(f, "- Uses CSS variables: {}", mark(self.css.uses_custom_properties))?;
        writeln!(f)?;
        writeln!(f, "JavaScript Analysis:")?;
        writeln!(f, "- Lines of code: {}", self.js.lines)?;
        writeln!(f, "- Contains event listeners: {}", mark(self.js.has_event_listeners))?;
        writeln!(f, "- Uses modern ES6+: {}", mark(self.js.uses_modern_syntax))?;
        writeln!(f)?;
        write!(f, "Overall Status: Ready for deployment")
    }
}
