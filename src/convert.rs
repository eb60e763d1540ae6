//! Conversion package generators.
//!
//! Each target turns the three buffers plus some app metadata into a named
//! set of text files. Nothing is compiled or validated: the wrappers are
//! templates a developer finishes in the platform's own toolchain. Output is
//! deterministic for identical inputs.

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::buffer::Snapshot;
use crate::error::{LivepadError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionTarget {
    Web,
    Exe,
    Apk,
    Ios,
}

impl ConversionTarget {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Some(ConversionTarget::Web),
            "exe" => Some(ConversionTarget::Exe),
            "apk" => Some(ConversionTarget::Apk),
            "ios" => Some(ConversionTarget::Ios),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConversionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionTarget::Web => write!(f, "web"),
            ConversionTarget::Exe => write!(f, "exe"),
            ConversionTarget::Apk => write!(f, "apk"),
            ConversionTarget::Ios => write!(f, "ios"),
        }
    }
}

/// User-supplied application metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMeta {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl Default for AppMeta {
    fn default() -> Self {
        Self {
            name: "MyApp".to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
        }
    }
}

impl AppMeta {
    /// Build metadata, substituting defaults for blank name and version.
    pub fn new(name: &str, version: &str, description: &str) -> Self {
        let defaults = Self::default();
        Self {
            name: if name.trim().is_empty() { defaults.name } else { name.to_string() },
            version: if version.trim().is_empty() { defaults.version } else { version.to_string() },
            description: description.to_string(),
        }
    }

    /// npm-style package name: lowercase, whitespace runs become `-`.
    pub fn slug(&self) -> String {
        self.name
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Identifier segment used in bundle ids: lowercase, whitespace removed.
    pub fn ident(&self) -> String {
        self.name
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }
}

/// Settings shared by every generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSettings {
    pub author: String,
    pub bundle_prefix: String,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            author: "livepad".to_string(),
            bundle_prefix: "com.livepad".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageEntry {
    File(String),
    Dir,
}

/// A generated bundle of files, keyed by archive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub target: ConversionTarget,
    pub app_name: String,
    pub entries: BTreeMap<String, PackageEntry>,
}

impl Package {
    fn new(target: ConversionTarget, meta: &AppMeta) -> Self {
        Self {
            target,
            app_name: meta.name.clone(),
            entries: BTreeMap::new(),
        }
    }

    fn file(&mut self, path: &str, content: impl Into<String>) {
        self.entries
            .insert(path.to_string(), PackageEntry::File(content.into()));
    }

    fn dir(&mut self, path: &str) {
        self.entries.insert(path.to_string(), PackageEntry::Dir);
    }

    pub fn file_content(&self, path: &str) -> Option<&str> {
        match self.entries.get(path)? {
            PackageEntry::File(content) => Some(content),
            PackageEntry::Dir => None,
        }
    }

    /// Download name, `{app}-{target}.zip`, with the app name reduced to
    /// [`safe_file_name`] characters.
    pub fn archive_name(&self) -> String {
        format!("{}-{}.zip", safe_file_name(&self.app_name), self.target)
    }
}

/// File-name form of a user-supplied name: ASCII alphanumerics, `.`, `_`
/// and `-` are kept, everything else becomes `_`. A name with nothing
/// worth keeping falls back to `MyApp`.
pub fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if cleaned.chars().all(|c| matches!(c, '.' | '_')) {
        AppMeta::default().name
    } else {
        cleaned
    }
}

#[derive(Serialize)]
struct PackageJson<'a> {
    name: String,
    version: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    main: Option<&'a str>,
    author: &'a str,
}

fn package_json(meta: &AppMeta, main: Option<&str>, author: &str) -> Result<String> {
    let json = PackageJson {
        name: meta.slug(),
        version: &meta.version,
        description: &meta.description,
        main,
        author,
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

/// Generate a package for the selected target.
///
/// Fails with [`LivepadError::MissingSelection`] before doing any work when
/// no target was chosen.
pub fn convert(
    selection: Option<ConversionTarget>,
    meta: &AppMeta,
    sources: &Snapshot,
    settings: &PackageSettings,
) -> Result<Package> {
    let target = selection.ok_or(LivepadError::MissingSelection("conversion type"))?;
    let mut pkg = Package::new(target, meta);
    match target {
        ConversionTarget::Web => {
            pkg.file("index.html", sources.html.as_str());
            pkg.file("style.css", sources.css.as_str());
            pkg.file("script.js", sources.js.as_str());
            pkg.file("package.json", package_json(meta, None, &settings.author)?);
        }
        ConversionTarget::Exe => {
            pkg.file("main.py", desktop_wrapper(meta, &settings.author));
            pkg.file(
                "package.json",
                package_json(meta, Some("main.py"), &settings.author)?,
            );
            pkg.file("requirements.txt", "pywebview");
            pkg.file(
                "README.md",
                format!(
                    "# {}\n\n{}\n\nVersion: {}\n\nBuilt with livepad",
                    meta.name, meta.description, meta.version
                ),
            );
        }
        ConversionTarget::Apk => {
            let bundle = format!("{}.{}", settings.bundle_prefix, meta.ident());
            pkg.file("MainActivity.java", android_activity(&bundle));
            pkg.file("AndroidManifest.xml", android_manifest(&bundle, &meta.name));
            pkg.file("build.gradle", android_gradle(&bundle, &meta.version));
            pkg.file("assets/index.html", sources.html.as_str());
            pkg.file("assets/style.css", sources.css.as_str());
            pkg.file("assets/script.js", sources.js.as_str());
        }
        ConversionTarget::Ios => {
            let bundle = format!("{}.{}", settings.bundle_prefix, meta.ident());
            pkg.file("ViewController.swift", IOS_CONTROLLER);
            pkg.file("Info.plist", ios_plist(&bundle, meta));
            pkg.dir("Assets.xcassets");
            pkg.file("index.html", sources.html.as_str());
            pkg.file("style.css", sources.css.as_str());
            pkg.file("script.js", sources.js.as_str());
        }
    }
    Ok(pkg)
}

fn desktop_wrapper(meta: &AppMeta, author: &str) -> String {
    format!(
        r#"#!/usr/bin/env python3
"""
{name} - {description}
Version: {version}
Author: {author}
"""

import webview


def main():
    webview.create_window(
        title='{name}',
        url='index.html',
        width=1200,
        height=800,
        resizable=True,
    )
    webview.start(debug=False)


if __name__ == '__main__':
    main()
"#,
        name = meta.name,
        description = meta.description,
        version = meta.version,
    )
}

fn android_activity(bundle: &str) -> String {
    format!(
        r#"package {bundle};

import android.os.Bundle;
import android.webkit.WebSettings;
import android.webkit.WebView;
import androidx.appcompat.app.AppCompatActivity;

public class MainActivity extends AppCompatActivity {{
    private WebView webView;

    @Override
    protected void onCreate(Bundle savedInstanceState) {{
        super.onCreate(savedInstanceState);
        setContentView(R.layout.activity_main);

        webView = findViewById(R.id.webview);
        WebSettings settings = webView.getSettings();
        settings.setJavaScriptEnabled(true);
        settings.setDomStorageEnabled(true);

        webView.loadUrl("file:///android_asset/index.html");
    }}
}}"#
    )
}

fn android_manifest(bundle: &str, name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="{bundle}">

    <application
        android:allowBackup="true"
        android:icon="@mipmap/ic_launcher"
        android:label="{name}"
        android:theme="@style/AppTheme">

        <activity
            android:name=".MainActivity"
            android:exported="true">
            <intent-filter>
                <action android:name="android.intent.action.MAIN" />
                <category android:name="android.intent.category.LAUNCHER" />
            </intent-filter>
        </activity>
    </application>
</manifest>"#
    )
}

fn android_gradle(bundle: &str, version: &str) -> String {
    format!(
        r#"plugins {{
    id 'com.android.application'
}}

android {{
    compileSdk 33

    defaultConfig {{
        applicationId "{bundle}"
        minSdk 21
        targetSdk 33
        versionCode 1
        versionName "{version}"
    }}
}}

dependencies {{
    implementation 'androidx.appcompat:appcompat:1.6.1'
}}"#
    )
}

const IOS_CONTROLLER: &str = r#"import UIKit
import WebKit

class ViewController: UIViewController, WKNavigationDelegate {

    var webView: WKWebView!

    override func viewDidLoad() {
        super.viewDidLoad()

        let configuration = WKWebViewConfiguration()
        webView = WKWebView(frame: .zero, configuration: configuration)
        webView.navigationDelegate = self
        view = webView

        if let url = Bundle.main.url(forResource: "index", withExtension: "html") {
            webView.load(URLRequest(url: url))
        }
    }
}"#;

fn ios_plist(bundle: &str, meta: &AppMeta) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleDisplayName</key>
    <string>{name}</string>
    <key>CFBundleExecutable</key>
    <string>$(EXECUTABLE_NAME)</string>
    <key>CFBundleIdentifier</key>
    <string>{bundle}</string>
    <key>CFBundleName</key>
    <string>{name}</string>
    <key>CFBundlePackageType</key>
    <string>APPL</string>
    <key>CFBundleShortVersionString</key>
    <string>{version}</string>
    <key>CFBundleVersion</key>
    <string>1</string>
    <key>LSRequiresIPhoneOS</key>
    <true/>
</dict>
</plist>"#,
        name = meta.name,
        version = meta.version,
    )
}

/// Standalone Python script with install hints and imports for each
/// non-blank package line. The import name is the part before any `==`.
pub fn python_script(packages: &str, body: &str) -> String {
    let pkgs: Vec<&str> = packages
        .lines()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let installs = pkgs
        .iter()
        .map(|p| format!("# pip install {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    let imports = pkgs
        .iter()
        .map(|p| format!("import {}", p.split("==").next().unwrap_or(*p)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "#!/usr/bin/env python3\n\"\"\"\nGenerated with livepad\n\"\"\"\n\n# Required packages\n{installs}\n\n# Imports\n{imports}\n\n{body}\n\nif __name__ == '__main__':\n    main()\n"
    )
}
