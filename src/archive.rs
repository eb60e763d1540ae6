//! Zip packaging for generated packages and whole projects.
//!
//! Entries are written uncompressed with a fixed timestamp so the same
//! package always produces the same bytes.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::buffer::{Snapshot, SourceKind};
use crate::convert::{Package, PackageEntry};
use crate::error::{LivepadError, Result};

pub const PROJECT_ARCHIVE_NAME: &str = "project.zip";

/// Largest decompressed source file accepted from an imported archive.
pub const MAX_ENTRY_BYTES: u64 = 4 * 1024 * 1024;

const PROJECT_README: &str = "# Project\n\nBuilt with livepad\n";

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default())
}

/// Serialize a generated package into zip bytes.
pub fn write_package(pkg: &Package) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, entry) in &pkg.entries {
        match entry {
            PackageEntry::File(content) => {
                zip.start_file(path.as_str(), options())?;
                zip.write_all(content.as_bytes())?;
            }
            PackageEntry::Dir => {
                zip.add_directory(path.as_str(), options())?;
            }
        }
    }
    Ok(zip.finish()?.into_inner())
}

/// The plain project download: the three sources plus a README.
pub fn project_archive(sources: &Snapshot) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for kind in SourceKind::ALL {
        zip.start_file(kind.default_file_name(), options())?;
        zip.write_all(sources.get(kind).as_bytes())?;
    }
    zip.start_file("README.md", options())?;
    zip.write_all(PROJECT_README.as_bytes())?;
    Ok(zip.finish()?.into_inner())
}

/// Read `index.html`, `style.css` and `script.js` out of a project archive.
///
/// Files are matched by base name at any depth; the first hit for each kind
/// wins. Missing kinds come back empty. An archive with none of them is
/// rejected as an unsupported import, and so is any matched entry larger
/// than [`MAX_ENTRY_BYTES`] once decompressed.
pub fn read_project(bytes: &[u8]) -> Result<Snapshot> {
    read_project_limited(bytes, MAX_ENTRY_BYTES)
}

fn read_project_limited(bytes: &[u8], limit: u64) -> Result<Snapshot> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut found: [Option<String>; 3] = [None, None, None];

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let base = file
            .name()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let Some(slot) = SourceKind::ALL
            .iter()
            .position(|kind| kind.default_file_name() == base)
        else {
            continue;
        };
        if found[slot].is_some() {
            continue;
        }
        let too_large = || LivepadError::EntryTooLarge { name: base.clone(), limit };
        // The declared size can lie, so the read is capped as well.
        if file.size() > limit {
            return Err(too_large());
        }
        let mut text = String::new();
        (&mut file).take(limit + 1).read_to_string(&mut text)?;
        if text.len() as u64 > limit {
            return Err(too_large());
        }
        found[slot] = Some(text);
    }

    if found.iter().all(Option::is_none) {
        return Err(LivepadError::UnsupportedImportFormat(
            "archive has no index.html, style.css or script.js".to_string(),
        ));
    }
    let [html, css, js] = found;
    Ok(Snapshot {
        html: html.unwrap_or_default(),
        css: css.unwrap_or_default(),
        js: js.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{convert, AppMeta, ConversionTarget, PackageSettings};

    fn names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn test_project_archive_contents() {
        let bytes = project_archive(&Snapshot::new("<p></p>", "p{}", "x()")).unwrap();
        let mut listed = names(&bytes);
        listed.sort();
        assert_eq!(listed, ["README.md", "index.html", "script.js", "style.css"]);
    }

    #[test]
    fn test_project_archive_reads_back() {
        let snap = Snapshot::new("<p></p>", "p{}", "x()");
        let bytes = project_archive(&snap).unwrap();
        assert_eq!(read_project(&bytes).unwrap(), snap);
    }

    #[test]
    fn test_write_package_is_byte_stable() {
        let pkg = convert(
            Some(ConversionTarget::Ios),
            &AppMeta::default(),
            &Snapshot::new("h", "c", "j"),
            &PackageSettings::default(),
        )
        .unwrap();
        assert_eq!(write_package(&pkg).unwrap(), write_package(&pkg).unwrap());
    }

    #[test]
    fn test_write_package_keeps_directories() {
        let pkg = convert(
            Some(ConversionTarget::Ios),
            &AppMeta::default(),
            &Snapshot::default(),
            &PackageSettings::default(),
        )
        .unwrap();
        let listed = names(&write_package(&pkg).unwrap());
        assert!(listed.iter().any(|n| n.starts_with("Assets.xcassets")));
    }

    #[test]
    fn test_read_project_nested_and_partial() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("site/src/style.css", options()).unwrap();
        zip.write_all(b"a{}").unwrap();
        zip.start_file("site/notes.txt", options()).unwrap();
        zip.write_all(b"ignore").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let snap = read_project(&bytes).unwrap();
        assert_eq!(snap, Snapshot::new("", "a{}", ""));
    }

    #[test]
    fn test_read_project_without_sources_is_rejected() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("readme.txt", options()).unwrap();
        zip.write_all(b"hi").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(
            read_project(&bytes),
            Err(LivepadError::UnsupportedImportFormat(_))
        ));
    }

    #[test]
    fn test_read_project_rejects_oversized_entry() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("index.html", options()).unwrap();
        zip.write_all(&[b'a'; 100]).unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let err = read_project_limited(&bytes, 10).unwrap_err();
        assert!(matches!(err, LivepadError::EntryTooLarge { ref name, limit: 10 } if name == "index.html"));
        assert!(err.is_recoverable());
        assert_eq!(read_project_limited(&bytes, 100).unwrap().html.len(), 100);
    }

    #[test]
    fn test_read_project_garbage_is_archive_error() {
        assert!(matches!(read_project(b"not a zip"), Err(LivepadError::Archive(_))));
    }
}
