//! Artifact archive handling
//!
//! Artifacts travel as zip archives with a `metadata.toml` at the root.
//! Directories from git checkouts and local paths are packaged on the fly
//! so every source hands the installer the same shape of bytes.

use crate::error::{SkillsyncError, SkillsyncResult};
use crate::lock::ArtifactType;
use serde::Deserialize;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Manifest file every artifact archive must carry
pub const METADATA_FILE: &str = "metadata.toml";

/// Parsed `metadata.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactMetadata {
    pub artifact: MetadataSection,
}

/// `[artifact]` section of `metadata.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataSection {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
}

fn zip_err(e: zip::result::ZipError) -> SkillsyncError {
    SkillsyncError::Archive(e.to_string())
}

fn open(data: &[u8]) -> SkillsyncResult<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(data)).map_err(zip_err)
}

fn write_zip<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> SkillsyncResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data) in entries {
        writer.start_file(name, options).map_err(zip_err)?;
        writer
            .write_all(data)
            .map_err(|e| SkillsyncError::io(format!("writing archive entry {}", name), e))?;
    }

    let cursor = writer.finish().map_err(zip_err)?;
    Ok(cursor.into_inner())
}

/// Build an archive from in-memory files
pub fn pack_files(entries: &[(&str, &[u8])]) -> SkillsyncResult<Vec<u8>> {
    write_zip(entries.iter().copied())
}

/// Package a directory tree into an archive.
///
/// Entries are sorted by path so the same tree always yields the same
/// entry order. `.git` directories are skipped.
pub fn package_dir(dir: &Path) -> SkillsyncResult<Vec<u8>> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| {
            SkillsyncError::Archive(format!("walking {}: {}", dir.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| SkillsyncError::Internal(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data = fs::read(entry.path()).map_err(|e| {
            SkillsyncError::io(format!("reading {}", entry.path().display()), e)
        })?;
        files.push((name, data));
    }

    write_zip(files.iter().map(|(n, d)| (n.as_str(), d.as_slice())))
}

/// Names of all entries in an archive
pub fn list_entries(data: &[u8]) -> SkillsyncResult<Vec<String>> {
    let archive = open(data)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Read a single entry by name
pub fn read_entry(data: &[u8], name: &str) -> SkillsyncResult<Vec<u8>> {
    let mut archive = open(data)?;
    let mut file = archive
        .by_name(name)
        .map_err(|_| SkillsyncError::Archive(format!("{} not found in archive", name)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| SkillsyncError::io(format!("reading archive entry {}", name), e))?;
    Ok(buf)
}

/// Parse the archive's `metadata.toml`
pub fn read_metadata(data: &[u8]) -> SkillsyncResult<ArtifactMetadata> {
    let raw = read_entry(data, METADATA_FILE)?;
    let text = String::from_utf8(raw)
        .map_err(|_| SkillsyncError::Archive(format!("{} is not UTF-8", METADATA_FILE)))?;
    toml::from_str(&text)
        .map_err(|e| SkillsyncError::Archive(format!("invalid {}: {}", METADATA_FILE, e)))
}

/// Extract an archive into `dest`, rejecting entries that escape it
pub fn extract(data: &[u8], dest: &Path) -> SkillsyncResult<()> {
    let mut archive = open(data)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(zip_err)?;
        let target = file
            .enclosed_name()
            .map(|p| dest.join(p))
            .ok_or_else(|| {
                SkillsyncError::Archive(format!("entry '{}' escapes the archive root", file.name()))
            })?;

        if file.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| SkillsyncError::io(format!("creating {}", target.display()), e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SkillsyncError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut out = fs::File::create(&target)
            .map_err(|e| SkillsyncError::io(format!("creating {}", target.display()), e))?;
        std::io::copy(&mut file, &mut out)
            .map_err(|e| SkillsyncError::io(format!("writing {}", target.display()), e))?;
    }

    Ok(())
}
