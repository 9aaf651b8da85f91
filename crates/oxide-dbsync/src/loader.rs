//! Grain file loading.
//!
//! A score directory holds one `<grain>.json` file per grain. Larger grains
//! may be split into `<grain>.<part>.json` files whose elements are appended
//! to the main file's. All files of a grain are read through one chained
//! checksum, main file first and parts in name order, so the fingerprint
//! covers the grain's whole source.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use oxide_score::checksum::{ChecksumReader, Fingerprint};
use oxide_score::raw::{RawElement, RawGrain};
use serde::Deserialize;
use tracing::debug;

use crate::error::{DbSyncError, Result};

const EXTENSION: &str = "json";

/// Additional elements of a grain stored in a part file.
#[derive(Debug, Deserialize)]
struct GrainPart {
    #[serde(default)]
    elements: Vec<RawElement>,
}

#[derive(Default)]
struct GrainFiles {
    main: Option<PathBuf>,
    parts: Vec<PathBuf>,
}

/// Loads every grain declared in `dir`, ordered by grain name.
pub fn load_score_dir(dir: &Path) -> Result<Vec<RawGrain>> {
    if !dir.is_dir() {
        return Err(DbSyncError::ScoreDirNotFound(dir.to_path_buf()));
    }

    let mut files: BTreeMap<String, GrainFiles> = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        match stem.split_once('.') {
            Some((grain, _)) => files.entry(grain.to_string()).or_default().parts.push(path),
            None => files.entry(stem).or_default().main = Some(path),
        }
    }

    let mut grains = Vec::with_capacity(files.len());
    for (name, mut group) in files {
        group.parts.sort();
        let Some(main) = group.main else {
            return Err(DbSyncError::ParseError {
                path: group.parts.swap_remove(0),
                message: format!("Part file without main grain file '{name}.{EXTENSION}'"),
            });
        };
        grains.push(load_grain(&name, &main, &group.parts)?);
    }
    Ok(grains)
}

/// Loads one grain from its main file and part files.
pub fn load_grain(name: &str, main: &Path, parts: &[PathBuf]) -> Result<RawGrain> {
    let (text, mut fingerprint) = read_chained(main, None)?;
    let mut grain: RawGrain = parse(main, &text)?;
    if grain.name != name {
        return Err(DbSyncError::ParseError {
            path: main.to_path_buf(),
            message: format!(
                "File declares grain '{}', expected '{name}' from the file name",
                grain.name
            ),
        });
    }

    for part in parts {
        let (text, next) = read_chained(part, Some(fingerprint))?;
        let extra: GrainPart = parse(part, &text)?;
        grain.elements.extend(extra.elements);
        fingerprint = next;
    }

    debug!(grain = %name, files = parts.len() + 1, fingerprint = %fingerprint, "Loaded grain");
    Ok(grain.with_fingerprint(fingerprint))
}

fn read_chained(path: &Path, previous: Option<Fingerprint>) -> Result<(String, Fingerprint)> {
    let file = File::open(path)?;
    let mut reader = match previous {
        Some(previous) => ChecksumReader::chained(file, previous),
        None => ChecksumReader::new(file),
    };
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok((text, reader.finish()?))
}

fn parse<T: for<'de> Deserialize<'de>>(path: &Path, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| DbSyncError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
