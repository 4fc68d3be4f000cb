//! Incremental jar updates
//!
//! A jardiff is a jar holding the entries that are new or changed in the
//! target version plus an index at `META-INF/INDEX.JD`:
//!
//! ```text
//! version 1.0
//! remove com/example/Gone.class
//! move com/example/Old\ Name.class com/example/NewName.class
//! ```
//!
//! Merging against the cached jar of the current version yields the target
//! jar. Entries are copied raw, without recompressing.

use std::collections::HashSet;
use std::io::{Read, Seek, Write};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use zip::result::ZipError;
use zip::{ZipArchive, ZipWriter};

use crate::error::FetchError;

pub const INDEX_FILE: &str = "META-INF/INDEX.JD";

const VERSION_LINE: &str = "version 1.0";
const REMOVE_KEYWORD: &str = "remove";
const MOVE_KEYWORD: &str = "move";

/// `<old> <new>`, where the separating space is the first one not escaped
static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*?[^\\])\s(.*)$").unwrap());

#[derive(Debug, Default, PartialEq)]
struct DiffIndex {
    removed: HashSet<String>,
    moved: Vec<(String, String)>,
}

fn unescape(name: &str) -> String {
    name.replace("\\ ", " ")
}

fn parse_index(content: &str) -> Result<DiffIndex, FetchError> {
    let mut lines = content.lines();
    if lines.next().map(str::trim_end) != Some(VERSION_LINE) {
        return Err(FetchError::JarDiff(format!(
            "index is not based on jardiff {}",
            VERSION_LINE
        )));
    }

    let mut index = DiffIndex::default();
    for line in lines.map(str::trim) {
        if let Some(rest) = line.strip_prefix(REMOVE_KEYWORD) {
            index.removed.insert(unescape(rest.trim()));
        } else if let Some(rest) = line.strip_prefix(MOVE_KEYWORD) {
            let rest = rest.trim();
            let captures = MOVE_RE
                .captures(rest)
                .ok_or_else(|| FetchError::JarDiff(format!("invalid move definition '{}'", rest)))?;
            index
                .moved
                .push((unescape(&captures[1]), unescape(&captures[2])));
        }
    }

    Ok(index)
}

fn read_index<R: Read + Seek>(diff: &mut ZipArchive<R>) -> Result<DiffIndex, FetchError> {
    let mut content = String::new();
    match diff.by_name(INDEX_FILE) {
        Ok(mut file) => {
            file.read_to_string(&mut content)?;
        }
        Err(ZipError::FileNotFound) => {
            return Err(FetchError::JarDiff(format!("missing {}", INDEX_FILE)));
        }
        Err(e) => return Err(e.into()),
    }
    parse_index(&content)
}

/// Applies `diff` to `old_jar` and writes the resulting jar to `output`.
///
/// The result holds the new entries of the diff, the moved entries of the
/// old jar under their new names, and every old entry that is neither
/// replaced, removed nor moved.
pub fn merge<O, D, W>(old_jar: O, diff: D, output: W) -> Result<W, FetchError>
where
    O: Read + Seek,
    D: Read + Seek,
    W: Write + Seek,
{
    let mut old = ZipArchive::new(old_jar)?;
    let mut diff = ZipArchive::new(diff)?;
    let index = read_index(&mut diff)?;

    let new_names: Vec<String> = diff
        .file_names()
        .filter(|name| *name != INDEX_FILE)
        .map(str::to_owned)
        .collect();
    let old_names: Vec<String> = old.file_names().map(str::to_owned).collect();

    let mut writer = ZipWriter::new(output);

    for name in &new_names {
        debug!("jardiff: adding new entry {}", name);
        writer.raw_copy_file(diff.by_name(name)?)?;
    }

    for (from, to) in &index.moved {
        debug!("jardiff: moving {} to {}", from, to);
        let file = old.by_name(from).map_err(|e| match e {
            ZipError::FileNotFound => FetchError::JarDiff(format!(
                "moved entry '{}' can not be found in original jar",
                from
            )),
            other => other.into(),
        })?;
        writer.raw_copy_file_rename(file, to)?;
    }

    let unmodified = old_names.iter().filter(|name| {
        !new_names.contains(name)
            && !index.removed.contains(*name)
            && !index.moved.iter().any(|(from, _)| from == *name)
    });
    for name in unmodified {
        writer.raw_copy_file(old.by_name(name)?)?;
    }

    Ok(writer.finish()?)
}
