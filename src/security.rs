#![forbid(unsafe_code)]

//! Guards shared by the server binary and the file endpoints: the root check
//! and the file-name checks for the flat download directory.

use anyhow::{Result, bail};
use nix::unistd::Uid;
use thiserror::Error;

/// Raised when a client-supplied file name could escape the download
/// directory or is otherwise unusable as a single flat entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid file name: {0:?}")]
pub struct UnsafeFileName(pub String);

/// Fails fast when the server is started as root. The extractor writes
/// wherever its output template points, so it should never run privileged.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Accepts only names that address a single entry directly under the
/// download directory.
///
/// Anything containing a parent-directory sequence is refused, whether it is
/// spelled with literal dots or percent-encoded (`%2e`, any casing). Path
/// separators and NUL bytes are refused as well since the directory is flat.
pub fn ensure_safe_file_name(name: &str) -> Result<(), UnsafeFileName> {
    let reject = || Err(UnsafeFileName(name.to_string()));

    if name.trim().is_empty() || name.contains(['/', '\\', '\0']) {
        return reject();
    }

    let lowered = name.to_ascii_lowercase();
    if lowered.contains("%2f") || lowered.contains("%5c") || lowered.contains("%00") {
        return reject();
    }
    if lowered.replace("%2e", ".").contains("..") {
        return reject();
    }
    if name == "." {
        return reject();
    }

    Ok(())
}

/// Makes an extractor-chosen file name servable: titles are free text, so
/// separators are replaced and dot runs collapsed until the name passes
/// [`ensure_safe_file_name`].
pub fn sanitize_file_name(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '/' | '\\' | '\0' => cleaned.push('_'),
            '.' if cleaned.ends_with('.') => {}
            other => cleaned.push(other),
        }
    }

    let mut cleaned = cleaned.trim().to_string();
    // Encoded dots would otherwise be rejected when the file is served.
    while ensure_safe_file_name(&cleaned).is_err() && !cleaned.is_empty() {
        let lowered = cleaned.to_ascii_lowercase();
        let Some(index) = ["%2e", "%2f", "%5c", "%00"]
            .iter()
            .filter_map(|needle| lowered.find(needle))
            .min()
        else {
            break;
        };
        cleaned.replace_range(index..index + 1, "_");
    }

    if ensure_safe_file_name(&cleaned).is_err() {
        return "download".to_string();
    }
    cleaned
}
