//! Parsing submitter identity out of submission file names.
//!
//! Submissions are named `hw<NNN>_<submitter>.<ext>`, for example
//! `hw001_jk369.rhai`. The submitter id runs from the first `_` up to the
//! first `.`, so ids themselves may contain further underscores but no dots.
//! Ids never contain `,` or whitespace, since they key rows of the score
//! table.

use std::path::Path;

/// Byte range of the three lab digits inside a file name.
const LAB_DIGITS: std::ops::Range<usize> = 2..5;

/// Who submitted a file, and for which lab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Lab number, or `None` when the digits could not be parsed.
    pub lab_number:   Option<u32>,
    /// Submitter id.
    pub submitter_id: String,
}

/// A file name that cannot be attributed to a submitter.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No `_` separating the lab prefix from the submitter id.
    #[error("`{0}` has no `_` separating the lab number from the submitter id")]
    MissingSeparator(String),
    /// No `.` after the submitter id.
    #[error("`{0}` has no file extension after the submitter id")]
    MissingExtension(String),
    /// Nothing between the `_` and the `.`.
    #[error("`{0}` has an empty submitter id")]
    EmptySubmitter(String),
    /// The submitter id contains a `,` or whitespace.
    #[error("`{0}` has a `,` or whitespace in its submitter id")]
    InvalidSubmitter(String),
    /// The path does not end in a valid UTF-8 file name.
    #[error("`{0}` is not a readable file name")]
    Unreadable(String),
}

/// Resolves a bare file name into an [`Identity`].
pub fn resolve(file_name: &str) -> Result<Identity, IdentityError> {
    let start = file_name
        .find('_')
        .ok_or_else(|| IdentityError::MissingSeparator(file_name.to_string()))?
        + 1;
    let end = file_name
        .find('.')
        .filter(|&end| end >= start)
        .ok_or_else(|| IdentityError::MissingExtension(file_name.to_string()))?;

    let submitter_id = &file_name[start..end];
    if submitter_id.is_empty() {
        return Err(IdentityError::EmptySubmitter(file_name.to_string()));
    }
    if submitter_id.contains(|c: char| c == ',' || c.is_whitespace()) {
        return Err(IdentityError::InvalidSubmitter(file_name.to_string()));
    }

    Ok(Identity {
        lab_number:   lab_number(file_name),
        submitter_id: submitter_id.to_string(),
    })
}

/// Resolves the file name component of `path`.
pub fn resolve_path(path: &Path) -> Result<Identity, IdentityError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IdentityError::Unreadable(path.display().to_string()))?;
    resolve(file_name)
}

/// Reads the lab digits at their fixed offset.
fn lab_number(file_name: &str) -> Option<u32> {
    file_name
        .get(LAB_DIGITS)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
}
