//! Centralized filename parsing for the `YYYY-MM-DD-slug` convention.
//!
//! Every entry source (manifest `filepath`, markdown file, `.page` directory)
//! carries its date and slug in its basename:
//!
//! ```text
//! 2023-05-01-my-talk.md        → date 2023-05-01, slug "my-talk"
//! 2021-11-30_workshop.html     → date 2021-11-30, slug "workshop"
//! 2020-02-14-launch.page/      → date 2020-02-14, slug "launch"
//! ```
//!
//! The grammar is `YYYY-MM-DD<sep><slug>[.<ext>]` with `<sep>` one of `-`/`_`.
//! Parsing is explicit: a name that does not follow it yields a [`NameError`]
//! naming the violated rule, never a panic on short input.

use chrono::NaiveDate;
use thiserror::Error;

/// Length of the `YYYY-MM-DD` prefix in bytes.
const DATE_LEN: usize = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("'{0}' is too short to start with a YYYY-MM-DD date")]
    TooShort(String),
    #[error("'{0}' is not a valid YYYY-MM-DD date")]
    InvalidDate(String),
    #[error("'{0}' has no '-' or '_' between the date and the slug")]
    MissingSeparator(String),
    #[error("'{0}' has an empty slug")]
    EmptySlug(String),
    #[error("slug '{0}' may only contain ASCII letters, digits, '-' and '_'")]
    InvalidSlug(String),
}

/// Result of parsing a dated name like `2023-05-01-my-talk.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedName {
    pub date: NaiveDate,
    /// Name part after the date with the extension stripped.
    pub slug: String,
}

/// Parse a basename following the `YYYY-MM-DD-slug.ext` convention.
///
/// - `"2023-05-01-my-talk.md"` → 2023-05-01, `"my-talk"`
/// - `"2023-05-01_my-talk"` → 2023-05-01, `"my-talk"`
/// - `"2020-02-14-launch.page"` → 2020-02-14, `"launch"`
/// - `"bad-date-a.md"` → [`NameError::InvalidDate`]
/// - `"2023-05-01.md"` → [`NameError::MissingSeparator`]
pub fn parse_dated_name(name: &str) -> Result<DatedName, NameError> {
    if name.len() < DATE_LEN {
        return Err(NameError::TooShort(name.to_string()));
    }
    let prefix = name
        .get(..DATE_LEN)
        .ok_or_else(|| NameError::InvalidDate(name.to_string()))?;
    let date = parse_date(prefix)?;

    let rest = name[DATE_LEN..]
        .strip_prefix(['-', '_'])
        .ok_or_else(|| NameError::MissingSeparator(name.to_string()))?;

    let slug = strip_extension(rest);
    if slug.is_empty() {
        return Err(NameError::EmptySlug(name.to_string()));
    }
    validate_slug(slug)?;

    Ok(DatedName {
        date,
        slug: slug.to_string(),
    })
}

/// Parse a bare `YYYY-MM-DD` date.
///
/// Stricter than a format-string parse: exactly ten characters, zero-padded
/// fields, and a real calendar day.
pub fn parse_date(text: &str) -> Result<NaiveDate, NameError> {
    let invalid = || NameError::InvalidDate(text.to_string());
    let bytes = text.as_bytes();
    if bytes.len() != DATE_LEN || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(invalid());
    }
    let field = |range: std::ops::Range<usize>| -> Result<u32, NameError> {
        let part = &text[range];
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        part.parse().map_err(|_| invalid())
    };
    let year = field(0..4)?;
    let month = field(5..7)?;
    let day = field(8..10)?;
    NaiveDate::from_ymd_opt(year as i32, month, day).ok_or_else(invalid)
}

/// Check that a slug is safe to use as a URL path segment and file stem.
pub fn validate_slug(slug: &str) -> Result<(), NameError> {
    let safe = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        Ok(())
    } else {
        Err(NameError::InvalidSlug(slug.to_string()))
    }
}

/// Display title for a slug: dashes become spaces.
///
/// - `"my-talk"` → `"my talk"`
pub fn display_title(slug: &str) -> String {
    slug.replace('-', " ")
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}
