//! Conversion between [`Uuid`] and the vendor's brace-delimited UUID text.

use uuid::Uuid;

use crate::error::{PrlError, Result};

/// `{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}`, lower-case.
pub fn format_braced(uuid: &Uuid) -> String {
    format!("{{{}}}", uuid.hyphenated())
}

/// Parse the vendor's braced form. Hex digits may be in either case.
pub fn parse_braced(text: &str) -> Result<Uuid> {
    let malformed = || PrlError::InvalidData(format!("UUID in config file malformed: '{}'", text));

    let inner = text
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(malformed)?;

    // Only the hyphenated layout is accepted inside the braces.
    if inner.len() != 36 {
        return Err(malformed());
    }
    Uuid::try_parse(inner).map_err(|_| malformed())
}
