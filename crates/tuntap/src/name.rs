//! Interface naming conventions.

#[cfg(any(target_os = "linux", target_os = "macos", test))]
use crate::error::{Error, Result};

/// Maximum interface name length (including null terminator).
pub const IFNAMSIZ: usize = 16;

/// Validate a name against the generic kernel rules.
#[cfg(any(target_os = "linux", target_os = "macos", test))]
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_name(name, "empty name"));
    }

    if name.len() >= IFNAMSIZ {
        return Err(Error::NameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }

    if name.contains('/') || name.contains('\0') {
        return Err(Error::invalid_name(name, "name contains invalid characters"));
    }

    if name.chars().any(|c| c.is_whitespace()) {
        return Err(Error::invalid_name(name, "name contains whitespace"));
    }

    Ok(())
}

/// Parse `<prefix><unit>` and return the unit number.
///
/// The unit is decimal and must fit below `u32::MAX`; `u32::MAX` itself is
/// reserved because some drivers encode "any unit" as `unit + 1`.
#[cfg(any(target_os = "macos", test))]
pub fn parse_unit(name: &str, prefix: &str) -> Result<u32> {
    let invalid = || Error::invalid_name(name, format!("interface name must be {prefix}[0-9]+"));

    let digits = name.strip_prefix(prefix).ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    match digits.parse::<u32>() {
        Ok(unit) if unit < u32::MAX => Ok(unit),
        _ => Err(invalid()),
    }
}

/// Like [`parse_unit`], but an absent name is accepted and yields `None`.
#[cfg(any(target_os = "macos", test))]
pub fn parse_optional_unit(name: Option<&str>, prefix: &str) -> Result<Option<u32>> {
    match name {
        None => Ok(None),
        Some(name) if name.is_empty() => Ok(None),
        Some(name) => parse_unit(name, prefix).map(Some),
    }
}

/// Find the lowest `<prefix>N` not present in `existing`.
#[cfg(any(target_os = "macos", test))]
pub fn lowest_free<'a>(prefix: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let mut used: Vec<u32> = existing
        .into_iter()
        .filter_map(|name| parse_unit(name, prefix).ok())
        .collect();
    used.sort_unstable();
    used.dedup();

    let mut unit = 0;
    for taken in used {
        if taken != unit {
            break;
        }
        unit += 1;
    }
    format!("{prefix}{unit}")
}
