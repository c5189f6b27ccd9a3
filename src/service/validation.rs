//! Input validation and timestamp helpers shared by the services.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

use crate::config::canonicalize_project_id;
use crate::error::{MemoryError, Result};

/// Prefix every global fact key must carry.
pub const GLOBAL_KEY_PREFIX: &str = "global.";

/// Group key that collides with the global-fact key space.
pub const RESERVED_GROUP_KEY: &str = "global";

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn require_project_id(project_id: &str) -> Result<()> {
    if project_id.is_empty() {
        return Err(MemoryError::ProjectIdRequired);
    }
    Ok(())
}

/// Resolve a project id to its canonical absolute path.
pub fn canonical_project(project_id: &str) -> Result<String> {
    require_project_id(project_id)?;
    canonicalize_project_id(project_id).map_err(|e| MemoryError::InvalidProjectId {
        project_id: project_id.to_string(),
        reason: e.to_string(),
    })
}

pub fn validate_group_id(group_id: &str) -> Result<()> {
    if group_id.is_empty() {
        return Err(MemoryError::GroupIdRequired);
    }
    if !is_identifier(group_id) {
        return Err(MemoryError::InvalidGroupId(group_id.to_string()));
    }
    Ok(())
}

pub fn validate_group_key(group_key: &str) -> Result<()> {
    if group_key.is_empty() {
        return Err(MemoryError::GroupKeyRequired);
    }
    if group_key == RESERVED_GROUP_KEY {
        return Err(MemoryError::InvalidGroupKey {
            key: group_key.to_string(),
            reason: format!("{RESERVED_GROUP_KEY:?} is reserved"),
        });
    }
    if !is_identifier(group_key) {
        return Err(MemoryError::InvalidGroupKey {
            key: group_key.to_string(),
            reason: "allowed characters are A-Z a-z 0-9 _ -".into(),
        });
    }
    Ok(())
}

/// Global keys look like `global.<suffix>`, suffix in `[A-Za-z0-9._-]+`.
pub fn validate_global_key(key: &str) -> Result<()> {
    let invalid = |reason: &str| MemoryError::InvalidGlobalKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    let Some(suffix) = key.strip_prefix(GLOBAL_KEY_PREFIX) else {
        return Err(invalid("must start with \"global.\""));
    };
    if suffix.is_empty() {
        return Err(invalid("missing name after \"global.\""));
    }
    if !suffix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(invalid("allowed characters are A-Z a-z 0-9 . _ -"));
    }
    Ok(())
}

/// Parse an optional RFC3339 field, naming the field on failure.
pub fn parse_rfc3339(field: &'static str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match value {
        None | Some("") => Ok(None),
        Some(v) => DateTime::parse_from_rfc3339(v)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| MemoryError::InvalidTimeFormat {
                field,
                value: v.to_string(),
            }),
    }
}

/// Current UTC time at whole-second precision, rounded up.
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(now: DateTime<Utc>) -> String {
    let rounded = match now.with_nanosecond(0) {
        Some(floor) if floor != now => floor + chrono::Duration::seconds(1),
        Some(floor) => floor,
        None => now,
    };
    rounded.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn group_id_charset() {
        assert!(validate_group_id("inbox_1-a").is_ok());
        assert!(matches!(validate_group_id(""), Err(MemoryError::GroupIdRequired)));
        for bad in ["a b", "a/b", "ü", "a.b"] {
            assert!(matches!(validate_group_id(bad), Err(MemoryError::InvalidGroupId(_))), "{bad}");
        }
    }

    #[test]
    fn group_key_reserves_global() {
        assert!(validate_group_key("sprint-1").is_ok());
        assert!(matches!(validate_group_key("global"), Err(MemoryError::InvalidGroupKey { .. })));
        assert!(validate_group_key("Global").is_ok());
        assert!(matches!(validate_group_key(""), Err(MemoryError::GroupKeyRequired)));
    }

    #[test]
    fn global_key_format() {
        assert!(validate_global_key("global.build.cmd").is_ok());
        assert!(validate_global_key("global.a_b-c").is_ok());
        for bad in ["build.cmd", "global.", "global", "global.a b", "Global.x"] {
            assert!(validate_global_key(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn rfc3339_parsing_names_the_field() {
        assert!(parse_rfc3339("since", None).unwrap().is_none());
        assert!(parse_rfc3339("since", Some("2024-01-01T00:00:00+02:00")).unwrap().is_some());
        let err = parse_rfc3339("until", Some("yesterday")).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidTimeFormat { field: "until", .. }));
    }

    #[test]
    fn timestamps_round_up_to_whole_seconds() {
        let exact = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(exact), "2024-05-01T12:00:00Z");

        let fractional = exact + chrono::Duration::milliseconds(1);
        assert_eq!(format_timestamp(fractional), "2024-05-01T12:00:01Z");
    }

    #[test]
    fn project_id_is_canonicalized() {
        let tmp = tempfile::TempDir::new().unwrap();
        let canonical = canonical_project(&tmp.path().to_string_lossy()).unwrap();
        assert!(std::path::Path::new(&canonical).is_absolute());
        assert!(matches!(canonical_project(""), Err(MemoryError::ProjectIdRequired)));
    }
}
