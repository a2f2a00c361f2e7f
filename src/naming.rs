//! Deterministic table identifiers derived from a topic.
//!
//! A topic `sensors/livingroom` owns one durable summary table named by its
//! basename (`topic_sensorslivingroom`) and one detail table per session,
//! `topic_sensorslivingroom_20220314180000`.
//!
//! Basenames are lossy: topics that differ only in `:` or `/` share a
//! basename (`a:b` and `ab` both map to `topic_ab`) and therefore share tables.

use chrono::NaiveDateTime;

use crate::error::TopicError;

/// Literal prefix of every engine-owned table.
pub const TABLE_PREFIX: &str = "topic_";

/// Session timestamp format, second precision.
pub const SESSION_TS_FORMAT: &str = "%Y%m%d%H%M%S";

/// Longest identifier the server keeps without truncation (NAMEDATALEN - 1).
pub const MAX_IDENT_LEN: usize = 63;

const SESSION_TS_LEN: usize = 14;

// ---

/// Summary table name (and detail table prefix) for a topic.
pub fn basename(topic: &str) -> String {
    // ---
    format!("{TABLE_PREFIX}{}", topic.replace([':', '/'], ""))
}

/// Detail table name for a session of the topic owning `basename`.
pub fn session_table_name(basename: &str, started_at: NaiveDateTime) -> String {
    // ---
    format!("{basename}_{}", started_at.format(SESSION_TS_FORMAT))
}

/// Recover the session timestamp from a detail table name.
///
/// Only `basename_` followed by exactly fourteen digits forming a valid
/// timestamp is accepted, which keeps other topics' tables out of discovery.
pub fn parse_session_table(basename: &str, table_name: &str) -> Option<NaiveDateTime> {
    // ---
    let suffix = table_name.strip_prefix(basename)?.strip_prefix('_')?;
    if suffix.len() != SESSION_TS_LEN || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(suffix, SESSION_TS_FORMAT).ok()
}

/// `LIKE` pattern matching every detail table candidate of `basename`.
///
/// Uses the default backslash escape so `_` in the basename is literal.
pub fn like_pattern(basename: &str) -> String {
    // ---
    let mut pattern = String::with_capacity(basename.len() + 4);
    for c in basename.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push_str("\\_%");
    pattern
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    // ---
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ---

/// Identifier of a topic's detail table for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTableId {
    // ---
    basename: String,
    started_at: NaiveDateTime,
}

impl SessionTableId {
    // ---
    /// Build the identifier, rejecting names the server would truncate.
    pub fn new(topic: &str, started_at: NaiveDateTime) -> Result<Self, TopicError> {
        // ---
        let basename = basename(topic);
        let name = session_table_name(&basename, started_at);
        if name.len() > MAX_IDENT_LEN {
            return Err(TopicError::NameTooLong {
                topic: topic.to_string(),
                name,
                max: MAX_IDENT_LEN,
            });
        }
        Ok(Self {
            basename,
            started_at,
        })
    }

    /// Summary table name shared by every session of the topic.
    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn started_at(&self) -> NaiveDateTime {
        self.started_at
    }

    /// Detail table name for this session.
    pub fn table_name(&self) -> String {
        session_table_name(&self.basename, self.started_at)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_basename_strips_separators() {
        // ---
        assert_eq!(basename("sensors/livingroom"), "topic_sensorslivingroom");
        assert_eq!(
            basename("myqttsense/24:0a:c4:00:01:10"),
            "topic_myqttsense240ac4000110"
        );
    }

    #[test]
    fn test_basename_collision_is_known() {
        // ---
        assert_eq!(basename("a:b"), basename("ab"));
        assert_eq!(basename("a/b"), basename("ab"));
    }

    #[test]
    fn test_session_table_name() {
        // ---
        let id = SessionTableId::new("sensors/livingroom", at(18, 0, 0)).unwrap();
        assert_eq!(id.basename(), "topic_sensorslivingroom");
        assert_eq!(id.table_name(), "topic_sensorslivingroom_20220314180000");
        assert_eq!(id.started_at(), at(18, 0, 0));
    }

    #[test]
    fn test_session_name_drops_subseconds() {
        // ---
        let ts = at(18, 0, 0) + chrono::Duration::milliseconds(750);
        assert_eq!(
            session_table_name("topic_x", ts),
            "topic_x_20220314180000"
        );
    }

    #[test]
    fn test_parse_session_table() {
        // ---
        let base = "topic_ab";
        assert_eq!(
            parse_session_table(base, "topic_ab_20220314180000"),
            Some(at(18, 0, 0))
        );

        // The summary table itself
        assert_eq!(parse_session_table(base, "topic_ab"), None);
        // A longer topic sharing the prefix
        assert_eq!(parse_session_table(base, "topic_abc_20220314180000"), None);
        assert_eq!(parse_session_table(base, "topic_ab_c_20220314180000"), None);
        // Wrong length or not a date
        assert_eq!(parse_session_table(base, "topic_ab_2022031418000"), None);
        assert_eq!(parse_session_table(base, "topic_ab_20221314180000"), None);
        assert_eq!(parse_session_table(base, "topic_ab_merge"), None);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        // ---
        assert_eq!(like_pattern("topic_a%b"), "topic\\_a\\%b\\_%");
    }

    #[test]
    fn test_quote_ident() {
        // ---
        assert_eq!(quote_ident("topic_ab"), "\"topic_ab\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_overlong_topic_rejected() {
        // ---
        let topic = "x".repeat(MAX_IDENT_LEN);
        let err = SessionTableId::new(&topic, at(0, 0, 0)).unwrap_err();
        assert!(matches!(err, TopicError::NameTooLong { max: 63, .. }));

        // prefix (6) + topic + '_' + 14 digits == 63
        let topic = "x".repeat(MAX_IDENT_LEN - TABLE_PREFIX.len() - 15);
        assert!(SessionTableId::new(&topic, at(0, 0, 0)).is_ok());
    }
}
