use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::{Response, ResponseSource};

/// A stored response together with the key it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub meta: EntryMeta,
    pub body: Bytes,
}

/// Everything about an entry except its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn from_response(key: &str, response: &Response, stored_at: DateTime<Utc>) -> Self {
        Self {
            meta: EntryMeta {
                key: key.to_string(),
                status: response.status,
                headers: response.headers.clone(),
                stored_at,
            },
            // Bytes clones share the buffer
            body: response.body.clone(),
        }
    }

    pub fn to_response(&self) -> Response {
        Response {
            status: self.meta.status,
            headers: self.meta.headers.clone(),
            body: self.body.clone(),
            source: ResponseSource::Cache,
        }
    }

    pub fn key(&self) -> &str {
        &self.meta.key
    }

    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.meta.stored_at
    }

    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.meta.stored_at).num_minutes()
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        format_age(self.age_minutes(now))
    }
}

/// Human-readable age, rounding to the nearest larger unit.
pub fn format_age(minutes: i64) -> String {
    match minutes {
        // Negative ages come from clock skew
        i64::MIN..=0 => "just now".to_string(),
        1..=59 => format!("{}m ago", minutes),
        60..=1439 => {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        }
        _ => {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn test_entry_round_trips_response_fields() {
        let response = Response::new(200, "In the beginning...").with_header("content-type", "text/plain");
        let entry = CacheEntry::from_response("https://x/a.txt", &response, at(0));
        assert_eq!(entry.size(), 19);

        let served = entry.to_response();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.body, response.body);
        assert_eq!(served.content_type(), Some("text/plain"));
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(-5), "just now");
        assert_eq!(format_age(0), "just now");
        assert_eq!(format_age(5), "5m ago");
        assert_eq!(format_age(89), "1h ago");
        assert_eq!(format_age(90), "2h ago");
        assert_eq!(format_age(1440 * 2 + 60 * 11), "2d ago");
        assert_eq!(format_age(1440 * 2 + 60 * 12), "3d ago");
    }

    #[test]
    fn test_age_display_uses_given_now() {
        let entry = CacheEntry::from_response("k", &Response::new(200, "x"), at(0));
        assert_eq!(entry.age_display(at(0)), "just now");
        assert_eq!(entry.age_display(at(45)), "45m ago");
    }
}
