//! Deterministic cache keys derived from request inputs.
//!
//! key = md5(identity | category-or-"any" | time bucket | canonical inputs)

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::prompt::Category;

/// Everything a cached result depends on.
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    pub namespace: &'a str,
    pub identity: &'a str,
    pub category: Option<Category>,
    pub preferences: &'a Value,
    pub exclusions: &'a [Uuid],
}

/// Index of the fixed-width window `now` falls in.
pub fn time_bucket(now: DateTime<Utc>, window: Duration) -> i64 {
    let width = window.as_secs().max(1) as i64;
    now.timestamp().div_euclid(width)
}

pub fn fingerprint(input: &FingerprintInput<'_>, now: DateTime<Utc>, window: Duration) -> String {
    let mut exclusions: Vec<String> = input.exclusions.iter().map(Uuid::to_string).collect();
    exclusions.sort();
    exclusions.dedup();

    let mut canonical = String::new();
    write_canonical(input.preferences, &mut canonical);

    let material = format!(
        "{}|{}|{}|{}|{}",
        input.identity,
        input.category.map_or("any", |c| c.as_str()),
        time_bucket(now, window),
        canonical,
        exclusions.join(",")
    );

    format!("{}:{:x}", input.namespace, md5::compute(material.as_bytes()))
}

/// Serializes JSON with object keys sorted at every depth.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const WINDOW: Duration = Duration::from_secs(300);

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn input<'a>(prefs: &'a Value, exclusions: &'a [Uuid]) -> FingerprintInput<'a> {
        FingerprintInput {
            namespace: "personalized",
            identity: "user-1",
            category: Some(Category::Family),
            preferences: prefs,
            exclusions,
        }
    }

    #[test]
    fn test_key_ignores_object_key_order() {
        let a = json!({"interests": ["sailing"], "tone": "warm"});
        let b = json!({"tone": "warm", "interests": ["sailing"]});
        assert_eq!(
            fingerprint(&input(&a, &[]), at(1_000), WINDOW),
            fingerprint(&input(&b, &[]), at(1_000), WINDOW)
        );
    }

    #[test]
    fn test_key_ignores_exclusion_order() {
        let prefs = json!({});
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            fingerprint(&input(&prefs, &[x, y]), at(0), WINDOW),
            fingerprint(&input(&prefs, &[y, x]), at(0), WINDOW)
        );
    }

    #[test]
    fn test_key_stable_within_bucket_and_changes_across() {
        let prefs = json!({});
        let first = fingerprint(&input(&prefs, &[]), at(600), WINDOW);
        assert_eq!(first, fingerprint(&input(&prefs, &[]), at(899), WINDOW));
        assert_ne!(first, fingerprint(&input(&prefs, &[]), at(900), WINDOW));
    }

    #[test]
    fn test_category_and_identity_are_part_of_key() {
        let prefs = json!({});
        let base = input(&prefs, &[]);
        let mut other_category = base.clone();
        other_category.category = None;
        let mut other_identity = base.clone();
        other_identity.identity = "user-2";

        let key = fingerprint(&base, at(0), WINDOW);
        assert_ne!(key, fingerprint(&other_category, at(0), WINDOW));
        assert_ne!(key, fingerprint(&other_identity, at(0), WINDOW));
        assert!(key.starts_with("personalized:"));
    }
}
