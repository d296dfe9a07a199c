//! Schema versioning and migrate-on-load.
//!
//! Every persisted record is wrapped in an envelope carrying the schema
//! version it was written with. When a record older than the current version
//! is loaded, the ordered chain of pure migrations for its kind is applied
//! one step at a time until it reaches the current shape.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// A single schema step: `from_version` → `from_version + 1`.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version this step upgrades from
    pub from_version: u32,
    /// Human-readable description
    pub description: &'static str,
    /// Pure transformation of the record payload
    pub apply: fn(Value) -> std::result::Result<Value, String>,
}

/// A record type the store knows how to persist and evolve.
pub trait Versioned: Serialize + DeserializeOwned {
    /// Stable name written into the envelope
    const KIND: &'static str;

    /// Version written by this build
    const SCHEMA_VERSION: u32 = 1;

    /// Upgrade steps, one per historical version
    fn migrations() -> &'static [Migration] {
        &[]
    }
}

/// Bring `payload` from `from_version` up to `T::SCHEMA_VERSION`.
///
/// Returns the payload unchanged when it is already current.
///
/// # Errors
///
/// Returns a description of the failure when a step is missing, a step
/// fails, or the payload is newer than this build understands.
pub fn upgrade<T: Versioned>(from_version: u32, payload: Value) -> std::result::Result<Value, String> {
    if from_version > T::SCHEMA_VERSION {
        return Err(format!(
            "{} record has schema version {from_version}, newer than supported {}",
            T::KIND,
            T::SCHEMA_VERSION
        ));
    }

    let mut version = from_version;
    let mut payload = payload;
    while version < T::SCHEMA_VERSION {
        let step = T::migrations()
            .iter()
            .find(|m| m.from_version == version)
            .ok_or_else(|| format!("no {} migration from schema version {version}", T::KIND))?;

        tracing::debug!(
            kind = T::KIND,
            from = version,
            to = version + 1,
            step = step.description,
            "Applying migration"
        );
        payload = (step.apply)(payload)
            .map_err(|e| format!("{} migration from v{version} failed: {e}", T::KIND))?;
        version += 1;
    }

    Ok(payload)
}

/// Get a mutable JSON object or fail with a migration message.
pub(crate) fn as_object(
    value: &mut Value,
) -> std::result::Result<&mut serde_json::Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "record payload is not an object".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        name: String,
        size: u32,
        color: String,
    }

    fn add_size(mut v: Value) -> std::result::Result<Value, String> {
        as_object(&mut v)?.insert("size".into(), json!(1));
        Ok(v)
    }

    fn add_color(mut v: Value) -> std::result::Result<Value, String> {
        as_object(&mut v)?.insert("color".into(), json!("red"));
        Ok(v)
    }

    const WIDGET_MIGRATIONS: &[Migration] = &[
        Migration {
            from_version: 1,
            description: "introduce size",
            apply: add_size,
        },
        Migration {
            from_version: 2,
            description: "introduce color",
            apply: add_color,
        },
    ];

    impl Versioned for Widget {
        const KIND: &'static str = "widget";
        const SCHEMA_VERSION: u32 = 3;

        fn migrations() -> &'static [Migration] {
            WIDGET_MIGRATIONS
        }
    }

    #[test]
    fn test_upgrade_applies_chain_in_order() {
        let v = upgrade::<Widget>(1, json!({"name": "w"})).unwrap();
        let widget: Widget = serde_json::from_value(v).unwrap();
        assert_eq!(
            widget,
            Widget {
                name: "w".into(),
                size: 1,
                color: "red".into()
            }
        );
    }

    #[test]
    fn test_upgrade_current_is_identity() {
        let payload = json!({"name": "w", "size": 4, "color": "blue"});
        assert_eq!(upgrade::<Widget>(3, payload.clone()).unwrap(), payload);
    }

    #[test]
    fn test_upgrade_rejects_future_versions() {
        assert!(upgrade::<Widget>(9, json!({})).is_err());
    }

    #[test]
    fn test_upgrade_reports_missing_step() {
        assert!(upgrade::<Widget>(0, json!({})).is_err());
    }

    #[test]
    fn test_failing_step_surfaces_error() {
        let err = upgrade::<Widget>(1, json!([1, 2])).unwrap_err();
        assert!(err.contains("not an object"));
    }
}
