use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::{FetchError, Result, Value};

/// Caller-set switches forwarded to the serializer on every call.
pub type SerializerFlags = BTreeMap<String, Value>;

/// Flag honoured by [`JsonSerializer`]: pretty-print request bodies.
pub const PRETTY_FLAG: &str = "pretty";

/// Pluggable body serializer.
///
/// The core only exchanges [`Value`] trees with the serializer, so an
/// implementation is free to use any textual wire format.
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &Value, flags: &SerializerFlags) -> Result<String>;

    fn deserialize(&self, raw: &str, flags: &SerializerFlags) -> Result<Value>;
}

/// Default serializer backed by `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value, flags: &SerializerFlags) -> Result<String> {
        let pretty = flags
            .get(PRETTY_FLAG)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let encoded = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        encoded.map_err(|err| FetchError::Serialize(err.to_string()))
    }

    fn deserialize(&self, raw: &str, _flags: &SerializerFlags) -> Result<Value> {
        if raw.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(raw).map_err(|err| {
            FetchError::Decode(format!("invalid JSON payload: {err}"))
        })
    }
}

/// Deserializes raw text into `T` through a pluggable serializer.
pub(crate) fn deserialize_as<T: DeserializeOwned>(
    serializer: &dyn Serializer,
    raw: &str,
    flags: &SerializerFlags,
) -> Result<T> {
    let value = serializer.deserialize(raw, flags)?;
    serde_json::from_value(value).map_err(|err| {
        FetchError::Decode(format!(
            "payload does not match {}: {err}",
            std::any::type_name::<T>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::{deserialize_as, JsonSerializer, Serializer, SerializerFlags, PRETTY_FLAG};
    use crate::FetchError;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    #[test]
    fn pretty_flag_changes_layout() {
        let mut flags = SerializerFlags::new();
        let compact = JsonSerializer
            .serialize(&json!({"a": 1}), &flags)
            .expect("must serialize");
        flags.insert(PRETTY_FLAG.to_owned(), json!(true));
        let pretty = JsonSerializer
            .serialize(&json!({"a": 1}), &flags)
            .expect("must serialize");

        assert_eq!(compact, r#"{"a":1}"#);
        assert!(pretty.contains('\n'));
    }

    #[test]
    fn empty_payload_is_null() {
        let value: serde_json::Value =
            deserialize_as(&JsonSerializer, "  ", &SerializerFlags::new())
                .expect("empty body must decode");
        assert!(value.is_null());
        deserialize_as::<()>(&JsonSerializer, "", &SerializerFlags::new())
            .expect("empty body must decode into unit");
    }

    #[test]
    fn typed_decode_and_mismatch() {
        let user: User = deserialize_as(
            &JsonSerializer,
            r#"{"id":1,"name":"kit"}"#,
            &SerializerFlags::new(),
        )
        .expect("must decode");
        assert_eq!(user, User { id: 1, name: "kit".to_owned() });

        let err = deserialize_as::<User>(&JsonSerializer, r#"{"id":"x"}"#, &SerializerFlags::new())
            .expect_err("must fail");
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
