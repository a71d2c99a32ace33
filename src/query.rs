//! URL assembly: segment joining, placeholder filling and form-style
//! encoding of query strings and `application/x-www-form-urlencoded` bodies.

use url::form_urlencoded::byte_serialize;

use crate::{FetchError, Result, Value};

/// Joins URL segments with single slashes, trimming slashes around each one.
///
/// Empty segments are skipped, so `combine_url(["https://a.test/", "", "/users/"])`
/// is `https://a.test/users`.
pub fn combine_url<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .map(|segment| segment.as_ref().trim_matches('/').to_owned())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn escape(raw: &str) -> String {
    byte_serialize(raw.as_bytes()).collect()
}

/// Renders a scalar value the way it appears in a URL, without quotes for strings.
pub fn value_to_param_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Encodes name/value pairs as `a=1&b=2`.
///
/// Objects are flattened with dotted keys (`filter.name=kit`), arrays repeat
/// their key once per element. Arrays may only hold scalars.
pub fn encode_pairs<'a, I>(pairs: I) -> Result<String>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut encoded = Vec::new();
    for (name, value) in pairs {
        push_pair(&mut encoded, &escape(name), value)?;
    }
    Ok(encoded.join("&"))
}

fn push_pair(encoded: &mut Vec<String>, key: &str, value: &Value) -> Result<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                if item.is_array() || item.is_object() {
                    return Err(FetchError::Argument(format!(
                        "array parameter `{key}` may only contain scalar values"
                    )));
                }
                push_pair(encoded, key, item)?;
            }
        }
        Value::Object(fields) => {
            for (field, nested) in fields {
                push_pair(encoded, &format!("{key}.{}", escape(field)), nested)?;
            }
        }
        scalar => encoded.push(format!("{key}={}", escape(&value_to_param_string(scalar)))),
    }
    Ok(())
}

/// Builds the final request URL.
///
/// `{placeholder}`s left in `path` are filled positionally from
/// `route_parameters`; remaining route values are appended as path segments.
pub fn build_url(
    base_url: &str,
    path: &str,
    route_parameters: &[String],
    query_parameters: &[(String, Value)],
) -> Result<String> {
    let mut remaining = route_parameters.iter();
    let mut filled = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            return Err(FetchError::Configuration(format!(
                "unterminated placeholder in route `{path}`"
            )));
        };
        let placeholder = &rest[open + 1..open + close];
        let Some(value) = remaining.next() else {
            return Err(FetchError::Configuration(format!(
                "no route value left for `{{{placeholder}}}` in `{path}`"
            )));
        };
        filled.push_str(&rest[..open]);
        filled.push_str(value);
        rest = &rest[open + close + 1..];
    }
    filled.push_str(rest);

    let mut segments = vec![base_url, filled.as_str()];
    segments.extend(remaining.map(String::as_str));
    let mut url = combine_url(segments);

    if !query_parameters.is_empty() {
        let query = encode_pairs(
            query_parameters
                .iter()
                .map(|(name, value)| (name.as_str(), value)),
        )?;
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{build_url, combine_url, encode_pairs};
    use crate::FetchError;

    fn pairs(value: &Value) -> Vec<(&str, &Value)> {
        value
            .as_object()
            .expect("object")
            .iter()
            .map(|(key, value)| (key.as_str(), value))
            .collect()
    }

    #[test]
    fn combine_trims_and_skips_empty_segments() {
        assert_eq!(
            combine_url(["https://api.test/", "", "/v1/", "users"]),
            "https://api.test/v1/users"
        );
        assert_eq!(combine_url(["/only/"]), "only");
    }

    #[test]
    fn encodes_scalars_arrays_and_nested_objects() {
        let params = json!({
            "q": "a b&c",
            "ids": [1, 2],
            "filter": { "name": "kit", "active": true },
            "empty": null
        });
        let encoded = encode_pairs(pairs(&params)).expect("must encode");

        assert!(encoded.contains("q=a+b%26c"));
        assert!(encoded.contains("ids=1&ids=2"));
        assert!(encoded.contains("filter.name=kit"));
        assert!(encoded.contains("filter.active=true"));
        assert!(encoded.contains("empty="));
    }

    #[test]
    fn nested_arrays_are_rejected() {
        let params = json!({ "matrix": [[1, 2]] });
        let err = encode_pairs(pairs(&params)).expect_err("must reject");
        assert!(matches!(err, FetchError::Argument(_)));
    }

    #[test]
    fn placeholders_are_filled_before_segments_are_appended() {
        let url = build_url(
            "https://api.test/",
            "/users/{id}/posts",
            &["7".to_owned(), "latest".to_owned()],
            &[("page".to_owned(), json!(2))],
        )
        .expect("must build");
        assert_eq!(url, "https://api.test/users/7/posts/latest?page=2");
    }

    #[test]
    fn existing_query_string_is_extended() {
        let url = build_url("https://api.test", "search?sort=asc", &[], &[("q".to_owned(), json!("x"))])
            .expect("must build");
        assert_eq!(url, "https://api.test/search?sort=asc&q=x");
    }

    #[test]
    fn missing_route_value_is_a_configuration_error() {
        let err = build_url("https://api.test", "users/{id}", &[], &[]).expect_err("must fail");
        assert!(matches!(err, FetchError::Configuration(_)));
    }
}
