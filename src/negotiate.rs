use std::fs;

use crate::mime::{self, essence};
use crate::options::CONTENT_TYPE;
use crate::query::encode_pairs;
use crate::{Body, FetchError, RequestOptions, Result, Serializer, SerializerFlags, Value};

/// How a request body is turned into bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodingStrategy {
    Json,
    Multipart,
    ImageUpload,
    FormUrlEncoded,
    TextPlain,
    GraphQl,
    Xml,
    RawUpload,
}

impl EncodingStrategy {
    /// Exact content types are matched before the `image/` prefix; anything
    /// unknown is uploaded raw.
    pub fn for_content_type(content_type: &str) -> Self {
        let mime = essence(content_type).to_ascii_lowercase();
        match mime.as_str() {
            mime::APPLICATION_JSON => Self::Json,
            mime::MULTIPART_FORM_DATA => Self::Multipart,
            mime::FORM_URLENCODED => Self::FormUrlEncoded,
            mime::TEXT_PLAIN => Self::TextPlain,
            mime::APPLICATION_GRAPHQL => Self::GraphQl,
            mime::APPLICATION_XML => Self::Xml,
            other if other.starts_with("image/") => Self::ImageUpload,
            _ => Self::RawUpload,
        }
    }

    /// Encodes `body` for the wire.
    ///
    /// A body whose shape does not fit the strategy is an
    /// [`FetchError::Argument`].
    pub fn encode(
        self,
        body: &Body,
        content_type: &str,
        serializer: &dyn Serializer,
        flags: &SerializerFlags,
    ) -> Result<EncodedBody> {
        let mut content_type = content_type.to_owned();
        let bytes = match (self, body) {
            (Self::Json, Body::Value(value)) => serializer.serialize(value, flags)?.into_bytes(),
            (Self::Json, Body::Text(text)) => text.clone().into_bytes(),
            (Self::Json, Body::Bytes(bytes)) => bytes.clone(),

            (Self::Multipart, Body::Multipart(form)) => {
                content_type = form.content_type();
                form.encode()
            }
            (Self::Multipart, Body::Bytes(bytes)) => bytes.clone(),

            (Self::ImageUpload | Self::RawUpload, Body::Bytes(bytes)) => bytes.clone(),
            (Self::ImageUpload | Self::RawUpload, Body::Text(text)) => text.clone().into_bytes(),
            (Self::ImageUpload | Self::RawUpload, Body::File(path)) => fs::read(path).map_err(|err| {
                FetchError::Argument(format!("cannot read upload file {}: {err}", path.display()))
            })?,

            (Self::FormUrlEncoded, Body::Value(Value::Object(fields))) => {
                encode_pairs(fields.iter().map(|(name, value)| (name.as_str(), value)))?.into_bytes()
            }
            (Self::FormUrlEncoded, Body::Text(text)) => text.clone().into_bytes(),

            (Self::TextPlain, Body::Text(text)) => text.clone().into_bytes(),
            (Self::TextPlain, Body::Value(Value::String(text))) => text.clone().into_bytes(),
            (Self::TextPlain, Body::Value(value)) => value.to_string().into_bytes(),
            (Self::TextPlain, Body::Bytes(bytes)) => {
                String::from_utf8_lossy(bytes).into_owned().into_bytes()
            }

            (Self::GraphQl, Body::Text(text)) => text.clone().into_bytes(),
            (Self::GraphQl, Body::Value(Value::String(text))) => text.clone().into_bytes(),

            (Self::Xml, Body::Text(text)) => text.clone().into_bytes(),
            (Self::Xml, Body::Value(value)) => value.to_string().into_bytes(),
            (Self::Xml, Body::Bytes(bytes)) => bytes.clone(),

            (strategy, body) => {
                return Err(FetchError::Argument(format!(
                    "{} body cannot be sent as {content_type} ({strategy:?})",
                    body_kind(body)
                )))
            }
        };

        Ok(EncodedBody {
            content_type,
            bytes,
        })
    }
}

fn body_kind(body: &Body) -> &'static str {
    match body {
        Body::Text(_) => "text",
        Body::Bytes(_) => "binary",
        Body::Value(_) => "structured",
        Body::Multipart(_) => "multipart",
        Body::File(_) => "file",
    }
}

/// Wire-ready request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedBody {
    /// Final content type; multipart bodies carry their boundary here.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl EncodedBody {
    /// Wire bytes as shown to observers: text formats verbatim, binary ones as a size.
    pub fn describe(&self) -> String {
        match EncodingStrategy::for_content_type(&self.content_type) {
            EncodingStrategy::Json
            | EncodingStrategy::FormUrlEncoded
            | EncodingStrategy::TextPlain
            | EncodingStrategy::GraphQl
            | EncodingStrategy::Xml => String::from_utf8_lossy(&self.bytes).into_owned(),
            EncodingStrategy::Multipart
            | EncodingStrategy::ImageUpload
            | EncodingStrategy::RawUpload => format!("<{} bytes>", self.bytes.len()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Negotiated {
    pub content_type: String,
    pub strategy: EncodingStrategy,
}

/// Picks the content type and encoding strategy for a body.
///
/// Precedence: explicit content type, then the file name extension (a file
/// body's own path counts), then the shape of the body.
pub fn negotiate(body: &Body, file_name: Option<&str>, explicit: Option<&str>) -> Negotiated {
    let content_type = explicit
        .filter(|value| !value.trim().is_empty())
        .map(str::to_owned)
        .or_else(|| file_name.and_then(mime::mime_for_file_name).map(str::to_owned))
        .or_else(|| {
            body.file_path()
                .and_then(|path| path.to_str())
                .and_then(mime::mime_for_file_name)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| infer_from_body(body).to_owned());

    Negotiated {
        strategy: EncodingStrategy::for_content_type(&content_type),
        content_type,
    }
}

fn infer_from_body(body: &Body) -> &'static str {
    match body {
        Body::Text(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                mime::APPLICATION_JSON
            } else {
                mime::TEXT_PLAIN
            }
        }
        Body::Value(_) => mime::APPLICATION_JSON,
        Body::Multipart(_) => mime::MULTIPART_FORM_DATA,
        Body::Bytes(bytes) => mime::sniff_bytes(bytes),
        Body::File(_) => mime::APPLICATION_OCTET_STREAM,
    }
}

/// Negotiates and encodes `body` against a per-attempt snapshot, writing the
/// final content type back into its headers.
pub(crate) fn negotiate_options(
    options: &mut RequestOptions,
    body: &Body,
    file_name: Option<&str>,
) -> Result<EncodedBody> {
    let explicit = options.content_type();
    let negotiated = negotiate(body, file_name, explicit.as_deref());
    let encoded = negotiated.strategy.encode(
        body,
        &negotiated.content_type,
        options.serializer.as_ref(),
        &options.flags,
    )?;
    options.set_header(CONTENT_TYPE, encoded.content_type.clone());
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{negotiate, negotiate_options, EncodingStrategy};
    use crate::{Body, FetchError, JsonSerializer, MultipartForm, RequestOptions, SerializerFlags};

    #[test]
    fn explicit_content_type_wins() {
        let negotiated = negotiate(&Body::text("{}"), Some("a.png"), Some("application/xml"));
        assert_eq!(negotiated.content_type, "application/xml");
        assert_eq!(negotiated.strategy, EncodingStrategy::Xml);
    }

    #[test]
    fn file_name_beats_body_inference() {
        let negotiated = negotiate(&Body::bytes(b"%PDF-1.4".to_vec()), Some("photo.JPG"), None);
        assert_eq!(negotiated.content_type, "image/jpeg");
        assert_eq!(negotiated.strategy, EncodingStrategy::ImageUpload);

        let negotiated = negotiate(&Body::file("docs/report.pdf"), None, None);
        assert_eq!(negotiated.content_type, "application/pdf");
        assert_eq!(negotiated.strategy, EncodingStrategy::RawUpload);
    }

    #[test]
    fn body_shape_inference() {
        let cases = [
            (Body::text("  [1, 2]"), "application/json"),
            (Body::text("hello"), "text/plain"),
            (Body::Value(json!({"a": 1})), "application/json"),
            (Body::Multipart(MultipartForm::new()), "multipart/form-data"),
            (Body::bytes(vec![0x89, 0x50, 0x4E, 0x47]), "image/png"),
            (Body::bytes(vec![0xFF, 0xD8, 0xFF]), "image/jpeg"),
            (Body::bytes(b"%PDF-1.7".to_vec()), "application/pdf"),
            (Body::bytes(vec![1, 2, 3]), "application/octet-stream"),
        ];
        for (body, expected) in cases {
            assert_eq!(negotiate(&body, None, None).content_type, expected, "{body:?}");
        }
    }

    #[test]
    fn exact_matches_precede_prefix_matches() {
        assert_eq!(
            EncodingStrategy::for_content_type("application/json; charset=utf-8"),
            EncodingStrategy::Json
        );
        assert_eq!(
            EncodingStrategy::for_content_type("image/svg+xml"),
            EncodingStrategy::ImageUpload
        );
        assert_eq!(
            EncodingStrategy::for_content_type("application/zip"),
            EncodingStrategy::RawUpload
        );
    }

    #[test]
    fn graphql_requires_string_body() {
        let err = EncodingStrategy::GraphQl
            .encode(
                &Body::Value(json!({"query": "{ me }"})),
                "application/graphql",
                &JsonSerializer,
                &SerializerFlags::new(),
            )
            .expect_err("must reject non-string body");
        assert!(matches!(err, FetchError::Argument(_)));

        let encoded = EncodingStrategy::GraphQl
            .encode(
                &Body::text("{ me { id } }"),
                "application/graphql",
                &JsonSerializer,
                &SerializerFlags::new(),
            )
            .expect("must accept text");
        assert_eq!(encoded.bytes, b"{ me { id } }");
    }

    #[test]
    fn raw_upload_rejects_structured_body() {
        let err = EncodingStrategy::RawUpload
            .encode(
                &Body::Value(json!([1])),
                "application/zip",
                &JsonSerializer,
                &SerializerFlags::new(),
            )
            .expect_err("must reject");
        assert!(matches!(err, FetchError::Argument(_)));
    }

    #[test]
    fn form_body_is_flattened() {
        let body = Body::form([("name", json!("kit cat")), ("tags", json!(["a", "b"]))]);
        let encoded = EncodingStrategy::FormUrlEncoded
            .encode(
                &body,
                "application/x-www-form-urlencoded",
                &JsonSerializer,
                &SerializerFlags::new(),
            )
            .expect("must encode");
        assert_eq!(encoded.bytes, b"name=kit+cat&tags=a&tags=b");
        assert_eq!(encoded.describe(), "name=kit+cat&tags=a&tags=b");
    }

    #[test]
    fn binary_bodies_are_described_by_size() {
        let encoded = negotiate_options(
            &mut RequestOptions::new(),
            &Body::bytes(vec![0x89, 0x50, 0x4E, 0x47, 0x00]),
            None,
        )
        .expect("must encode");
        assert_eq!(encoded.describe(), "<5 bytes>");

        let encoded = negotiate_options(
            &mut RequestOptions::new(),
            &Body::Value(json!({"a": 1})),
            None,
        )
        .expect("must encode");
        assert_eq!(encoded.describe(), r#"{"a":1}"#);
    }

    #[test]
    fn negotiated_type_is_written_back_into_snapshot() {
        let mut options = RequestOptions::new();
        let form = MultipartForm::new().text("field", "value");
        let boundary = form.boundary().to_owned();

        let encoded = negotiate_options(&mut options, &Body::Multipart(form), None)
            .expect("must encode");
        let header = options.content_type().expect("content type must be set");
        assert_eq!(header, format!("multipart/form-data; boundary={boundary}"));
        assert_eq!(encoded.content_type, header);
    }
}
