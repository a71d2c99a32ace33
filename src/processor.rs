use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::serializer::deserialize_as;
use crate::{FetchError, Method, Result, Serializer, SerializerFlags};

/// Import settings forwarded to the texture decoder untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureParams {
    pub readable: bool,
    pub mipmaps: bool,
    pub linear: bool,
}

/// What the caller wants extracted from a response body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Deserialize the body into the requested type.
    #[default]
    Json,
    /// Decode the body as an image (GET only).
    Texture(TextureParams),
    /// Stream the body to disk (GET only).
    File { path: PathBuf, append: bool },
    /// Keep the raw text, skip typed decoding.
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Unknown,
}

impl ImageFormat {
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Self::Png
        } else if bytes.starts_with(&[0xFF, 0xD8]) {
            Self::Jpeg
        } else if bytes.starts_with(b"GIF8") {
            Self::Gif
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Self::Webp
        } else {
            Self::Unknown
        }
    }
}

/// Image payload produced by the texture strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub params: TextureParams,
    pub bytes: Vec<u8>,
}

/// Opaque result of a non-JSON response strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Artifact {
    Image(DecodedImage),
    File {
        path: PathBuf,
        bytes_written: u64,
        appended: bool,
    },
}

/// Turns raw response bytes into a texture or file artifact.
pub trait ArtifactDecoder: Send + Sync {
    fn decode(&self, raw: &[u8], kind: &ArtifactKind) -> Result<Artifact>;
}

/// Header-level image inspection and plain filesystem writes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultArtifactDecoder;

impl ArtifactDecoder for DefaultArtifactDecoder {
    fn decode(&self, raw: &[u8], kind: &ArtifactKind) -> Result<Artifact> {
        match kind {
            ArtifactKind::Texture(params) => decode_image(raw, *params).map(Artifact::Image),
            ArtifactKind::File { path, append } => write_file(raw, path, *append),
            other => Err(FetchError::Artifact(format!(
                "no artifact is produced for {other:?}"
            ))),
        }
    }
}

fn decode_image(raw: &[u8], params: TextureParams) -> Result<DecodedImage> {
    let format = ImageFormat::detect(raw);
    let (width, height) = match format {
        ImageFormat::Png if raw.len() >= 24 => (
            Some(u32::from_be_bytes([raw[16], raw[17], raw[18], raw[19]])),
            Some(u32::from_be_bytes([raw[20], raw[21], raw[22], raw[23]])),
        ),
        ImageFormat::Gif if raw.len() >= 10 => (
            Some(u16::from_le_bytes([raw[6], raw[7]]).into()),
            Some(u16::from_le_bytes([raw[8], raw[9]]).into()),
        ),
        ImageFormat::Unknown => {
            return Err(FetchError::Artifact(
                "response body is not a supported image".to_owned(),
            ))
        }
        _ => (None, None),
    };

    Ok(DecodedImage {
        format,
        width,
        height,
        params,
        bytes: raw.to_vec(),
    })
}

fn write_file(raw: &[u8], path: &Path, append: bool) -> Result<Artifact> {
    let io_error =
        |err: std::io::Error| FetchError::Artifact(format!("cannot write {}: {err}", path.display()));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(io_error)?;
    file.write_all(raw).map_err(io_error)?;

    Ok(Artifact::File {
        path: path.to_path_buf(),
        bytes_written: raw.len() as u64,
        appended: append,
    })
}

/// Typed content and/or artifact extracted from a response body.
#[derive(Debug)]
pub struct Materialized<T> {
    pub content: Option<T>,
    pub artifact: Option<Artifact>,
}

/// Download/decoding strategy chosen per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseProcessor {
    Json { decode: bool },
    Texture(TextureParams),
    File { path: PathBuf, append: bool },
}

impl ResponseProcessor {
    /// Texture and file strategies only apply to GET; everything else is JSON.
    pub fn select(method: Method, kind: &ArtifactKind) -> Self {
        match (method, kind) {
            (Method::Get, ArtifactKind::Texture(params)) => Self::Texture(*params),
            (Method::Get, ArtifactKind::File { path, append }) => Self::File {
                path: path.clone(),
                append: *append,
            },
            (_, ArtifactKind::None) => Self::Json { decode: false },
            _ => Self::Json { decode: true },
        }
    }

    /// Raw text kept for observability. `None` for texture and file strategies.
    pub fn raw_text(&self, raw: &[u8]) -> Option<String> {
        match self {
            Self::Json { .. } => Some(String::from_utf8_lossy(raw).into_owned()),
            _ => None,
        }
    }

    /// Produces the typed value or artifact for a successful response.
    pub fn materialize<T: DeserializeOwned>(
        &self,
        raw: &[u8],
        serializer: &dyn Serializer,
        flags: &SerializerFlags,
        decoder: &dyn ArtifactDecoder,
    ) -> Result<Materialized<T>> {
        match self {
            Self::Json { decode: true } => {
                let text = String::from_utf8_lossy(raw);
                Ok(Materialized {
                    content: Some(deserialize_as(serializer, &text, flags)?),
                    artifact: None,
                })
            }
            Self::Json { decode: false } => Ok(Materialized {
                content: None,
                artifact: None,
            }),
            Self::Texture(params) => Ok(Materialized {
                content: None,
                artifact: Some(decoder.decode(raw, &ArtifactKind::Texture(*params))?),
            }),
            Self::File { path, append } => Ok(Materialized {
                content: None,
                artifact: Some(decoder.decode(
                    raw,
                    &ArtifactKind::File {
                        path: path.clone(),
                        append: *append,
                    },
                )?),
            }),
        }
    }

    /// Best-effort decode for error responses. Never writes artifacts.
    pub fn materialize_lenient<T: DeserializeOwned>(
        &self,
        raw: &[u8],
        serializer: &dyn Serializer,
        flags: &SerializerFlags,
    ) -> Option<T> {
        match self {
            Self::Json { decode: true } => {
                let text: Cow<'_, str> = String::from_utf8_lossy(raw);
                deserialize_as(serializer, &text, flags).ok()
            }
            _ => None,
        }
    }
}
