use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::{Call, Engine};
use crate::transport::{ReqwestTransport, Transport};
use crate::{
    AbortController, Artifact, Body, DecodedImage, FetchError, Method, Observer,
    RequestOptions, Response, Result, TextureParams, Value,
};

pub const ENV_BASE_URL: &str = "FETCHKIT_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "FETCHKIT_TIMEOUT_MS";
pub const ENV_RETRY_COUNT: &str = "FETCHKIT_RETRY_COUNT";
pub const ENV_RETRY_DELAY_MS: &str = "FETCHKIT_RETRY_DELAY_MS";

/// Declarative HTTP client.
///
/// Holds the long-lived [`RequestOptions`]; every call works on its own
/// clone, optionally adjusted by a per-call `configure` callback.
#[derive(Clone)]
pub struct FetchClient {
    options: RequestOptions,
    engine: Engine,
}

impl fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchClient")
            .field("options", &self.options)
            .field("observers", &self.engine.observers.len())
            .finish()
    }
}

impl Default for FetchClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchClient {
    /// Creates a client with default options over a fresh `reqwest` client.
    pub fn new() -> Self {
        Self::with_options(RequestOptions::new())
    }

    pub fn with_options(options: RequestOptions) -> Self {
        #[allow(unused_mut)]
        let mut observers: Vec<Arc<dyn Observer>> = Vec::new();
        #[cfg(feature = "tracing")]
        observers.push(Arc::new(crate::TracingObserver));

        Self {
            options,
            engine: Engine {
                transport: Arc::new(ReqwestTransport::new()),
                observers,
            },
        }
    }

    /// Creates a client whose options are set up by `configure`.
    pub fn configure<F>(configure: F) -> Self
    where
        F: FnOnce(&mut RequestOptions),
    {
        let mut options = RequestOptions::new();
        configure(&mut options);
        Self::with_options(options)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::configure(|options| {
            options.set_base_url(base_url);
        })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `FETCHKIT_BASE_URL`: base URL of every request (required)
    /// - `FETCHKIT_TIMEOUT_MS`: per-attempt timeout
    /// - `FETCHKIT_RETRY_COUNT`: retries after the first attempt
    /// - `FETCHKIT_RETRY_DELAY_MS`: pause between attempts
    ///
    /// # Example
    ///
    /// ```no_run
    /// use fetchkit_http::FetchClient;
    ///
    /// let client = FetchClient::from_env().expect("missing FETCHKIT_BASE_URL");
    /// ```
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_BASE_URL).map_err(|_| {
            FetchError::Configuration(format!("missing {ENV_BASE_URL} environment variable"))
        })?;
        if base_url.trim().is_empty() {
            return Err(FetchError::Configuration(format!(
                "{ENV_BASE_URL} is set but empty"
            )));
        }

        let mut options = RequestOptions::new();
        options.set_base_url(base_url.trim());
        if let Some(timeout) = env_number::<u64>(ENV_TIMEOUT_MS)? {
            options.set_timeout(Duration::from_millis(timeout));
        }
        if let Some(retry_count) = env_number::<i32>(ENV_RETRY_COUNT)? {
            options.set_retry_count(retry_count);
        }
        if let Some(delay) = env_number::<u64>(ENV_RETRY_DELAY_MS)? {
            options.set_retry_delay(Duration::from_millis(delay));
        }
        Ok(Self::with_options(options))
    }

    /// Replaces the transport, e.g. with a stub in tests.
    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.engine.transport = Arc::new(transport);
        self
    }

    /// Adds a lifecycle observer.
    pub fn with_observer<O: Observer + 'static>(mut self, observer: O) -> Self {
        self.engine.observers.push(Arc::new(observer));
        self
    }

    /// Removes every observer, the default tracing one included.
    pub fn without_observers(mut self) -> Self {
        self.engine.observers.clear();
        self
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Long-lived options. Changes apply to calls started afterwards.
    pub fn options_mut(&mut self) -> &mut RequestOptions {
        &mut self.options
    }

    pub fn set_abort_controller(&mut self, controller: AbortController) -> &mut Self {
        self.options.set_abort_controller(controller);
        self
    }

    /// Sends a request built from the client options.
    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Body>) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.request_with(method, path, body, |_| {}).await
    }

    /// Sends a request, running `configure` on the options snapshot of every attempt.
    pub async fn request_with<T, F>(
        &self,
        method: Method,
        path: &str,
        body: Option<Body>,
        configure: F,
    ) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(&mut RequestOptions) + Send + Sync,
    {
        let file_name = body
            .as_ref()
            .and_then(Body::file_path)
            .and_then(|path| path.file_name())
            .and_then(|name| name.to_str())
            .map(str::to_owned);
        let call = Call::new(method, path)
            .body(body.as_ref())
            .file_name(file_name.as_deref());
        self.engine.execute(&self.options, call, configure).await
    }

    pub async fn get<T>(&self, path: &str) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.request(Method::Get, path, None).await
    }

    pub async fn get_with<T, F>(&self, path: &str, configure: F) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(&mut RequestOptions) + Send + Sync,
    {
        self.request_with(Method::Get, path, None, configure).await
    }

    /// GET with every field of `parameters` added to the query string.
    pub async fn get_with_query<T, P>(&self, path: &str, parameters: &P) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
        P: Serialize + ?Sized,
    {
        let mut collected = RequestOptions::new();
        collected.add_parameters(parameters)?;
        let pairs = collected.query_parameters;

        self.request_with(Method::Get, path, None, move |options| {
            for (name, value) in &pairs {
                options.add_query_parameter(name.clone(), value.clone());
            }
        })
        .await
    }

    /// Downloads an image. The decoded image is the response content.
    pub async fn get_texture(&self, path: &str, params: TextureParams) -> Result<Response<DecodedImage>> {
        let response: Response<()> = self
            .get_with(path, move |options| {
                options.use_texture(params);
            })
            .await?;
        let image = match response.artifact() {
            Some(Artifact::Image(image)) => Some(image.clone()),
            _ => None,
        };
        Ok(response.with_content(image))
    }

    /// Streams the response body into `save_path`, appending or overwriting.
    pub async fn get_file(
        &self,
        path: &str,
        save_path: impl Into<PathBuf>,
        append: bool,
    ) -> Result<Response<()>> {
        let save_path = save_path.into();
        self.get_with(path, move |options| {
            options.use_file(save_path.clone(), append);
        })
        .await
    }

    pub async fn post<T>(&self, path: &str, body: impl Into<Body>) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.request(Method::Post, path, Some(body.into())).await
    }

    pub async fn put<T>(&self, path: &str, body: impl Into<Body>) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.request(Method::Put, path, Some(body.into())).await
    }

    pub async fn patch<T>(&self, path: &str, body: impl Into<Body>) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.request(Method::Patch, path, Some(body.into())).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response<Value>> {
        self.request(Method::Delete, path, None).await
    }

    pub async fn head(&self, path: &str) -> Result<Response<Value>> {
        self.request(Method::Head, path, None).await
    }

    /// Sends an `OPTIONS` request.
    pub async fn options_request(&self, path: &str) -> Result<Response<Value>> {
        self.request(Method::Options, path, None).await
    }

    /// POSTs raw bytes with an explicit MIME type.
    pub async fn upload_file(
        &self,
        path: &str,
        bytes: impl Into<Vec<u8>>,
        mime_type: &str,
    ) -> Result<Response<Value>> {
        let mime_type = mime_type.to_owned();
        self.request_with(Method::Post, path, Some(Body::Bytes(bytes.into())), move |options| {
            options.set_content_type(mime_type.clone());
        })
        .await
    }

    pub async fn upload_png(&self, path: &str, png: impl Into<Vec<u8>>) -> Result<Response<Value>> {
        self.upload_file(path, png, "image/png").await
    }

    pub async fn upload_jpeg(&self, path: &str, jpeg: impl Into<Vec<u8>>) -> Result<Response<Value>> {
        self.upload_file(path, jpeg, "image/jpeg").await
    }

    /// Uploads a file from disk; the MIME type follows its extension.
    pub async fn upload_path(&self, path: &str, file: impl Into<PathBuf>) -> Result<Response<Value>> {
        self.request(Method::Post, path, Some(Body::File(file.into()))).await
    }
}

fn env_number<N>(name: &str) -> Result<Option<N>>
where
    N: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Err(FetchError::Configuration(format!(
            "{name} is set but empty"
        ))),
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            FetchError::Configuration(format!("{name} must be a number, got `{raw}`"))
        }),
        Err(_) => Ok(None),
    }
}
