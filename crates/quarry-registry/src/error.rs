use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    /// A request error happened while talking to the registry. Refer to the
    /// error message for more details.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("package `{0}` was not found in the registry")]
    PackageNotFound(String),

    #[error("`{name}@{version}` is not available for {os}/{arch}")]
    NotAvailableForPlatform {
        name: String,
        version: String,
        os: String,
        arch: String,
    },

    #[error("received some unexpected JSON from {url}")]
    BadJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base64 payload in the recipe for `{name}`: {field}")]
    BadPayload { name: String, field: String },
}
