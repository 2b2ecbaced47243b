//! Hero image lookup against an Unsplash-compatible photo API.

use std::{path::Path, time::Duration};

use inkpress_core::{HeroImageRef, config::HeroConfig};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    error::BuildError,
    retry::{RetryPolicy, retry},
};

/// The only supported image source.
pub const UNSPLASH: &str = "unsplash";

/// User-Agent string for lookup requests.
const USER_AGENT: &str = concat!("inkpress/", env!("CARGO_PKG_VERSION"));

/// Timeout for one lookup request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Hero image lookup failures.
#[derive(Debug, Error)]
pub enum LookupError {
    /// A post wants a hero image but no access key is configured.
    #[error("no access key configured for hero image '{0}' (set hero.access_key)")]
    MissingCredentials(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Request failed before a response arrived.
    #[error("{url}: {message}")]
    Transport { url: String, message: String },

    /// Non-success HTTP status.
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The service answered with an `errors` list.
    #[error("{url}: {}", .messages.join("; "))]
    Api { url: String, messages: Vec<String> },

    /// The response body was not the expected JSON.
    #[error("{url}: invalid response: {message}")]
    Decode { url: String, message: String },
}

impl LookupError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingCredentials(_) | Self::Client(_))
    }
}

/// Resolved hero image, ready for templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeroImage {
    /// Image URL to embed.
    pub url: String,

    /// Alternative text.
    pub alt: String,

    /// Photographer name.
    pub author_name: String,

    /// Photographer profile page.
    pub author_url: String,

    /// Photo page on the service.
    pub page_url: String,
}

#[derive(Debug, Deserialize)]
struct PhotoResponse {
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    alt_description: Option<String>,
    #[serde(default)]
    description: Option<String>,
    urls: Option<PhotoUrls>,
    #[serde(default)]
    links: Option<Links>,
    #[serde(default)]
    user: Option<PhotoUser>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    html: String,
}

#[derive(Debug, Deserialize)]
struct PhotoUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    links: Links,
}

/// Client for the photo API.
#[derive(Debug, Clone)]
pub struct HeroClient {
    client: Client,
    endpoint: String,
    access_key: Option<String>,
    policy: RetryPolicy,
}

impl HeroClient {
    /// Build a client from configuration.
    pub fn from_config(config: &HeroConfig) -> Result<Self, LookupError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LookupError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone().filter(|k| !k.is_empty()),
            policy: RetryPolicy {
                max_attempts: config.max_attempts,
                ..RetryPolicy::default()
            },
        })
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve the hero image declared by the post at `post`.
    #[instrument(skip(self, hero), fields(id = %hero.id))]
    pub async fn lookup(&self, hero: &HeroImageRef, post: &Path) -> Result<HeroImage, BuildError> {
        if hero.source != UNSPLASH {
            return Err(BuildError::format(
                post,
                format!("unsupported hero image source '{}'", hero.source),
            ));
        }

        let key = self
            .access_key
            .as_deref()
            .ok_or_else(|| LookupError::MissingCredentials(hero.id.clone()))?;

        let image = retry(self.policy, LookupError::is_retryable, |_| {
            self.fetch(&hero.id, key)
        })
        .await?;

        debug!(url = %image.url, "resolved hero image");
        Ok(image)
    }

    async fn fetch(&self, id: &str, key: &str) -> Result<HeroImage, LookupError> {
        let url = format!("{}/photos/{id}", self.endpoint);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Client-ID {key}"))
            .header("Accept-Version", "v1")
            .send()
            .await
            .map_err(|e| LookupError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| LookupError::Transport {
            url: url.clone(),
            message: format!("failed to read body: {e}"),
        })?;

        // Error payloads carry an `errors` list; report it over the bare status.
        let parsed: Option<PhotoResponse> = serde_json::from_str(&body).ok();
        if let Some(errors) = parsed.as_ref().map(|p| &p.errors).filter(|e| !e.is_empty()) {
            return Err(LookupError::Api {
                url,
                messages: errors.clone(),
            });
        }

        if !status.is_success() {
            return Err(LookupError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let photo = parsed.ok_or_else(|| LookupError::Decode {
            url: url.clone(),
            message: "body is not a photo object".to_string(),
        })?;
        let urls = photo.urls.ok_or_else(|| LookupError::Decode {
            url: url.clone(),
            message: "missing urls".to_string(),
        })?;
        let user = photo.user.unwrap_or(PhotoUser {
            name: String::new(),
            links: Links::default(),
        });

        Ok(HeroImage {
            url: urls.regular,
            alt: photo
                .alt_description
                .or(photo.description)
                .unwrap_or_default(),
            author_name: user.name,
            author_url: user.links.html,
            page_url: photo.links.unwrap_or_default().html,
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    use super::*;

    fn client_for(server: &MockServer, key: Option<&str>) -> HeroClient {
        let config = HeroConfig {
            endpoint: server.uri(),
            access_key: key.map(str::to_string),
            max_attempts: 3,
        };
        HeroClient::from_config(&config)
            .unwrap()
            .with_policy(RetryPolicy::immediate(3))
    }

    fn hero(id: &str) -> HeroImageRef {
        HeroImageRef {
            source: UNSPLASH.to_string(),
            id: id.to_string(),
        }
    }

    fn photo_json() -> serde_json::Value {
        serde_json::json!({
            "id": "abc",
            "alt_description": "a mountain lake",
            "urls": { "regular": "https://images.example/abc?w=1080" },
            "links": { "html": "https://unsplash.example/photos/abc" },
            "user": {
                "name": "Jane Doe",
                "links": { "html": "https://unsplash.example/@jane" }
            }
        })
    }

    #[tokio::test]
    async fn test_lookup_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/abc"))
            .and(header("Authorization", "Client-ID secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(photo_json()))
            .expect(1)
            .mount(&server)
            .await;

        let image = client_for(&server, Some("secret"))
            .lookup(&hero("abc"), Path::new("p.md"))
            .await
            .unwrap();

        assert_eq!(image.url, "https://images.example/abc?w=1080");
        assert_eq!(image.alt, "a mountain lake");
        assert_eq!(image.author_name, "Jane Doe");
        assert_eq!(image.author_url, "https://unsplash.example/@jane");
    }

    #[tokio::test]
    async fn test_errors_list_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/gone"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "errors": ["Couldn't find Photo"] })),
            )
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server, Some("secret"))
            .lookup(&hero("gone"), Path::new("p.md"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::RemoteLookup(LookupError::Api { ref messages, .. })
                if messages == &["Couldn't find Photo".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/abc"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/photos/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(photo_json()))
            .mount(&server)
            .await;

        let image = client_for(&server, Some("secret"))
            .lookup(&hero("abc"), Path::new("p.md"))
            .await
            .unwrap();
        assert_eq!(image.author_name, "Jane Doe");
    }

    #[tokio::test]
    async fn test_missing_credentials_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(photo_json()))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .lookup(&hero("abc"), Path::new("p.md"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::RemoteLookup(LookupError::MissingCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_source_is_format_error() {
        let server = MockServer::start().await;
        let reference = HeroImageRef {
            source: "flickr".to_string(),
            id: "1".to_string(),
        };

        let err = client_for(&server, Some("secret"))
            .lookup(&reference, Path::new("p.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Format { .. }));
    }
}
