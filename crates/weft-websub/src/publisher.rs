//! Publishing content to a hub.

use crate::WebsubError;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use tracing::debug;

/// Pushes content to a hub on behalf of one base URL.
///
/// The publisher also serves topic advertisement on GET, so subscribers
/// that land on a topic URL can discover the hub through `Link` headers.
pub struct Publisher {
    base_url: String,
    hub_url: String,
    client: reqwest::Client,
}

impl Publisher {
    /// Creates a publisher rooted at `base_url` that publishes through
    /// `hub_url`.
    #[must_use]
    pub fn new(base_url: &str, hub_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            hub_url: hub_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Base URL this publisher advertises as its own.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Publishes `body` as the content of `topic`.
    ///
    /// The topic does not have to live under this publisher's base URL;
    /// the hub accepts publishes on any topic.
    ///
    /// # Errors
    ///
    /// Returns [`WebsubError::Http`] when the request cannot be sent and
    /// [`WebsubError::PublishRejected`] when the hub answers non-2xx.
    pub async fn publish(
        &self,
        topic: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), WebsubError> {
        let endpoint = format!("{}/publish", self.hub_url);

        let response = self
            .client
            .post(&endpoint)
            .query(&[("hub.mode", "publish"), ("hub.topic", topic)])
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebsubError::PublishRejected {
                topic: topic.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(topic, "published");
        Ok(())
    }

    /// Serves hub discovery for topics under this publisher.
    ///
    /// Every GET is answered 200 with `Link` headers naming the hub and
    /// the requested topic, even for topics this node never publishes on.
    #[must_use]
    pub fn router(&self) -> Router {
        let hub_url = self.hub_url.clone();
        let base_url = self.base_url.clone();

        Router::new().fallback(move |uri: axum::http::Uri| {
            let link = format!(
                "<{hub_url}>; rel=\"hub\", <{base_url}{}>; rel=\"self\"",
                uri.path().trim_end_matches('/')
            );
            async move { ([(header::LINK, link)], StatusCode::OK).into_response() }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_normalized() {
        let publisher = Publisher::new("http://localhost:4044/", "http://localhost:8080/");
        assert_eq!(publisher.base_url(), "http://localhost:4044");
        assert_eq!(publisher.hub_url, "http://localhost:8080");
    }
}
