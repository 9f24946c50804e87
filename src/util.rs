use std::sync::Arc;

use reqwest::header::{COOKIE, USER_AGENT};
use reqwest_cookie_store::CookieStoreMutex;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

pub struct HttpClient {
    pub client: ClientWithMiddleware,
    pub cookies: Arc<CookieStoreMutex>,
    session: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("reqwest middleware error: {0}")]
    ReqwestMiddlewareError(#[from] reqwest_middleware::Error),
}

impl HttpClient {
    /// `session` is the value of the site's `user_session` cookie, if any.
    pub fn new(session: Option<String>) -> reqwest::Result<HttpClient> {
        let cookies = Arc::new(CookieStoreMutex::default());
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .build()?;

        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(HttpClient {
            client,
            cookies,
            session: session.filter(|s| !s.is_empty()),
        })
    }

    pub async fn fetch_text(
        &self,
        url: &str,
        user_agent: Option<&str>,
    ) -> Result<String, DownloadError> {
        let mut req = self.client.get(url);
        if let Some(session) = &self.session {
            req = req.header(COOKIE, format!("user_session={}", session));
        }
        if let Some(ua) = user_agent {
            req = req.header(USER_AGENT, ua);
        }

        req.send().await?.text().await.map_err(|e| e.into())
    }
}
