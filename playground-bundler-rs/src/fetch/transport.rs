use crate::error::FetchError;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use reqwest::Client;
use url::Url;

/// Raw outcome of one HTTP GET after redirects were followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub final_url: Url,
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network seam used by the fetch cache.
///
/// Futures are not `Send`: the whole resolution pipeline runs on a single
/// thread and interleaves cooperatively.
pub trait Transport {
    fn get(&self, url: &Url) -> LocalBoxFuture<'_, Result<TransportResponse, FetchError>>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &Url) -> LocalBoxFuture<'_, Result<TransportResponse, FetchError>> {
        let url = url.clone();
        async move {
            let network_error = |err: reqwest::Error| FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            };
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(network_error)?;
            let final_url = response.url().clone();
            let status = response.status().as_u16();
            let body = response.text().await.map_err(network_error)?;
            Ok(TransportResponse {
                final_url,
                status,
                body,
            })
        }
        .boxed_local()
    }
}
