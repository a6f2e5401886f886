//! Network access for the resolution pipeline: a pluggable transport and the
//! single-flight fetch cache sitting in front of it.

mod cache;
mod transport;

pub use cache::{CachePolicy, FetchCache, FetchOutcome, FetchedModule};
pub use transport::{ReqwestTransport, Transport, TransportResponse};

#[cfg(test)]
pub(crate) mod testing {
    use super::{Transport, TransportResponse};
    use crate::error::FetchError;
    use futures::future::LocalBoxFuture;
    use futures::FutureExt;
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;
    use url::Url;

    pub fn url(text: &str) -> Url {
        Url::parse(text).unwrap()
    }

    /// In-memory CDN. Each route holds a queue of responses; the last one
    /// repeats once the queue is drained.
    #[derive(Default)]
    pub struct MockTransport {
        routes: RefCell<HashMap<String, VecDeque<TransportResponse>>>,
        calls: RefCell<Vec<String>>,
        latency: Cell<Option<Duration>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Delays every response by `latency`.
        pub fn set_latency(&self, latency: Duration) {
            self.latency.set(Some(latency));
        }

        fn push(&self, requested: &str, response: TransportResponse) {
            self.routes
                .borrow_mut()
                .entry(requested.to_string())
                .or_default()
                .push_back(response);
        }

        pub fn serve(&self, requested: &str, body: &str) {
            self.redirect(requested, requested, body);
        }

        pub fn redirect(&self, requested: &str, final_url: &str, body: &str) {
            self.push(
                requested,
                TransportResponse {
                    final_url: url(final_url),
                    status: 200,
                    body: body.to_string(),
                },
            );
        }

        pub fn fail_then_serve(&self, requested: &str, status: u16, error_body: &str, body: &str) {
            self.push(
                requested,
                TransportResponse {
                    final_url: url(requested),
                    status,
                    body: error_body.to_string(),
                },
            );
            self.serve(requested, body);
        }

        pub fn calls_to(&self, requested: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|call| call.as_str() == requested)
                .count()
        }

        pub fn total_calls(&self) -> usize {
            self.calls.borrow().len()
        }

        fn respond(&self, requested: &Url) -> TransportResponse {
            self.calls.borrow_mut().push(requested.to_string());
            let mut routes = self.routes.borrow_mut();
            match routes.get_mut(requested.as_str()) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap(),
                None => TransportResponse {
                    final_url: requested.clone(),
                    status: 404,
                    body: format!("not found: {requested}"),
                },
            }
        }
    }

    impl Transport for MockTransport {
        fn get(&self, url: &Url) -> LocalBoxFuture<'_, Result<TransportResponse, FetchError>> {
            let url = url.clone();
            async move {
                match self.latency.get() {
                    Some(latency) => tokio::time::sleep(latency).await,
                    None => tokio::task::yield_now().await,
                }
                Ok(self.respond(&url))
            }
            .boxed_local()
        }
    }
}
