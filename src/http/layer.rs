//! Tower layer that intercepts update checks on an outbound client.
//!
//! # Responsibilities
//! - Buffer and decode the body of monitored requests
//! - Run the egress hook and re-encode the rewritten request
//! - Call the inner service under the configured timeout
//! - Finalize the logged row by id with the call's outcome
//!
//! # Design Decisions
//! - Unmonitored requests are forwarded without touching the body
//! - At most `max_body_bytes` are buffered; a larger body is forwarded
//!   unmodified and unlogged, with the chunks already read put back in front
//!   of the rest of the stream
//! - A body the rewrite left alone goes out as the original bytes
//! - Rewriting and logging never turn a call into an error; only a failing
//!   body stream and the inner service can fail it

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use futures_util::{stream, StreamExt};
use hyper::body::Body as HttpBody;
use tower::{BoxError, Layer, Service};

use crate::http::request::OutgoingRequest;
use crate::http::response::ResponseOutcome;
use crate::interceptor::UpdateInterceptor;

/// Wraps a client service with update-check interception.
#[derive(Clone)]
pub struct UpdateCheckLayer {
    interceptor: Arc<UpdateInterceptor>,
}

impl UpdateCheckLayer {
    pub fn new(interceptor: Arc<UpdateInterceptor>) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for UpdateCheckLayer {
    type Service = UpdateCheckService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UpdateCheckService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

#[derive(Clone)]
pub struct UpdateCheckService<S> {
    inner: S,
    interceptor: Arc<UpdateInterceptor>,
}

impl<S> UpdateCheckService<S> {
    pub fn interceptor(&self) -> &Arc<UpdateInterceptor> {
        &self.interceptor
    }
}

impl<S, ResBody> Service<Request<Body>> for UpdateCheckService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // keep the service that was polled ready, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = self.interceptor.clone();

        Box::pin(async move {
            let url = request.uri().to_string();
            if interceptor.monitored_endpoint(&url).is_none() {
                return inner.call(request).await.map_err(Into::into);
            }

            let config = interceptor.config().load();
            let limit = config.transport.max_body_bytes;
            if request.body().size_hint().lower() > limit as u64 {
                tracing::warn!(url = %url, limit = limit, "Body exceeds rewrite limit, forwarding unmodified");
                return inner.call(request).await.map_err(Into::into);
            }

            let (parts, body) = request.into_parts();
            let bytes = match buffer_body(body, limit).await? {
                Buffered::Complete(bytes) => bytes,
                Buffered::Overflow(body) => {
                    tracing::warn!(url = %url, limit = limit, "Body exceeds rewrite limit, forwarding unmodified");
                    return inner.call(Request::from_parts(parts, body)).await.map_err(Into::into);
                }
            };

            let outgoing = OutgoingRequest::from_parts(&parts, bytes.clone());
            let decoded = outgoing.body.clone();
            let (outgoing, id) = interceptor.intercept(outgoing);
            let wire = if outgoing.body == decoded {
                bytes
            } else {
                outgoing.body.encode_over(&bytes)
            };
            let request = outgoing.into_http_request_with_body(parts, wire);

            let result: Result<Response<ResBody>, BoxError> = if config.transport.request_secs > 0 {
                let timeout = Duration::from_secs(config.transport.request_secs);
                match tokio::time::timeout(timeout, inner.call(request)).await {
                    Ok(result) => result.map_err(Into::into),
                    Err(elapsed) => Err(elapsed.into()),
                }
            } else {
                inner.call(request).await.map_err(Into::into)
            };

            if let Some(id) = id {
                let outcome = match &result {
                    Ok(response) => ResponseOutcome::Status(response.status().as_u16()),
                    Err(err) => ResponseOutcome::from_error(&**err),
                };
                interceptor.finalize(id, &outcome);
            }

            result
        })
    }
}

/// A request body read up to the rewrite limit.
enum Buffered {
    Complete(Bytes),
    /// The limit was crossed; the body replays every chunk already read.
    Overflow(Body),
}

async fn buffer_body(body: Body, limit: usize) -> Result<Buffered, axum::Error> {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut len = 0usize;

    while let Some(chunk) = data.next().await {
        let chunk = chunk?;
        len += chunk.len();
        chunks.push(chunk);
        if len > limit {
            let head = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            return Ok(Buffered::Overflow(Body::from_stream(head.chain(data))));
        }
    }

    Ok(Buffered::Complete(match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => Bytes::from(chunks.concat()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModifierConfig, SharedConfig};
    use crate::store::{LogFilter, LogStore, MemoryLogStore, ResponseStatus, SortOrder};
    use axum::http::StatusCode;
    use std::convert::Infallible;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Records what reached the wire and answers with a fixed status.
    #[derive(Clone)]
    struct Upstream {
        seen: Arc<Mutex<Vec<(String, String)>>>,
        status: StatusCode,
        delay: Duration,
    }

    impl Service<Request<Body>> for Upstream {
        type Response = Response<Body>;
        type Error = Infallible;
        type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: Request<Body>) -> Self::Future {
            let seen = self.seen.clone();
            let status = self.status;
            let delay = self.delay;
            Box::pin(async move {
                let uri = request.uri().to_string();
                let body = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap_or_default();
                seen.lock().unwrap().push((uri, String::from_utf8_lossy(&body).into_owned()));
                tokio::time::sleep(delay).await;
                Ok(Response::builder().status(status).body(Body::empty()).unwrap())
            })
        }
    }

    fn setup(status: StatusCode, delay: Duration) -> (UpdateCheckService<Upstream>, Upstream, Arc<MemoryLogStore>) {
        let mut config = ModifierConfig::default();
        config.interception.endpoints = vec!["http://updates.test/".into()];
        config.transport.request_secs = 5;
        let store = Arc::new(MemoryLogStore::new());
        let interceptor = Arc::new(UpdateInterceptor::new(SharedConfig::new(config), store.clone()));
        let upstream = Upstream {
            seen: Arc::default(),
            status,
            delay,
        };
        (UpdateCheckLayer::new(interceptor).layer(upstream.clone()), upstream, store)
    }

    fn rows(store: &MemoryLogStore) -> Vec<crate::store::LogEntry> {
        store.search(&LogFilter::default(), SortOrder::default(), 100, 0).unwrap()
    }

    #[tokio::test]
    async fn test_monitored_request_is_rewritten_and_finalized() {
        let (service, upstream, store) = setup(StatusCode::OK, Duration::ZERO);
        let request = Request::post("http://updates.test/plugins/update-check/1.1/?locale=de")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(
                "plugins=%7B%22a%2Fa.php%22%3A%7B%22UpdateURI%22%3A%22https%3A%2F%2Fx%22%7D%7D&active=%5B%22a%2Fa.php%22%5D",
            ))
            .unwrap();

        let response = service.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let seen = upstream.seen.lock().unwrap().clone();
        assert_eq!(seen[0].0, "http://updates.test/plugins/update-check/1.1/");
        assert_eq!(seen[0].1, "plugins=%7B%7D&active=%5B%5D");

        let rows = rows(&store);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].response_code, ResponseStatus::Code(200));
    }

    #[tokio::test]
    async fn test_unmonitored_request_is_forwarded_as_is() {
        let (service, upstream, store) = setup(StatusCode::OK, Duration::ZERO);
        let request = Request::post("http://elsewhere.test/?a=1")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("plugins=%7B%7D"))
            .unwrap();

        service.oneshot(request).await.unwrap();

        let seen = upstream.seen.lock().unwrap().clone();
        assert_eq!(seen[0], ("http://elsewhere.test/?a=1".to_string(), "plugins=%7B%7D".to_string()));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded() {
        let (service, _, store) = setup(StatusCode::OK, Duration::from_secs(60));
        let request = Request::get("http://updates.test/core/version-check/1.7/")
            .body(Body::empty())
            .unwrap();

        let err = service.oneshot(request).await.unwrap_err();
        assert!(err.is::<tokio::time::error::Elapsed>());
        assert_eq!(rows(&store)[0].response_code, ResponseStatus::Error("timeout".into()));
    }

    #[tokio::test]
    async fn test_oversized_body_bypasses_rewrite() {
        let (service, upstream, store) = setup(StatusCode::OK, Duration::ZERO);
        let mut config = (*service.interceptor().config().load()).clone();
        config.transport.max_body_bytes = 4;
        service.interceptor().config().replace(config);

        let request = Request::post("http://updates.test/themes/update-check/1.1/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("themes=%7B%7D"))
            .unwrap();
        service.oneshot(request).await.unwrap();

        assert_eq!(upstream.seen.lock().unwrap()[0].1, "themes=%7B%7D");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_still_reaches_upstream() {
        let (service, upstream, store) = setup(StatusCode::OK, Duration::ZERO);
        let mut config = (*service.interceptor().config().load()).clone();
        config.transport.max_body_bytes = 16;
        service.interceptor().config().replace(config);

        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"plugins=%7B%22a%2Fa.php%22")),
            Ok(Bytes::from_static(b"%3A%7B%7D%7D&active=%5B%5D")),
        ];
        let request = Request::post("http://updates.test/plugins/update-check/1.1/?locale=de")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        let response = service.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let seen = upstream.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "http://updates.test/plugins/update-check/1.1/?locale=de");
        assert_eq!(seen[0].1, "plugins=%7B%22a%2Fa.php%22%3A%7B%7D%7D&active=%5B%5D");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_streamed_body_under_limit_is_rewritten() {
        let (service, upstream, store) = setup(StatusCode::OK, Duration::ZERO);
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"themes=%7B%22t%22%3A%7B%22Update")),
            Ok(Bytes::from_static(b"URI%22%3A%22x%22%7D%7D")),
        ];
        let request = Request::post("http://updates.test/themes/update-check/1.1/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        service.oneshot(request).await.unwrap();

        assert_eq!(upstream.seen.lock().unwrap()[0].1, "themes=%7B%7D");
        assert_eq!(rows(&store).len(), 1);
    }

    #[tokio::test]
    async fn test_core_check_body_reaches_upstream_byte_for_byte() {
        let (service, upstream, store) = setup(StatusCode::OK, Duration::ZERO);
        let body = "locale%5B%5D=de_DE&locale%5B%5D=fr_FR&x=1+2";
        let request = Request::post("http://updates.test/core/version-check/1.7/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();

        service.oneshot(request).await.unwrap();

        assert_eq!(upstream.seen.lock().unwrap()[0].1, body);
        assert_eq!(rows(&store)[0].response_code, ResponseStatus::Code(200));
    }

    #[tokio::test]
    async fn test_rewritten_body_keeps_repeated_keys() {
        let (service, upstream, _) = setup(StatusCode::OK, Duration::ZERO);
        let request = Request::post("http://updates.test/plugins/update-check/1.1/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(
                "plugins=%7B%22a%22%3A%7B%22UpdateURI%22%3A%22x%22%7D%7D&locale%5B%5D=de_DE&locale%5B%5D=fr_FR",
            ))
            .unwrap();

        service.oneshot(request).await.unwrap();

        assert_eq!(
            upstream.seen.lock().unwrap()[0].1,
            "plugins=%7B%7D&locale%5B%5D=de_DE&locale%5B%5D=fr_FR"
        );
    }
}
