//! Request admission: rate limiting, API-key guard on writes, request-id
//! propagation and structured access logging.
//!
//! Order within the middleware: rate limiter first, then the key guard,
//! then the wrapped service. Every response, including short-circuits,
//! carries `x-request-id`.

mod rate_limit;

pub use rate_limit::RateLimiter;

use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::Method;
use actix_web::{Error, HttpResponse};
use futures_util::future::LocalBoxFuture;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ErrorBody;

/// POST routes with read semantics, exempt from the write-key guard
const READ_POSTS: &[&str] = &["/v1/agent/discovery"];

pub struct Admission {
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
}

impl Admission {
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> Self {
        Self {
            api_key: config.api_key.clone(),
            limiter,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Admission
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdmissionMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdmissionMiddleware {
            service: Rc::new(service),
            api_key: self.api_key.clone(),
            limiter: Arc::clone(&self.limiter),
        }))
    }
}

pub struct AdmissionMiddleware<S> {
    service: Rc<S>,
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for AdmissionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let api_key = self.api_key.clone();
        let limiter = Arc::clone(&self.limiter);

        Box::pin(async move {
            let started = Instant::now();
            let request_id = request_id(&req);
            let method = req.method().clone();
            let path = req.path().to_string();

            let ip = client_ip(&req);
            let now_ms = chrono::Utc::now().timestamp_millis();
            if let Err(retry_after) = limiter.check(&ip, now_ms) {
                let response = HttpResponse::TooManyRequests()
                    .insert_header(("Retry-After", retry_after.to_string()))
                    .insert_header(("x-request-id", request_id.clone()))
                    .json(ErrorBody {
                        error: "Too many requests".to_string(),
                        status_code: 429,
                        validation: None,
                        details: None,
                    });
                log_access(&method, &path, 429, started, &request_id);
                return Ok(req.into_response(response).map_into_right_body());
            }

            if let Some(expected) = api_key.as_deref() {
                if is_guarded_write(&method, &path) {
                    let provided = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
                    if provided != Some(expected) {
                        let response = HttpResponse::Unauthorized()
                            .insert_header(("x-request-id", request_id.clone()))
                            .json(ErrorBody {
                                error: "Invalid or missing API key".to_string(),
                                status_code: 401,
                                validation: None,
                                details: None,
                            });
                        log_access(&method, &path, 401, started, &request_id);
                        return Ok(req.into_response(response).map_into_right_body());
                    }
                }
            }

            let mut res = service.call(req).await?;
            res.headers_mut().insert(
                HeaderName::from_static("x-request-id"),
                HeaderValue::from_str(&request_id)
                    .unwrap_or_else(|_| HeaderValue::from_static("invalid-request-id")),
            );
            log_access(&method, &path, res.status().as_u16(), started, &request_id);
            Ok(res.map_into_left_body())
        })
    }
}

/// First non-empty of x-request-id, x-correlation-id, or a fresh UUID
fn request_id(req: &ServiceRequest) -> String {
    for header in ["x-request-id", "x-correlation-id"] {
        if let Some(value) = req.headers().get(header).and_then(|v| v.to_str().ok()) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    Uuid::new_v4().to_string()
}

/// x-forwarded-for[0] when present, else the transport peer address
fn client_ip(req: &ServiceRequest) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_guarded_write(method: &Method, path: &str) -> bool {
    let is_write = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method);
    is_write && !READ_POSTS.contains(&path)
}

fn log_access(method: &Method, path: &str, status: u16, started: Instant, request_id: &str) {
    log::info!(
        "{} {} {} {}ms request_id={}",
        method,
        path,
        status,
        started.elapsed().as_millis(),
        request_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn writes_are_guarded_except_discovery() {
        assert!(is_guarded_write(&Method::POST, "/v1/agent/register"));
        assert!(is_guarded_write(&Method::DELETE, "/v1/agent/register"));
        assert!(is_guarded_write(&Method::POST, "/admin/reindex"));
        assert!(!is_guarded_write(&Method::POST, "/v1/agent/discovery"));
        assert!(!is_guarded_write(&Method::GET, "/health"));
    }

    #[test]
    fn request_id_prefers_incoming_headers() {
        let req = TestRequest::default()
            .insert_header(("x-request-id", "abc-123"))
            .to_srv_request();
        assert_eq!(request_id(&req), "abc-123");

        let req = TestRequest::default()
            .insert_header(("x-correlation-id", "corr-9"))
            .to_srv_request();
        assert_eq!(request_id(&req), "corr-9");

        let req = TestRequest::default().to_srv_request();
        let generated = request_id(&req);
        assert!(Uuid::parse_str(&generated).is_ok());
    }

    #[test]
    fn client_ip_takes_first_forwarded_entry() {
        let req = TestRequest::default()
            .insert_header(("x-forwarded-for", " 10.0.0.9 , 172.16.0.1"))
            .to_srv_request();
        assert_eq!(client_ip(&req), "10.0.0.9");
    }

    #[test]
    fn client_ip_without_peer_is_unknown() {
        let req = TestRequest::default().to_srv_request();
        assert_eq!(client_ip(&req), "unknown");
    }
}
