//! Rate limiting guard.

use std::fmt;
use std::future::{Future, Ready, ready};
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

use actix_web::{
    Error, HttpMessage, ResponseError,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue},
};

use aegis_core::domain::{ClientKey, Principal, RateLimitPolicy};
use aegis_core::ports::RateLimiter;

use super::error::AppError;

/// How the guard derives the counter bucket for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientKeySource {
    /// The authenticated principal's id, falling back to the peer IP.
    #[default]
    Principal,
    /// The TCP peer's IP.
    Ip,
    /// The client IP reported by `Forwarded` / `X-Forwarded-For`. Any
    /// caller can set these headers, so only use this behind a proxy that
    /// overwrites them.
    ForwardedIp,
}

impl FromStr for ClientKeySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "principal" => Ok(ClientKeySource::Principal),
            "ip" => Ok(ClientKeySource::Ip),
            "forwarded_ip" => Ok(ClientKeySource::ForwardedIp),
            other => Err(format!(
                "unknown client key source '{other}', expected principal, ip or forwarded_ip"
            )),
        }
    }
}

impl fmt::Display for ClientKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKeySource::Principal => f.write_str("principal"),
            ClientKeySource::Ip => f.write_str("ip"),
            ClientKeySource::ForwardedIp => f.write_str("forwarded_ip"),
        }
    }
}

impl ClientKeySource {
    pub fn key_for(&self, req: &ServiceRequest) -> ClientKey {
        if *self == ClientKeySource::Principal {
            if let Some(principal) = req.extensions().get::<Principal>() {
                return ClientKey::from_principal(principal);
            }
        }

        let ip = match self {
            ClientKeySource::ForwardedIp => req
                .connection_info()
                .realip_remote_addr()
                .and_then(parse_ip),
            _ => req.peer_addr().map(|addr| addr.ip()),
        };

        ip.map(ClientKey::from_ip).unwrap_or_else(ClientKey::unknown)
    }
}

/// `realip_remote_addr` may carry a port when it falls back to the peer address.
fn parse_ip(addr: &str) -> Option<IpAddr> {
    addr.parse::<IpAddr>()
        .ok()
        .or_else(|| addr.parse::<SocketAddr>().ok().map(|a| a.ip()))
}

/// Per-route admission check.
///
/// Mounted on the route inside [`AuthGuard`](super::AuthGuard) so only
/// authenticated requests for a matching method ever reach the counter
/// store. Routes without a policy pass straight through.
pub struct RateLimitGuard {
    route_id: Arc<str>,
    policy: Option<RateLimitPolicy>,
    limiter: Arc<dyn RateLimiter>,
    key_source: ClientKeySource,
}

impl RateLimitGuard {
    pub fn new(
        route_id: &str,
        policy: Option<RateLimitPolicy>,
        limiter: Arc<dyn RateLimiter>,
        key_source: ClientKeySource,
    ) -> Self {
        Self {
            route_id: Arc::from(route_id),
            policy,
            limiter,
            key_source,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitGuardService {
            service: Rc::new(service),
            route_id: self.route_id.clone(),
            policy: self.policy,
            limiter: self.limiter.clone(),
            key_source: self.key_source,
        }))
    }
}

pub struct RateLimitGuardService<S> {
    service: Rc<S>,
    route_id: Arc<str>,
    policy: Option<RateLimitPolicy>,
    limiter: Arc<dyn RateLimiter>,
    key_source: ClientKeySource,
}

impl<S, B> Service<ServiceRequest> for RateLimitGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        let policy = match self.policy {
            Some(policy) => policy,
            None => {
                return Box::pin(async move {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                });
            }
        };

        let limiter = self.limiter.clone();
        let route_id = self.route_id.clone();
        let client = self.key_source.key_for(&req);

        Box::pin(async move {
            let admission = limiter.admit(&client, &route_id, &policy).await;

            if !admission.allowed {
                tracing::warn!(client = %client, route = %route_id, "Rate limit exceeded");
                let response = AppError::RateLimited {
                    limit: admission.limit,
                    retry_after: admission.retry_after.unwrap_or(policy.window()),
                }
                .error_response();
                return Ok(req.into_response(response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            let headers = res.headers_mut();
            headers.insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(admission.limit),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(admission.remaining),
            );

            Ok(res.map_into_left_body())
        })
    }
}
