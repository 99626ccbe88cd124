//! Route table and dispatch.
//!
//! Routes are registered once at startup and mounted as actix resources,
//! each wrapped so that authentication runs before rate limiting:
//!
//! ```text
//! request -> AuthGuard -> RateLimitGuard -> handler
//! ```

use actix_web::{http::Method, web};

use aegis_core::domain::RateLimitPolicy;

use crate::config::RateLimitSettings;
use crate::handlers;
use crate::middleware::{AppError, AuthGuard, Guards, RateLimitGuard};
use crate::state::AppState;

pub const LIST_MODELS: &str = "list_models";
pub const DESCRIBE_MODEL: &str = "describe_model";
pub const CHAT_COMPLETIONS: &str = "chat_completions";

pub const STANDARD_ROUTE_IDS: [&str; 3] = [LIST_MODELS, DESCRIBE_MODEL, CHAT_COMPLETIONS];

/// Handler a route dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ListModels,
    DescribeModel,
    ChatCompletions,
}

#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub id: String,
    pub method: Method,
    /// actix path pattern, e.g. `/openai/v1/models/{model}`.
    pub path: String,
    /// `None` means unlimited.
    pub policy: Option<RateLimitPolicy>,
    pub endpoint: Endpoint,
}

impl RouteSpec {
    pub fn new(id: &str, method: Method, path: &str, endpoint: Endpoint) -> Self {
        Self {
            id: id.to_string(),
            method,
            path: path.to_string(),
            policy: None,
            endpoint,
        }
    }

    pub fn with_policy(mut self, policy: Option<RateLimitPolicy>) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route id '{0}' is already registered")]
    DuplicateId(String),

    #[error("{method} {path} is already registered")]
    DuplicateRoute { method: Method, path: String },
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteSpec>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The OpenAI-compatible routes, each limited per `limits`.
    pub fn standard(limits: &RateLimitSettings) -> Self {
        let routes = [
            RouteSpec::new(LIST_MODELS, Method::GET, "/openai/v1/models", Endpoint::ListModels),
            RouteSpec::new(
                DESCRIBE_MODEL,
                Method::GET,
                "/openai/v1/models/{model}",
                Endpoint::DescribeModel,
            ),
            RouteSpec::new(
                CHAT_COMPLETIONS,
                Method::POST,
                "/openai/v1/chat/completions",
                Endpoint::ChatCompletions,
            ),
        ];

        Self {
            routes: routes
                .into_iter()
                .map(|route| {
                    let policy = limits.policy_for(&route.id);
                    route.with_policy(policy)
                })
                .collect(),
        }
    }

    pub fn register(&mut self, route: RouteSpec) -> Result<(), RouteError> {
        if self.routes.iter().any(|r| r.id == route.id) {
            return Err(RouteError::DuplicateId(route.id));
        }
        if self
            .routes
            .iter()
            .any(|r| r.method == route.method && r.path == route.path)
        {
            return Err(RouteError::DuplicateRoute {
                method: route.method,
                path: route.path,
            });
        }

        self.routes.push(route);
        Ok(())
    }

    pub fn routes(&self) -> &[RouteSpec] {
        &self.routes
    }

    /// Mount every route plus the 404 fallback onto `cfg`.
    ///
    /// Routes sharing a path become one resource; a request whose method
    /// matches none of them answers 405.
    pub fn configure(&self, cfg: &mut web::ServiceConfig, state: &AppState, guards: &Guards) {
        cfg.app_data(web::Data::new(state.clone()))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::BadRequest(err.to_string()).into()
            }));

        let mut paths: Vec<&str> = Vec::new();
        for route in &self.routes {
            if !paths.contains(&route.path.as_str()) {
                paths.push(&route.path);
            }
        }

        for path in paths {
            let mut resource = web::resource(path);
            for route in self.routes.iter().filter(|r| r.path == path) {
                resource = resource.route(mount(route, guards));
            }

            cfg.service(
                resource
                    .default_service(web::to(handlers::method_not_allowed))
                    .wrap(AuthGuard::new(guards.authenticator.clone())),
            );
        }

        cfg.default_service(web::to(handlers::not_found));

        let ids: Vec<&str> = self.routes.iter().map(|r| r.id.as_str()).collect();
        tracing::debug!(routes = ?ids, "Routes mounted");
    }
}

/// One method on a resource. The limiter sits on the route itself, so it
/// only runs once the method matched and [`AuthGuard`] has admitted the caller.
fn mount(route: &RouteSpec, guards: &Guards) -> actix_web::Route {
    let handler = web::method(route.method.clone());
    let handler = match route.endpoint {
        Endpoint::ListModels => handler.to(handlers::models::list),
        Endpoint::DescribeModel => handler.to(handlers::models::describe),
        Endpoint::ChatCompletions => handler.to(handlers::chat::completions),
    };

    handler.wrap(RateLimitGuard::new(
        &route.id,
        route.policy,
        guards.limiter.clone(),
        guards.key_source,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use actix_web::{App, http::StatusCode, test as actix_test};
    use async_trait::async_trait;
    use serde_json::json;

    use aegis_core::domain::{
        FinishReason, ModelDetail, ModelRecord, ModelSummary, Principal, TokenCounts,
    };
    use aegis_core::ports::{
        BackendError, CounterStore, Generation, GenerationRequest, ModelBackend, StoreError,
    };
    use aegis_infra::{
        ApiKeyAuthenticator, InMemoryCounterStore, InMemoryModelCatalog, InMemoryUsageRepository,
        ManualClock, WindowedRateLimiter,
    };

    use crate::config::GatewayConfig;
    use crate::middleware::ClientKeySource;
    use crate::usage::UsageRecorder;

    struct StubBackend;

    #[async_trait]
    impl ModelBackend for StubBackend {
        async fn list(&self) -> Result<Vec<ModelSummary>, BackendError> {
            Ok(vec![ModelSummary {
                id: "gpt-4o".to_string(),
                object: "model".to_string(),
                created: 1715367049,
                owned_by: "system".to_string(),
            }])
        }

        async fn describe(&self, id: &str) -> Result<ModelDetail, BackendError> {
            match id {
                "missing" => Err(BackendError::NotFound(id.to_string())),
                "overloaded" => Err(BackendError::Upstream {
                    status: 503,
                    body: json!({"error": {"message": "try later", "type": "server_error", "param": null, "code": null}}),
                }),
                "unreachable" => Err(BackendError::Transport("connection refused".to_string())),
                _ => Ok(ModelSummary {
                    id: id.to_string(),
                    object: "model".to_string(),
                    created: 0,
                    owned_by: "system".to_string(),
                }
                .into()),
            }
        }

        async fn generate(&self, request: GenerationRequest) -> Result<Generation, BackendError> {
            Ok(Generation {
                body: json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion",
                    "model": request.model,
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 9, "completion_tokens": 1, "total_tokens": 10}
                }),
                model: request.model,
                finish_reason: FinishReason::Stop,
                usage: TokenCounts {
                    predicted: 0,
                    prompt: 9,
                    completion: 1,
                    total: 10,
                },
            })
        }
    }

    /// In-memory store that counts how often it is asked.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryCounterStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CounterStore for CountingStore {
        async fn increment_and_get(
            &self,
            key: &str,
            sub_window: u64,
            window_count: u32,
            ttl: Duration,
        ) -> Result<u64, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner
                .increment_and_get(key, sub_window, window_count, ttl)
                .await
        }
    }

    struct Harness {
        state: AppState,
        guards: Guards,
        store: Arc<CountingStore>,
        clock: Arc<ManualClock>,
        usage: Arc<InMemoryUsageRepository>,
    }

    fn harness() -> Harness {
        let store = Arc::new(CountingStore::default());
        let clock = Arc::new(ManualClock::new(10_000));
        let usage = Arc::new(InMemoryUsageRepository::new());

        let recorder = UsageRecorder::new(
            true,
            Arc::new(InMemoryModelCatalog::new([ModelRecord::new("gpt-4o", "openai")])),
            usage.clone(),
        );
        let guards = Guards {
            authenticator: Arc::new(ApiKeyAuthenticator::new([
                ("sk-alice".to_string(), Principal::new("alice")),
                ("sk-bob".to_string(), Principal::new("bob")),
            ])),
            limiter: Arc::new(WindowedRateLimiter::new(store.clone()).with_clock(clock.clone())),
            key_source: ClientKeySource::Principal,
        };

        Harness {
            state: AppState::new(Arc::new(StubBackend), recorder),
            guards,
            store,
            clock,
            usage,
        }
    }

    fn five_per_second() -> Option<RateLimitPolicy> {
        RateLimitPolicy::new(5, Duration::from_secs(1), 1).ok()
    }

    fn table(policy: Option<RateLimitPolicy>) -> RouteTable {
        let mut table = RouteTable::new();
        table
            .register(
                RouteSpec::new(LIST_MODELS, Method::GET, "/openai/v1/models", Endpoint::ListModels)
                    .with_policy(policy),
            )
            .unwrap();
        table
            .register(
                RouteSpec::new(
                    DESCRIBE_MODEL,
                    Method::GET,
                    "/openai/v1/models/{model}",
                    Endpoint::DescribeModel,
                )
                .with_policy(policy),
            )
            .unwrap();
        table
            .register(
                RouteSpec::new(
                    CHAT_COMPLETIONS,
                    Method::POST,
                    "/openai/v1/chat/completions",
                    Endpoint::ChatCompletions,
                )
                .with_policy(policy),
            )
            .unwrap();
        table
    }

    fn get(uri: &str, key: Option<&str>) -> actix_test::TestRequest {
        let req = actix_test::TestRequest::get().uri(uri);
        match key {
            Some(key) => req.insert_header(("Authorization", format!("Bearer {key}"))),
            None => req,
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut table = table(None);

        assert_eq!(
            table.register(RouteSpec::new(
                LIST_MODELS,
                Method::GET,
                "/other",
                Endpoint::ListModels
            )),
            Err(RouteError::DuplicateId(LIST_MODELS.to_string()))
        );
        assert_eq!(
            table.register(RouteSpec::new(
                "list_models_v2",
                Method::GET,
                "/openai/v1/models",
                Endpoint::ListModels
            )),
            Err(RouteError::DuplicateRoute {
                method: Method::GET,
                path: "/openai/v1/models".to_string(),
            })
        );
        assert_eq!(table.routes().len(), 3);
    }

    #[test]
    fn test_methods_can_share_a_path() {
        let mut table = RouteTable::new();
        table
            .register(RouteSpec::new("read", Method::GET, "/x", Endpoint::ListModels))
            .unwrap();
        table
            .register(RouteSpec::new("write", Method::POST, "/x", Endpoint::ChatCompletions))
            .unwrap();

        assert_eq!(table.routes().len(), 2);
    }

    #[actix_web::test]
    async fn test_shared_path_dispatches_by_method_with_own_limits() {
        let h = harness();
        let mut table = RouteTable::new();
        table
            .register(
                RouteSpec::new("read", Method::GET, "/v1/things", Endpoint::ListModels)
                    .with_policy(RateLimitPolicy::new(1, Duration::from_secs(60), 1).ok()),
            )
            .unwrap();
        table
            .register(RouteSpec::new(
                "write",
                Method::POST,
                "/v1/things",
                Endpoint::ChatCompletions,
            ))
            .unwrap();
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        let res = actix_test::call_service(&app, get("/v1/things", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let res = actix_test::call_service(&app, get("/v1/things", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        // POST has no policy of its own, so the GET quota does not apply
        for _ in 0..3 {
            let req = actix_test::TestRequest::post()
                .uri("/v1/things")
                .insert_header(("Authorization", "Bearer sk-alice"))
                .set_json(json!({"model": "gpt-4o", "messages": []}))
                .to_request();
            let res = actix_test::call_service(&app, req).await;
            assert_eq!(res.status(), StatusCode::OK);
        }

        let req = actix_test::TestRequest::put()
            .uri("/v1/things")
            .insert_header(("Authorization", "Bearer sk-alice"))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(h.store.calls(), 2);
    }

    #[test]
    fn test_standard_table_limits_ai_routes_by_default() {
        let config = GatewayConfig::from_lookup(|_| None).unwrap();
        let table = RouteTable::standard(&config.rate_limit);

        assert_eq!(table.routes().len(), 3);
        let route = |id: &str| table.routes().iter().find(|r| r.id == id).unwrap();
        for id in STANDARD_ROUTE_IDS {
            assert_eq!(route(id).policy.map(|p| p.max_requests()), Some(60), "{id}");
        }
        assert_eq!(route(CHAT_COMPLETIONS).method, Method::POST);
    }

    #[actix_web::test]
    async fn test_standard_routes_enforce_default_limit() {
        let h = harness();
        let config = GatewayConfig::from_lookup(|key| {
            (key == "RATE_LIMIT_DEFAULT").then(|| "2,60,1".to_string())
        })
        .unwrap();
        let table = RouteTable::standard(&config.rate_limit);
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        for _ in 0..2 {
            let res = actix_test::call_service(&app, get("/openai/v1/models", Some("sk-alice")).to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
        }
        let res = actix_test::call_service(&app, get("/openai/v1/models", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn test_lists_models() {
        let h = harness();
        let table = table(five_per_second());
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        let res = actix_test::call_service(&app, get("/openai/v1/models", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "4");

        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["id"], "gpt-4o");
    }

    #[actix_web::test]
    async fn test_path_parameter_reaches_handler() {
        let h = harness();
        let table = table(five_per_second());
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        let res =
            actix_test::call_service(&app, get("/openai/v1/models/gpt-4o-mini", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["id"], "gpt-4o-mini");
    }

    #[actix_web::test]
    async fn test_unauthenticated_request_never_touches_counters() {
        let h = harness();
        let table = table(five_per_second());
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        for key in [None, Some("sk-wrong")] {
            let res = actix_test::call_service(&app, get("/openai/v1/models", key).to_request()).await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

            let body: serde_json::Value = actix_test::read_body_json(res).await;
            assert_eq!(body["error"]["type"], "authentication_error");
        }

        assert_eq!(h.store.calls(), 0);
        assert!(h.store.inner.is_empty().await);
    }

    #[actix_web::test]
    async fn test_sixth_request_in_a_second_is_limited() {
        let h = harness();
        let table = table(five_per_second());
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        for _ in 0..5 {
            let res = actix_test::call_service(&app, get("/openai/v1/models", Some("sk-alice")).to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
            h.clock.advance(Duration::from_millis(40));
        }

        let res = actix_test::call_service(&app, get("/openai/v1/models", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get("retry-after").unwrap(), "1");
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "0");
        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["error"]["code"], "rate_limit_exceeded");

        // another principal has its own quota
        let res = actix_test::call_service(&app, get("/openai/v1/models", Some("sk-bob")).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        // 1.1s after the first request
        h.clock.set(11_100);
        let res = actix_test::call_service(&app, get("/openai/v1/models", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_unlimited_route_skips_limiter() {
        let h = harness();
        let table = table(None);
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        for _ in 0..20 {
            let res = actix_test::call_service(&app, get("/openai/v1/models", Some("sk-alice")).to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
        }
        assert_eq!(h.store.calls(), 0);
    }

    #[actix_web::test]
    async fn test_unknown_path_is_not_found() {
        let h = harness();
        let table = table(five_per_second());
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        let res = actix_test::call_service(&app, get("/openai/v1/embeddings", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[actix_web::test]
    async fn test_wrong_method_is_not_allowed() {
        let h = harness();
        let table = table(five_per_second());
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        let res = actix_test::call_service(
            &app,
            get("/openai/v1/chat/completions", Some("sk-alice")).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["error"]["code"], "method_not_allowed");
        assert_eq!(h.store.calls(), 0);
    }

    #[actix_web::test]
    async fn test_backend_errors_are_propagated() {
        let h = harness();
        let table = table(None);
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        let res =
            actix_test::call_service(&app, get("/openai/v1/models/missing", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res =
            actix_test::call_service(&app, get("/openai/v1/models/overloaded", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["error"]["message"], "try later");

        let res =
            actix_test::call_service(&app, get("/openai/v1/models/unreachable", Some("sk-alice")).to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn test_chat_completion_records_usage() {
        let h = harness();
        let table = table(five_per_second());
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/openai/v1/chat/completions")
            .insert_header(("Authorization", "Bearer sk-alice"))
            .set_json(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hello there!"}],
                "temperature": 0.3
            }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["id"], "chatcmpl-1");

        let records = h.usage.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].predicted_tokens, 3);
        assert_eq!(records[0].total_tokens, 10);
        assert_eq!(records[0].finish_reason, FinishReason::Stop);
    }

    #[actix_web::test]
    async fn test_unknown_model_usage_does_not_affect_response() {
        let h = harness();
        let table = table(None);
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/openai/v1/chat/completions")
            .insert_header(("Authorization", "Bearer sk-bob"))
            .set_json(json!({"model": "not-in-catalog", "messages": []}))
            .to_request();
        let res = actix_test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert!(h.usage.records().await.is_empty());
    }

    #[actix_web::test]
    async fn test_streaming_and_malformed_bodies_are_rejected() {
        let h = harness();
        let table = table(None);
        let app = actix_test::init_service(
            App::new().configure(|cfg| table.configure(cfg, &h.state, &h.guards)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/openai/v1/chat/completions")
            .insert_header(("Authorization", "Bearer sk-alice"))
            .set_json(json!({"model": "gpt-4o", "messages": [], "stream": true}))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let req = actix_test::TestRequest::post()
            .uri("/openai/v1/chat/completions")
            .insert_header(("Authorization", "Bearer sk-alice"))
            .set_json(json!({"messages": []}))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }
}
