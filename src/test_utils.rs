//! Test doubles and an in-process fixture for exercising the HTTP surface.
//!
//! `TestFixture` wires the real router to:
//! - a wiremock server standing in for the upstream OpenID Connect provider
//! - `MemoryDirectory` / `MemoryRefreshTokenStore` instead of Postgres
//! - `MemoryCache` instead of Valkey
//!
//! ```rust,ignore
//! let fixture = TestFixture::new().await;
//! let tokens = fixture.login("ext-1").await;
//! let response = fixture.post_form("/token", &[("grant_type", "refresh_token"), ...]).await;
//! response.assert_status(StatusCode::OK);
//! ```
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use josekit::jwk::Jwk;
use josekit::jwk::alg::ec::{EcCurve, EcKeyPair};
use josekit::jws::{ES256, JwsHeader};
use josekit::jwt::{self, JwtPayload};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, header as header_eq, method, path};
use wiremock::{Match, Mock, MockServer, ResponseTemplate};

use crate::api;
use crate::config::ProviderConfig;
use crate::middleware;
use crate::repos::client_repo::ClientRow;
use crate::repos::error::{RepoError, RepoResult};
use crate::repos::service_repo::ServiceRow;
use crate::repos::user_repo::{NewUser, PermissionRow, UserRow};
use crate::services::auth::refresh_ledger::RefreshTokenStore;
use crate::services::auth::scope;
use crate::services::auth::state_store::code_challenge;
use crate::services::auth::{Directory, Principal};
use crate::services::cache::memory::MemoryCache;
use crate::services::keys::KeyManager;
use crate::services::oidc::ExternalProvider;
use crate::state::{AppState, StateSettings};

pub const PROVIDER_CLIENT_ID: &str = "ums-test";
pub const PROVIDER_CLIENT_SECRET: &str = "provider-secret";
pub const CLIENT_REDIRECT_URI: &str = "http://localhost:3000/callback";

/// Fresh key material on every call.
pub fn test_keys() -> Arc<KeyManager> {
    let signing = EcKeyPair::generate(EcCurve::P256).unwrap();
    let encryption = EcKeyPair::generate(EcCurve::P256).unwrap();
    Arc::new(
        KeyManager::from_pem(
            &signing.to_traditional_pem_private_key(),
            &encryption.to_traditional_pem_private_key(),
        )
        .unwrap(),
    )
}

pub fn test_user(external_id: &str, is_admin: bool, disabled: bool) -> UserRow {
    UserRow {
        id: Uuid::new_v4(),
        external_identifier: external_id.to_string(),
        name: "Test User".to_string(),
        username: "test".to_string(),
        email: "test@example.org".to_string(),
        disabled,
        is_admin,
    }
}

pub fn test_principal(scopes: &[&str], is_admin: bool) -> Principal {
    let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
    Principal::User {
        user: test_user("ext-test", is_admin, false),
        permissions: scope::group(&scopes),
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DirectoryData {
    users: Vec<UserRow>,
    grants: Vec<(Uuid, PermissionRow)>,
    services: Vec<ServiceRow>,
    clients: Vec<ClientRow>,
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    data: Mutex<DirectoryData>,
}

impl MemoryDirectory {
    /// alpha (read, write), beta (read, write, delete) and user-management.
    pub fn with_catalog() -> Self {
        let directory = Self::default();
        {
            let mut data = directory.data.lock().unwrap();
            for (name, levels) in [
                ("alpha", &["read", "write"][..]),
                ("beta", &["read", "write", "delete"][..]),
                ("user-management", &["read", "write", "delete"][..]),
            ] {
                data.services.push(ServiceRow {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    description: None,
                    supported_scope_levels: levels.iter().map(|l| l.to_string()).collect(),
                });
            }
        }
        directory
    }

    pub fn insert_user(&self, external_id: &str, is_admin: bool, disabled: bool) -> UserRow {
        let user = test_user(external_id, is_admin, disabled);
        self.data.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn grant(&self, user_id: Uuid, service: &str, level: &str) {
        self.data.lock().unwrap().grants.push((
            user_id,
            PermissionRow {
                service: service.to_string(),
                scope_level: level.to_string(),
            },
        ));
    }

    pub fn set_disabled(&self, user_id: Uuid, disabled: bool) {
        let mut data = self.data.lock().unwrap();
        if let Some(user) = data.users.iter_mut().find(|u| u.id == user_id) {
            user.disabled = disabled;
        }
    }

    pub fn user_count(&self) -> usize {
        self.data.lock().unwrap().users.len()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn user_by_external_id(&self, external_id: &str) -> RepoResult<Option<UserRow>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .users
            .iter()
            .find(|u| u.external_identifier == external_id)
            .cloned())
    }

    async fn user_by_id(&self, id: Uuid) -> RepoResult<Option<UserRow>> {
        let data = self.data.lock().unwrap();
        Ok(data.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, user: NewUser<'_>) -> RepoResult<UserRow> {
        let mut data = self.data.lock().unwrap();
        if data
            .users
            .iter()
            .any(|u| u.external_identifier == user.external_identifier)
        {
            return Err(RepoError::Conflict);
        }
        let row = UserRow {
            id: Uuid::new_v4(),
            external_identifier: user.external_identifier.to_string(),
            name: user.name.to_string(),
            username: user.username.to_string(),
            email: user.email.to_string(),
            disabled: false,
            is_admin: false,
        };
        data.users.push(row.clone());
        Ok(row)
    }

    async fn user_permissions(&self, user_id: Uuid) -> RepoResult<Vec<PermissionRow>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .grants
            .iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn assign_permissions(&self, user_id: Uuid, grants: &[PermissionRow]) -> RepoResult<()> {
        let mut data = self.data.lock().unwrap();
        for grant in grants {
            let known = data.grants.iter().any(|(id, row)| {
                *id == user_id
                    && row.service == grant.service
                    && row.scope_level == grant.scope_level
            });
            if !known {
                data.grants.push((user_id, grant.clone()));
            }
        }
        Ok(())
    }

    async fn services(&self) -> RepoResult<Vec<ServiceRow>> {
        Ok(self.data.lock().unwrap().services.clone())
    }

    async fn client_by_id(&self, id: Uuid) -> RepoResult<Option<ClientRow>> {
        let data = self.data.lock().unwrap();
        Ok(data.clients.iter().find(|c| c.id == id).cloned())
    }

    async fn create_client(
        &self,
        description: &str,
        contact_name: &str,
        contact_email: &str,
    ) -> RepoResult<ClientRow> {
        let row = ClientRow {
            id: Uuid::new_v4(),
            description: description.to_string(),
            contact_name: contact_name.to_string(),
            contact_email: contact_email.to_string(),
            created_at: Utc::now(),
        };
        self.data.lock().unwrap().clients.push(row.clone());
        Ok(row)
    }

    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Refresh token ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    rows: Mutex<HashMap<String, DateTime<Utc>>>,
    failing: AtomicBool,
}

impl MemoryRefreshTokenStore {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Make every insert fail, as an unreachable database would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn insert(&self, jti: &str, expires_at: DateTime<Utc>) -> RepoResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Db(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(jti) {
            return Err(RepoError::Conflict);
        }
        rows.insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn take_alive(&self, jti: &str, now: DateTime<Utc>) -> RepoResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get(jti) {
            Some(expires_at) if *expires_at > now => {
                rows.remove(jti);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, jti: &str) -> RepoResult<u64> {
        Ok(self.rows.lock().unwrap().remove(jti).map_or(0, |_| 1))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, expires_at| *expires_at > now);
        Ok((before - rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Upstream provider
// ---------------------------------------------------------------------------

/// Matches a token request whose `code_verifier` hashes to `challenge`.
struct PkceVerifierMatches(String);

impl Match for PkceVerifierMatches {
    fn matches(&self, request: &wiremock::Request) -> bool {
        url::form_urlencoded::parse(&request.body)
            .find(|(k, _)| k == "code_verifier")
            .is_some_and(|(_, verifier)| code_challenge(&verifier) == self.0)
    }
}

pub struct ProviderMock {
    pub server: MockServer,
    key: EcKeyPair,
    kid: String,
}

impl ProviderMock {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let key = EcKeyPair::generate(EcCurve::P256).unwrap();
        let kid = "provider-key-1".to_string();
        let mock = Self { server, key, kid };

        let base = mock.server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/token"),
                "userinfo_endpoint": format!("{base}/userinfo"),
                "jwks_uri": format!("{base}/jwks"),
            })))
            .mount(&mock.server)
            .await;

        let mut public: Jwk = mock.key.to_jwk_public_key();
        public.set_key_id(&mock.kid);
        public.set_key_use("sig");
        public.set_algorithm("ES256");
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "keys": [Value::Object(public.as_ref().clone())] })),
            )
            .mount(&mock.server)
            .await;

        mock
    }

    pub fn config(&self) -> ProviderConfig {
        ProviderConfig {
            issuer: self.server.uri(),
            client_id: PROVIDER_CLIENT_ID.to_string(),
            client_secret: PROVIDER_CLIENT_SECRET.to_string(),
            redirect_uri: CLIENT_REDIRECT_URI.to_string(),
        }
    }

    pub fn id_token(&self, subject: &str) -> String {
        let mut header = JwsHeader::new();
        header.set_token_type("JWT");
        header.set_key_id(&self.kid);

        let now = SystemTime::now();
        let mut payload = JwtPayload::new();
        payload.set_issuer(self.server.uri());
        payload.set_subject(subject);
        payload.set_audience(vec![PROVIDER_CLIENT_ID]);
        payload.set_issued_at(&now);
        payload.set_expires_at(&(now + Duration::from_secs(300)));

        let signer = ES256.signer_from_jwk(&self.key.to_jwk_key_pair()).unwrap();
        jwt::encode_with_signer(&payload, &header, &signer).unwrap()
    }

    /// Accept `code` once PKCE checks out, answering for `subject`.
    pub async fn expect_code(&self, code: &str, code_challenge: &str, subject: &str) {
        let upstream_access = format!("upstream-{code}");
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(format!("code={code}&")))
            .and(body_string_contains(format!("client_secret={PROVIDER_CLIENT_SECRET}")))
            .and(PkceVerifierMatches(code_challenge.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": upstream_access,
                "token_type": "Bearer",
                "id_token": self.id_token(subject),
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header_eq("authorization", format!("Bearer {upstream_access}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": subject,
                "preferred_username": format!("user-{subject}"),
                "name": "Jane Doe",
                "email": "jane@example.org",
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn reject_code(&self, code: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(format!("code={code}&")))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
            )
            .mount(&self.server)
            .await;
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

pub struct TestFixture {
    pub app: Router,
    pub state: AppState,
    pub provider: ProviderMock,
    pub directory: Arc<MemoryDirectory>,
    pub refresh_store: Arc<MemoryRefreshTokenStore>,
}

impl TestFixture {
    pub async fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();

        let provider = ProviderMock::start().await;
        let external = ExternalProvider::discover(&provider.config()).await.unwrap();

        let directory = Arc::new(MemoryDirectory::with_catalog());
        let refresh_store = Arc::new(MemoryRefreshTokenStore::default());
        let state = AppState::new(
            test_keys(),
            Arc::new(external),
            directory.clone(),
            Arc::new(MemoryCache::new()),
            refresh_store.clone(),
            StateSettings {
                access_token_ttl: Duration::from_secs(900),
                refresh_token_ttl: Duration::from_secs(43_200),
                public_base_url: None,
            },
        );

        let app = Router::new()
            .merge(api::routes(state.clone()))
            .with_state(state.clone());
        let app = middleware::http::apply(middleware::security_headers::apply(app));

        Self {
            app,
            state,
            provider,
            directory,
            refresh_store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_ref())
            .header(header::HOST, "ums.test")
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post_form(&self, uri: impl AsRef<str>, fields: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri.as_ref())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        bearer: Option<&str>,
    ) -> TestResponse {
        self.send_json(Method::POST, uri, body, bearer).await
    }

    pub async fn patch_json<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        bearer: Option<&str>,
    ) -> TestResponse {
        self.send_json(Method::PATCH, uri, body, bearer).await
    }

    pub async fn get_authorized(&self, uri: impl AsRef<str>, bearer: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_ref())
            .header(header::HOST, "ums.test")
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn send_json<T: Serialize>(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        body: &T,
        bearer: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap();
        self.send(request).await
    }

    /// GET /login and pull `state` and the PKCE challenge out of the redirect.
    pub async fn begin_login(&self) -> (String, String) {
        let response = self
            .get(format!("/login?redirect_uri={CLIENT_REDIRECT_URI}"))
            .await;
        response.assert_status(StatusCode::FOUND);

        let location = url::Url::parse(&response.location()).unwrap();
        let param = |name: &str| {
            location
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };
        (param("state"), param("code_challenge"))
    }

    /// Whole authorization-code flow for `subject`; returns the `/token` response.
    pub async fn login(&self, subject: &str) -> TestResponse {
        let (state, challenge) = self.begin_login().await;
        let code = format!("code-{}", Uuid::new_v4().simple());
        self.provider.expect_code(&code, &challenge, subject).await;

        let redirect = self
            .get(format!("/callback?code={code}&state={state}"))
            .await;
        redirect.assert_status(StatusCode::SEE_OTHER);

        self.get(format!("/{}", redirect.location())).await
    }

    pub fn access_token_for(&self, principal: &Principal) -> String {
        self.state
            .issuer
            .issue_access_token(principal, &principal.scopes())
            .unwrap()
            .token
    }

    /// Access token for a directory user with its current permissions.
    pub async fn bearer_for_user(&self, user: &UserRow) -> String {
        let principal = self
            .state
            .resolver
            .resolve_subject(&user.id.to_string())
            .await
            .unwrap();
        self.access_token_for(&principal)
    }
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    #[track_caller]
    pub fn assert_status(&self, expected: StatusCode) {
        assert_eq!(
            self.status,
            expected,
            "unexpected status, body: {}",
            String::from_utf8_lossy(&self.body)
        );
    }

    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn json_value(&self) -> Value {
        self.json()
    }

    pub fn location(&self) -> String {
        self.headers
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    /// `title` of a problem body.
    pub fn problem_title(&self) -> String {
        self.json_value()["title"].as_str().unwrap_or_default().to_string()
    }
}
