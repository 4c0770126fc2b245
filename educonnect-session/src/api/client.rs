//! EduConnect REST facade.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::models::{LoginRequest, LoginResponse, Page};
use crate::cache::{QueryCache, QueryKey};
use crate::config::SessionConfig;
use crate::credentials::{
    Credential, CredentialStore, FileCredentialStore, HttpTokenRenewer, RefreshCoordinator,
    SessionEvent, SessionEvents,
};
use crate::error::{ApiError, Result};
use crate::filter::{DEFAULT_ORDERING, FilterState, FilterStateController};
use crate::transport::{RequestDescriptor, TransportClient};
use crate::utils::http_client::build_http_client;

type ApiResult<T> = std::result::Result<T, ApiError>;

const PROFILE: &str = "auth/profile";
const COURSES: &str = "courses";
const SAVED_COURSES: &str = "saved-courses";
const UNIVERSITIES: &str = "universities";
const CHAT_SESSIONS: &str = "ai/chat/sessions";
const RECOMMENDATIONS: &str = "ai/recommendations";

/// Typed entry point to the catalog service.
///
/// Reads go through the shared [`QueryCache`]; mutations invalidate the
/// namespaces whose data they change. An [`ApiError::AuthExpired`] from any
/// call drops every cached result, since it belonged to the dead session.
pub struct CatalogClient {
    config: SessionConfig,
    transport: TransportClient,
    coordinator: Arc<RefreshCoordinator>,
    events: Arc<SessionEvents>,
    cache: QueryCache<Value>,
    filters: FilterStateController,
}

impl CatalogClient {
    /// Build a client whose credential persists in
    /// [`SessionConfig::credential_store_path`].
    pub async fn from_config(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let store = FileCredentialStore::open(&config.credential_store_path).await?;
        Self::with_store(config, Arc::new(store))
    }

    /// Build a client around an existing credential store.
    pub fn with_store(config: SessionConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let base_url = config.base_url()?;
        let http = build_http_client(config.request_timeout);

        let renewer = Arc::new(HttpTokenRenewer::new(http.clone(), &base_url)?);
        let events = Arc::new(SessionEvents::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            renewer,
            Arc::clone(&events),
        ));
        let transport = TransportClient::new(http, base_url, Arc::clone(&coordinator));
        let cache = QueryCache::with_stale_after(config.cache_stale_after);
        let filters =
            FilterStateController::with_state(FilterState::default(), config.search_debounce);

        info!(base_url = %transport.base_url(), "Catalog client ready");

        Ok(Self {
            config,
            transport,
            coordinator,
            events,
            cache,
            filters,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn cache(&self) -> &QueryCache<Value> {
        &self.cache
    }

    /// The course list filter state this client's UI works against.
    pub fn filter_controller(&self) -> &FilterStateController {
        &self.filters
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.coordinator.store().read().await.is_some()
    }

    // ========== Auth ==========

    /// Log in and install the returned credential. Returns the user document.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Value> {
        let descriptor = RequestDescriptor::post("auth/login/")
            .anonymous()
            .with_json(serde_json::to_value(LoginRequest { email, password })?);
        let response: LoginResponse = self.transport.send_json(&descriptor).await?;

        self.coordinator
            .install(&Credential::new(response.access, response.refresh))
            .await?;
        self.cache.clear();
        Ok(response.user)
    }

    pub async fn register(&self, user: Value) -> ApiResult<Value> {
        self.send(RequestDescriptor::post("auth/register/").anonymous().with_json(user))
            .await
    }

    /// Forget the credential and everything cached for the session.
    pub async fn logout(&self) -> Result<()> {
        self.coordinator.logout().await?;
        self.cache.clear();
        Ok(())
    }

    pub async fn profile(&self) -> ApiResult<Value> {
        self.cached(&QueryKey::new(PROFILE), RequestDescriptor::get("auth/profile/"), None)
            .await
    }

    pub async fn update_profile(&self, changes: Value) -> ApiResult<Value> {
        let updated = self
            .send(RequestDescriptor::patch("auth/profile/").with_json(changes))
            .await?;
        self.cache.invalidate(PROFILE);
        Ok(updated)
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> ApiResult<Value> {
        let body = json!({
            "current_password": current_password,
            "new_password": new_password,
            "new_password_confirm": new_password_confirm,
        });
        self.send(RequestDescriptor::post("auth/change-password/").with_json(body))
            .await
    }

    // ========== Courses ==========

    /// One page of the course list for `filters`.
    pub async fn courses(&self, filters: &FilterState) -> ApiResult<Page<Value>> {
        self.courses_with(filters, None).await
    }

    /// Like [`courses`](Self::courses), abandoned with [`ApiError::Cancelled`]
    /// once `cancel` fires (e.g. the filters changed again).
    pub async fn courses_cancellable(
        &self,
        filters: &FilterState,
        cancel: &CancellationToken,
    ) -> ApiResult<Page<Value>> {
        self.courses_with(filters, Some(cancel)).await
    }

    async fn courses_with(
        &self,
        filters: &FilterState,
        cancel: Option<&CancellationToken>,
    ) -> ApiResult<Page<Value>> {
        let key = filters.query_key();
        let mut params = key.query_pairs();
        if filters.ordering() == DEFAULT_ORDERING {
            params.push(("ordering".to_string(), DEFAULT_ORDERING.to_string()));
        }
        let descriptor = RequestDescriptor::get("courses/").with_query(params);
        decode(self.cached(&key, descriptor, cancel).await?)
    }

    pub async fn course(&self, id: u64) -> ApiResult<Value> {
        self.cached(
            &QueryKey::new(format!("{COURSES}/{id}")),
            RequestDescriptor::get(format!("courses/{id}/")),
            None,
        )
        .await
    }

    pub async fn popular_courses(&self) -> ApiResult<Value> {
        self.cached(&QueryKey::new("popular"), RequestDescriptor::get("popular/"), None)
            .await
    }

    pub async fn statistics(&self) -> ApiResult<Value> {
        self.cached(&QueryKey::new("statistics"), RequestDescriptor::get("statistics/"), None)
            .await
    }

    /// Side-by-side comparison. Not cached.
    pub async fn compare(&self, course_ids: &[u64]) -> ApiResult<Value> {
        self.send(RequestDescriptor::post("compare/").with_json(json!({ "course_ids": course_ids })))
            .await
    }

    pub async fn course_reviews(&self, course_id: u64) -> ApiResult<Page<Value>> {
        let body = self
            .cached(
                &QueryKey::new(format!("{COURSES}/{course_id}/reviews")),
                RequestDescriptor::get(format!("courses/{course_id}/reviews/")),
                None,
            )
            .await?;
        decode(body)
    }

    pub async fn add_review(
        &self,
        course_id: u64,
        review: Value,
    ) -> ApiResult<Value> {
        let created = self
            .send(RequestDescriptor::post(format!("courses/{course_id}/reviews/")).with_json(review))
            .await?;
        // Ratings feed into course lists and details as well.
        self.cache.invalidate(COURSES);
        Ok(created)
    }

    // ========== Universities ==========

    pub async fn universities<I, K, V>(&self, params: I) -> ApiResult<Page<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let key = params
            .into_iter()
            .fold(QueryKey::new(UNIVERSITIES), |key, (k, v)| key.param(k, v));
        let descriptor = RequestDescriptor::get("universities/").with_query(key.query_pairs());
        decode(self.cached(&key, descriptor, None).await?)
    }

    pub async fn university(&self, id: u64) -> ApiResult<Value> {
        self.cached(
            &QueryKey::new(format!("{UNIVERSITIES}/{id}")),
            RequestDescriptor::get(format!("universities/{id}/")),
            None,
        )
        .await
    }

    pub async fn featured_universities(&self) -> ApiResult<Value> {
        self.cached(
            &QueryKey::new("featured-universities"),
            RequestDescriptor::get("featured-universities/"),
            None,
        )
        .await
    }

    // ========== Saved courses ==========

    pub async fn saved_courses(&self) -> ApiResult<Page<Value>> {
        let body = self
            .cached(
                &QueryKey::new(SAVED_COURSES),
                RequestDescriptor::get("saved-courses/"),
                None,
            )
            .await?;
        decode(body)
    }

    pub async fn save_course(
        &self,
        course_id: u64,
        notes: Option<&str>,
    ) -> ApiResult<Value> {
        let descriptor = RequestDescriptor::post("saved-courses/")
            .with_json(json!({ "course_id": course_id, "notes": notes }));
        let saved = self.send(descriptor).await?;
        self.invalidate_saved();
        Ok(saved)
    }

    pub async fn update_saved_course(
        &self,
        id: u64,
        notes: &str,
    ) -> ApiResult<Value> {
        let descriptor =
            RequestDescriptor::patch(format!("saved-courses/{id}/")).with_json(json!({ "notes": notes }));
        let updated = self.send(descriptor).await?;
        self.invalidate_saved();
        Ok(updated)
    }

    pub async fn unsave_course(&self, id: u64) -> ApiResult<()> {
        self.send(RequestDescriptor::delete(format!("saved-courses/{id}/")))
            .await?;
        self.invalidate_saved();
        Ok(())
    }

    /// Course documents carry an `is_saved` flag, so both namespaces go.
    fn invalidate_saved(&self) {
        self.cache.invalidate(SAVED_COURSES);
        self.cache.invalidate(COURSES);
    }

    // ========== AI assistant ==========

    /// Natural-language search. Results are never cached.
    pub async fn smart_search(
        &self,
        query: &str,
        filters: Option<&FilterState>,
    ) -> ApiResult<Value> {
        let filters = filters.map(|state| {
            state
                .to_query_pairs()
                .into_iter()
                .map(|(name, value)| (name.to_string(), Value::String(value)))
                .collect::<Map<_, _>>()
        });
        self.send(
            RequestDescriptor::post("ai/search/smart/")
                .with_json(json!({ "query": query, "filters": filters })),
        )
        .await
    }

    pub async fn chat_query(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> ApiResult<Value> {
        let reply = self
            .send(
                RequestDescriptor::post("ai/chat/query/")
                    .with_json(json!({ "message": message, "session_id": session_id })),
            )
            .await?;
        self.cache.invalidate(CHAT_SESSIONS);
        Ok(reply)
    }

    pub async fn chat_sessions(&self) -> ApiResult<Page<Value>> {
        let body = self
            .cached(
                &QueryKey::new(CHAT_SESSIONS),
                RequestDescriptor::get("ai/chat/sessions/"),
                None,
            )
            .await?;
        decode(body)
    }

    pub async fn chat_session(&self, session_id: &str) -> ApiResult<Value> {
        self.cached(
            &QueryKey::new(format!("{CHAT_SESSIONS}/{session_id}")),
            RequestDescriptor::get(format!("ai/chat/sessions/{session_id}/")),
            None,
        )
        .await
    }

    pub async fn recommendations(&self) -> ApiResult<Page<Value>> {
        let body = self
            .cached(
                &QueryKey::new(RECOMMENDATIONS),
                RequestDescriptor::get("ai/recommendations/"),
                None,
            )
            .await?;
        decode(body)
    }

    pub async fn generate_recommendations(&self) -> ApiResult<Value> {
        let generated = self
            .send(RequestDescriptor::post("ai/recommendations/generate/"))
            .await?;
        self.cache.invalidate(RECOMMENDATIONS);
        Ok(generated)
    }

    pub async fn dismiss_recommendation(&self, id: u64) -> ApiResult<Value> {
        let dismissed = self
            .send(RequestDescriptor::post(format!(
                "ai/recommendations/{id}/dismiss/"
            )))
            .await?;
        self.cache.invalidate(RECOMMENDATIONS);
        Ok(dismissed)
    }

    // ========== Plumbing ==========

    async fn send(&self, descriptor: RequestDescriptor) -> ApiResult<Value> {
        self.send_with(descriptor, None).await
    }

    async fn send_with(
        &self,
        descriptor: RequestDescriptor,
        cancel: Option<&CancellationToken>,
    ) -> ApiResult<Value> {
        let result = match cancel {
            Some(cancel) => self.transport.send_cancellable(&descriptor, cancel).await,
            None => self.transport.send(&descriptor).await,
        };

        match result {
            Ok(response) => Ok(response.body),
            Err(ApiError::AuthExpired) => {
                debug!("Session ended; dropping cached results");
                self.cache.clear();
                Err(ApiError::AuthExpired)
            }
            Err(e) => Err(e),
        }
    }

    async fn cached(
        &self,
        key: &QueryKey,
        descriptor: RequestDescriptor,
        cancel: Option<&CancellationToken>,
    ) -> ApiResult<Value> {
        self.cache
            .fetch(key, move || self.send_with(descriptor, cancel))
            .await
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))
}
