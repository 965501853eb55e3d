//! HTTP surface: tracking pings, report downloads, and gated page access.

use axum::body::Body;
use axum::extract::{Form, FromRequestParts, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use services::{
    AccessDecision, AccessError, AccountError, AppServices, ProgressError, ReportError,
    TrackOutcome, TrackingServiceError,
};
use tracing::{error, warn};
use tutor_core::model::{Section, UserAccount, UserId, VideoTracking};

/// Header carrying the authenticated user id, set by the fronting proxy.
pub const USER_HEADER: &str = "x-user-id";

pub fn router(app: AppServices) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(index))
        .route("/accounts/logout/", get(logout))
        .route("/track/", post(track))
        .route("/report/", get(report))
        .route("/pages/:hierarchy/", get(page_root))
        .route("/pages/:hierarchy/*path", get(page))
        .with_state(app)
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "sign in required".to_owned()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_owned()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_owned(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::UnknownSection { .. } => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ProgressError> for ApiError {
    fn from(err: ProgressError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<TrackingServiceError> for ApiError {
    fn from(err: TrackingServiceError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

//
// ─── AUTH ──────────────────────────────────────────────────────────────────────
//

/// The signed-in account named by the `x-user-id` header.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserAccount);

#[axum::async_trait]
impl FromRequestParts<AppServices> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        app: &AppServices,
    ) -> Result<Self, Self::Rejection> {
        let id = user_id_from_headers(&parts.headers).ok_or(ApiError::Unauthorized)?;
        match app.accounts().get_user(id).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                warn!(user = %id, "unknown user id in request");
                Err(ApiError::Forbidden)
            }
        }
    }
}

fn user_id_from_headers(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(USER_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(_) => ApiError::Internal(format!("invalid redirect target {location:?}")).into_response(),
    }
}

//
// ─── HANDLERS ──────────────────────────────────────────────────────────────────
//

pub async fn health() -> impl IntoResponse {
    "OK"
}

/// Signed-in users go to their last location; everyone else gets the splash text.
pub async fn index(
    State(app): State<AppServices>,
    user: Option<CurrentUser>,
) -> Result<Response, ApiError> {
    match user {
        Some(CurrentUser(user)) => Ok(found(&app.access().landing(&user).await?)),
        None => Ok("videoanalytics".into_response()),
    }
}

pub async fn logout(
    State(app): State<AppServices>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    Ok(found(&app.access().logout_destination(&user).await?))
}

/// Raw form fields of a tracking ping. Missing or unparseable numbers count as zero.
#[derive(Debug, Default, Deserialize)]
pub struct TrackForm {
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub video_duration: String,
    #[serde(default)]
    pub seconds_viewed: String,
}

impl TrackForm {
    #[must_use]
    pub fn into_tracking(self) -> VideoTracking {
        VideoTracking {
            video_id: self.video_id.trim().to_owned(),
            video_duration: self.video_duration.trim().parse().unwrap_or(0),
            seconds_viewed: self.seconds_viewed.trim().parse().unwrap_or(0),
        }
    }
}

pub async fn track(
    State(app): State<AppServices>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<TrackForm>,
) -> Result<Json<TrackOutcome>, ApiError> {
    let outcome = app
        .tracker()
        .record_view(user.id, &form.into_tracking())
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Streams the requested report as a CSV attachment. Staff only.
pub async fn report(
    State(app): State<AppServices>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    if !user.is_staff && !user.is_superuser {
        return Err(ApiError::Forbidden);
    }
    let export = app.export_selected(query.kind.as_deref()).await?;
    let disposition = HeaderValue::from_str(&export.content_disposition())
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let content_type = HeaderValue::from_static(export.content_type());
    let body = Body::from_stream(export.into_byte_stream());
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, content_type), (CONTENT_DISPOSITION, disposition)],
        body,
    )
        .into_response())
}

/// What an allowed page request returns to the client.
#[derive(Debug, Serialize)]
pub struct PageView {
    pub hierarchy: String,
    pub section: Section,
    pub url: String,
    pub first_visit: DateTime<Utc>,
    pub last_visit: DateTime<Utc>,
}

pub async fn page_root(
    State(app): State<AppServices>,
    user: CurrentUser,
    Path(hierarchy): Path<String>,
) -> Result<Response, ApiError> {
    render_page(&app, &user.0, &hierarchy, "").await
}

pub async fn page(
    State(app): State<AppServices>,
    user: CurrentUser,
    Path((hierarchy, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    render_page(&app, &user.0, &hierarchy, &path).await
}

async fn render_page(
    app: &AppServices,
    user: &UserAccount,
    hierarchy: &str,
    path: &str,
) -> Result<Response, ApiError> {
    match app.access().check_section(user, hierarchy, path).await? {
        AccessDecision::Allowed {
            section,
            url,
            visit,
        } => Ok(Json(PageView {
            hierarchy: hierarchy.to_owned(),
            section,
            url,
            first_visit: visit.first_visit,
            last_visit: visit.last_visit,
        })
        .into_response()),
        AccessDecision::Redirect { location } => Ok(found(&location)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use storage::repository::{NewSectionRecord, NewUserRecord};
    use services::{AccessPolicy, Clock};
    use tutor_core::model::{BlockKind, QuizBlock, ResearchGroup, YouTubeBlock};
    use tutor_core::time::fixed_clock;

    async fn app_with_tree() -> AppServices {
        let app = AppServices::in_memory(fixed_clock(), AccessPolicy::default());
        let curriculum = &app.storage().curriculum;
        let h = curriculum.create_hierarchy("a", "/pages/a/").await.unwrap();
        let root = curriculum.sections(h.id).await.unwrap()[0].id;
        let mut ids = Vec::new();
        for slug in ["intro", "check", "outro"] {
            let id = curriculum
                .insert_section(NewSectionRecord {
                    hierarchy_id: h.id,
                    parent_id: Some(root),
                    slug: slug.into(),
                    label: slug.into(),
                })
                .await
                .unwrap();
            ids.push(id);
        }
        curriculum
            .insert_block(
                ids[0],
                BlockKind::YouTube(YouTubeBlock {
                    video_id: "vid1".into(),
                    title: "Intro".into(),
                }),
            )
            .await
            .unwrap();
        curriculum
            .insert_block(
                ids[1],
                BlockKind::Quiz(QuizBlock {
                    title: "Check".into(),
                    css_extra: String::new(),
                }),
            )
            .await
            .unwrap();
        app
    }

    async fn user(app: &AppServices, record: NewUserRecord) -> UserAccount {
        app.accounts().create_user(record).await.unwrap()
    }

    fn expect_err(result: Result<Response, ApiError>) -> ApiError {
        match result {
            Ok(response) => panic!("expected an error, got {}", response.status()),
            Err(err) => err,
        }
    }

    fn location(response: &Response) -> &str {
        response.headers()[LOCATION].to_str().unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn user_header_is_required_and_must_name_an_account() {
        let app = app_with_tree().await;
        let p1 = user(&app, NewUserRecord::participant("p1")).await;

        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();
        let err = CurrentUser::from_request_parts(&mut parts, &app)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));

        let (mut parts, ()) = Request::builder()
            .header(USER_HEADER, "999")
            .body(())
            .unwrap()
            .into_parts();
        let err = CurrentUser::from_request_parts(&mut parts, &app)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        let (mut parts, ()) = Request::builder()
            .header(USER_HEADER, p1.id.to_string())
            .body(())
            .unwrap()
            .into_parts();
        let CurrentUser(found) = CurrentUser::from_request_parts(&mut parts, &app)
            .await
            .unwrap();
        assert_eq!(found.id, p1.id);
    }

    #[test]
    fn tracking_form_treats_garbage_numbers_as_zero() {
        let tracking = TrackForm {
            video_id: " vid1 ".into(),
            video_duration: "abc".into(),
            seconds_viewed: "12".into(),
        }
        .into_tracking();
        assert_eq!(tracking.video_id, "vid1");
        assert_eq!(tracking.video_duration, 0);
        assert_eq!(tracking.seconds_viewed, 12);
    }

    #[tokio::test]
    async fn invalid_ping_reports_failure_without_an_error_status() {
        let app = app_with_tree().await;
        let p1 = user(&app, NewUserRecord::participant("p1")).await;
        let Json(outcome) = track(
            State(app.clone()),
            CurrentUser(p1.clone()),
            Form(TrackForm {
                video_id: "vid1".into(),
                video_duration: "0".into(),
                seconds_viewed: "5".into(),
            }),
        )
        .await
        .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.msg.as_deref(), Some("Invalid video duration"));
        assert!(app.tracker().view(p1.id, "vid1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn report_is_staff_only_and_served_as_attachment() {
        let app = app_with_tree().await;
        let p1 = user(&app, NewUserRecord::participant("p1")).await;
        let admin = user(&app, NewUserRecord::staff("admin")).await;

        let denied = expect_err(
            report(
                State(app.clone()),
                CurrentUser(p1),
                Query(ReportQuery::default()),
            )
            .await,
        );
        assert!(matches!(denied, ApiError::Forbidden));

        let response = report(
            State(app.clone()),
            CurrentUser(admin),
            Query(ReportQuery {
                kind: Some("values".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/csv");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"videoanalytics_values.csv\""
        );
        let text = body_text(response).await;
        assert!(text.starts_with("participant_id,percent_complete,last_access,time_spent,vid1,"));
        assert!(text.contains("\r\np1,0,,0,0,0\r\n"));
    }

    #[tokio::test]
    async fn report_without_a_type_is_metadata_named_key() {
        let app = app_with_tree().await;
        let admin = user(&app, NewUserRecord::staff("admin")).await;
        let response = report(State(app), CurrentUser(admin), Query(ReportQuery::default()))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"videoanalytics_key.csv\""
        );
        let text = body_text(response).await;
        assert!(text.starts_with("hierarchy,itemIdentifier,group,itemType,itemText\r\n"));
    }

    #[tokio::test]
    async fn locked_section_redirects_and_allowed_section_records_a_visit() {
        let app = app_with_tree().await;
        let p1 = user(&app, NewUserRecord::participant("p1")).await;

        let response = render_page(&app, &p1, "a", "outro").await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/pages/a/check/");

        let response = render_page(&app, &p1, "a", "intro/").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["url"], "/pages/a/intro/");
        assert_eq!(body["section"]["label"], "intro");

        let response = index(State(app.clone()), Some(CurrentUser(p1.clone())))
            .await
            .unwrap();
        assert_eq!(location(&response), "/pages/a/intro/");
    }

    #[tokio::test]
    async fn other_groups_tree_redirects_and_unknown_path_is_not_found() {
        let app = app_with_tree().await;
        let p1 = user(&app, NewUserRecord::participant("p1")).await;
        app.accounts()
            .assign_research_group(p1.id, ResearchGroup::new('b').unwrap())
            .await
            .unwrap();

        let err = expect_err(render_page(&app, &p1, "a", "missing").await);
        assert!(matches!(err, ApiError::NotFound(_)));

        // group b has no tree yet, so its members land on that tree's root
        let response = render_page(&app, &p1, "a", "intro").await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/pages/b/");

        let response = index(State(app.clone()), Some(CurrentUser(p1)))
            .await
            .unwrap();
        assert_eq!(location(&response), "/pages/b/");
    }

    #[tokio::test]
    async fn logout_sends_staff_home() {
        let app = AppServices::in_memory(Clock::system(), AccessPolicy::default());
        let admin = user(&app, NewUserRecord::staff("admin")).await;
        let response = logout(State(app), CurrentUser(admin)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");
    }
}
