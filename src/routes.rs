use std::sync::Arc;

use askama::Template;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::ingest::Ingestor;
use crate::models::{IngestReport, NewNews, NewsRecord};
use crate::news::NewsService;
use crate::Error;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

pub struct AppState {
    pub news: NewsService,
    pub ingestor: Arc<Ingestor>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/refresh", post(refresh))
        .route("/api/news", get(list_news).post(add_news))
        .route("/api/ingest", post(ingest))
        .route("/api/ingest/status", get(ingest_status))
        .route("/api/backup", get(backup))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A record prepared for display
pub struct NewsView {
    pub title: String,
    pub link: String,
    pub author: String,
    pub published: String,
}

impl From<&NewsRecord> for NewsView {
    fn from(record: &NewsRecord) -> Self {
        Self {
            title: record.title.clone(),
            link: record.link.clone(),
            author: record.author.clone(),
            published: record.pub_date.format(DISPLAY_FORMAT).to_string(),
        }
    }
}

// Template structs
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub news: Vec<NewsView>,
    pub total: i64,
    pub refreshing: bool,
}

#[derive(Template)]
#[template(path = "backup.html")]
pub struct BackupTemplate {
    pub date: String,
    pub news: Vec<NewsView>,
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

/// JSON error body with a status derived from the domain error
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self::new(err.status_code(), err.to_string())
    }
}

impl From<askama::Error> for AppError {
    fn from(err: askama::Error) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render template: {}", err),
        )
    }
}

#[derive(Serialize)]
pub struct NewsList {
    pub news: Vec<NewsRecord>,
}

// Route handlers
pub async fn index(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let records = state.news.list_news().await?;
    let total = state.news.store().count().await?;
    let refreshing = state.ingestor.is_running();

    Ok(HtmlTemplate(IndexTemplate {
        news: records.iter().map(NewsView::from).collect(),
        total,
        refreshing,
    }))
}

/// Form target on the index page: ingest, then back to the listing.
pub async fn refresh(State(state): State<Arc<AppState>>) -> Result<Redirect, AppError> {
    match state.ingestor.run().await {
        Ok(_) | Err(Error::IngestInProgress) => Ok(Redirect::to("/")),
        Err(e) => Err(e.into()),
    }
}

pub async fn list_news(State(state): State<Arc<AppState>>) -> Result<Json<NewsList>, AppError> {
    let news = state.news.list_news().await?;
    Ok(Json(NewsList { news }))
}

pub async fn add_news(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewNews>,
) -> Result<(StatusCode, Json<NewsRecord>), AppError> {
    let record = state.news.add_news(input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn ingest(State(state): State<Arc<AppState>>) -> Result<Json<IngestReport>, AppError> {
    let report = state.ingestor.run().await?;
    Ok(Json(report))
}

pub async fn ingest_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let running = state.ingestor.is_running();
    Json(json!({ "running": running }))
}

pub async fn backup(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let records = state.news.list_news().await?;
    if records.is_empty() {
        return Err(AppError::new(StatusCode::NOT_FOUND, "저장할 뉴스가 없습니다."));
    }

    let date = Utc::now().format("%Y-%m-%d").to_string();
    let html = BackupTemplate {
        date: date.clone(),
        news: records.iter().map(NewsView::from).collect(),
    }
    .render()?;

    info!("Rendered backup of {} records", records.len());
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"news-backup-{}.html\"", date),
            ),
        ],
        html,
    )
        .into_response())
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::fetcher::FeedFetcher;
    use crate::normalizer::Normalizer;
    use crate::store::{MemoryStore, NewsStore};
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// App wired to a feed URL nobody listens on; ingestion fails fast.
    fn create_test_app() -> (Router, NewsService) {
        let config = FeedConfig {
            url: "http://127.0.0.1:1/rss".to_string(),
            source: "서울경제".to_string(),
            user_agent: "Test/1.0".to_string(),
            timeout_secs: 2,
        };
        let store = NewsStore::new(Arc::new(MemoryStore::new()), "news");
        let news = NewsService::new(store.clone(), config.source.clone());
        let ingestor = Arc::new(Ingestor::new(
            FeedFetcher::new(&config).unwrap(),
            Normalizer::new(config.source.clone()),
            store,
        ));

        let state = Arc::new(AppState {
            news: news.clone(),
            ingestor,
        });
        (router(state), news)
    }

    async fn setup_test_data(news: &NewsService) {
        for (i, date) in ["2024-05-10T16:45:00Z", "2024-05-11T10:30:00Z", "2024-05-11T09:15:00Z"]
            .iter()
            .enumerate()
        {
            news.add_news(NewNews {
                title: Some(format!("Article {}", i)),
                author: Some("김기자".to_string()),
                link: Some(format!("https://www.sedaily.com/example{}", i)),
                pub_date: Some(date.to_string()),
                source: None,
            })
            .await
            .unwrap();
        }
    }

    async fn body_string(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let (app, _news) = create_test_app();

            let response = app
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, "OK");
        }
    }

    mod index_tests {
        use super::*;

        #[tokio::test]
        async fn test_index_empty() {
            let (app, _news) = create_test_app();

            let response = app
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_string(response).await.contains("표시할 뉴스가 없습니다"));
        }

        #[tokio::test]
        async fn test_index_lists_newest_first() {
            let (app, news) = create_test_app();
            setup_test_data(&news).await;

            let response = app
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let body = body_string(response).await;

            let newest = body.find("Article 1").unwrap();
            let middle = body.find("Article 2").unwrap();
            let oldest = body.find("Article 0").unwrap();
            assert!(newest < middle && middle < oldest);
            assert!(body.contains("2024-05-11 10:30"));
        }

        #[tokio::test]
        async fn test_index_escapes_titles() {
            let (app, news) = create_test_app();
            news.add_news(NewNews {
                title: Some("<script>alert(1)</script>".to_string()),
                author: Some("a".to_string()),
                link: Some("https://x/1".to_string()),
                ..NewNews::default()
            })
            .await
            .unwrap();

            let response = app
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let body = body_string(response).await;

            assert!(!body.contains("<script>alert(1)</script>"));
            assert!(body.contains("&lt;script&gt;"));
        }
    }

    mod api_news_tests {
        use super::*;

        #[tokio::test]
        async fn test_list_news_json() {
            let (app, news) = create_test_app();
            setup_test_data(&news).await;

            let response = app
                .oneshot(Request::builder().uri("/api/news").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
            let items = body["news"].as_array().unwrap();
            assert_eq!(items.len(), 3);
            assert_eq!(items[0]["title"], "Article 1");
            assert_eq!(items[0]["pubDate"], "2024-05-11T10:30:00.000Z");
        }

        #[tokio::test]
        async fn test_add_news_created() {
            let (app, news) = create_test_app();

            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/news",
                    r#"{"title":"삼성 발표","author":"노우리","link":"https://x/1","pubDate":"2024-05-11T10:30"}"#,
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::CREATED);
            let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(body["pubDate"], "2024-05-11T10:30:00.000Z");
            assert_eq!(body["source"], "서울경제");
            assert_eq!(news.store().count().await.unwrap(), 1);
        }

        #[tokio::test]
        async fn test_add_news_conflict() {
            let (app, news) = create_test_app();
            setup_test_data(&news).await;

            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/news",
                    r#"{"title":"Article 0","author":"x","link":"https://www.sedaily.com/example0"}"#,
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::CONFLICT);
            assert!(body_string(response).await.contains("error"));
            assert_eq!(news.store().count().await.unwrap(), 3);
        }

        #[tokio::test]
        async fn test_add_news_validation() {
            let (app, _news) = create_test_app();

            let response = app
                .oneshot(json_request("POST", "/api/news", r#"{"title":"only"}"#))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_string(response).await;
            assert!(body.contains("author"));
            assert!(body.contains("link"));
        }

        #[tokio::test]
        async fn test_add_news_script_link_rejected() {
            let (app, news) = create_test_app();

            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/news",
                    r#"{"title":"t","author":"a","link":"javascript:alert(document.cookie)"}"#,
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(news.list_news().await.unwrap().is_empty());
        }
    }

    mod ingest_tests {
        use super::*;

        #[tokio::test]
        async fn test_ingest_fetch_failure_is_bad_gateway() {
            let (app, _news) = create_test_app();

            let response = app
                .oneshot(json_request("POST", "/api/ingest", ""))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
            assert!(body_string(response).await.contains("Feed fetch failed"));
        }

        #[tokio::test]
        async fn test_ingest_status() {
            let (app, _news) = create_test_app();

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/api/ingest/status")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, r#"{"running":false}"#);
        }
    }

    mod backup_tests {
        use super::*;

        #[tokio::test]
        async fn test_backup_empty_is_not_found() {
            let (app, _news) = create_test_app();

            let response = app
                .oneshot(Request::builder().uri("/api/backup").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_backup_attachment() {
            let (app, news) = create_test_app();
            setup_test_data(&news).await;

            let response = app
                .oneshot(Request::builder().uri("/api/backup").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let disposition = response
                .headers()
                .get(header::CONTENT_DISPOSITION)
                .unwrap()
                .to_str()
                .unwrap()
                .to_string();
            assert!(disposition.starts_with("attachment; filename=\"news-backup-"));
            assert!(disposition.ends_with(".html\""));

            let body = body_string(response).await;
            assert!(body.contains("뉴스 백업"));
            assert!(body.contains("https://www.sedaily.com/example0"));
            assert!(body.contains("김기자"));
        }
    }
}
