//! Static file serving for the public directory.

use std::path::Path;

use axum::{
    Router,
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tower_http::services::ServeDir;
use tracing::debug;

/// Serve `public_dir`, hiding every path with a dot-prefixed segment.
pub fn router(public_dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(public_dir))
        .layer(middleware::from_fn(hide_dotfiles))
}

async fn hide_dotfiles(request: Request, next: Next) -> Response {
    if is_hidden(request.uri().path()) {
        debug!(path = %request.uri().path(), "Refusing to serve hidden path");
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

/// Percent-encoded dots count; `ServeDir` decodes them.
fn is_hidden(path: &str) -> bool {
    path.split('/').any(|segment| {
        segment.starts_with('.')
            || segment
                .get(..3)
                .is_some_and(|head| head.eq_ignore_ascii_case("%2e"))
    })
}

#[cfg(test)]
mod tests {
    use super::is_hidden;
    use crate::storage::STAGING_PREFIX;
    use crate::test_utils::{create_test_app, create_test_config};
    use axum::http::StatusCode;
    use tempfile::TempDir;

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden("/uploads/profile-photos/.incoming-1234"));
        assert!(is_hidden("/.env"));
        assert!(is_hidden("/uploads/%2Eincoming-1"));
        assert!(is_hidden("/uploads/%2eincoming-1"));
        assert!(!is_hidden("/uploads/profile-photos/42-1700000000000.jpg"));
        assert!(!is_hidden("/"));
        assert!(!is_hidden("/index.html"));
    }

    #[tokio::test]
    async fn test_staging_files_are_not_served() {
        let tmp = TempDir::new().unwrap();
        let config = create_test_config(tmp.path());
        let upload_dir = config.upload_dir();
        let server = create_test_app(config).await;

        let staging = format!("{STAGING_PREFIX}in-flight");
        std::fs::write(upload_dir.join(&staging), b"half an upload").unwrap();
        std::fs::write(upload_dir.join("1-1.png"), b"done").unwrap();

        server
            .get(&format!("/uploads/profile-photos/{staging}"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get("/uploads/profile-photos/%2Eincoming-in-flight")
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let served = server.get("/uploads/profile-photos/1-1.png").await;
        served.assert_status(StatusCode::OK);
        assert_eq!(served.as_bytes().as_ref(), b"done");
    }
}
