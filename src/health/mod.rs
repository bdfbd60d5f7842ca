//! Liveness endpoints.
//!
//! `/healthz` and `/ping` answer as long as the process can serve requests.
//! They sit in the public tier and never touch a collaborator.

use axum::response::IntoResponse;

use crate::routing::handler::{self, Handler};

pub fn healthz() -> Handler {
    handler::from_fn(|_request| async { "ok".into_response() })
}

pub fn ping() -> Handler {
    handler::from_fn(|_request| async { "pong".into_response() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_liveness_bodies() {
        for (handler, expected) in [(healthz(), "ok"), (ping(), "pong")] {
            let response = handler
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert_eq!(&body[..], expected.as_bytes());
        }
    }
}
