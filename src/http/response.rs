//! Mapping responder replies onto HTTP responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::request::RequestContext;
use crate::responder::PingReply;

impl IntoResponse for PingReply {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        if let Some(ctx) = self.context {
            response.extensions_mut().insert(RequestContext(ctx));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::Status;

    #[test]
    fn error_reply_uses_reason_phrase() {
        let reply = PingReply {
            status: Status::TooManyRequests,
            body: Status::TooManyRequests.reason().to_string(),
            context: None,
            message_id: None,
        };
        let response = reply.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.extensions().get::<RequestContext>().is_none());
    }
}
