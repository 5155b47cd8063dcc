//! HTTP ingress.
//!
//! A single route, `POST /api/v1/pdf/url`. The handler checks the bearer
//! token before touching the body, parses and validates the request itself
//! (so malformed JSON gets the same response shape as field failures), and
//! hands the domain model to the use case.

use actix_web::http::header;
use actix_web::web::{self, Data};
use actix_web::{HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::Error;
use crate::generate::GeneratePdfUrl;
use crate::request::GeneratePdfUrlRequest;

pub struct AppState {
    pub generate: Arc<GeneratePdfUrl>,
    pub auth_secret: String,
}

/// Register the service routes on an actix app.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/v1/pdf/url").route(web::post().to(generate_pdf_url)),
    );
}

async fn generate_pdf_url(
    state: Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, Error> {
    check_bearer(&req, &state.auth_secret)?;

    let request: GeneratePdfUrlRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            log::debug!("rejected undecodable request body: {err}");
            return Ok(HttpResponse::BadRequest().json(json!({
                "message": "Could not validate request. Please, make sure all fields are of \
                            the correct type (E.g, ints are not strings) and that the request \
                            body is a valid JSON and try again.",
                "errors": [],
            })));
        }
    };

    let request = request.validated()?.into_model();
    let url = state.generate.execute(&request).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "PDF generated successfully",
        "url": url,
    })))
}

/// Validate `Authorization: Bearer <token>` against the shared secret. The
/// token comparison is constant time.
fn check_bearer(req: &HttpRequest, secret: &str) -> Result<(), Error> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::Auth("Authorization header is required".to_string()))?;

    let Some(token) = header.strip_prefix("Bearer ") else {
        return Err(Error::Auth(
            "Authorization header must start with 'Bearer'".to_string(),
        ));
    };

    if token.is_empty() {
        return Err(Error::Auth("Token cannot be empty".to_string()));
    }

    let matches: bool = token.as_bytes().ct_eq(secret.as_bytes()).into();
    if !matches {
        return Err(Error::Auth("Authorization token is wrong".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn request_with_auth(value: Option<&str>) -> HttpRequest {
        let mut req = TestRequest::post().uri("/api/v1/pdf/url");
        if let Some(value) = value {
            req = req.insert_header((header::AUTHORIZATION, value));
        }
        req.to_http_request()
    }

    #[test]
    fn missing_header_is_rejected() {
        let err = check_bearer(&request_with_auth(None), "secret").unwrap_err();
        assert!(err.to_string().contains("Authorization header is required"));
    }

    #[test]
    fn non_bearer_header_is_rejected() {
        let err = check_bearer(&request_with_auth(Some("Basic abc")), "secret").unwrap_err();
        assert!(err.to_string().contains("must start with 'Bearer'"));
    }

    #[test]
    fn empty_token_is_rejected() {
        let err = check_bearer(&request_with_auth(Some("Bearer ")), "secret").unwrap_err();
        assert!(err.to_string().contains("Token cannot be empty"));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let err = check_bearer(&request_with_auth(Some("Bearer nope")), "secret").unwrap_err();
        assert!(err.to_string().contains("Authorization token is wrong"));
    }

    #[test]
    fn matching_token_passes() {
        assert!(check_bearer(&request_with_auth(Some("Bearer secret")), "secret").is_ok());
    }
}
