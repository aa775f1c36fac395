use crate::validation::ValidationErrors;
use lambda_http::{
    http::{
        header::{ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
        StatusCode,
    },
    Body, Error, Response,
};
use serde::Serialize;

pub const ACCEPTED_MESSAGE: &str =
    "Thank you! Your message has been sent successfully. We'll get back to you soon.";
pub const CORRECTION_MESSAGE: &str = "Please correct the errors below";
pub const INVALID_METHOD_MESSAGE: &str = "Invalid request method";
pub const SEND_FAILED_MESSAGE: &str = "Failed to send email. Please try again later.";

/// The JSON body returned for every request. Failures are reported here and
/// never through the HTTP status.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub errors: ValidationErrors,
}

impl ApiResponse {
    pub fn accepted() -> Self {
        Self {
            success: true,
            message: ACCEPTED_MESSAGE.into(),
            errors: ValidationErrors::default(),
        }
    }

    pub fn rejected(errors: ValidationErrors) -> Self {
        Self {
            success: false,
            message: CORRECTION_MESSAGE.into(),
            errors,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: ValidationErrors::default(),
        }
    }

    pub fn into_http_response(self) -> Result<Response<Body>, Error> {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(ACCESS_CONTROL_ALLOW_METHODS, "POST")
            .body(serde_json::to_string(&self)?.into())?)
    }
}

#[cfg(test)]
mod tests {
    use super::ApiResponse;
    use googletest::prelude::*;
    use lambda_http::Body;

    #[googletest::test]
    fn serializes_empty_errors_as_object() -> Result<()> {
        verify_that!(
            serde_json::to_string(&ApiResponse::failed("Nope")),
            ok(eq(r#"{"success":false,"message":"Nope","errors":{}}"#))
        )
    }

    #[googletest::test]
    fn http_response_allows_any_origin() -> Result<()> {
        let response = ApiResponse::accepted().into_http_response().unwrap();

        expect_that!(response.status().as_u16(), eq(200));
        expect_that!(
            response.headers().get("Content-Type"),
            some(eq("application/json"))
        );
        expect_that!(
            response.headers().get("Access-Control-Allow-Origin"),
            some(eq("*"))
        );
        expect_that!(
            response.headers().get("Access-Control-Allow-Methods"),
            some(eq("POST"))
        );
        verify_that!(
            response.body(),
            points_to(matches_pattern!(Body::Text(contains_substring(
                "\"success\":true"
            ))))
        )
    }
}
