use lambda_http::{
    http::header::{HOST, USER_AGENT},
    request::RequestContext,
    Request, RequestExt,
};

const UNKNOWN: &str = "unknown";

/// What the notification email and the submission log record about the
/// client that posted the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    pub remote_address: String,
    pub user_agent: String,
    pub host: Option<String>,
}

impl RequestMetadata {
    pub fn from_request(request: &Request) -> Self {
        Self {
            remote_address: Self::source_ip(request)
                .or_else(|| Self::forwarded_for(request))
                .unwrap_or_else(|| UNKNOWN.into()),
            user_agent: Self::header(request, USER_AGENT.as_str())
                .unwrap_or_else(|| UNKNOWN.into()),
            host: Self::header(request, HOST.as_str()),
        }
    }

    fn source_ip(request: &Request) -> Option<String> {
        match request.request_context_ref()? {
            RequestContext::ApiGatewayV1(context) => context.identity.source_ip.clone(),
            RequestContext::ApiGatewayV2(context) => context.http.source_ip.clone(),
            _ => None,
        }
    }

    fn forwarded_for(request: &Request) -> Option<String> {
        let forwarded = Self::header(request, "x-forwarded-for")?;
        forwarded
            .split(',')
            .map(str::trim)
            .find(|address| !address.is_empty())
            .map(Into::into)
    }

    fn header(request: &Request, name: &str) -> Option<String> {
        let value = request.headers().get(name)?;
        let value = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
        (!value.is_empty()).then_some(value)
    }
}
