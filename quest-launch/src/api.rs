use crate::{
    campaign::CampaignSpec,
    progress::StepUpdate,
    saga::{LaunchFailure, LaunchOutcome, LaunchResult, LaunchSaga, LaunchState, Severity},
};
use log::info;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use actix_web::{
    body::BoxBody, error, http::StatusCode, web, App, Error, HttpRequest, HttpResponse, HttpServer,
    Responder, ResponseError,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiResult<T = ()> {
    pub code: i32,
    pub msg: Option<Cow<'static, str>>,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResult<T> {
    pub fn new() -> Self {
        Self {
            code: 200,
            msg: None,
            data: None,
        }
    }
    pub fn code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }
    pub fn with_msg<S: Into<Cow<'static, str>>>(mut self, msg: S) -> Self {
        self.msg = Some(msg.into());
        self
    }
    pub fn msg_as_str(&self) -> &str {
        self.msg.as_ref().map(|s| s.as_ref()).unwrap_or_default()
    }
    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }
    pub fn log_to_resp(&self, req: &HttpRequest) -> HttpResponse {
        self.log(req);
        self.to_resp()
    }
    pub fn log(&self, req: &HttpRequest) {
        info!(
            "{} \"{} {} {:?}\" {}",
            req.peer_addr().map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
            req.method(),
            req.uri(),
            req.version(),
            self.code
        );
    }
    pub fn to_resp(&self) -> HttpResponse {
        match serde_json::to_string(self) {
            Ok(json) => HttpResponse::Ok().content_type("application/json").body(json),
            Err(e) => Error::from(e).into(),
        }
    }
}

impl<T: Serialize> Default for ApiResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

use std::fmt::{self, Debug, Display};

impl<T: Debug + Serialize> Display for ApiResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type ApiError = ApiResult<()>;
impl<T: Debug + Serialize> ResponseError for ApiResult<T> {
    fn status_code(&self) -> StatusCode {
        StatusCode::OK
    }
    fn error_response(&self) -> HttpResponse {
        self.to_resp()
    }
}

impl<T: Serialize> Responder for ApiResult<T> {
    type Body = BoxBody;

    fn respond_to(self, req: &HttpRequest) -> HttpResponse {
        (&self).respond_to(req)
    }
}
impl<T: Serialize> Responder for &ApiResult<T> {
    type Body = BoxBody;

    fn respond_to(self, req: &HttpRequest) -> HttpResponse {
        self.log_to_resp(req)
    }
}

// return 200 all
pub fn json_error_handler<E>(err: E, req: &HttpRequest) -> error::Error
where
    E: std::fmt::Display + std::fmt::Debug + 'static,
{
    let detail = err.to_string();
    let api = ApiResult::new().with_data(()).code(400).with_msg(detail);
    let response = api.log_to_resp(req);

    error::InternalError::from_response(err, response).into()
}

pub async fn notfound(req: HttpRequest) -> Result<HttpResponse, Error> {
    let api = ApiResult::new().with_data(()).code(404).with_msg("route not found");

    Ok(api.respond_to(&req))
}

/// Body of launch and retry replies. On failure `state` carries whatever the
/// launch captured, a present `chainTxHash` means funds already moved.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LaunchReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<LaunchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<LaunchState>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub state: LaunchState,
    pub progress: Vec<StepUpdate>,
}

fn failure_code(failure: &LaunchFailure) -> i32 {
    match failure.error.severity() {
        Severity::Fatal => 400,
        Severity::Recoverable => 409,
        Severity::Inconsistent => 202,
    }
}

pub fn launch_reply(result: LaunchResult) -> ApiResult<LaunchReply> {
    match result {
        Ok(outcome) => ApiResult::new().with_data(LaunchReply {
            outcome: Some(outcome),
            severity: None,
            retryable: false,
            state: None,
        }),
        Err(failure) => ApiResult::new()
            .code(failure_code(&failure))
            .with_msg(failure.error.to_string())
            .with_data(LaunchReply {
                outcome: None,
                severity: Some(failure.error.severity()),
                retryable: failure.error.is_retryable(),
                state: failure.state,
            }),
    }
}

async fn launch(
    saga: web::Data<LaunchSaga>,
    spec: web::Json<CampaignSpec>,
) -> ApiResult<LaunchReply> {
    launch_reply(saga.run(&spec.into_inner()).await)
}

async fn retry(
    saga: web::Data<LaunchSaga>,
    campaign_id: web::Path<String>,
) -> ApiResult<LaunchReply> {
    launch_reply(saga.resume(&campaign_id.into_inner()).await)
}

async fn status(saga: web::Data<LaunchSaga>, key: web::Path<String>) -> ApiResult<StatusReply> {
    let key = key.into_inner();
    match saga.state(&key).await {
        Ok(Some(state)) => ApiResult::new().with_data(StatusReply {
            progress: saga.progress().history(&key),
            state,
        }),
        Ok(None) => ApiResult::new().code(404).with_msg(format!("no launch {}", key)),
        Err(e) => ApiResult::new().code(500).with_msg(e.to_string()),
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/launch", web::post().to(launch))
        .route("/launch/{campaign_id}/retry", web::post().to(retry))
        .route("/launch/{key}", web::get().to(status));
}

pub async fn serve(listen: &str, saga: LaunchSaga) -> std::io::Result<()> {
    info!("launch api listening on {}", listen);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(saga.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .configure(routes)
            .default_service(web::route().to(notfound))
    })
    .bind(listen)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saga::LaunchError;
    use actix_web::test;

    #[::core::prelude::v1::test]
    fn failure_reply_carries_severity() {
        let reply = launch_reply(Err(LaunchFailure {
            error: LaunchError::Finalization {
                chain_tx_hash: "0xabc".into(),
                message: "store down".into(),
            },
            state: None,
        }));
        assert_eq!(reply.code, 202);
        let data = reply.data.unwrap();
        assert_eq!(data.severity, Some(Severity::Inconsistent));
        assert!(data.retryable);
        assert!(reply.msg.unwrap().contains("0xabc"));
    }

    #[actix_web::test]
    async fn unknown_route_gets_envelope() {
        let app = test::init_service(App::new().default_service(web::route().to(notfound))).await;
        let req = test::TestRequest::get().uri("/nope").to_request();
        let resp: ApiResult<()> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.code, 404);
        assert_eq!(resp.msg_as_str(), "route not found");
    }
}
