//! 接口帮助函数

use actix_web::HttpResponse;
use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::HttpRequest;
use serde::Serialize;
use tracing::error;

use crate::errors::ClickTrailError;

#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
    pub code: &'a str,
}

/// 将业务错误转换为 JSON 错误响应
pub fn error_response(err: &ClickTrailError) -> HttpResponse {
    let status = err.http_status();
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ErrorBody {
            error: err.message(),
            code: err.code(),
        })
}

/// JSON 请求体解析失败时返回与业务校验一致的 400
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(&ClickTrailError::validation(err.to_string()));
    InternalError::from_response(err, response).into()
}

/// 查询参数解析失败时返回 400
pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(&ClickTrailError::validation(err.to_string()));
    InternalError::from_response(err, response).into()
}
