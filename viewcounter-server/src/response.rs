use chrono::DateTime;
use chrono_tz::Tz;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ALLOW, CONTENT_TYPE, HeaderValue,
};
use hyper::{Response, StatusCode};
use log::error;
use serde::Serialize;

/// 허용 메소드 목록
const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// 조회수 응답 본문
///
/// 실패한 항목은 `null` 로 내려갑니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCountResponse {
    pub success: bool,
    pub total_views: Option<i64>,
    pub visitor_views: Option<i64>,
    pub most_recent_view_time: Option<String>,
    pub visitors_most_recent_view_time: Option<String>,
}

/// 응답용 시각 문자열 (RFC 3339, 기준 시간대 오프셋)
pub fn format_view_time(at: &DateTime<Tz>) -> String {
    at.to_rfc3339()
}

/// JSON 응답
pub fn json_response(body: &ViewCountResponse, origin: &HeaderValue) -> Response<Full<Bytes>> {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("응답 직렬화 실패: {e}");
            br#"{"success":false}"#.to_vec()
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    response
}

/// CORS preflight 응답
pub fn preflight_response(origin: &HeaderValue) -> Response<Full<Bytes>> {
    let mut response = empty_response(StatusCode::NO_CONTENT);
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// 허용되지 않은 메소드
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    let mut response = create_error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    response
}

/// 에러응답
pub fn create_error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_with_camel_case_keys() {
        let body = ViewCountResponse {
            success: true,
            total_views: Some(3),
            visitor_views: Some(1),
            most_recent_view_time: None,
            visitors_most_recent_view_time: None,
        };
        let json: serde_json::Value = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["totalViews"], 3);
        assert_eq!(json["visitorViews"], 1);
        assert!(json["mostRecentViewTime"].is_null());
        assert!(json["visitorsMostRecentViewTime"].is_null());
    }

    #[test]
    fn default_is_failed_and_absent() {
        let body = ViewCountResponse::default();
        assert!(!body.success);
        assert_eq!(body.total_views, None);
    }

    #[test]
    fn view_time_carries_helsinki_offset() {
        let summer = chrono_tz::Europe::Helsinki
            .with_ymd_and_hms(2021, 8, 22, 12, 0, 0)
            .unwrap();
        assert_eq!(format_view_time(&summer), "2021-08-22T12:00:00+03:00");

        let winter = chrono_tz::Europe::Helsinki
            .with_ymd_and_hms(2021, 1, 5, 8, 30, 0)
            .unwrap();
        assert_eq!(format_view_time(&winter), "2021-01-05T08:30:00+02:00");
    }

    #[test]
    fn json_response_has_cors_and_content_type() {
        let origin = HeaderValue::from_static("https://example.org");
        let response = json_response(&ViewCountResponse::default(), &origin);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.org");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }
}
