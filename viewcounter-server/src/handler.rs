use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use log::{debug, error, warn};

use viewcounter_db::ViewStore;
use viewcounter_error::{ErrorKind, Result, ViewCounterError};

use crate::response::{
    ViewCountResponse, create_error_response, format_view_time, json_response,
    method_not_allowed, preflight_response,
};
use crate::state::AppState;
use crate::visitor::VisitorIdentity;

/// 요청 핸들러
///
/// 본문은 쓰지 않으므로 본문 타입과 무관하게 동작합니다.
pub async fn handle_request<B>(
    req: Request<B>,
    peer: SocketAddr,
    state: AppState,
) -> Result<Response<Full<Bytes>>> {
    debug!("incoming: {} {} ({peer})", req.method(), req.uri());

    if req.uri().path() != state.config.path {
        return Ok(create_error_response(StatusCode::NOT_FOUND, "Not found"));
    }

    if *req.method() == Method::OPTIONS {
        return Ok(preflight_response(&state.allowed_origin));
    }
    if *req.method() != Method::POST {
        return Ok(method_not_allowed());
    }

    let visitor = VisitorIdentity::from_request(req.headers(), peer);
    let body = count_view(state.store.as_ref(), &visitor).await;
    Ok(json_response(&body, &state.allowed_origin))
}

/// 조회 한 건을 기록하고 집계를 모음
///
/// 최근 조회 시각은 기록 전에 읽으므로 이번 방문 직전의 시각입니다. 단계별
/// 실패는 해당 항목만 비우고 나머지는 계속 채웁니다.
pub async fn count_view(store: &dyn ViewStore, visitor: &VisitorIdentity) -> ViewCountResponse {
    let mut response = ViewCountResponse::default();

    if let Err(e) = ensure_schema_with_retry(store).await {
        report_failure("테이블 확인", &e);
        return response;
    }

    let mut success = true;

    response.most_recent_view_time = settle(
        "최근 조회 시각",
        store.most_recent_view_time(None).await,
        &mut success,
    )
    .flatten()
    .map(|at| format_view_time(&at));

    response.visitors_most_recent_view_time = settle(
        "방문자 최근 조회 시각",
        store.most_recent_view_time(Some(&visitor.ip)).await,
        &mut success,
    )
    .flatten()
    .map(|at| format_view_time(&at));

    if let Some(record) = settle(
        "조회 기록",
        store
            .record_view(&visitor.ip, &visitor.host, visitor.port)
            .await,
        &mut success,
    ) {
        debug!("조회 기록 완료: id={}", record.id);
    }

    response.total_views = settle("전체 조회수", store.total_view_count().await, &mut success);
    response.visitor_views = settle(
        "방문자 조회수",
        store.visitor_view_count(&visitor.ip).await,
        &mut success,
    );

    response.success = success;
    response
}

/// 테이블 확인, 재시도 가능한 실패면 한 번 더 시도
async fn ensure_schema_with_retry(store: &dyn ViewStore) -> Result<()> {
    match store.ensure_schema().await {
        Ok(()) => Ok(()),
        Err(e) if e.kind().is_retryable() => {
            warn!("테이블 확인 실패, 한 번 재시도: {e}");
            store.ensure_schema().await
        }
        Err(e) => Err(e),
    }
}

fn settle<T>(stage: &str, result: Result<T>, success: &mut bool) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            report_failure(stage, &e);
            *success = false;
            None
        }
    }
}

/// 단계별 실패 로그
fn report_failure(stage: &str, err: &ViewCounterError) {
    match err.kind() {
        ErrorKind::Configuration => error!("{stage} 실패, 설정 확인 필요: {err}"),
        ErrorKind::ConnectionTimeout => warn!("{stage} 실패, 데이터베이스 응답 없음: {err}"),
        ErrorKind::Schema => error!("{stage} 실패, 테이블 생성 불가: {err}"),
        ErrorKind::Record => error!("{stage} 실패, 조회수는 증가하지 않음: {err}"),
        ErrorKind::Query => error!("{stage} 실패, 해당 항목 생략: {err}"),
        ErrorKind::Io => error!("{stage} 실패: {err}"),
    }
}
