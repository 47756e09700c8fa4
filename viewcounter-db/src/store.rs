use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use viewcounter_error::Result;

/// 조회 시각을 기록하고 보여주는 기준 시간대
pub const REFERENCE_ZONE: Tz = chrono_tz::Europe::Helsinki;

/// 기준 시간대의 현재 시각
#[must_use]
pub fn reference_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&REFERENCE_ZONE)
}

/// 저장된 조회 기록 한 건
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRecord {
    pub id: i64,
    pub ip_address: String,
    pub host_name: Option<String>,
    pub port: u16,
    pub viewed_at: DateTime<Tz>,
}

/// 조회 기록 저장소
///
/// 각 작업은 독립적으로 연결을 빌려 씁니다. 빈 결과(0, `None`)는 에러가 아닙니다.
#[async_trait]
pub trait ViewStore: Send + Sync {
    /// 테이블이 없으면 생성
    async fn ensure_schema(&self) -> Result<()>;

    /// 조회 기록 추가
    async fn record_view(&self, visitor_ip: &str, host: &str, port: u16) -> Result<ViewRecord>;

    /// 전체 조회수
    async fn total_view_count(&self) -> Result<i64>;

    /// 방문자 조회수
    async fn visitor_view_count(&self, visitor_ip: &str) -> Result<i64>;

    /// 가장 최근 조회 시각, `visitor_ip` 가 있으면 해당 방문자로 한정
    async fn most_recent_view_time(&self, visitor_ip: Option<&str>) -> Result<Option<DateTime<Tz>>>;
}
