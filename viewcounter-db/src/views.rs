use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{debug, error};
use tokio_postgres::Row;

use viewcounter_error::{ErrorKind, Result, ViewCounterError, record_err};

use crate::lease::LeasedConnection;
use crate::pool::DatabasePool;
use crate::schema;
use crate::sql::views::{self as sql, HOST_NAME_MAX_LEN, IP_ADDRESS_MAX_LEN};
use crate::store::{REFERENCE_ZONE, ViewRecord, ViewStore, reference_now};

/// PostgreSQL 조회 기록 저장소
#[derive(Clone)]
pub struct ViewRepository {
    pool: DatabasePool,
}

impl ViewRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 내부 연결 풀
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    async fn lease(&self, kind: ErrorKind) -> Result<LeasedConnection> {
        self.pool.lease().await.map_err(|e| {
            error!("연결 풀에서 연결 가져오기 실패 ({kind}): {e}");
            e
        })
    }

    async fn count(&self, query: &str, visitor_ip: Option<&str>) -> Result<i64> {
        let mut conn = self.lease(ErrorKind::Query).await?;

        let row = match visitor_ip {
            Some(ip) => conn.query_one(query, &[&ip]).await,
            None => conn.query_one(query, &[]).await,
        }
        .map_err(|e| {
            error!("조회수 쿼리 실패: {e}");
            e.into_error(ErrorKind::Query, "조회수 쿼리 실패")
        })?;

        row.try_get::<_, i64>(0).map_err(|e| {
            ViewCounterError::with_source(ErrorKind::Query, "조회수 값을 읽을 수 없음", e)
        })
    }
}

/// 조회 기록 입력값 검증
pub fn validate_view(visitor_ip: &str, host: &str) -> Result<()> {
    if visitor_ip.trim().is_empty() {
        return Err(record_err("방문자 IP가 비어 있음"));
    }
    if visitor_ip.chars().count() > IP_ADDRESS_MAX_LEN {
        return Err(record_err(format!(
            "방문자 IP가 {IP_ADDRESS_MAX_LEN}자를 넘음"
        )));
    }
    if host.chars().count() > HOST_NAME_MAX_LEN {
        return Err(record_err(format!(
            "호스트 이름이 {HOST_NAME_MAX_LEN}자를 넘음"
        )));
    }
    Ok(())
}

/// TIMESTAMPTZ 바인딩용 시각, 같은 순간의 UTC 표현
fn storage_time(at: &DateTime<Tz>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

/// 저장된 포트 값을 `u16` 으로 변환
fn port_from_column(port: i32) -> Result<u16> {
    u16::try_from(port).map_err(|e| {
        ViewCounterError::with_source(
            ErrorKind::Record,
            format!("저장된 포트 값이 범위를 벗어남: {port}"),
            e,
        )
    })
}

fn record_from_row(row: &Row) -> Result<ViewRecord> {
    let column = |e: tokio_postgres::Error| {
        ViewCounterError::with_source(ErrorKind::Record, "추가된 조회 기록을 읽을 수 없음", e)
    };

    let port: i32 = row.try_get(3).map_err(column)?;
    let viewed_at: DateTime<Utc> = row.try_get(4).map_err(column)?;
    Ok(ViewRecord {
        id: row.try_get(0).map_err(column)?,
        ip_address: row.try_get(1).map_err(column)?,
        host_name: row.try_get(2).map_err(column)?,
        port: port_from_column(port)?,
        viewed_at: viewed_at.with_timezone(&REFERENCE_ZONE),
    })
}

#[async_trait]
impl ViewStore for ViewRepository {
    async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.lease(ErrorKind::Schema).await?;
        schema::ensure_schema(&mut conn).await
    }

    async fn record_view(&self, visitor_ip: &str, host: &str, port: u16) -> Result<ViewRecord> {
        validate_view(visitor_ip, host)?;

        let host_name: Option<&str> = (!host.is_empty()).then_some(host);
        let port = i32::from(port);
        let viewed_at = storage_time(&reference_now());

        let mut conn = self.lease(ErrorKind::Record).await?;
        let row = conn
            .write_one(sql::INSERT_VIEW, &[&visitor_ip, &host_name, &port, &viewed_at])
            .await
            .map_err(|e| {
                error!("조회 기록 추가 실패: {e}");
                e.into_error(ErrorKind::Record, "조회 기록 추가 실패")
            })?;

        let record = record_from_row(&row)?;
        debug!("조회 기록 추가: id={} ip={}", record.id, record.ip_address);
        Ok(record)
    }

    async fn total_view_count(&self) -> Result<i64> {
        self.count(sql::COUNT_VIEWS, None).await
    }

    async fn visitor_view_count(&self, visitor_ip: &str) -> Result<i64> {
        self.count(sql::COUNT_VISITOR_VIEWS, Some(visitor_ip)).await
    }

    async fn most_recent_view_time(&self, visitor_ip: Option<&str>) -> Result<Option<DateTime<Tz>>> {
        let mut conn = self.lease(ErrorKind::Query).await?;

        let row = match visitor_ip {
            Some(ip) => conn.query_one(sql::VISITOR_MOST_RECENT_VIEW_TIME, &[&ip]).await,
            None => conn.query_one(sql::MOST_RECENT_VIEW_TIME, &[]).await,
        }
        .map_err(|e| {
            error!("최근 조회 시각 쿼리 실패: {e}");
            e.into_error(ErrorKind::Query, "최근 조회 시각 쿼리 실패")
        })?;

        // 행이 없으면 MAX 는 NULL
        let latest: Option<DateTime<Utc>> = row.try_get(0).map_err(|e| {
            ViewCounterError::with_source(ErrorKind::Query, "최근 조회 시각 값을 읽을 수 없음", e)
        })?;
        Ok(latest.map(|at| at.with_timezone(&REFERENCE_ZONE)))
    }
}
