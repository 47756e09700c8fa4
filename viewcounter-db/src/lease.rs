use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use deadpool_postgres::Object;
use log::{error, warn};
use tokio::sync::Mutex;
use tokio::time::error::Elapsed;
use tokio_postgres::Row;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;

use viewcounter_config::PoolConfig;
use viewcounter_error::{ErrorKind, ViewCounterError};

/// 바인딩 파라미터 목록
pub type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// 빌린 연결 하나에 적용되는 시간 제한
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseLimits {
    /// 구문 하나의 실행 제한
    pub statement_timeout: Duration,
    /// 이 시간을 넘겨 잡고 있으면 회수
    pub abandon_after: Duration,
}

impl From<&PoolConfig> for LeaseLimits {
    fn from(config: &PoolConfig) -> Self {
        Self {
            statement_timeout: Duration::from_secs(config.statement_timeout_seconds),
            abandon_after: Duration::from_secs(config.abandon_timeout_seconds),
        }
    }
}

impl LeaseLimits {
    /// `held` 만큼 잡고 있던 연결에 남은 실행 시간
    ///
    /// 회수 기준을 넘겼으면 `None`.
    #[must_use]
    pub fn budget(&self, held: Duration) -> Option<Duration> {
        self.abandon_after
            .checked_sub(held)
            .filter(|remaining| !remaining.is_zero())
            .map(|remaining| remaining.min(self.statement_timeout))
    }
}

/// 빌린 연결에서 발생한 에러
#[derive(Debug)]
pub enum LeaseError {
    /// 구문이 제한 시간 안에 끝나지 않음
    Timeout(Duration),
    /// 너무 오래 잡혀 있어 연결이 회수됨
    Reclaimed(Duration),
    /// PostgreSQL 에러
    Postgres(tokio_postgres::Error),
}

impl LeaseError {
    /// 호출 단계의 에러 종류로 변환
    ///
    /// 타임아웃(서버 측 취소 포함)과 회수는 단계와 관계없이 `ConnectionTimeout` 입니다.
    pub fn into_error(self, kind: ErrorKind, context: &str) -> ViewCounterError {
        match self {
            LeaseError::Timeout(limit) => ViewCounterError::new(
                ErrorKind::ConnectionTimeout,
                format!("{context}: 구문이 {limit:?} 안에 끝나지 않음"),
            ),
            LeaseError::Reclaimed(held) => ViewCounterError::new(
                ErrorKind::ConnectionTimeout,
                format!("{context}: 연결이 {held:?} 동안 반환되지 않아 회수됨"),
            ),
            // 서버 측 statement_timeout 취소
            LeaseError::Postgres(e) if e.code() == Some(&SqlState::QUERY_CANCELED) => {
                ViewCounterError::with_source(ErrorKind::ConnectionTimeout, context, e)
            }
            LeaseError::Postgres(e) => ViewCounterError::with_source(kind, context, e),
        }
    }

    /// 이미 존재하는 객체를 동시에 만들다 생긴 충돌인지
    #[must_use]
    pub fn is_duplicate_object(&self) -> bool {
        match self {
            LeaseError::Postgres(e) => matches!(
                e.code(),
                Some(code) if *code == SqlState::UNIQUE_VIOLATION
                    || *code == SqlState::DUPLICATE_TABLE
                    || *code == SqlState::DUPLICATE_OBJECT
            ),
            _ => false,
        }
    }
}

impl fmt::Display for LeaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseError::Timeout(limit) => write!(f, "구문 타임아웃 ({limit:?})"),
            LeaseError::Reclaimed(held) => write!(f, "연결 회수됨 ({held:?})"),
            LeaseError::Postgres(e) => write!(f, "PostgreSQL 에러: {e}"),
        }
    }
}

impl std::error::Error for LeaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LeaseError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

/// 빌린 연결 하나의 공유 슬롯
///
/// 소유자와 풀의 회수 작업이 함께 봅니다. 연결이 `None` 이면 회수된 것입니다.
struct LeaseSlot {
    conn: Mutex<Option<Object>>,
    leased_at: Instant,
}

impl LeaseSlot {
    fn held_for(&self) -> Duration {
        self.leased_at.elapsed()
    }
}

/// 풀로 돌려보내지 않고 연결을 닫음
fn reclaim(conn: &mut Option<Object>) -> bool {
    match conn.take() {
        Some(object) => {
            drop(Object::take(object));
            true
        }
        None => false,
    }
}

/// 현재 빌려준 연결 목록
///
/// 소유자가 아무것도 하지 않아도 회수 기준을 넘긴 연결을 풀에서 떼어낼 수 있게
/// 합니다. 떼어낸 자리는 풀에서 기다리는 요청이 바로 씁니다.
#[derive(Clone, Default)]
pub(crate) struct LeaseRegistry {
    slots: Arc<StdMutex<Vec<Weak<LeaseSlot>>>>,
}

impl LeaseRegistry {
    fn register(&self, slot: &Arc<LeaseSlot>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|weak| weak.strong_count() > 0);
        slots.push(Arc::downgrade(slot));
    }

    /// `abandon_after` 를 넘긴 연결을 강제 회수하고 회수한 수를 반환
    ///
    /// 구문 실행 중인 연결은 건너뜁니다. 그 구문은 자체 시간 제한에 걸립니다.
    pub(crate) fn reclaim_abandoned(&self, abandon_after: Duration) -> usize {
        let overdue: Vec<Arc<LeaseSlot>> = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.retain(|weak| weak.strong_count() > 0);
            slots
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|slot| slot.held_for() >= abandon_after)
                .collect()
        };

        let mut reclaimed = 0;
        for slot in overdue {
            let Ok(mut conn) = slot.conn.try_lock() else {
                continue;
            };
            if reclaim(&mut conn) {
                warn!(
                    "연결이 {:?} 동안 반환되지 않아 강제 회수",
                    slot.held_for()
                );
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// 등록된 연결 수
    pub(crate) fn active(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.iter().filter(|weak| weak.strong_count() > 0).count()
    }
}

/// 풀에서 빌린 연결
///
/// 한 작업만 소유하며 drop 될 때 풀로 돌아갑니다. 회수 기준을 넘긴 연결이나
/// 구문 타임아웃을 겪은 연결은 풀로 돌려보내지 않고 닫습니다. 회수 기준을 넘긴
/// 연결은 소유자가 쓰지 않고 있어도 풀이 떼어냅니다.
pub struct LeasedConnection {
    slot: Arc<LeaseSlot>,
    limits: LeaseLimits,
}

impl LeasedConnection {
    pub(crate) fn new(conn: Object, limits: LeaseLimits, registry: &LeaseRegistry) -> Self {
        let slot = Arc::new(LeaseSlot {
            conn: Mutex::new(Some(conn)),
            leased_at: Instant::now(),
        });
        registry.register(&slot);
        Self { slot, limits }
    }

    /// 빌린 뒤 지난 시간
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.slot.held_for()
    }

    /// 회수되어 더 쓸 수 없는지
    ///
    /// 구문 실행 중이면 `false`.
    #[must_use]
    pub fn is_reclaimed(&self) -> bool {
        self.slot
            .conn
            .try_lock()
            .map(|conn| conn.is_none())
            .unwrap_or(false)
    }

    /// 파라미터 바인딩 구문 실행
    pub async fn execute(&mut self, sql: &str, params: Params<'_>) -> Result<u64, LeaseError> {
        let budget = self.budget().await?;
        let held = self.held_for();
        let mut conn = self.slot.conn.lock().await;
        let client = conn.as_mut().ok_or(LeaseError::Reclaimed(held))?;

        let outcome = tokio::time::timeout(budget, client.execute(sql, params)).await;
        settle(&mut conn, outcome, budget)
    }

    /// 캐시된 준비 구문으로 한 행 조회
    pub async fn query_one(&mut self, sql: &str, params: Params<'_>) -> Result<Row, LeaseError> {
        let budget = self.budget().await?;
        let held = self.held_for();
        let mut conn = self.slot.conn.lock().await;
        let client = conn.as_mut().ok_or(LeaseError::Reclaimed(held))?;

        let outcome = tokio::time::timeout(budget, async move {
            let statement = client.prepare_cached(sql).await?;
            client.query_one(&statement, params).await
        })
        .await;
        settle(&mut conn, outcome, budget)
    }

    /// 트랜잭션 안에서 한 행을 쓰고 커밋
    ///
    /// 커밋 전에 실패하면 트랜잭션은 롤백됩니다.
    pub async fn write_one(&mut self, sql: &str, params: Params<'_>) -> Result<Row, LeaseError> {
        let budget = self.budget().await?;
        let held = self.held_for();
        let mut conn = self.slot.conn.lock().await;
        let client = conn.as_mut().ok_or(LeaseError::Reclaimed(held))?;

        let outcome = tokio::time::timeout(budget, async move {
            let tx = client.transaction().await?;
            let statement = tx.prepare_cached(sql).await?;
            let row = tx.query_one(&statement, params).await?;
            tx.commit().await?;
            Ok::<Row, tokio_postgres::Error>(row)
        })
        .await;
        settle(&mut conn, outcome, budget)
    }

    async fn budget(&self) -> Result<Duration, LeaseError> {
        let held = self.held_for();
        match self.limits.budget(held) {
            Some(budget) => Ok(budget),
            None => {
                if reclaim(&mut *self.slot.conn.lock().await) {
                    warn!("연결이 {held:?} 동안 반환되지 않아 강제 회수");
                }
                Err(LeaseError::Reclaimed(held))
            }
        }
    }
}

fn settle<T>(
    conn: &mut Option<Object>,
    outcome: Result<Result<T, tokio_postgres::Error>, Elapsed>,
    budget: Duration,
) -> Result<T, LeaseError> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            if e.is_closed() {
                reclaim(conn);
            }
            Err(LeaseError::Postgres(e))
        }
        Err(_) => {
            // 응답 대기 중인 연결은 재사용하지 않음
            error!("구문 실행 타임아웃 ({budget:?}), 연결 폐기");
            reclaim(conn);
            Err(LeaseError::Timeout(budget))
        }
    }
}

impl Drop for LeasedConnection {
    fn drop(&mut self) {
        let held = self.held_for();
        if held < self.limits.abandon_after {
            return;
        }
        // 잠겨 있으면 회수 작업이 처리 중
        if let Ok(mut conn) = self.slot.conn.try_lock() {
            if reclaim(&mut conn) {
                warn!("연결이 {held:?} 동안 잡혀 있었음, 풀로 돌려보내지 않고 닫음");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LeaseLimits {
        LeaseLimits {
            statement_timeout: Duration::from_secs(5),
            abandon_after: Duration::from_secs(30),
        }
    }

    #[test]
    fn fresh_lease_gets_full_statement_timeout() {
        assert_eq!(limits().budget(Duration::ZERO), Some(Duration::from_secs(5)));
    }

    #[test]
    fn budget_shrinks_near_abandon_deadline() {
        assert_eq!(
            limits().budget(Duration::from_secs(28)),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn no_budget_after_abandon_deadline() {
        assert_eq!(limits().budget(Duration::from_secs(30)), None);
        assert_eq!(limits().budget(Duration::from_secs(31)), None);
    }

    #[test]
    fn limits_follow_pool_config() {
        let config = PoolConfig {
            statement_timeout_seconds: 2,
            abandon_timeout_seconds: 9,
            ..PoolConfig::default()
        };
        let limits = LeaseLimits::from(&config);
        assert_eq!(limits.statement_timeout, Duration::from_secs(2));
        assert_eq!(limits.abandon_after, Duration::from_secs(9));
    }

    #[test]
    fn timeouts_map_to_connection_timeout_regardless_of_stage() {
        let err = LeaseError::Timeout(Duration::from_secs(5)).into_error(ErrorKind::Record, "insert");
        assert_eq!(err.kind(), ErrorKind::ConnectionTimeout);

        let err = LeaseError::Reclaimed(Duration::from_secs(40)).into_error(ErrorKind::Query, "count");
        assert_eq!(err.kind(), ErrorKind::ConnectionTimeout);
        assert!(!LeaseError::Timeout(Duration::ZERO).is_duplicate_object());
    }
}
