use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_postgres::{NoTls, config::Config};

use viewcounter_config::{ConnectionConfig, DbConfig, PoolConfig};
use viewcounter_error::{ErrorKind, Result, ViewCounterError, config_err};

use crate::lease::{LeaseLimits, LeaseRegistry, LeasedConnection};

/// db 풀 인스턴스
#[derive(Clone)]
pub struct DatabasePool {
    pool: Arc<Pool>,
    limits: LeaseLimits,
    idle: IdlePolicy,
    leases: LeaseRegistry,
    _reaper: Arc<IdleReaper>,
}

impl DatabasePool {
    /// db 풀 생성
    pub async fn new(dbconfig: &DbConfig, connection: &ConnectionConfig) -> Result<Self> {
        info!("db 풀 초기화");

        // PostgreSQL 설정 생성
        let pg_config = Self::create_pg_config(connection, &dbconfig.pool);

        // 연결 풀 생성
        let pool = Self::create_connection_pool(pg_config, &dbconfig.pool).await?;

        info!(
            "데이터베이스 연결 풀 초기화 완료 (최대 연결 수: {}, 유휴 상한: {})",
            dbconfig.pool.max_connections, dbconfig.pool.max_idle_connections
        );

        let idle = IdlePolicy::from(&dbconfig.pool);
        let limits = LeaseLimits::from(&dbconfig.pool);
        let leases = LeaseRegistry::default();
        let reaper = IdleReaper::spawn(pool.clone(), idle, leases.clone(), limits, &dbconfig.pool);

        Ok(Self {
            pool: Arc::new(pool),
            limits,
            idle,
            leases,
            _reaper: Arc::new(reaper),
        })
    }

    /// `PostgreSQL` 설정 생성
    fn create_pg_config(connection: &ConnectionConfig, pool: &PoolConfig) -> Config {
        let statement_timeout_ms = pool.statement_timeout_seconds.saturating_mul(1000);

        let mut pg_config = Config::new();
        pg_config
            .host(connection.host.as_str())
            .port(connection.port)
            .dbname(connection.database.as_str())
            .user(connection.user.as_str())
            .password(connection.password.as_str())
            .application_name("viewcounter")
            .options(&format!("-c statement_timeout={statement_timeout_ms}"))
            .connect_timeout(Duration::from_secs(pool.connect_timeout_seconds))
            .keepalives(true);

        pg_config
    }

    /// 연결 풀 생성 및 테스트
    async fn create_connection_pool(pg_config: Config, pool_config: &PoolConfig) -> Result<Pool> {
        if pool_config.max_connections == 0 {
            return Err(config_err("max_connections 는 1 이상이어야 함"));
        }

        // 재사용 전 항상 연결 상태 검증
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Verified,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);

        // 풀 빌더 설정
        let pool = Pool::builder(mgr)
            .max_size(pool_config.max_connections)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(Duration::from_secs(pool_config.wait_timeout_seconds)))
            .create_timeout(Some(Duration::from_secs(pool_config.connect_timeout_seconds)))
            .recycle_timeout(Some(Duration::from_secs(pool_config.recycle_timeout_seconds)))
            .build()
            .map_err(|e| config_err(format!("db 풀 생성 실패: {e}")))?;

        // 연결 테스트
        let conn = pool.get().await?;

        // 간단한 쿼리로 연결 확인
        conn.query_one("SELECT 1", &[]).await.map_err(|e| {
            ViewCounterError::with_source(
                ErrorKind::ConnectionTimeout,
                "데이터베이스 쿼리 테스트 실패",
                e,
            )
        })?;

        Ok(pool)
    }

    /// 연결 풀에서 연결 빌려오기
    ///
    /// 반환된 연결은 drop 될 때 풀로 돌아갑니다. 빌리기 전에 회수 기준을 넘긴
    /// 연결을 먼저 떼어내므로, 버려진 연결이 자리를 계속 차지하지 않습니다.
    pub async fn lease(&self) -> Result<LeasedConnection> {
        let reclaimed = self.leases.reclaim_abandoned(self.limits.abandon_after);
        if reclaimed > 0 {
            debug!("버려진 연결 {reclaimed}개 회수 후 대기");
        }

        let conn = self.pool.get().await?;
        Ok(LeasedConnection::new(conn, self.limits, &self.leases))
    }

    /// 유휴 연결 정리
    pub fn reap_idle(&self) -> usize {
        self.idle.reap(&self.pool)
    }

    /// 연결 풀 상태 정보
    pub fn pool_status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
            leased: self.leases.active(),
        }
    }
}

/// 연결 풀 상태 정보
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub max_size: usize,
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
    /// 현재 빌려준 연결 수
    pub leased: usize,
}

/// 유휴 연결 유지 기준
#[derive(Debug, Clone, Copy)]
struct IdlePolicy {
    max_idle: usize,
    idle_timeout: Duration,
}

impl From<&PoolConfig> for IdlePolicy {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_idle: config.max_idle_connections,
            idle_timeout: Duration::from_secs(config.idle_timeout_seconds),
        }
    }
}

impl IdlePolicy {
    /// 유휴 연결을 최대 `max_idle` 개까지만 남기고, 오래된 것은 닫음
    fn reap(self, pool: &Pool) -> usize {
        let kept = Cell::new(0usize);
        let removed = Cell::new(0usize);

        let _ = pool.retain(|_, metrics| {
            let keep = kept.get() < self.max_idle && metrics.last_used() < self.idle_timeout;
            if keep {
                kept.set(kept.get() + 1);
            } else {
                removed.set(removed.get() + 1);
            }
            keep
        });

        removed.get()
    }
}

const MIN_REAP_INTERVAL: Duration = Duration::from_millis(100);

/// 유휴 연결과 버려진 연결을 주기적으로 정리하는 백그라운드 작업
struct IdleReaper {
    handle: JoinHandle<()>,
}

impl IdleReaper {
    fn spawn(
        pool: Pool,
        idle: IdlePolicy,
        leases: LeaseRegistry,
        limits: LeaseLimits,
        config: &PoolConfig,
    ) -> Self {
        // 버려진 연결을 회수 기준의 절반 안에 찾도록 주기를 맞춤
        let interval = Duration::from_secs(config.reap_interval_seconds.max(1))
            .min(limits.abandon_after / 2)
            .max(MIN_REAP_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // 첫 tick 은 즉시 반환
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reclaimed = leases.reclaim_abandoned(limits.abandon_after);
                if reclaimed > 0 {
                    debug!("버려진 연결 {reclaimed}개 회수");
                }
                let removed = idle.reap(&pool);
                if removed > 0 {
                    debug!("유휴 연결 {removed}개 정리");
                }
            }
        });

        Self { handle }
    }
}

impl Drop for IdleReaper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// 데이터베이스 풀 초기화 함수
///
/// 프로세스 시작 시 한 번 호출합니다. 실패하면 시작을 중단해야 합니다.
pub async fn initialize_dbpool(
    config: &DbConfig,
    connection: &ConnectionConfig,
) -> Result<DatabasePool> {
    DatabasePool::new(config, connection).await
}
