use std::sync::Arc;

use hyper::header::HeaderValue;

use viewcounter_config::ServerConfig;
use viewcounter_db::ViewStore;
use viewcounter_error::{ErrorKind, Result, ViewCounterError};

/// 애플리케이션의 공유 상태를 관리하는 구조체
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ViewStore>,
    pub config: Arc<ServerConfig>,
    /// 검증된 CORS 허용 오리진
    pub allowed_origin: HeaderValue,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn ViewStore>) -> Result<Self> {
        let allowed_origin = HeaderValue::from_str(&config.allowed_origin).map_err(|e| {
            ViewCounterError::with_source(
                ErrorKind::Configuration,
                format!("allowed_origin 값이 헤더로 쓸 수 없음: {}", config.allowed_origin),
                e,
            )
        })?;

        Ok(Self {
            store,
            config: Arc::new(config),
            allowed_origin,
        })
    }
}
