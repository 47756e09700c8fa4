use std::path::Path;

use log::info;

use viewcounter_error::{ErrorKind, Result};

use crate::config::{PORT_ENV, ServerConfig};
use crate::dbconfig::{ConnectionConfig, DbConfig};

/// 통합 세팅 인스턴스
pub struct Settings {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub connection: ConnectionConfig,
}

impl Settings {
    /// Setting 생성
    pub fn new() -> Result<Self> {
        let server = Self::load_server_config()?;
        let database = Self::load_db_config()?;
        let connection = ConnectionConfig::from_env(&database.url_env)?;
        info!(
            "접속 대상: {}:{}/{} ({})",
            connection.host, connection.port, connection.database, database.url_env
        );

        Ok(Self {
            server,
            database,
            connection,
        })
    }

    /// 서버 설정 로드
    fn load_server_config() -> Result<ServerConfig> {
        // yml 파일 유무 확인
        let config = if Path::new("config.yml").exists() {
            info!("서버 설정파일 로드: config.yml");
            ServerConfig::from_file("config.yml")
                .map_err(|e| e.into_kind(ErrorKind::Configuration))?
        } else {
            // 기본설정사용
            info!("서버 기본설정 사용");
            ServerConfig::new()
        };

        let port = std::env::var(PORT_ENV).ok();
        config.with_port_override(port.as_deref())
    }

    /// db 설정 로드
    fn load_db_config() -> Result<DbConfig> {
        // yml 파일 유무 확인
        if Path::new("db.yml").exists() {
            info!("DB 설정파일 로드: db.yml");
            DbConfig::from_file("db.yml").map_err(|e| e.into_kind(ErrorKind::Configuration))
        } else {
            // 기본설정사용
            info!("DB 기본설정 사용");
            Ok(DbConfig::default())
        }
    }
}
