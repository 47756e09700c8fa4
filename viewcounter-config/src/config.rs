use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use viewcounter_error::{Result, config_err};

/// 바인드 포트를 덮어쓰는 환경변수
pub const PORT_ENV: &str = "PORT";

/// HTTP 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_host: String,
    pub bind_port: u16,
    /// 조회수 집계 경로
    pub path: String,
    /// CORS 허용 오리진
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// 기본설정으로 생성
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 8080,
            path: "/countView".to_string(),
            allowed_origin: "https://coderodde.github.io".to_string(),
        }
    }

    /// 설정파일에서 설정 로드
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        Self::from_yaml(&contents)
    }

    /// yml 문자열에서 설정 로드
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config = serde_yml::from_str(contents)?;
        Ok(config)
    }

    /// `PORT` 값이 있으면 바인드 포트 교체
    pub fn with_port_override(mut self, port: Option<&str>) -> Result<Self> {
        if let Some(raw) = port {
            self.bind_port = raw
                .trim()
                .parse()
                .map_err(|e| config_err(format!("{PORT_ENV} 값이 올바르지 않음 '{raw}': {e}")))?;
        }
        Ok(self)
    }

    /// 바인딩 주소
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}
