use std::error::Error as StdError;
use std::fmt;
use std::io;

use deadpool_postgres::PoolError;
use serde_yml::Error as YmlError;
use url::ParseError as UrlParseError;

/// 래핑되는 원인 에러
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// 에러 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 접속 URI 누락/형식 오류 등 설정 에러
    Configuration,

    /// 풀 고갈, 연결 생성 실패, 구문 타임아웃
    ConnectionTimeout,

    /// 테이블 생성 실패
    Schema,

    /// 조회 기록 추가 실패
    Record,

    /// 집계 조회 실패
    Query,

    /// 네트워크 입출력 에러
    Io,
}

impl ErrorKind {
    /// 호출자가 재시도해도 되는 에러인지
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        match self {
            ErrorKind::Configuration => false,
            ErrorKind::ConnectionTimeout
            | ErrorKind::Schema
            | ErrorKind::Record
            | ErrorKind::Query => true,
            ErrorKind::Io => false,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "설정 에러",
            ErrorKind::ConnectionTimeout => "연결 타임아웃",
            ErrorKind::Schema => "스키마 에러",
            ErrorKind::Record => "조회 기록 에러",
            ErrorKind::Query => "집계 조회 에러",
            ErrorKind::Io => "I/O 에러",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 조회수 카운터의 모든 에러를 하나로 표현합니다.
///
/// 종류(`ErrorKind`)와 메시지, 그리고 선택적인 원인 에러를 가집니다.
#[derive(Debug)]
pub struct ViewCounterError {
    kind: ErrorKind,
    message: String,
    source: Option<BoxError>,
}

impl ViewCounterError {
    /// 원인 없는 에러 생성
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// 원인 에러를 감싸서 생성
    pub fn with_source<E>(kind: ErrorKind, message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 같은 원인을 유지한 채 종류만 바꿈
    #[must_use]
    pub fn into_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }
}

impl fmt::Display for ViewCounterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {} ({})", self.kind, self.message, source),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl StdError for ViewCounterError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| err.as_ref() as &(dyn StdError + 'static))
    }
}

/// Result 타입 별칭 정의
pub type Result<T> = std::result::Result<T, ViewCounterError>;

/// From 트레이트 구현으로 다양한 에러 타입을 ViewCounterError로 변환
impl From<io::Error> for ViewCounterError {
    fn from(err: io::Error) -> Self {
        ViewCounterError::with_source(ErrorKind::Io, "입출력 실패", err)
    }
}

impl From<YmlError> for ViewCounterError {
    fn from(err: YmlError) -> Self {
        ViewCounterError::with_source(ErrorKind::Configuration, "YAML 파싱 에러", err)
    }
}

impl From<UrlParseError> for ViewCounterError {
    fn from(err: UrlParseError) -> Self {
        ViewCounterError::with_source(ErrorKind::Configuration, "접속 URI 파싱 에러", err)
    }
}

impl From<PoolError> for ViewCounterError {
    fn from(err: PoolError) -> Self {
        let message = match &err {
            PoolError::Timeout(_) => "연결 풀 대기 시간 초과",
            PoolError::Backend(_) => "새 데이터베이스 연결 생성 실패",
            PoolError::Closed => "연결 풀이 닫혀 있음",
            _ => "연결 풀 에러",
        };
        ViewCounterError::with_source(ErrorKind::ConnectionTimeout, message, err)
    }
}

/// 에러 처리 유틸리티 함수
pub fn config_err<E: fmt::Display>(err: E) -> ViewCounterError {
    ViewCounterError::new(ErrorKind::Configuration, err.to_string())
}

pub fn record_err<E: fmt::Display>(err: E) -> ViewCounterError {
    ViewCounterError::new(ErrorKind::Record, err.to_string())
}
