use std::io::Write;

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;

/// 빌드 종류별 기본 로그 레벨
#[must_use]
pub const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// 로거 세팅
///
/// `RUST_LOG` 가 있으면 기본 레벨 대신 사용합니다. 두 번째 호출부터는 무시됩니다.
pub fn setup_logger() {
    let mut builder = Builder::new();
    builder.filter(None, default_level());

    #[cfg(debug_assertions)]
    {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });
    }

    #[cfg(not(debug_assertions))]
    {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        });
    }

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_is_idempotent() {
        setup_logger();
        setup_logger();
        log::info!("logger ready");
    }

    #[test]
    fn debug_builds_log_debug() {
        if cfg!(debug_assertions) {
            assert_eq!(default_level(), LevelFilter::Debug);
        } else {
            assert_eq!(default_level(), LevelFilter::Info);
        }
    }
}
