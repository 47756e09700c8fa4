/// 테이블 이름
pub const TABLE_NAME: &str = "views";

/// IPv6 주소 문자열 최대 길이 (IPv4-mapped 포함)
pub const IP_ADDRESS_MAX_LEN: usize = 45;

/// DNS 호스트 이름 최대 길이
pub const HOST_NAME_MAX_LEN: usize = 253;

/// 테이블 생성 쿼리
pub const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS views (
        id BIGSERIAL PRIMARY KEY,
        ip_address VARCHAR(45) NOT NULL,
        host_name VARCHAR(253),
        port INTEGER NOT NULL CHECK (port BETWEEN 0 AND 65535),
        viewed_at TIMESTAMPTZ NOT NULL
    )";

/// 기본 인덱스 생성 쿼리
pub const CREATE_INDICES: [&str; 1] =
    ["CREATE INDEX IF NOT EXISTS views_ip_address_idx ON views(ip_address)"];

/// 조회 기록 추가
pub const INSERT_VIEW: &str = "
    INSERT INTO views (ip_address, host_name, port, viewed_at)
    VALUES ($1, $2, $3, $4)
    RETURNING id, ip_address, host_name, port, viewed_at";

/// 전체 조회수
pub const COUNT_VIEWS: &str = "SELECT COUNT(*) FROM views";

/// 방문자 조회수
pub const COUNT_VISITOR_VIEWS: &str = "SELECT COUNT(*) FROM views WHERE ip_address = $1";

/// 가장 최근 조회 시각
pub const MOST_RECENT_VIEW_TIME: &str = "SELECT MAX(viewed_at) FROM views";

/// 방문자의 가장 최근 조회 시각
pub const VISITOR_MOST_RECENT_VIEW_TIME: &str =
    "SELECT MAX(viewed_at) FROM views WHERE ip_address = $1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_bounds_match_constants() {
        assert!(CREATE_TABLE.contains(&format!("ip_address VARCHAR({IP_ADDRESS_MAX_LEN}) NOT NULL")));
        assert!(CREATE_TABLE.contains(&format!("host_name VARCHAR({HOST_NAME_MAX_LEN})")));
    }

    #[test]
    fn ddl_is_idempotent() {
        assert!(CREATE_TABLE.contains(&format!("CREATE TABLE IF NOT EXISTS {TABLE_NAME}")));
        for index in CREATE_INDICES {
            assert!(index.starts_with("CREATE INDEX IF NOT EXISTS"));
        }
    }

    #[test]
    fn visitor_filters_are_bound_parameters() {
        for sql in [INSERT_VIEW, COUNT_VISITOR_VIEWS, VISITOR_MOST_RECENT_VIEW_TIME] {
            assert!(sql.contains("$1"));
            assert!(!sql.contains('\''));
        }
        assert!(INSERT_VIEW.contains("$4"));
    }
}
