use log::{debug, error, warn};

use viewcounter_error::{ErrorKind, Result};

use crate::lease::{LeaseError, LeasedConnection};
use crate::sql::views;

/// views 테이블과 인덱스가 없으면 생성
///
/// 매 요청마다 불러도 됩니다. 실패는 재시도하지 않고 그대로 돌려줍니다.
pub async fn ensure_schema(conn: &mut LeasedConnection) -> Result<()> {
    // 테이블
    create_if_missing(conn, views::CREATE_TABLE)
        .await
        .map_err(|e| {
            error!("views 테이블 생성중 오류 발생: {e}");
            e.into_error(ErrorKind::Schema, "views 테이블 생성 실패")
        })?;

    // 인덱싱
    for index_query in views::CREATE_INDICES {
        create_if_missing(conn, index_query).await.map_err(|e| {
            error!("views 인덱스 생성 실패: {e}");
            e.into_error(ErrorKind::Schema, "views 인덱스 생성 실패")
        })?;
    }

    debug!("views 테이블 확인 완료");
    Ok(())
}

/// `IF NOT EXISTS` 구문 실행
///
/// 다른 세션이 같은 객체를 동시에 만들면 PostgreSQL 이 중복 에러를 낼 수 있는데,
/// 이 경우 객체는 이미 존재하므로 성공으로 봅니다.
async fn create_if_missing(
    conn: &mut LeasedConnection,
    sql: &str,
) -> std::result::Result<(), LeaseError> {
    match conn.execute(sql, &[]).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_duplicate_object() => {
            warn!("동시 생성 충돌, 이미 존재하는 것으로 처리: {e}");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
