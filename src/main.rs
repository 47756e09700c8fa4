use std::sync::Arc;

use log::info;

use viewcounter_config::Settings;
use viewcounter_db::{ViewRepository, ViewStore, initialize_dbpool};
use viewcounter_error::Result;
use viewcounter_logging::setup_logger;
use viewcounter_server::server::ViewCounterServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 로거 세팅
    setup_logger();

    info!("viewcounter 서버 시작");

    // 통합 설정 로드
    let settings = Settings::new()?;
    info!("데이터베이스 접속 정보: {:?}", settings.connection);

    // db 세팅
    let db_pool = initialize_dbpool(&settings.database, &settings.connection).await?;
    let store: Arc<dyn ViewStore> = Arc::new(ViewRepository::new(db_pool));

    let server = ViewCounterServer::new(settings.server, store)?;
    server.run().await
}
