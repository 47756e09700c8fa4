use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoConnBuilder;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;

use crate::handler::handle_request;
use crate::state::AppState;

use viewcounter_config::ServerConfig;
use viewcounter_db::ViewStore;
use viewcounter_error::Result;

/// 조회수 서버 구조체
pub struct ViewCounterServer {
    /// 요청마다 복제되는 공유 상태
    state: AppState,
}

impl ViewCounterServer {
    /// 새로운 서버 인스턴스를 생성
    pub fn new(config: ServerConfig, store: Arc<dyn ViewStore>) -> Result<Self> {
        Ok(Self {
            state: AppState::new(config, store)?,
        })
    }

    /// 서버실행
    ///
    /// Ctrl-C 를 받으면 새 연결 수락을 멈추고 반환합니다.
    pub async fn run(&self) -> Result<()> {
        // 바인딩 주소
        let addr = self.state.config.bind_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("조회수 서버 시작: {addr}{}", self.state.config.path);

        self.serve(listener).await
    }

    /// 이미 바인딩된 리스너로 서비스
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            let (stream, client_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("연결 수락 실패: {e}");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("종료 신호 수신, 서버 정지");
                    return Ok(());
                }
            };
            let state = self.state.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                if let Err(err) = AutoConnBuilder::new(TokioExecutor::new())
                    .serve_connection(
                        io,
                        service_fn(move |req| handle_request(req, client_addr, state.clone())),
                    )
                    .await
                {
                    error!("커넥션 에러: {err}");
                } else {
                    debug!("커넥션 종료: {client_addr}");
                }
            });
        }
    }
}
