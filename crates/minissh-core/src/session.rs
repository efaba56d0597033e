// miniSSH Session Manager
//
// 연결 하나를 소유하고 Unconnected → Connected → Authenticated → Closed 전이를 강제
//
// 잠금 규칙:
//   connect / authenticate / close : write lock (전이끼리, 그리고 채널 발급과 직렬화)
//   exec / sftp 작업                : read lock으로 채널 핸들만 복제 후 즉시 해제
//
// close()는 먼저 CancellationToken을 취소 → 진행 중인 작업은 ClosedError로 끝남

use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::{Credentials, HostAddr};
use crate::error::{Error, Result};
use crate::state::{SessionState, StateObserver, TracingObserver};
use crate::transport::{CommandSession, FileChannel, Transport, TransportHandle};

/// 네트워크 연결 하나 (SessionManager 전용 소유)
struct Connection {
    addr: HostAddr,
    handle: Box<dyn TransportHandle>,
}

/// 인증 후 열리는 명령 실행용 세션
///
/// 명령마다 여기서 짧은 채널을 새로 발급
struct Session {
    channels: Arc<dyn CommandSession>,
}

struct Inner {
    state: SessionState,
    connection: Option<Connection>,
    session: Option<Session>,
    files: Option<Arc<dyn FileChannel>>,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    observer: Box<dyn StateObserver>,
    cancel: CancellationToken,
    inner: RwLock<Inner>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_observer(transport, Box::new(TracingObserver))
    }

    pub fn with_observer(transport: Arc<dyn Transport>, observer: Box<dyn StateObserver>) -> Self {
        Self {
            transport,
            observer,
            cancel: CancellationToken::new(),
            inner: RwLock::new(Inner {
                state: SessionState::Unconnected,
                connection: None,
                session: None,
                files: None,
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    fn transition(&self, inner: &mut Inner, next: SessionState, operation: &'static str) -> Result<()> {
        if !inner.state.can_transition_to(&next) {
            return Err(Error::InvalidState { operation, state: inner.state });
        }
        let prev = std::mem::replace(&mut inner.state, next);
        self.observer.on_state_changed(prev, next);
        Ok(())
    }

    /// 현재 상태가 `expected`인지 확인 (Closed면 항상 ClosedError)
    fn require(inner: &Inner, expected: SessionState, operation: &'static str) -> Result<()> {
        match inner.state {
            SessionState::Closed     => Err(Error::Closed { operation }),
            s if s == expected       => Ok(()),
            state                    => Err(Error::InvalidState { operation, state }),
        }
    }

    pub async fn connect(&self, addr: &HostAddr) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::require(&inner, SessionState::Unconnected, "connect")?;

        tracing::info!("[session] connecting to {}", addr);
        let handle = self.until_closed("connect", self.transport.connect(addr)).await?;

        inner.connection = Some(Connection { addr: addr.clone(), handle });
        self.transition(&mut inner, SessionState::Connected, "connect")?;
        tracing::info!("[session] connected to {}", addr);
        Ok(())
    }

    /// 인증 성공 시 명령 세션 + 파일 채널을 함께 열고 Authenticated로 전이
    ///
    /// 거부되면 Connected 유지 → 다른 자격 증명으로 재시도 가능
    pub async fn authenticate(&self, username: &str, credentials: &Credentials) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::require(&inner, SessionState::Connected, "authenticate")?;

        let Inner { connection, session, files, .. } = &mut *inner;
        let conn = connection
            .as_mut()
            .ok_or(Error::Closed { operation: "authenticate" })?;

        tracing::info!(
            "[session] authenticating {}@{} ({})",
            username, conn.addr, credentials.method_name()
        );
        self.until_closed("authenticate", conn.handle.authenticate(username, credentials))
            .await?;

        let command_session: Arc<dyn CommandSession> =
            Arc::from(self.until_closed("authenticate", conn.handle.open_session()).await?);

        let file_channel = match self.until_closed("authenticate", conn.handle.open_file_channel()).await {
            Ok(channel) => channel,
            Err(e) => {
                // 세션만 열린 채로 남기지 않음
                if let Err(close_err) = command_session.close().await {
                    tracing::warn!("[session] closing orphan session failed: {}", close_err);
                }
                return Err(e);
            }
        };

        *session = Some(Session { channels: command_session });
        *files = Some(Arc::from(file_channel));
        self.transition(&mut inner, SessionState::Authenticated, "authenticate")?;
        tracing::info!("[session] authenticated, session + file channel open");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        let inner = self.inner.read().await;
        inner.state.is_connected()
            && inner.connection.as_ref().is_some_and(|c| !c.handle.is_closed())
    }

    pub async fn is_authenticated(&self) -> bool {
        let inner = self.inner.read().await;
        inner.state == SessionState::Authenticated
            && inner.connection.as_ref().is_some_and(|c| !c.handle.is_closed())
    }

    pub async fn is_session_open(&self) -> bool {
        let inner = self.inner.read().await;
        inner.session.as_ref().is_some_and(|s| s.channels.is_open())
    }

    pub async fn is_valid(&self) -> bool {
        self.is_connected().await && self.is_authenticated().await
    }

    /// 명령 실행용 세션 (Authenticated에서만)
    pub(crate) async fn command_session(&self, operation: &'static str) -> Result<Arc<dyn CommandSession>> {
        let inner = self.inner.read().await;
        Self::require(&inner, SessionState::Authenticated, operation)?;
        match &inner.session {
            Some(s) if s.channels.is_open() => Ok(Arc::clone(&s.channels)),
            _ => Err(Error::Closed { operation }),
        }
    }

    /// SFTP 채널 (Authenticated에서만)
    pub(crate) async fn file_channel(&self, operation: &'static str) -> Result<Arc<dyn FileChannel>> {
        let inner = self.inner.read().await;
        Self::require(&inner, SessionState::Authenticated, operation)?;
        inner.files.clone().ok_or(Error::Closed { operation })
    }

    /// close()와 경쟁시키며 실행
    ///
    /// 취소되면 작업 결과와 무관하게 ClosedError
    pub(crate) async fn until_closed<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Closed { operation }),
            result = fut => match result {
                Err(_) if self.cancel.is_cancelled() => Err(Error::Closed { operation }),
                other => other,
            },
        }
    }

    /// 어느 상태에서든 호출 가능, 두 번째 호출부터는 아무것도 하지 않음
    ///
    /// 해제 순서: Session → FileChannel → Connection (획득의 역순)
    /// 하나가 실패해도 나머지는 계속 시도하고, 실패는 CloseFailed로 모아서 반환
    pub async fn close(&self) -> Result<()> {
        // 진행 중인 작업을 먼저 깨움 (작업들은 lock을 잡고 있지 않음)
        self.cancel.cancel();

        let mut inner = self.inner.write().await;
        if inner.state == SessionState::Closed {
            return Ok(());
        }

        let mut failures = Vec::new();

        if let Some(session) = inner.session.take() {
            if let Err(e) = session.channels.close().await {
                tracing::warn!("[session] closing command session failed: {}", e);
                failures.push(e);
            }
        }
        if let Some(files) = inner.files.take() {
            if let Err(e) = files.close().await {
                tracing::warn!("[session] closing file channel failed: {}", e);
                failures.push(e);
            }
        }
        if let Some(conn) = inner.connection.take() {
            if let Err(e) = conn.handle.close().await {
                tracing::warn!("[session] disconnecting {} failed: {}", conn.addr, e);
                failures.push(e);
            }
            tracing::info!("[session] disconnected from {}", conn.addr);
        }

        self.transition(&mut inner, SessionState::Closed, "close")?;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::CloseFailed(failures))
        }
    }
}
