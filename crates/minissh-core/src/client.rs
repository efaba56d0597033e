// miniSSH Client (Facade)
//
// SessionManager + CommandExecutor + FileTransferClient를 하나의 핸들로 묶음
// 자체 로직은 인자 검증뿐: 빈 host/username/command/path는 네트워크 접근 전에 ArgumentError
//
// 한 인스턴스 = 연결 하나. 상태 전이(connect/authenticate/close)는 내부 lock으로 직렬화되고,
// exec와 파일 전송은 별도 채널을 쓰므로 동시에 진행 가능

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ClientConfig, Credentials, HostAddr};
use crate::error::{Error, Result};
use crate::exec::{CommandExecutor, CommandOutput};
use crate::session::SessionManager;
use crate::sftp::{FileTransferClient, ProgressInfo, RemoteResourceInfo};
use crate::ssh::RusshTransport;
use crate::state::{SessionState, StateObserver, TracingObserver};
use crate::transport::Transport;

pub struct Client {
    session: Arc<SessionManager>,
    executor: CommandExecutor,
    files: FileTransferClient,
}

impl Client {
    /// russh 기반 기본 클라이언트
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(RusshTransport::new(&config));
        Self::with_transport(transport, config)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self::with_observer(transport, config, Box::new(TracingObserver))
    }

    pub fn with_observer(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        observer: Box<dyn StateObserver>,
    ) -> Self {
        let session = Arc::new(SessionManager::with_observer(transport, observer));
        Self {
            executor: CommandExecutor::new(Arc::clone(&session)),
            files: FileTransferClient::new(Arc::clone(&session), config.effective_chunk_size()),
            session,
        }
    }

    // ── 연결 / 인증 ──────────────────────────────────────────────────────────

    /// host: "<ip>:<port>" 또는 "<host>" (포트 22)
    pub async fn connect(&self, host: &str) -> Result<()> {
        let addr = HostAddr::parse(host)?;
        self.session.connect(&addr).await
    }

    pub async fn authenticate(&self, username: &str, credentials: &Credentials) -> Result<()> {
        require_non_empty("authenticate", "username", username)?;
        if let Credentials::PublicKey { paths } = credentials {
            if paths.is_empty() {
                return Err(Error::argument("authenticate", "at least one key file is required"));
            }
        }
        self.session.authenticate(username, credentials).await
    }

    pub async fn authenticate_password(&self, username: &str, password: &str) -> Result<()> {
        self.authenticate(username, &Credentials::password(password)).await
    }

    /// 키 파일을 순서대로 시도
    pub async fn authenticate_public_key<I, P>(&self, username: &str, key_paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.authenticate(username, &Credentials::public_key(key_paths)).await
    }

    // ── 상태 조회 ────────────────────────────────────────────────────────────

    pub async fn state(&self) -> SessionState {
        self.session.state().await
    }

    pub async fn is_connected(&self) -> bool {
        self.session.is_connected().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.is_authenticated().await
    }

    pub async fn is_session_open(&self) -> bool {
        self.session.is_session_open().await
    }

    /// 연결 + 인증 모두 완료
    pub async fn is_valid(&self) -> bool {
        self.session.is_valid().await
    }

    // ── 명령 실행 ────────────────────────────────────────────────────────────

    /// 명령 하나를 실행하고 끝날 때까지 기다림
    ///
    /// 사용자 입력이 필요한 명령에는 쓰지 말 것 (stdin 없음, PTY 없음)
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        if command.trim().is_empty() {
            return Err(Error::argument("exec", "command must not be empty"));
        }
        self.executor.exec(command).await
    }

    // ── 파일 ─────────────────────────────────────────────────────────────────

    pub async fn list(&self, path: &str) -> Result<Vec<RemoteResourceInfo>> {
        require_non_empty("list", "path", path)?;
        self.files.list(path).await
    }

    pub async fn stat(&self, path: &str) -> Result<RemoteResourceInfo> {
        require_non_empty("stat", "path", path)?;
        self.files.stat(path).await
    }

    pub async fn download(&self, remote: &str, local: &str) -> Result<u64> {
        require_transfer_paths("download", remote, local)?;
        self.files.download(remote, local).await
    }

    pub async fn download_with_progress<F>(&self, remote: &str, local: &str, on_progress: F) -> Result<u64>
    where
        F: Fn(ProgressInfo),
    {
        require_transfer_paths("download", remote, local)?;
        self.files.download_with_progress(remote, local, on_progress).await
    }

    pub async fn upload(&self, local: &str, remote: &str) -> Result<u64> {
        require_transfer_paths("upload", remote, local)?;
        self.files.upload(local, remote).await
    }

    pub async fn upload_with_progress<F>(&self, local: &str, remote: &str, on_progress: F) -> Result<u64>
    where
        F: Fn(ProgressInfo),
    {
        require_transfer_paths("upload", remote, local)?;
        self.files.upload_with_progress(local, remote, on_progress).await
    }

    pub async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        require_non_empty("chmod", "path", path)?;
        self.files.chmod(path, mode).await
    }

    pub async fn chown(&self, path: &str, uid: u32) -> Result<()> {
        require_non_empty("chown", "path", path)?;
        self.files.chown(path, uid).await
    }

    pub async fn chgrp(&self, path: &str, gid: u32) -> Result<()> {
        require_non_empty("chgrp", "path", path)?;
        self.files.chgrp(path, gid).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<()> {
        require_non_empty("mkdir", "path", path)?;
        self.files.mkdir(path).await
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        require_non_empty("remove", "path", path)?;
        self.files.remove(path).await
    }

    pub async fn realpath(&self, path: &str) -> Result<String> {
        require_non_empty("realpath", "path", path)?;
        self.files.realpath(path).await
    }

    // ── 종료 ─────────────────────────────────────────────────────────────────

    /// 세션 → 파일 채널 → 연결 순서로 정리 (여러 번 불러도 안전)
    pub async fn close(&self) -> Result<()> {
        self.session.close().await
    }
}

fn require_non_empty(operation: &'static str, what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::argument(operation, format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}

fn require_transfer_paths(operation: &'static str, remote: &str, local: &str) -> Result<()> {
    require_non_empty(operation, "remote path", remote)?;
    require_non_empty(operation, "local path", local)
}
