// miniSSH Transport (russh 기반)
//
// russh로 SSH 연결/인증/채널을 처리하고
// russh-sftp로 SFTP 채널을 수립합니다.
//
// 이 파일만 russh 타입을 알고, 나머지는 transport.rs의 trait만 사용

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, ChannelStream, Disconnect};
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::{RawSftpSession, SftpSession};
use russh_sftp::protocol::{FileAttributes, StatusCode};

use crate::config::{ClientConfig, Credentials, HostAddr};
use crate::error::{Error, Result};
use crate::sftp::{RemoteResourceInfo, ResourceKind};
use crate::transport::{
    AttrChange, ChannelEvent, CommandChannel, CommandSession, FileChannel, RemoteReader,
    RemoteWriter, Transport, TransportHandle,
};

// russh 클라이언트 핸들러 (서버 이벤트 처리)
struct ClientHandler {
    host: String,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        // known_hosts 저장/검증은 범위 밖: 지문만 남기고 수락
        tracing::debug!(
            "[ssh] host key for {}: {}",
            self.host,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}

pub struct RusshTransport {
    config: Arc<client::Config>,
    connect_timeout: Duration,
}

impl RusshTransport {
    pub fn new(config: &ClientConfig) -> Self {
        let russh_config = client::Config {
            inactivity_timeout: config.inactivity_timeout(),
            keepalive_interval: config.keepalive_interval(),
            ..Default::default()
        };
        Self {
            config: Arc::new(russh_config),
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn connect(&self, addr: &HostAddr) -> Result<Box<dyn TransportHandle>> {
        let handler = ClientHandler { host: addr.to_string() };
        let connecting = client::connect(
            Arc::clone(&self.config),
            (addr.host.as_str(), addr.port),
            handler,
        );

        let handle = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| Error::Connection {
                host: addr.to_string(),
                message: format!("timed out after {:?}", self.connect_timeout),
            })?
            .map_err(|e| Error::Connection { host: addr.to_string(), message: e.to_string() })?;

        Ok(Box::new(RusshHandle { addr: addr.clone(), handle: Arc::new(handle) }))
    }
}

struct RusshHandle {
    addr: HostAddr,
    handle: Arc<Handle<ClientHandler>>,
}

#[async_trait]
impl TransportHandle for RusshHandle {
    async fn authenticate(&mut self, username: &str, credentials: &Credentials) -> Result<()> {
        let host = self.addr.to_string();
        let reject = |message: String| Error::Authentication {
            host: host.clone(),
            username: username.to_string(),
            message,
        };

        // 인증 전에는 세션/파일 채널이 없으므로 핸들을 단독 소유
        let handle = Arc::get_mut(&mut self.handle)
            .ok_or_else(|| reject("connection already has open channels".to_string()))?;

        match credentials {
            Credentials::Password(password) => {
                let accepted = handle
                    .authenticate_password(username, password.as_str())
                    .await
                    .map_err(|e| reject(e.to_string()))?;
                if accepted { Ok(()) } else { Err(reject("password rejected".to_string())) }
            }
            Credentials::PublicKey { paths } => {
                let mut reasons = Vec::new();
                for path in paths {
                    let key = match load_key(path) {
                        Ok(key) => key,
                        Err(e) => {
                            tracing::warn!("[ssh] skipping key {}: {}", path.display(), e);
                            reasons.push(format!("{}: {}", path.display(), e));
                            continue;
                        }
                    };
                    match handle.authenticate_publickey(username, Arc::new(key)).await {
                        Ok(true)  => return Ok(()),
                        Ok(false) => reasons.push(format!("{}: rejected", path.display())),
                        Err(e)    => return Err(reject(e.to_string())),
                    }
                }
                if reasons.is_empty() {
                    Err(reject("no key files given".to_string()))
                } else {
                    Err(reject(reasons.join(", ")))
                }
            }
        }
    }

    async fn open_session(&self) -> Result<Box<dyn CommandSession>> {
        Ok(Box::new(RusshSession {
            handle: Arc::clone(&self.handle),
            open: AtomicBool::new(true),
        }))
    }

    async fn open_file_channel(&self) -> Result<Box<dyn FileChannel>> {
        // 파일 I/O용 + 디렉토리 목록용, sftp 서브시스템 두 개
        let files = self.sftp_stream().await?;
        let dirs = self.sftp_stream().await?;

        let sftp = RusshFiles::open(files, dirs)
            .await
            .map_err(|e| Error::channel("open file channel", e))?;

        tracing::debug!("[ssh] sftp subsystem ready on {}", self.addr);
        Ok(Box::new(sftp))
    }

    async fn close(&self) -> Result<()> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| Error::channel("close connection", e))
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

impl RusshHandle {
    async fn sftp_stream(&self) -> Result<ChannelStream<Msg>> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::channel("open file channel", e))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| Error::channel("open file channel", e))?;

        Ok(channel.into_stream())
    }
}

fn load_key(path: &Path) -> std::result::Result<russh::keys::key::KeyPair, russh::keys::Error> {
    russh::keys::load_secret_key(path, None)
}

// ── 명령 실행 ────────────────────────────────────────────────────────────────

struct RusshSession {
    handle: Arc<Handle<ClientHandler>>,
    open: AtomicBool,
}

#[async_trait]
impl CommandSession for RusshSession {
    async fn open_command(&self) -> Result<Box<dyn CommandChannel>> {
        if !self.is_open() {
            return Err(Error::Closed { operation: "open command channel" });
        }
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::channel("open command channel", e))?;
        Ok(Box::new(RusshCommand { channel }))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.handle.is_closed()
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}

struct RusshCommand {
    channel: Channel<Msg>,
}

#[async_trait]
impl CommandChannel for RusshCommand {
    async fn exec(&mut self, command: &str) -> Result<()> {
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| Error::channel("exec", e))
    }

    async fn next_event(&mut self) -> Result<Option<ChannelEvent>> {
        // EOF는 무시: RFC 4254 5.3상 EOF 없이 닫힐 수도, 데이터보다 먼저 올 수도 있음
        loop {
            match self.channel.wait().await {
                None | Some(ChannelMsg::Close) => return Ok(None),
                Some(ChannelMsg::Data { data }) => {
                    return Ok(Some(ChannelEvent::Stdout(data.to_vec())))
                }
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    return Ok(Some(ChannelEvent::Stderr(data.to_vec())))
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    return Ok(Some(ChannelEvent::ExitStatus(exit_status)))
                }
                Some(ChannelMsg::Failure) => {
                    return Err(Error::channel("exec", "server refused the exec request"))
                }
                Some(_) => continue,
            }
        }
    }
}

// ── SFTP ──────────────────────────────────────────────────────────────────────

// SftpSession::read_dir는 READDIR 배치를 역순으로 이어붙이므로
// 목록은 RawSftpSession으로 직접 읽음
struct RusshFiles {
    sftp: SftpSession,
    dirs: RawSftpSession,
}

impl RusshFiles {
    async fn open<F, D>(files: F, dirs: D) -> std::result::Result<Self, SftpError>
    where
        F: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        D: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let sftp = SftpSession::new(files).await?;
        let dirs = RawSftpSession::new(dirs);
        dirs.init().await?;
        Ok(Self { sftp, dirs })
    }
}

/// 서버 status → Path (경로 문제) / Transfer (그 외)
fn sftp_error(operation: &'static str, path: &str, err: SftpError) -> Error {
    let path_problem = matches!(
        &err,
        SftpError::Status(status) if matches!(
            status.status_code,
            StatusCode::NoSuchFile | StatusCode::PermissionDenied | StatusCode::Failure
        )
    );
    if path_problem {
        Error::path(operation, path, err)
    } else {
        Error::transfer(operation, path, err)
    }
}

fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() { format!("/{}", name) } else { format!("{}/{}", dir, name) }
}

fn file_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(path)
        .to_string()
}

fn to_info(name: String, path: String, attrs: &FileAttributes) -> RemoteResourceInfo {
    RemoteResourceInfo {
        name,
        path,
        kind: attrs.permissions.map(ResourceKind::from_mode).unwrap_or(ResourceKind::Other),
        size: attrs.size.unwrap_or(0),
        permissions: attrs.permissions,
        uid: attrs.uid,
        gid: attrs.gid,
        atime: attrs.atime.map(u64::from),
        mtime: attrs.mtime.map(u64::from),
    }
}

#[async_trait]
impl FileChannel for RusshFiles {
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteResourceInfo>> {
        let handle = self.dirs.opendir(path)
            .await
            .map_err(|e| sftp_error("list", path, e))?
            .handle;

        // Eof까지 배치를 받은 순서대로 뒤에 붙임
        let mut entries = Vec::new();
        let listed = loop {
            match self.dirs.readdir(handle.as_str()).await {
                Ok(name) => entries.extend(
                    name.files
                        .into_iter()
                        .filter(|f| f.filename != "." && f.filename != ".."),
                ),
                Err(SftpError::Status(status)) if status.status_code == StatusCode::Eof => {
                    break Ok(())
                }
                Err(e) => break Err(sftp_error("list", path, e)),
            }
        };

        let closed = self.dirs.close(handle).await;
        listed?;
        closed.map_err(|e| sftp_error("list", path, e))?;

        Ok(entries
            .into_iter()
            .map(|f| {
                let full = join_remote(path, &f.filename);
                to_info(f.filename, full, &f.attrs)
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<RemoteResourceInfo> {
        let attrs = self.sftp.metadata(path)
            .await
            .map_err(|e| sftp_error("stat", path, e))?;
        Ok(to_info(file_name(path), path.to_string(), &attrs))
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader> {
        let file = self.sftp.open(path)
            .await
            .map_err(|e| sftp_error("download", path, e))?;
        Ok(Box::pin(file))
    }

    async fn open_write(&self, path: &str) -> Result<RemoteWriter> {
        // CREATE | TRUNCATE | WRITE
        let file = self.sftp.create(path)
            .await
            .map_err(|e| sftp_error("upload", path, e))?;
        Ok(Box::pin(file))
    }

    async fn set_attributes(&self, path: &str, change: AttrChange) -> Result<()> {
        let operation = match change {
            AttrChange::Permissions(_) => "chmod",
            AttrChange::Uid(_)         => "chown",
            AttrChange::Gid(_)         => "chgrp",
        };

        let mut attrs = FileAttributes::empty();
        match change {
            AttrChange::Permissions(mode) => attrs.permissions = Some(mode),
            // SFTPv3는 uid/gid를 한 쌍으로만 보냄 → 나머지 반쪽은 현재 값 유지
            AttrChange::Uid(uid) => {
                let current = self.sftp.metadata(path)
                    .await
                    .map_err(|e| sftp_error(operation, path, e))?;
                attrs.uid = Some(uid);
                attrs.gid = current.gid;
            }
            AttrChange::Gid(gid) => {
                let current = self.sftp.metadata(path)
                    .await
                    .map_err(|e| sftp_error(operation, path, e))?;
                attrs.uid = current.uid;
                attrs.gid = Some(gid);
            }
        }

        self.sftp.set_metadata(path, attrs)
            .await
            .map_err(|e| sftp_error(operation, path, e))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.sftp.create_dir(path)
            .await
            .map_err(|e| sftp_error("mkdir", path, e))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.sftp.remove_file(path)
            .await
            .map_err(|e| sftp_error("remove", path, e))
    }

    async fn realpath(&self, path: &str) -> Result<String> {
        self.sftp.canonicalize(path)
            .await
            .map_err(|e| sftp_error("realpath", path, e))
    }

    async fn close(&self) -> Result<()> {
        let dirs = self.dirs.close_session();
        self.sftp.close()
            .await
            .map_err(|e| Error::channel("close file channel", e))?;
        dirs.map_err(|e| Error::channel("close file channel", e))
    }
}
