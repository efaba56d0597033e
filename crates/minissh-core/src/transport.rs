// miniSSH Transport Boundary
//
// 키 교환/암호화/호스트키 검증은 여기서 구현하지 않음
// SessionManager는 아래 trait만 보고 동작 → russh 구현(ssh.rs)과 테스트용 가짜 구현을 교체 가능
//
//   Transport        : connect(addr) → TransportHandle
//   TransportHandle  : authenticate / open_session / open_file_channel / close
//   CommandSession   : 명령마다 새 CommandChannel 발급
//   FileChannel      : SFTP 요청 (목록, 읽기/쓰기 스트림, 속성 변경)
//
// 구현체는 에러를 crate::Error 분류(Connection/Authentication/Channel/Path/Transfer)로 돌려줌

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{Credentials, HostAddr};
use crate::error::Result;
use crate::sftp::RemoteResourceInfo;

pub type RemoteReader = Pin<Box<dyn AsyncRead + Send>>;
pub type RemoteWriter = Pin<Box<dyn AsyncWrite + Send>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// 핸드셰이크까지 완료된 (아직 인증 전) 연결
    async fn connect(&self, addr: &HostAddr) -> Result<Box<dyn TransportHandle>>;
}

#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// 거부 시 Error::Authentication, 이후 재시도 가능해야 함
    async fn authenticate(&mut self, username: &str, credentials: &Credentials) -> Result<()>;

    async fn open_session(&self) -> Result<Box<dyn CommandSession>>;

    async fn open_file_channel(&self) -> Result<Box<dyn FileChannel>>;

    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

#[async_trait]
pub trait CommandSession: Send + Sync {
    async fn open_command(&self) -> Result<Box<dyn CommandChannel>>;

    fn is_open(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

/// 명령 하나 전용 채널 (exec 후 이벤트를 끝까지 읽고 버림)
#[async_trait]
pub trait CommandChannel: Send {
    async fn exec(&mut self, command: &str) -> Result<()>;

    /// 채널이 닫히면 Ok(None)
    async fn next_event(&mut self) -> Result<Option<ChannelEvent>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
}

/// set_attributes 한 번에 바꾸는 속성 하나
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrChange {
    Permissions(u32),
    Uid(u32),
    Gid(u32),
}

#[async_trait]
pub trait FileChannel: Send + Sync {
    /// 리모트가 보고한 순서 그대로 ("." / ".." 제외)
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteResourceInfo>>;

    async fn stat(&self, path: &str) -> Result<RemoteResourceInfo>;

    async fn open_read(&self, path: &str) -> Result<RemoteReader>;

    /// 생성 또는 truncate. shutdown() 시점에 원격 핸들이 닫힘
    async fn open_write(&self, path: &str) -> Result<RemoteWriter>;

    async fn set_attributes(&self, path: &str, change: AttrChange) -> Result<()>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn remove(&self, path: &str) -> Result<()>;

    async fn realpath(&self, path: &str) -> Result<String>;

    async fn close(&self) -> Result<()>;
}
