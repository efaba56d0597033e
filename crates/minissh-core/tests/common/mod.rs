// 테스트용 가짜 Transport
//
// FakeRemote : 메모리 파일시스템 + 스크립트된 명령 + 실패 주입 스위치
// 실제 SSH 서버 없이 SessionManager / Executor / FileTransferClient 경로를 모두 태움
//
// 명령:
//   echo <text>  → stdout "<text>\n", exit 0
//   warn <text>  → stderr "<text>\n", exit 0
//   exit <n>     → exit n
//   hang         → 이벤트 없이 영원히 대기 (close() 취소 테스트용)
//   그 외         → stderr "command not found", exit 127

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::sync::Notify;

use minissh_core::config::{ClientConfig, Credentials, HostAddr};
use minissh_core::error::{Error, Result};
use minissh_core::sftp::{RemoteResourceInfo, ResourceKind};
use minissh_core::state::{SessionState, StateObserver};
use minissh_core::transport::{
    AttrChange, ChannelEvent, CommandChannel, CommandSession, FileChannel, RemoteReader,
    RemoteWriter, Transport, TransportHandle,
};
use minissh_core::Client;

pub const PASSWORD: &str = "x";
pub const GOOD_KEY: &str = "/keys/id_ed25519";

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Entry {
    path: String,
    node: Node,
    mode: u32,
    uid: u32,
    gid: u32,
}

pub struct FakeRemote {
    entries: Mutex<Vec<Entry>>,
    pub connect_attempts: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_file_channel: AtomicBool,
    pub fail_session_close: AtomicBool,
    pub fail_files_close: AtomicBool,
    pub fail_connection_close: AtomicBool,
    pub close_log: Mutex<Vec<&'static str>>,
    pub exec_started: Notify,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        let remote = Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            connect_attempts: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            fail_file_channel: AtomicBool::new(false),
            fail_session_close: AtomicBool::new(false),
            fail_files_close: AtomicBool::new(false),
            fail_connection_close: AtomicBool::new(false),
            close_log: Mutex::new(Vec::new()),
            exec_started: Notify::new(),
        });
        remote.add_dir("/");
        remote.add_dir("/root");
        remote
    }

    pub fn add_dir(&self, path: &str) {
        self.entries.lock().unwrap().push(Entry {
            path: path.to_string(),
            node: Node::Dir,
            mode: 0o040755,
            uid: 0,
            gid: 0,
        });
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.path != path);
        entries.push(Entry {
            path: path.to_string(),
            node: Node::File(data.to_vec()),
            mode: 0o100644,
            uid: 0,
            gid: 0,
        });
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().iter().find_map(|e| match &e.node {
            Node::File(data) if e.path == path => Some(data.clone()),
            _ => None,
        })
    }

    pub fn closes(&self) -> Vec<&'static str> {
        self.close_log.lock().unwrap().clone()
    }

    fn info(entry: &Entry) -> RemoteResourceInfo {
        let size = match &entry.node {
            Node::File(data) => data.len() as u64,
            Node::Dir => 4096,
        };
        RemoteResourceInfo {
            name: entry.path.rsplit('/').next().unwrap_or("").to_string(),
            path: entry.path.clone(),
            kind: ResourceKind::from_mode(entry.mode),
            size,
            permissions: Some(entry.mode),
            uid: Some(entry.uid),
            gid: Some(entry.gid),
            atime: Some(1_700_000_000),
            mtime: Some(1_700_000_000),
        }
    }

    fn find(&self, operation: &'static str, path: &str) -> Result<Entry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.path == path)
            .cloned()
            .ok_or_else(|| Error::Path {
                operation,
                path: path.to_string(),
                message: "No such file".to_string(),
            })
    }

    fn parent_of(path: &str) -> &str {
        match path.rsplit_once('/') {
            Some(("", _)) => "/",
            Some((parent, _)) => parent,
            None => ".",
        }
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

pub struct FakeTransport {
    pub remote: Arc<FakeRemote>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, addr: &HostAddr) -> Result<Box<dyn TransportHandle>> {
        self.remote.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.remote.fail_connect.load(Ordering::SeqCst) || addr.host == "unreachable" {
            return Err(Error::Connection {
                host: addr.to_string(),
                message: "Connection refused".to_string(),
            });
        }
        Ok(Box::new(FakeHandle {
            remote: Arc::clone(&self.remote),
            addr: addr.clone(),
            authenticated: false,
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeHandle {
    remote: Arc<FakeRemote>,
    addr: HostAddr,
    authenticated: bool,
    closed: AtomicBool,
}

#[async_trait]
impl TransportHandle for FakeHandle {
    async fn authenticate(&mut self, username: &str, credentials: &Credentials) -> Result<()> {
        let accepted = match credentials {
            Credentials::Password(pw) => username == "root" && pw.as_str() == PASSWORD,
            Credentials::PublicKey { paths } => paths.iter().any(|p| p == &PathBuf::from(GOOD_KEY)),
        };
        if !accepted {
            return Err(Error::Authentication {
                host: self.addr.to_string(),
                username: username.to_string(),
                message: "Permission denied".to_string(),
            });
        }
        self.authenticated = true;
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn CommandSession>> {
        assert!(self.authenticated, "session opened before authentication");
        Ok(Box::new(FakeSession { remote: Arc::clone(&self.remote), open: AtomicBool::new(true) }))
    }

    async fn open_file_channel(&self) -> Result<Box<dyn FileChannel>> {
        assert!(self.authenticated, "file channel opened before authentication");
        if self.remote.fail_file_channel.load(Ordering::SeqCst) {
            return Err(Error::Channel {
                operation: "open file channel",
                message: "subsystem request failed".to_string(),
            });
        }
        Ok(Box::new(FakeFiles { remote: Arc::clone(&self.remote) }))
    }

    async fn close(&self) -> Result<()> {
        self.remote.close_log.lock().unwrap().push("connection");
        self.closed.store(true, Ordering::SeqCst);
        if self.remote.fail_connection_close.load(Ordering::SeqCst) {
            return Err(Error::Channel {
                operation: "close connection",
                message: "reset by peer".to_string(),
            });
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ── 명령 ─────────────────────────────────────────────────────────────────────

struct FakeSession {
    remote: Arc<FakeRemote>,
    open: AtomicBool,
}

#[async_trait]
impl CommandSession for FakeSession {
    async fn open_command(&self) -> Result<Box<dyn CommandChannel>> {
        Ok(Box::new(FakeCommand {
            remote: Arc::clone(&self.remote),
            events: VecDeque::new(),
            hang: false,
        }))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.remote.close_log.lock().unwrap().push("session");
        self.open.store(false, Ordering::SeqCst);
        if self.remote.fail_session_close.load(Ordering::SeqCst) {
            return Err(Error::Channel {
                operation: "close session",
                message: "broken pipe".to_string(),
            });
        }
        Ok(())
    }
}

struct FakeCommand {
    remote: Arc<FakeRemote>,
    events: VecDeque<ChannelEvent>,
    hang: bool,
}

#[async_trait]
impl CommandChannel for FakeCommand {
    async fn exec(&mut self, command: &str) -> Result<()> {
        let (program, arg) = command.split_once(' ').unwrap_or((command, ""));
        match program {
            "echo" => {
                self.events.push_back(ChannelEvent::Stdout(format!("{arg}\n").into_bytes()));
                self.events.push_back(ChannelEvent::ExitStatus(0));
            }
            "warn" => {
                self.events.push_back(ChannelEvent::Stderr(format!("{arg}\n").into_bytes()));
                self.events.push_back(ChannelEvent::ExitStatus(0));
            }
            "exit" => {
                let code = arg.parse().unwrap_or(1);
                self.events.push_back(ChannelEvent::ExitStatus(code));
            }
            "hang" => self.hang = true,
            _ => {
                self.events.push_back(ChannelEvent::Stderr(b"command not found\n".to_vec()));
                self.events.push_back(ChannelEvent::ExitStatus(127));
            }
        }
        self.remote.exec_started.notify_one();
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChannelEvent>> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(self.events.pop_front())
    }
}

// ── 파일 ─────────────────────────────────────────────────────────────────────

struct FakeFiles {
    remote: Arc<FakeRemote>,
}

#[async_trait]
impl FileChannel for FakeFiles {
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteResourceInfo>> {
        let dir = self.remote.find("list", path)?;
        if !matches!(dir.node, Node::Dir) {
            return Err(Error::Path {
                operation: "list",
                path: path.to_string(),
                message: "Not a directory".to_string(),
            });
        }
        // 삽입 순서 = 서버가 보고하는 순서
        Ok(self
            .remote
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.path != path && FakeRemote::parent_of(&e.path) == path)
            .map(FakeRemote::info)
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<RemoteResourceInfo> {
        Ok(FakeRemote::info(&self.remote.find("stat", path)?))
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader> {
        match self.remote.find("download", path)?.node {
            Node::File(data) => Ok(Box::pin(std::io::Cursor::new(data))),
            Node::Dir => Err(Error::Path {
                operation: "download",
                path: path.to_string(),
                message: "Is a directory".to_string(),
            }),
        }
    }

    async fn open_write(&self, path: &str) -> Result<RemoteWriter> {
        self.remote.find("upload", FakeRemote::parent_of(path))?;
        Ok(Box::pin(FakeWriter {
            remote: Arc::clone(&self.remote),
            path: path.to_string(),
            buf: Vec::new(),
        }))
    }

    async fn set_attributes(&self, path: &str, change: AttrChange) -> Result<()> {
        let operation = match change {
            AttrChange::Permissions(_) => "chmod",
            AttrChange::Uid(_) => "chown",
            AttrChange::Gid(_) => "chgrp",
        };
        let mut entries = self.remote.entries.lock().unwrap();
        let entry = entries.iter_mut().find(|e| e.path == path).ok_or_else(|| Error::Path {
            operation,
            path: path.to_string(),
            message: "No such file".to_string(),
        })?;
        match change {
            AttrChange::Permissions(mode) => entry.mode = (entry.mode & 0o170000) | (mode & 0o7777),
            AttrChange::Uid(uid) => entry.uid = uid,
            AttrChange::Gid(gid) => entry.gid = gid,
        }
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.remote.find("mkdir", FakeRemote::parent_of(path))?;
        self.remote.add_dir(path);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.remote.find("remove", path)?;
        self.remote.entries.lock().unwrap().retain(|e| e.path != path);
        Ok(())
    }

    async fn realpath(&self, path: &str) -> Result<String> {
        Ok(if path == "." { "/root".to_string() } else { path.to_string() })
    }

    async fn close(&self) -> Result<()> {
        self.remote.close_log.lock().unwrap().push("files");
        if self.remote.fail_files_close.load(Ordering::SeqCst) {
            return Err(Error::Channel {
                operation: "close file channel",
                message: "sftp server gone".to_string(),
            });
        }
        Ok(())
    }
}

/// shutdown() 시점에 파일 내용을 확정
struct FakeWriter {
    remote: Arc<FakeRemote>,
    path: String,
    buf: Vec<u8>,
}

impl AsyncWrite for FakeWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        self.get_mut().buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.remote.add_file(&this.path, &this.buf);
        Poll::Ready(Ok(()))
    }
}

// ── 헬퍼 ─────────────────────────────────────────────────────────────────────

pub struct RecordingObserver {
    pub transitions: Arc<Mutex<Vec<(SessionState, SessionState)>>>,
}

impl StateObserver for RecordingObserver {
    fn on_state_changed(&self, prev: SessionState, next: SessionState) {
        self.transitions.lock().unwrap().push((prev, next));
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fake_client() -> (Client, Arc<FakeRemote>) {
    init_tracing();
    let remote = FakeRemote::new();
    let transport = Arc::new(FakeTransport { remote: Arc::clone(&remote) });
    let config = ClientConfig { chunk_size: 4, ..ClientConfig::default() };
    (Client::with_transport(transport, config), remote)
}

/// connect("localhost:22") + root/x 인증까지 완료된 클라이언트
pub async fn authenticated_client() -> (Client, Arc<FakeRemote>) {
    let (client, remote) = fake_client();
    client.connect("localhost:22").await.unwrap();
    client.authenticate_password("root", PASSWORD).await.unwrap();
    (client, remote)
}
