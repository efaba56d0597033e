// miniSSH File Transfer
//
// RemoteResourceInfo : 리모트 파일 엔트리 스냅샷 (list/stat 결과)
// ProgressInfo       : 전송 진척 정보 (콜백으로 전달)
// FileTransferClient : list, download, upload, chmod/chown/chgrp, stat, mkdir, remove, realpath
//
// 전송 도중 실패하면 대상 파일 내용은 정의되지 않음 (부분 파일 정리 안 함)

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::transport::AttrChange;
use crate::utils::{fmt_size, mtime_str, permission_str};

// ── 공통 타입 ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl ResourceKind {
    /// permission bits의 S_IFMT 부분으로 판별
    pub fn from_mode(mode: u32) -> Self {
        match mode & 0o170000 {
            0o040000 => ResourceKind::Directory,
            0o100000 => ResourceKind::File,
            0o120000 => ResourceKind::Symlink,
            _        => ResourceKind::Other,
        }
    }
}

/// 리모트 파일/디렉토리 엔트리
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResourceInfo {
    pub name: String,
    pub path: String,
    pub kind: ResourceKind,
    pub size: u64,
    pub permissions: Option<u32>,  // unix permission bits (file type 포함)
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<u64>,        // unix timestamp
    pub mtime: Option<u64>,
}

impl RemoteResourceInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == ResourceKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }

    /// "drwxr-xr-x" 형식. permission bits 없으면 kind로 최소 표현
    pub fn permission_str(&self) -> String {
        match self.permissions {
            Some(p) => permission_str(p),
            None    => if self.is_dir() { "d?????????" } else { "----------" }.to_string(),
        }
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.mtime.and_then(|t| DateTime::from_timestamp(t as i64, 0))
    }

    /// ls -la 스타일 날짜 문자열
    pub fn mtime_str(&self) -> String {
        self.mtime.map(mtime_str).unwrap_or_else(|| "?".to_string())
    }
}

/// 전송 진척 정보
///
/// *_with_progress의 on_progress 콜백으로 청크마다 전달됨
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub transferred: u64,   // 현재까지 전송된 바이트
    pub total: u64,         // 전체 파일 크기
    pub elapsed_secs: f64,  // 경과 시간 (초)
}

impl ProgressInfo {
    /// 전송률 (0.0 ~ 1.0)
    pub fn ratio(&self) -> f64 {
        if self.total > 0 { self.transferred as f64 / self.total as f64 } else { 0.0 }
    }

    /// 퍼센트 (0 ~ 100)
    pub fn percent(&self) -> u64 {
        (self.ratio() * 100.0) as u64
    }

    /// 전송 속도 (bytes/sec)
    pub fn speed(&self) -> u64 {
        if self.elapsed_secs > 0.0 {
            (self.transferred as f64 / self.elapsed_secs) as u64
        } else {
            0
        }
    }
}

// ── FileTransferClient ────────────────────────────────────────────────────────

pub struct FileTransferClient {
    manager: Arc<SessionManager>,
    chunk_size: usize,
}

impl FileTransferClient {
    pub fn new(manager: Arc<SessionManager>, chunk_size: usize) -> Self {
        Self { manager, chunk_size: chunk_size.max(1) }
    }

    pub async fn list(&self, path: &str) -> Result<Vec<RemoteResourceInfo>> {
        let files = self.manager.file_channel("list").await?;
        let entries = self.manager.until_closed("list", files.read_dir(path)).await?;
        tracing::debug!("[sftp] list {}: {} entries", path, entries.len());
        Ok(entries)
    }

    pub async fn stat(&self, path: &str) -> Result<RemoteResourceInfo> {
        let files = self.manager.file_channel("stat").await?;
        self.manager.until_closed("stat", files.stat(path)).await
    }

    pub async fn download(&self, remote: &str, local: &str) -> Result<u64> {
        self.download_with_progress(remote, local, |_| {}).await
    }

    /// 리모트 파일을 청크 단위로 로컬에 기록, 전송한 바이트 수 반환
    pub async fn download_with_progress<F>(&self, remote: &str, local: &str, on_progress: F) -> Result<u64>
    where
        F: Fn(ProgressInfo),
    {
        let files = self.manager.file_channel("download").await?;

        let transfer = async {
            let total = files.stat(remote).await.map_err(|e| e.during("download"))?.size;
            let mut reader = files.open_read(remote).await?;
            let mut writer = tokio::fs::File::create(local)
                .await
                .map_err(|e| Error::transfer("download", local, e))?;

            let copied = copy_chunks(
                &mut reader,
                &mut writer,
                self.chunk_size,
                total,
                &on_progress,
                |e| Error::transfer("download", remote, e),
                |e| Error::transfer("download", local, e),
            )
            .await?;

            writer.flush().await.map_err(|e| Error::transfer("download", local, e))?;
            Ok::<u64, Error>(copied)
        };

        let copied = self.manager.until_closed("download", transfer).await?;
        tracing::info!("[sftp] downloaded {} → {} ({})", remote, local, fmt_size(copied));
        Ok(copied)
    }

    pub async fn upload(&self, local: &str, remote: &str) -> Result<u64> {
        self.upload_with_progress(local, remote, |_| {}).await
    }

    /// 로컬 파일을 리모트로 전송 (기존 파일은 덮어씀), 전송한 바이트 수 반환
    pub async fn upload_with_progress<F>(&self, local: &str, remote: &str, on_progress: F) -> Result<u64>
    where
        F: Fn(ProgressInfo),
    {
        let files = self.manager.file_channel("upload").await?;

        let transfer = async {
            let mut reader = tokio::fs::File::open(local)
                .await
                .map_err(|e| Error::transfer("upload", local, e))?;
            let total = reader
                .metadata()
                .await
                .map_err(|e| Error::transfer("upload", local, e))?
                .len();
            let mut writer = files.open_write(remote).await?;

            let copied = copy_chunks(
                &mut reader,
                &mut writer,
                self.chunk_size,
                total,
                &on_progress,
                |e| Error::transfer("upload", local, e),
                |e| Error::transfer("upload", remote, e),
            )
            .await?;

            // shutdown에서 원격 핸들 close → 서버가 쓰기를 확정
            writer.shutdown().await.map_err(|e| Error::transfer("upload", remote, e))?;
            Ok::<u64, Error>(copied)
        };

        let copied = self.manager.until_closed("upload", transfer).await?;
        tracing::info!("[sftp] uploaded {} → {} ({})", local, remote, fmt_size(copied));
        Ok(copied)
    }

    pub async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        self.set_attribute("chmod", path, AttrChange::Permissions(mode)).await
    }

    pub async fn chown(&self, path: &str, uid: u32) -> Result<()> {
        self.set_attribute("chown", path, AttrChange::Uid(uid)).await
    }

    pub async fn chgrp(&self, path: &str, gid: u32) -> Result<()> {
        self.set_attribute("chgrp", path, AttrChange::Gid(gid)).await
    }

    async fn set_attribute(&self, operation: &'static str, path: &str, change: AttrChange) -> Result<()> {
        let files = self.manager.file_channel(operation).await?;
        self.manager
            .until_closed(operation, files.set_attributes(path, change))
            .await?;
        tracing::debug!("[sftp] {} {} ({:?})", operation, path, change);
        Ok(())
    }

    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let files = self.manager.file_channel("mkdir").await?;
        self.manager.until_closed("mkdir", files.mkdir(path)).await
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        let files = self.manager.file_channel("remove").await?;
        self.manager.until_closed("remove", files.remove(path)).await
    }

    /// 서버 기준 절대경로 ("." → 홈 디렉토리)
    pub async fn realpath(&self, path: &str) -> Result<String> {
        let files = self.manager.file_channel("realpath").await?;
        self.manager.until_closed("realpath", files.realpath(path)).await
    }
}

/// reader → writer 청크 복사, 청크마다 on_progress 호출
async fn copy_chunks<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    total: u64,
    on_progress: &F,
    read_err: impl Fn(std::io::Error) -> Error,
    write_err: impl Fn(std::io::Error) -> Error,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    F: Fn(ProgressInfo),
{
    let mut buf         = vec![0u8; chunk_size];
    let mut transferred = 0u64;
    let start           = std::time::Instant::now();

    loop {
        let n = reader.read(&mut buf).await.map_err(&read_err)?;
        if n == 0 { break; }

        writer.write_all(&buf[..n]).await.map_err(&write_err)?;

        transferred += n as u64;
        on_progress(ProgressInfo {
            transferred,
            total,
            elapsed_secs: start.elapsed().as_secs_f64(),
        });
    }

    Ok(transferred)
}
