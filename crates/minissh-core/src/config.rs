// miniSSH Connection Config
//
// HostAddr     : "host:port" 파싱 (포트 생략 시 22)
// Credentials  : 비밀번호 / 공개키 파일 목록 (하나의 authenticate로 처리)
// ClientConfig : 타임아웃, keepalive, 전송 청크 크기 (serde로 JSON/TOML 로드 가능)

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddr {
    pub host: String,
    pub port: u16,
}

impl HostAddr {
    /// "host", "host:port", "[::1]:port" 형식 허용
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::argument("connect", "host must not be empty"));
        }

        // IPv6: [addr]:port
        if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| Error::argument("connect", format!("unterminated '[' in {input}")))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => parse_port(p)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => return Err(Error::argument("connect", format!("unexpected {tail:?} after host"))),
            };
            return Self::checked(host, port);
        }

        match input.rsplit_once(':') {
            // 콜론이 하나뿐일 때만 host:port로 해석 (괄호 없는 IPv6는 포트 없음)
            Some((host, port)) if !host.contains(':') => Self::checked(host, parse_port(port)?),
            _ => Self::checked(input, DEFAULT_PORT),
        }
    }

    fn checked(host: &str, port: u16) -> Result<Self> {
        if host.is_empty() {
            return Err(Error::argument("connect", "host must not be empty"));
        }
        Ok(Self { host: host.to_string(), port })
    }
}

fn parse_port(port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(Error::argument("connect", format!("invalid port {port:?}"))),
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// 인증 수단
///
/// PublicKey는 순서대로 시도, 처음 수락된 키에서 중단
#[derive(Clone)]
pub enum Credentials {
    Password(Zeroizing<String>),
    PublicKey { paths: Vec<PathBuf> },
}

impl Credentials {
    pub fn password(password: impl Into<String>) -> Self {
        Credentials::Password(Zeroizing::new(password.into()))
    }

    pub fn public_key<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Credentials::PublicKey { paths: paths.into_iter().map(Into::into).collect() }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Credentials::Password(_)       => "password",
            Credentials::PublicKey { .. } => "publickey",
        }
    }
}

// 비밀번호는 로그에 남기지 않음
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(_) => f.write_str("Password(<redacted>)"),
            Credentials::PublicKey { paths } => {
                f.debug_struct("PublicKey").field("paths", paths).finish()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// TCP 연결 + 핸드셰이크 제한 시간 (초)
    pub connect_timeout_secs: u64,
    /// 무응답 시 연결 종료 (초), None이면 무제한
    pub inactivity_timeout_secs: Option<u64>,
    /// keepalive 전송 간격 (초)
    pub keepalive_interval_secs: Option<u64>,
    /// upload/download 청크 크기 (바이트)
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            inactivity_timeout_secs: None,
            keepalive_interval_secs: Some(30),
            chunk_size: 64 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.inactivity_timeout_secs.map(Duration::from_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        self.keepalive_interval_secs.map(Duration::from_secs)
    }

    /// 0이면 기본값으로 보정
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 { Self::default().chunk_size } else { self.chunk_size }
    }
}
