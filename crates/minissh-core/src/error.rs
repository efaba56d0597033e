// miniSSH Error Types
//
// 모든 에러는 작업 이름 + 대상(host/path/command)을 함께 담아 호출자에게 전달
// 내부 재시도 없음: 재시도 정책은 호출자 몫
// close()는 하위 리소스 실패를 CloseFailed로 모아서 한 번에 보고

use thiserror::Error;

use crate::state::SessionState;

#[derive(Debug, Error)]
pub enum Error {
    /// 잘못된 호출 인자 (네트워크 접근 전에 실패)
    #[error("{operation}: invalid argument: {message}")]
    Argument {
        operation: &'static str,
        message: String,
    },

    /// TCP 연결 / 핸드셰이크 실패
    #[error("connect to {host} failed: {message}")]
    Connection { host: String, message: String },

    /// 서버가 자격 증명을 거부
    #[error("authentication as {username}@{host} failed: {message}")]
    Authentication {
        host: String,
        username: String,
        message: String,
    },

    /// 채널 열기/다중화 실패
    #[error("{operation}: channel error: {message}")]
    Channel {
        operation: &'static str,
        message: String,
    },

    /// 명령 채널 I/O 실패
    #[error("exec `{command}` failed: {message}")]
    Execution { command: String, message: String },

    /// 로컬/리모트 파일 I/O 실패
    #[error("{operation} {path} failed: {message}")]
    Transfer {
        operation: &'static str,
        path: String,
        message: String,
    },

    /// 리모트 경로 없음 / 권한 없음 / 디렉토리 아님
    #[error("{operation} {path}: {message}")]
    Path {
        operation: &'static str,
        path: String,
        message: String,
    },

    /// close() 이후 또는 이미 해제된 채널에 대한 작업
    #[error("{operation}: channel closed")]
    Closed { operation: &'static str },

    /// 현재 상태에서 허용되지 않는 작업
    #[error("{operation} not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// close() 중 발생한 하위 리소스 실패 모음
    #[error("close failed: {}", join_errors(.0))]
    CloseFailed(Vec<Error>),
}

impl Error {
    pub(crate) fn argument(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Argument { operation, message: message.into() }
    }

    pub(crate) fn channel(operation: &'static str, message: impl ToString) -> Self {
        Error::Channel { operation, message: message.to_string() }
    }

    pub(crate) fn transfer(operation: &'static str, path: &str, message: impl ToString) -> Self {
        Error::Transfer { operation, path: path.to_string(), message: message.to_string() }
    }

    pub(crate) fn path(operation: &'static str, path: &str, message: impl ToString) -> Self {
        Error::Path { operation, path: path.to_string(), message: message.to_string() }
    }

    /// 하위 단계(stat 등)의 경로/전송 오류를 상위 작업 이름으로 바꿈
    pub(crate) fn during(self, operation: &'static str) -> Self {
        match self {
            Error::Path { path, message, .. } => Error::Path { operation, path, message },
            Error::Transfer { path, message, .. } => Error::Transfer { operation, path, message },
            other => other,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed { .. })
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
