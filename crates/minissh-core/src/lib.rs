// miniSSH Core Library (russh 기반)
//
// SSH 연결 하나 위에서 명령 실행 + SFTP 파일 전송
// Client 하나로 connect → authenticate → exec / list / download / upload / chmod ... → close

pub mod client;
pub mod config;
pub mod error;
pub mod exec;
pub mod session;
pub mod sftp;
pub mod ssh;
pub mod state;
pub mod transport;
pub mod utils;

pub use client::Client;
pub use config::{ClientConfig, Credentials, HostAddr};
pub use error::{Error, Result};
pub use exec::CommandOutput;
pub use sftp::{ProgressInfo, RemoteResourceInfo, ResourceKind};
pub use state::{SessionState, StateObserver};
