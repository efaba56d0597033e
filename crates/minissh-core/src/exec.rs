// miniSSH Command Executor
//
// exec() 한 번 = 짧은 채널 하나
// 채널이 닫힐 때까지 stdout/stderr를 모으고, exit status는 받았으면 함께 반환
// PTY / 대화형 명령은 지원하지 않음 (stdin을 읽는 명령은 끝나지 않을 수 있음)

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::transport::{ChannelEvent, CommandSession};

const STDOUT_CAPACITY: usize = 8 * 1024;

/// 명령 실행 결과
///
/// exit_status는 해석하지 않음: 0이 아니어도 exec()는 Ok
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// 서버가 exit-status를 보내지 않았으면 None (시그널 종료 등)
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

pub struct CommandExecutor {
    manager: Arc<SessionManager>,
}

impl CommandExecutor {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let session = self.manager.command_session("exec").await?;

        tracing::debug!("[exec] {}", command);
        let output = self
            .manager
            .until_closed("exec", run(session.as_ref(), command))
            .await?;

        tracing::debug!(
            "[exec] `{}` finished: exit={:?} stdout={}B stderr={}B",
            command, output.exit_status, output.stdout.len(), output.stderr.len()
        );
        Ok(output)
    }
}

async fn run(session: &dyn CommandSession, command: &str) -> Result<CommandOutput> {
    let mut channel = session
        .open_command()
        .await
        .map_err(|e| execution_error(command, e))?;

    channel
        .exec(command)
        .await
        .map_err(|e| execution_error(command, e))?;

    let mut output = CommandOutput {
        stdout: Vec::with_capacity(STDOUT_CAPACITY),
        ..CommandOutput::default()
    };

    // EOF 이후에도 exit-status가 올 수 있으므로 채널이 닫힐 때까지 읽음
    while let Some(event) = channel
        .next_event()
        .await
        .map_err(|e| execution_error(command, e))?
    {
        match event {
            ChannelEvent::Stdout(data)      => output.stdout.extend_from_slice(&data),
            ChannelEvent::Stderr(data)      => output.stderr.extend_from_slice(&data),
            ChannelEvent::ExitStatus(code)  => output.exit_status = Some(code),
        }
    }

    Ok(output)
}

fn execution_error(command: &str, err: Error) -> Error {
    match err {
        Error::Closed { .. } | Error::Execution { .. } => err,
        other => Error::Execution { command: command.to_string(), message: other.to_string() },
    }
}
