// miniSSH Session State Machine + Observer
//
// 연결 라이프사이클을 상태 머신으로 관리
// can_transition_to()로 허용된 전이만 가능하게 강제
//
// 상태 흐름:
//   Unconnected → Connected → Authenticated
//
//   어느 상태에서든 → Closed (종료 상태, 되돌릴 수 없음)

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Authenticated,
    Closed,
}

impl SessionState {
    /// 허용된 다음 상태인지 검증
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Unconnected, Connected)
            | (Connected, Authenticated)
            | (Unconnected | Connected | Authenticated, Closed)
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Authenticated)
    }
}

/// 상태 변경 알림 trait
///
/// 기본 구현은 TracingObserver (tracing 로그만 남김)
/// UI/테스트에서 같은 trait을 구현하면 상태 변화를 받아볼 수 있음
pub trait StateObserver: Send + Sync {
    fn on_state_changed(&self, prev: SessionState, next: SessionState);
}

pub struct TracingObserver;

impl StateObserver for TracingObserver {
    fn on_state_changed(&self, prev: SessionState, next: SessionState) {
        tracing::debug!("[state] {:?} → {:?}", prev, next);
    }
}
