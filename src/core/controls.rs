use tokio::sync::watch;

/// 暂停/取消信号。
/// 取消在文件粒度之间检查，从不打断已开始的单文件传输；
/// 暂停用 watch 通道的条件等待实现，而非固定间隔轮询。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ControlState {
    paused: bool,
    cancelled: bool,
}

#[derive(Debug)]
pub struct SyncControls {
    state: watch::Sender<ControlState>,
}

impl SyncControls {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::default());
        Self { state: tx }
    }

    pub fn pause(&self) {
        self.state.send_modify(|s| s.paused = true);
    }

    pub fn resume(&self) {
        self.state.send_modify(|s| s.paused = false);
    }

    pub fn cancel(&self) {
        self.state.send_modify(|s| s.cancelled = true);
    }

    /// 新一轮 sync 开始时重置取消标志（暂停状态保留）
    pub fn reset_cancelled(&self) {
        self.state.send_modify(|s| s.cancelled = false);
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().cancelled
    }

    /// 暂停期间阻塞等待；返回 false 表示等待期间（或进入时）已被取消
    pub async fn wait_if_paused(&self) -> bool {
        let mut rx = self.state.subscribe();
        loop {
            let s = *rx.borrow_and_update();
            if s.cancelled {
                return false;
            }
            if !s.paused {
                return true;
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }
}

impl Default for SyncControls {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_not_paused_returns_immediately() {
        let controls = SyncControls::new();
        assert!(controls.wait_if_paused().await);
    }

    #[tokio::test]
    async fn test_resume_wakes_waiter() {
        let controls = Arc::new(SyncControls::new());
        controls.pause();

        let waiter = {
            let controls = controls.clone();
            tokio::spawn(async move { controls.wait_if_paused().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        controls.resume();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter_with_false() {
        let controls = Arc::new(SyncControls::new());
        controls.pause();

        let waiter = {
            let controls = controls.clone();
            tokio::spawn(async move { controls.wait_if_paused().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        controls.cancel();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_cancelled_keeps_paused() {
        let controls = SyncControls::new();
        controls.pause();
        controls.cancel();
        controls.reset_cancelled();
        assert!(controls.is_paused());
        assert!(!controls.is_cancelled());
    }
}
