use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use application::ChatService;

#[derive(Clone)]
pub struct AppState {
    pub service: ChatService,
    closing: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(service: ChatService) -> Self {
        Self {
            service,
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 停止接受新的 websocket 升级
    pub fn begin_shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}
