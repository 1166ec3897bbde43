//! Per-run cooperative cancellation tokens. The agent streaming loop
//! checks its bound token between reads; `CancelRun` flips it and the
//! loop unwinds on its next check rather than being forcibly aborted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, run_id: &str) -> Arc<AtomicBool> {
        let token = Arc::new(AtomicBool::new(false));
        self.tokens.lock().insert(run_id.to_string(), token.clone());
        token
    }

    pub fn cancel(&self, run_id: &str) {
        if let Some(token) = self.tokens.lock().get(run_id) {
            token.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self, run_id: &str) -> bool {
        self.tokens
            .lock()
            .get(run_id)
            .map(|t| t.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn remove(&self, run_id: &str) {
        self.tokens.lock().remove(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flips_the_token_the_loop_observes() {
        let map = CancelMap::new();
        let token = map.create("run_1");
        assert!(!token.load(Ordering::SeqCst));
        map.cancel("run_1");
        assert!(token.load(Ordering::SeqCst));
    }

    #[test]
    fn unknown_run_cancel_is_a_no_op() {
        let map = CancelMap::new();
        map.cancel("run_missing");
        assert!(!map.is_cancelled("run_missing"));
    }
}
