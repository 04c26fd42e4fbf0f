//! Agents: asynchronous, serialized-per-agent state updates.
//! Each agent owns a single-consumer action queue drained by one
//! `tokio::task` at a time, the same shape `GXRt` uses for its `tasks:
//! JoinSet<(BindId, Value)>` — one future per unit of async work, fed by an
//! mpsc channel rather than a shared mutex taken per-action.

use crate::Value;
use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::mpsc;
use triomphe::Arc;

pub type Action = Box<dyn FnOnce(&Value) -> anyhow::Result<Value> + Send>;

/// What happens to an agent's state after an action fails:
/// `Continue` keeps the pre-action value and records the error for
/// `agent-error`; `Fail` parks the agent so every subsequent `send`/
/// `send-off` is rejected until `restart-agent` clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    Continue,
    Fail,
}

static NEXT_AGENT_ID: AtomicU64 = AtomicU64::new(0);

pub struct Agent {
    id: u64,
    state: RwLock<Value>,
    error_mode: ErrorMode,
    failed: RwLock<Option<String>>,
    tx: mpsc::UnboundedSender<Action>,
}

/// Process-wide registry of the background drain tasks, mirroring `GXRt`'s
/// `FxHashMap`-keyed registries rather than leaking a `JoinHandle` per
/// agent into caller-visible state.
static DRAINERS: Mutex<Option<FxHashMap<u64, tokio::task::JoinHandle<()>>>> = Mutex::new(None);

impl Agent {
    pub fn new(initial: Value, error_mode: ErrorMode) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = Arc::new(Agent {
            id: NEXT_AGENT_ID.fetch_add(1, AtomicOrdering::Relaxed),
            state: RwLock::new(initial),
            error_mode,
            failed: RwLock::new(None),
            tx,
        });
        let worker = agent.clone();
        let handle = tokio::spawn(async move { worker.drain(rx).await });
        DRAINERS.lock().get_or_insert_with(FxHashMap::default).insert(agent.id, handle);
        agent
    }

    async fn drain(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Action>) {
        while let Some(action) = rx.recv().await {
            if self.failed.read().is_some() {
                continue;
            }
            let current = self.state.read().clone();
            match action(&current) {
                Ok(next) => *self.state.write() = next,
                Err(e) => match self.error_mode {
                    ErrorMode::Continue => {}
                    ErrorMode::Fail => *self.failed.write() = Some(e.to_string()),
                },
            }
        }
    }

    pub fn deref(&self) -> Value {
        self.state.read().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.failed.read().clone()
    }

    pub fn is_failed(&self) -> bool {
        self.failed.read().is_some()
    }

    pub fn restart(&self, new_state: Value) {
        *self.failed.write() = None;
        *self.state.write() = new_state;
    }

    /// Enqueues `action` without blocking the caller. Both `send` (bounded
    /// work, dispatched on the runtime's worker threads) and `send-off`
    /// (potentially blocking work) collapse to the same unbounded queue
    /// here since nothing in this runtime distinguishes thread pools the
    /// way the source language's dedicated agent-send-off pool does.
    pub fn dispatch(&self, action: impl FnOnce(&Value) -> anyhow::Result<Value> + Send + 'static) -> anyhow::Result<()> {
        if self.is_failed() {
            anyhow::bail!("agent {} has failed: {}", self.id, self.error().unwrap_or_default());
        }
        self.tx.send(Box::new(action)).map_err(|_| anyhow::anyhow!("agent {} queue closed", self.id))
    }

    /// `await`: enqueues a no-op marker action behind everything already
    /// queued and waits for it to be drained, rather than polling the
    /// queue's length — a concurrent `dispatch` racing this call is free
    /// to land after the marker without breaking the "as of call time"
    /// contract.
    pub async fn await_all(self: &Arc<Self>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let marker: Action = Box::new(move |v| {
            let _ = tx.lock().take().map(|tx| tx.send(()));
            Ok(v.clone())
        });
        if self.tx.send(marker).is_ok() {
            let _ = rx.await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn dispatched_actions_apply_in_order() {
        let agent = Agent::new(Value::Int(0), ErrorMode::Continue);
        for _ in 0..5 {
            agent
                .dispatch(|v| match v {
                    Value::Int(n) => Ok(Value::Int(n + 1)),
                    _ => unreachable!(),
                })
                .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(agent.deref(), Value::Int(5));
    }

    #[tokio::test]
    async fn await_all_waits_for_every_action_queued_before_the_call() {
        let agent = Agent::new(Value::Int(0), ErrorMode::Continue);
        for _ in 0..20 {
            agent
                .dispatch(|v| match v {
                    Value::Int(n) => Ok(Value::Int(n + 1)),
                    _ => unreachable!(),
                })
                .unwrap();
        }
        agent.await_all().await;
        assert_eq!(agent.deref(), Value::Int(20));
    }

    #[tokio::test]
    async fn fail_mode_parks_the_agent_after_an_error() {
        let agent = Agent::new(Value::Int(0), ErrorMode::Fail);
        agent.dispatch(|_| anyhow::bail!("boom")).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(agent.is_failed());
        assert!(agent.dispatch(|v| Ok(v.clone())).is_err());
        agent.restart(Value::Int(0));
        assert!(!agent.is_failed());
    }
}
