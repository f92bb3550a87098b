//! Lifetime of the background work bound to one LAO.
//!
//! Each LAO gets a [`LaoScope`]. Tasks started on behalf of the LAO hold a
//! [`ScopeToken`] and `select!` on [`ScopeToken::cancelled`] alongside their
//! work. Tearing the LAO down cancels every token at once.

use lao_types::Hash;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::signal;
use tokio::sync::watch;

/// Cancellation signal for the work of one LAO.
pub struct LaoScope {
    lao: Hash,
    tx: watch::Sender<bool>,
}

impl LaoScope {
    pub fn new(lao: Hash) -> Self {
        let (tx, _) = watch::channel(false);
        Self { lao, tx }
    }

    pub fn lao(&self) -> &Hash {
        &self.lao
    }

    /// A token cancelled with this scope.
    pub fn token(&self) -> ScopeToken {
        ScopeToken(Some(self.tx.subscribe()))
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Handle held by a task running inside a scope. A detached token belongs
/// to no LAO and is never cancelled.
#[derive(Clone)]
pub struct ScopeToken(Option<watch::Receiver<bool>>);

impl ScopeToken {
    pub fn detached() -> Self {
        Self(None)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the scope is cancelled or dropped.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.0.as_mut() else {
            return std::future::pending().await;
        };
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Every live scope, by LAO id.
#[derive(Default)]
pub struct LaoScopes {
    scopes: Mutex<HashMap<Hash, LaoScope>>,
}

impl LaoScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token of the LAO's scope, opening the scope on first use.
    pub fn token(&self, lao: &Hash) -> ScopeToken {
        let mut scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());
        scopes
            .entry(lao.clone())
            .or_insert_with(|| LaoScope::new(lao.clone()))
            .token()
    }

    pub fn contains(&self, lao: &Hash) -> bool {
        self.scopes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(lao)
    }

    /// Cancel and forget the LAO's scope. Returns whether it existed.
    pub fn teardown(&self, lao: &Hash) -> bool {
        let scope = self.scopes.lock().unwrap_or_else(|e| e.into_inner()).remove(lao);
        match scope {
            Some(scope) => {
                scope.cancel();
                tracing::info!(lao = %scope.lao(), "LAO scope cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every scope, on client shutdown.
    pub fn teardown_all(&self) {
        let scopes: Vec<LaoScope> = self
            .scopes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, s)| s)
            .collect();
        for scope in scopes {
            scope.cancel();
        }
    }
}

/// Wait for SIGTERM or SIGINT.
pub async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
        _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
    }
}
