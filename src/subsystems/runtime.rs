//! Long-running task scaffolding.
//!
//! A [`Component`] is one independently running loop: the HTTP channel, the
//! log-rotation tick. `main` builds them with their shared state already
//! captured, then hands the set to [`spawn_components`], which runs them on
//! the Tokio pool under one [`CancellationToken`].
//!
//! The first component to fail cancels the token, so its siblings wind down
//! and the process can run its shutdown rotation.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

// ── Component ─────────────────────────────────────────────────────────────────

/// Boxed future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A self-contained unit that runs until `shutdown` fires or its work ends.
pub trait Component: Send + 'static {
    /// Name used in log lines.
    fn id(&self) -> &str;

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

// ── ComponentsHandle ──────────────────────────────────────────────────────────

/// Resolves once every spawned component has exited.
pub struct ComponentsHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl ComponentsHandle {
    /// Wait for all components; returns the first error any of them hit.
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Comms(format!("component supervisor panicked: {e}"))),
        }
    }
}

// ── spawn_components ──────────────────────────────────────────────────────────

/// Spawn each component as its own task.
///
/// An error or panic in any component cancels `shutdown`; the remaining
/// components are still drained before the handle resolves.
pub fn spawn_components(components: Vec<Box<dyn Component>>, shutdown: CancellationToken) -> ComponentsHandle {
    let handle = tokio::spawn(async move {
        let mut set: JoinSet<Result<(), AppError>> = JoinSet::new();

        for component in components {
            debug!(component = %component.id(), "spawning component");
            set.spawn(component.run(shutdown.clone()));
        }

        let mut first_err: Option<AppError> = None;

        while let Some(res) = set.join_next().await {
            match res {
                Err(e) => {
                    error!("component panicked: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Comms(format!("component panicked: {e}")));
                }
                Ok(Err(e)) => {
                    error!("component error: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Ok(Ok(())) => {}
            }
        }

        first_err.map_or(Ok(()), Err)
    });

    ComponentsHandle { inner: handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Waits;

    impl Component for Waits {
        fn id(&self) -> &str {
            "waits"
        }

        fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async move {
                shutdown.cancelled().await;
                Ok(())
            })
        }
    }

    struct Fails;

    impl Component for Fails {
        fn id(&self) -> &str {
            "fails"
        }

        fn run(self: Box<Self>, _shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async { Err(AppError::Comms("bind failed".into())) })
        }
    }

    #[tokio::test]
    async fn all_components_stop_on_cancel() {
        let shutdown = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Waits), Box::new(Waits)], shutdown.clone());
        shutdown.cancel();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn failure_cancels_siblings_and_is_reported() {
        let shutdown = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Waits), Box::new(Fails)], shutdown.clone());
        let err = handle.join().await.unwrap_err();
        assert!(err.to_string().contains("bind failed"));
        assert!(shutdown.is_cancelled());
    }
}
