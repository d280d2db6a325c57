use std::fmt::{Debug, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use crate::error::InferenceError;

type Job<M> = Box<dyn FnOnce(&mut M) + Send>;

/// Owns a value on a dedicated thread and runs closures against it.
///
/// Burn modules are `Send` but not `Sync`; keeping the module on its own
/// thread lets any number of request threads share one instance.
pub struct ModelHost<M> {
    accessor: ModelAccessor<M>,
    abort_tx: crossbeam::channel::Sender<()>,
    join_handle: Option<JoinHandle<M>>,
}

impl<M: Send + 'static> ModelHost<M> {
    pub fn spawn(name: &str, model: M) -> Result<Self, std::io::Error> {
        let (abort_tx, abort_rx) = crossbeam::channel::unbounded::<()>();
        let (tx, rx) = crossbeam::channel::unbounded::<Job<M>>();
        let join_handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut m = model;
                loop {
                    crossbeam::channel::select! {
                        recv(rx) -> job => {
                            match job {
                                Ok(job) => {
                                    // A panicking job drops its reply sender, which the
                                    // caller observes as a failed call.
                                    if catch_unwind(AssertUnwindSafe(|| job(&mut m))).is_err() {
                                        log::error!("Model call panicked");
                                    }
                                }
                                Err(_) => break,
                            }
                        }
                        recv(abort_rx) -> _ => {
                            break;
                        }
                    }
                }
                m
            })?;
        Ok(Self {
            accessor: ModelAccessor { tx },
            abort_tx,
            join_handle: Some(join_handle),
        })
    }

    pub fn accessor(&self) -> ModelAccessor<M> {
        self.accessor.clone()
    }

    /// Stop the host thread and hand the model back.
    pub fn into_model(mut self) -> Option<M> {
        let _ = self.abort_tx.send(());
        self.join_handle.take().and_then(|handle| handle.join().ok())
    }
}

impl<M> std::ops::Deref for ModelHost<M> {
    type Target = ModelAccessor<M>;

    fn deref(&self) -> &Self::Target {
        &self.accessor
    }
}

impl<M> Drop for ModelHost<M> {
    fn drop(&mut self) {
        let _ = self.abort_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

pub struct ModelAccessor<M> {
    tx: crossbeam::channel::Sender<Job<M>>,
}

impl<M> Debug for ModelAccessor<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAccessor")
            .field("pending", &self.tx.len())
            .finish()
    }
}

impl<M> Clone for ModelAccessor<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> ModelAccessor<M> {
    /// Run `f` on the host thread and wait for its result.
    pub fn with<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut M) -> R + Send + 'static,
    ) -> Result<R, InferenceError> {
        let (ret_tx, ret_rx) = crossbeam::channel::bounded(1);
        self.tx
            .send(Box::new(move |m: &mut M| {
                let _ = ret_tx.send(f(m));
            }))
            .map_err(|_| InferenceError::NumericBackend("model host has stopped".to_string()))?;
        ret_rx.recv().map_err(|_| {
            InferenceError::NumericBackend("model call failed without a result".to_string())
        })
    }
}
