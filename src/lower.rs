//! The lowering boundary.
//!
//! Decoding is strictly sequential, but each fully-decoded function is
//! independent of the next, so finished CFGs are handed to a worker pool
//! and lowered concurrently while decoding continues. The pool may finish
//! functions out of order; [`Cfg::decl_order`] carries the information the
//! output writer needs to re-impose declaration order.
//!
//! There is no cancellation: once submitted, a function runs to
//! completion. The only abort path is the module-wide error switch, which
//! prevents new submissions but does not interrupt in-flight work.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use tracing::debug;

use crate::ir::cfg::Cfg;
use crate::ir::globals::VariableDecl;

/// Target-specific lowering, implemented outside this crate.
///
/// `lower` is invoked at most once per function, and only while the
/// module-wide error counter is zero. `emit_globals` is invoked exactly
/// once, after all global names have been installed. Callers must discard
/// any produced artifact when translation reports an error.
pub trait Lower: Send + Sync {
    fn lower(&self, cfg: Cfg);
    fn emit_globals(&self, variables: &[VariableDecl]);
}

/// A lowering backend that does nothing. Used when only validation is
/// wanted.
pub struct NullLower;

impl Lower for NullLower {
    fn lower(&self, _cfg: Cfg) {}
    fn emit_globals(&self, _variables: &[VariableDecl]) {}
}

/// Submit/drain worker pool in front of a [`Lower`] backend.
///
/// With zero workers the pool degenerates to synchronous calls on the
/// submitting thread, which tests use for determinism.
pub struct LoweringPool {
    backend: Arc<dyn Lower>,
    sender: Option<Sender<Cfg>>,
    workers: Vec<JoinHandle<()>>,
}

impl LoweringPool {
    pub fn new(backend: Arc<dyn Lower>, num_workers: usize) -> Self {
        if num_workers == 0 {
            return Self {
                backend,
                sender: None,
                workers: Vec::new(),
            };
        }
        let (sender, receiver) = unbounded::<Cfg>();
        let workers = (0..num_workers)
            .map(|worker| {
                let receiver = receiver.clone();
                let backend = Arc::clone(&backend);
                std::thread::spawn(move || {
                    while let Ok(cfg) = receiver.recv() {
                        debug!(function = %cfg.name, worker, "lowering");
                        backend.lower(cfg);
                    }
                })
            })
            .collect();
        Self {
            backend,
            sender: Some(sender),
            workers,
        }
    }

    /// The backend behind the pool, for calls that bypass the queue
    /// (`emit_globals`).
    pub fn backend(&self) -> &Arc<dyn Lower> {
        &self.backend
    }

    /// Submit one function for lowering.
    pub fn submit(&self, cfg: Cfg) {
        match &self.sender {
            Some(sender) => {
                // The receiver only disappears after drain, and nothing is
                // submitted after drain.
                let _ = sender.send(cfg);
            }
            None => self.backend.lower(cfg),
        }
    }

    /// Block until every submitted function has been lowered.
    pub fn drain(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for LoweringPool {
    fn drop(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::Type;
    use parking_lot::Mutex;

    struct Recorder {
        names: Mutex<Vec<(usize, String)>>,
    }

    impl Lower for Recorder {
        fn lower(&self, cfg: Cfg) {
            self.names.lock().push((cfg.decl_order, cfg.name));
        }
        fn emit_globals(&self, _variables: &[VariableDecl]) {}
    }

    fn cfg(name: &str, order: usize) -> Cfg {
        Cfg::new(name.to_string(), order, Type::Void, true)
    }

    #[test]
    fn test_synchronous_pool() {
        let recorder = Arc::new(Recorder {
            names: Mutex::new(Vec::new()),
        });
        let mut pool = LoweringPool::new(Arc::clone(&recorder) as Arc<dyn Lower>, 0);
        pool.submit(cfg("a", 0));
        pool.submit(cfg("b", 1));
        pool.drain();
        assert_eq!(
            *recorder.names.lock(),
            vec![(0, "a".to_string()), (1, "b".to_string())]
        );
    }

    #[test]
    fn test_drain_observes_every_submission() {
        let recorder = Arc::new(Recorder {
            names: Mutex::new(Vec::new()),
        });
        let mut pool = LoweringPool::new(Arc::clone(&recorder) as Arc<dyn Lower>, 4);
        for i in 0..32 {
            pool.submit(cfg(&format!("f{i}"), i));
        }
        pool.drain();

        // Workers may finish out of order; declaration order re-imposes it.
        let mut seen = recorder.names.lock().clone();
        seen.sort_by_key(|(order, _)| *order);
        assert_eq!(seen.len(), 32);
        for (i, (order, name)) in seen.iter().enumerate() {
            assert_eq!(*order, i);
            assert_eq!(name, &format!("f{i}"));
        }
    }
}
