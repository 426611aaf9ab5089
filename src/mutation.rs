use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use crate::error::{BlogError, Result};
use crate::query_cache::RepaintNotifier;

type Action<A, T> = Arc<dyn Fn(A) -> Result<T> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum MutationStatus<T> {
    Idle,
    Pending,
    Success(T),
    Error(BlogError),
}

/// A user-triggered write with sticky pending/success/error status.
///
/// The status stays where the last call left it until [`Mutation::reset`].
/// Results are tagged with a generation so a call that was superseded by a
/// later `trigger` or by `reset` can never overwrite the current status.
pub struct Mutation<A, T> {
    name: &'static str,
    action: Action<A, T>,
    status: MutationStatus<T>,
    generation: u64,
    sender: Sender<(u64, Result<T>)>,
    receiver: Receiver<(u64, Result<T>)>,
    notifier: Option<RepaintNotifier>,
}

impl<A, T> Mutation<A, T>
where
    A: Send + 'static,
    T: Clone + Send + 'static,
{
    pub fn new<F>(name: &'static str, action: F) -> Self
    where
        F: Fn(A) -> Result<T> + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        Self {
            name,
            action: Arc::new(action),
            status: MutationStatus::Idle,
            generation: 0,
            sender,
            receiver,
            notifier: None,
        }
    }

    pub fn set_notifier(&mut self, notifier: RepaintNotifier) {
        self.notifier = Some(notifier);
    }

    pub fn trigger(&mut self, arg: A) {
        self.generation += 1;
        self.status = MutationStatus::Pending;
        debug!(mutation = self.name, generation = self.generation, "mutation started");

        let generation = self.generation;
        let action = self.action.clone();
        let sender = self.sender.clone();
        let notifier = self.notifier.clone();

        thread::spawn(move || {
            let result = action(arg);
            let _ = sender.send((generation, result));
            if let Some(notify) = notifier {
                notify();
            }
        });
    }

    /// Applies the result of the current call, if it has finished.
    /// Returns whether the status changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok((generation, result)) = self.receiver.try_recv() {
            if generation != self.generation || !self.is_pending() {
                debug!(mutation = self.name, generation, "discarding superseded result");
                continue;
            }
            self.status = match result {
                Ok(value) => {
                    debug!(mutation = self.name, "mutation succeeded");
                    MutationStatus::Success(value)
                }
                Err(err) => {
                    warn!(mutation = self.name, error = %err, "mutation failed");
                    MutationStatus::Error(err)
                }
            };
            changed = true;
        }
        changed
    }

    /// Back to idle; any call still in flight is forgotten.
    pub fn reset(&mut self) {
        if !self.is_idle() {
            debug!(mutation = self.name, "mutation reset");
        }
        self.generation += 1;
        self.status = MutationStatus::Idle;
    }

    pub fn status(&self) -> &MutationStatus<T> {
        &self.status
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.status, MutationStatus::Idle)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, MutationStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, MutationStatus::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, MutationStatus::Error(_))
    }

    pub fn error(&self) -> Option<&BlogError> {
        match &self.status {
            MutationStatus::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match &self.status {
            MutationStatus::Success(value) => Some(value),
            _ => None,
        }
    }
}
