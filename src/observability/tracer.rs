//! Instrumentation handle carried by the server.

use std::future::Future;

use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::Dispatch;

/// The dispatch every server task runs under.
///
/// Tests hand in a dispatch with a capturing layer; production code uses
/// [`Tracer::current`].
#[derive(Clone, Debug)]
pub struct Tracer {
    dispatch: Dispatch,
}

impl Tracer {
    /// Capture the dispatch active on the calling thread.
    pub fn current() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// A tracer that discards everything.
    pub fn noop() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `future` under this tracer's dispatch.
    pub fn instrument<F: Future>(&self, future: F) -> WithDispatch<F> {
        future.with_subscriber(self.dispatch.clone())
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::current()
    }
}
