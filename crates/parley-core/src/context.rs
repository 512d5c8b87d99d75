use std::rc::Rc;

use crate::events::{Notice, Publisher};
use crate::models::Timestamp;
use crate::store::SharedState;

pub type Clock = Rc<dyn Fn() -> Timestamp>;

/// Handles shared by the coordinators of one identity session.
pub struct SessionContext<S, P> {
    pub state: SharedState,
    pub service: Rc<S>,
    pub push: Rc<P>,
    pub publisher: Rc<Publisher>,
    pub clock: Clock,
}

impl<S, P> Clone for SessionContext<S, P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            service: self.service.clone(),
            push: self.push.clone(),
            publisher: self.publisher.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S, P> SessionContext<S, P> {
    pub fn now(&self) -> Timestamp {
        (self.clock)()
    }

    /// Push the current state to every subscribed surface.
    pub fn publish(&self) {
        let snapshot = self.state.borrow().snapshot();
        self.publisher.publish(snapshot);
    }

    pub fn notify(&self, notice: Notice) {
        self.publisher.notify(notice);
    }
}
