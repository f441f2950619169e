//! Named gates that hold a command on its lane until the test lets it go.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, LazyLock, Mutex};
use std::time::Duration;

use ordo::test_utils::poll_until;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    Proceed,
    Abort,
}

#[derive(Default)]
struct GateState {
    entered: u32,
    released: Option<Release>,
}

#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

static GATES: LazyLock<Mutex<HashMap<String, Arc<Gate>>>> = LazyLock::new(Default::default);

const HOLD_LIMIT: Duration = Duration::from_secs(10);

pub fn gate(name: &str) -> Arc<Gate> {
    GATES
        .lock()
        .expect("gate table poisoned")
        .entry(name.to_string())
        .or_default()
        .clone()
}

impl Gate {
    /// Block until released. A gate nobody releases aborts after a while so
    /// a failing test cannot wedge its lane.
    pub fn wait(&self) -> Release {
        let mut state = self.state.lock().expect("gate poisoned");
        state.entered += 1;
        self.cv.notify_all();
        let (state, _) = self
            .cv
            .wait_timeout_while(state, HOLD_LIMIT, |s| s.released.is_none())
            .expect("gate poisoned");
        state.released.unwrap_or(Release::Abort)
    }

    pub fn entered(&self) -> u32 {
        self.state.lock().expect("gate poisoned").entered
    }

    pub fn wait_entered(&self) -> bool {
        poll_until(Duration::from_secs(5), || self.entered() > 0)
    }

    pub fn release(&self, release: Release) {
        self.state.lock().expect("gate poisoned").released = Some(release);
        self.cv.notify_all();
    }
}
