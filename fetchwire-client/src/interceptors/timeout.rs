use std::time::Duration;

use fetchwire_core::{Error, Request, Response};

use crate::interceptor::{ApplicationInterceptor, ApplicationNext, BoxFuture};

/// Give requests default timeouts. Timeouts already set on a request win.
#[derive(Clone, Copy, Debug, Default)]
pub struct SetRequestTimeout {
    transfer: Option<Duration>,
    inactivity: Option<Duration>,
}

impl SetRequestTimeout {
    pub fn new(transfer: Duration) -> Self {
        Self {
            transfer: Some(transfer),
            inactivity: None,
        }
    }

    /// Also limit how long a single socket read may wait.
    pub fn inactivity(mut self, timeout: Duration) -> Self {
        self.inactivity = Some(timeout);
        self
    }

    fn apply(&self, request: &mut Request) {
        if request.transfer_timeout().is_none() {
            request.set_transfer_timeout(self.transfer);
        }
        if request.inactivity_timeout().is_none() {
            request.set_inactivity_timeout(self.inactivity);
        }
    }
}

impl ApplicationInterceptor for SetRequestTimeout {
    fn intercept<'a>(
        &'a self,
        mut request: Request,
        next: ApplicationNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        self.apply(&mut request);
        next.run(request)
    }

    fn name(&self) -> &str {
        "SetRequestTimeout"
    }
}
