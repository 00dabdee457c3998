use time::{Duration, SteadyTime};

/// The tick timer (C8 in spec.md §2) is an external collaborator: it owns
/// the "when should the receiver next be ticked" decision, mirroring the
/// original's `RudpTickTimer`. The receiver only ever narrows the next
/// requested tick time (`tick_after`/`tick_at`); some outer lane (spec.md
/// §5's single-threaded-per-connection driver, out of scope here) is
/// responsible for actually sleeping until `next_tick` and then calling
/// `handle_tick` on the receiver.
pub trait TickTimer {
    fn now(&self) -> SteadyTime;
    /// Requests a tick no later than `now() + delay`, without delaying a
    /// tick already scheduled sooner.
    fn tick_after(&mut self, delay: Duration);
    /// Requests a tick no later than the given absolute time, without
    /// delaying a tick already scheduled sooner.
    fn tick_at(&mut self, at: SteadyTime);
    /// The next time a tick has been requested, if any.
    fn next_tick(&self) -> Option<SteadyTime>;
    /// Clears the outstanding request once its tick has actually fired, so a
    /// driver loop polling `next_tick()` does not re-fire the same deadline.
    fn clear(&mut self);
}

/// Default `TickTimer`: tracks the single earliest outstanding tick
/// request, exactly as the original's `tick_timer_` field. A real driver
/// loop reads `next_tick()`, sleeps until it elapses, and calls
/// `RudpReceiver::handle_tick`.
pub struct DefaultTickTimer {
    next_tick: Option<SteadyTime>,
}

impl DefaultTickTimer {
    pub fn new() -> Self {
        DefaultTickTimer { next_tick: None }
    }

    fn request(&mut self, at: SteadyTime) {
        self.next_tick = Some(match self.next_tick {
            Some(existing) if existing <= at => existing,
            _ => at,
        });
    }
}

impl Default for DefaultTickTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TickTimer for DefaultTickTimer {
    fn now(&self) -> SteadyTime {
        SteadyTime::now()
    }

    fn tick_after(&mut self, delay: Duration) {
        let at = self.now() + delay;
        self.request(at);
    }

    fn tick_at(&mut self, at: SteadyTime) {
        self.request(at);
    }

    fn next_tick(&self) -> Option<SteadyTime> {
        self.next_tick
    }

    fn clear(&mut self) {
        self.next_tick = None;
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::cell::Cell;

    /// A `TickTimer` whose clock is advanced manually, so receiver tests
    /// can assert exact scheduling decisions without real sleeps.
    pub struct FakeTickTimer {
        now: Cell<SteadyTime>,
        next_tick: Option<SteadyTime>,
    }

    impl FakeTickTimer {
        pub fn new() -> Self {
            FakeTickTimer {
                now: Cell::new(SteadyTime::now()),
                next_tick: None,
            }
        }

        pub fn advance(&self, delay: Duration) {
            self.now.set(self.now.get() + delay);
        }
    }

    impl TickTimer for FakeTickTimer {
        fn now(&self) -> SteadyTime {
            self.now.get()
        }

        fn tick_after(&mut self, delay: Duration) {
            let at = self.now() + delay;
            self.next_tick = Some(match self.next_tick {
                Some(existing) if existing <= at => existing,
                _ => at,
            });
        }

        fn tick_at(&mut self, at: SteadyTime) {
            self.next_tick = Some(match self.next_tick {
                Some(existing) if existing <= at => existing,
                _ => at,
            });
        }

        fn next_tick(&self) -> Option<SteadyTime> {
            self.next_tick
        }

        fn clear(&mut self) {
            self.next_tick = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_at_keeps_the_earlier_request() {
        let mut timer = DefaultTickTimer::new();
        let now = timer.now();
        timer.tick_at(now + Duration::seconds(5));
        timer.tick_at(now + Duration::seconds(1));
        assert_eq!(timer.next_tick(), Some(now + Duration::seconds(1)));
        timer.tick_at(now + Duration::seconds(10));
        assert_eq!(timer.next_tick(), Some(now + Duration::seconds(1)));
    }
}
