//! Poll state machine, independent of any transport.

use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::policy::PollPolicy;

/// What a single poll observed.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResponse {
    Pending,
    Success(JsonValue),
    Error {
        message: String,
        details: Option<JsonValue>,
    },
    /// Unknown, deleted or expired id
    NotFound,
    /// The poll itself failed; counts as an attempt
    Unavailable(String),
}

/// Final answer of a poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success(JsonValue),
    Failed {
        message: String,
        details: Option<JsonValue>,
    },
    NotFound,
    /// Gave up; the server may still complete the job later
    TimedOut { attempts: u32 },
}

impl PollOutcome {
    /// Whether the server holds a terminal record for the job.
    pub fn is_terminal_result(&self) -> bool {
        matches!(self, PollOutcome::Success(_) | PollOutcome::Failed { .. })
    }
}

/// Next move after a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    Wait(Duration),
    Done(PollOutcome),
}

/// Tracks attempts and waited time for one job.
#[derive(Debug, Clone)]
pub struct Poller {
    policy: PollPolicy,
    attempts: u32,
    waited: Duration,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            waited: Duration::ZERO,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total wait scheduled so far.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Feed the result of one poll.
    pub fn on_response(&mut self, response: PollResponse) -> PollStep {
        self.attempts += 1;

        match response {
            PollResponse::Success(data) => PollStep::Done(PollOutcome::Success(data)),
            PollResponse::Error { message, details } => {
                PollStep::Done(PollOutcome::Failed { message, details })
            }
            PollResponse::NotFound => PollStep::Done(PollOutcome::NotFound),
            PollResponse::Pending | PollResponse::Unavailable(_) => self.next_wait(),
        }
    }

    fn next_wait(&mut self) -> PollStep {
        let timed_out = PollStep::Done(PollOutcome::TimedOut {
            attempts: self.attempts,
        });

        if !self.policy.allows_another(self.attempts) {
            return timed_out;
        }

        let wait = self.policy.wait_after(self.attempts);
        if let Some(budget) = self.policy.overall_timeout {
            if self.waited + wait > budget {
                return timed_out;
            }
        }

        self.waited += wait;
        PollStep::Wait(wait)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn gives_up_after_thirty_polls_two_seconds_apart() {
        let mut poller = Poller::new(PollPolicy::default());

        let mut waits = 0;
        let outcome = loop {
            match poller.on_response(PollResponse::Pending) {
                PollStep::Wait(d) => {
                    assert_eq!(d, Duration::from_secs(2));
                    waits += 1;
                }
                PollStep::Done(outcome) => break outcome,
            }
        };

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 30 });
        assert_eq!(waits, 29);
        assert_eq!(poller.waited(), Duration::from_secs(58));
    }

    #[test]
    fn terminal_responses_finish_immediately() {
        let mut poller = Poller::new(PollPolicy::default());
        assert!(matches!(poller.on_response(PollResponse::Pending), PollStep::Wait(_)));

        let data = serde_json::json!([{"name": "A"}]);
        assert_eq!(
            poller.on_response(PollResponse::Success(data.clone())),
            PollStep::Done(PollOutcome::Success(data))
        );
        assert_eq!(poller.attempts(), 2);

        let mut poller = Poller::new(PollPolicy::default());
        assert_eq!(
            poller.on_response(PollResponse::Error {
                message: "invalid filter".into(),
                details: None,
            }),
            PollStep::Done(PollOutcome::Failed {
                message: "invalid filter".into(),
                details: None,
            })
        );
    }

    #[test]
    fn not_found_is_final() {
        let mut poller = Poller::new(PollPolicy::default());
        assert_eq!(
            poller.on_response(PollResponse::NotFound),
            PollStep::Done(PollOutcome::NotFound)
        );
    }

    #[test]
    fn transport_failures_count_as_attempts() {
        let mut poller = Poller::new(PollPolicy::fixed(2, Duration::from_millis(10)));
        assert!(matches!(
            poller.on_response(PollResponse::Unavailable("connection refused".into())),
            PollStep::Wait(_)
        ));
        assert_eq!(
            poller.on_response(PollResponse::Unavailable("connection refused".into())),
            PollStep::Done(PollOutcome::TimedOut { attempts: 2 })
        );
    }

    #[test]
    fn overall_timeout_cuts_the_schedule_short() {
        let policy = PollPolicy::fixed(100, Duration::from_secs(2))
            .with_overall_timeout(Duration::from_secs(5));
        let mut poller = Poller::new(policy);

        assert_eq!(poller.on_response(PollResponse::Pending), PollStep::Wait(Duration::from_secs(2)));
        assert_eq!(poller.on_response(PollResponse::Pending), PollStep::Wait(Duration::from_secs(2)));
        assert_eq!(
            poller.on_response(PollResponse::Pending),
            PollStep::Done(PollOutcome::TimedOut { attempts: 3 })
        );
    }

    proptest! {
        #[test]
        fn never_exceeds_max_attempts(max in 1u32..50, pending in 0usize..100) {
            let mut poller = Poller::new(PollPolicy::fixed(max, Duration::from_millis(1)));
            let mut done = None;
            for _ in 0..pending {
                if let PollStep::Done(outcome) = poller.on_response(PollResponse::Pending) {
                    done = Some(outcome);
                    break;
                }
            }

            prop_assert!(poller.attempts() <= max);
            match done {
                Some(PollOutcome::TimedOut { attempts }) => prop_assert_eq!(attempts, max),
                Some(other) => prop_assert!(false, "unexpected outcome {:?}", other),
                None => prop_assert!(pending < max as usize),
            }
        }
    }
}
