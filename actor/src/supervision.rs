//! Supervision strategies
//!

use crate::Error;

use std::{fmt::Debug, time::Duration};

/// What a parent decides to do with a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep the current instance and its state, continue with the next message.
    Resume,
    /// Replace the instance with a fresh one.
    Restart,
    /// Stop the child permanently.
    Stop,
    /// Fail the parent with the same cause.
    Escalate,
}

/// Which children a directive applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Only the failed child.
    OneForOne,
    /// Every child of the parent.
    AllForOne,
}

/// Maps a failure cause to a directive.
pub type Decider = fn(&Error) -> Directive;

/// Stops on initialization failures, kills and death pacts, restarts on anything else.
pub fn default_decider(error: &Error) -> Directive {
    match error {
        Error::Initialization(..) | Error::ActorKilled(_) | Error::DeathPact(_) => {
            Directive::Stop
        }
        _ => Directive::Restart,
    }
}

/// Decider that always stops.
pub fn stopping_decider(_error: &Error) -> Directive {
    Directive::Stop
}

/// Decider that always escalates.
pub fn escalating_decider(_error: &Error) -> Directive {
    Directive::Escalate
}

/// A SupervisorStrategy defines what a parent does when one of its children fails. The
/// decider picks the directive, the kind picks the children it applies to and the retry
/// limits bound the number of restarts.
#[derive(Debug, Clone)]
pub struct SupervisorStrategy {
    kind: StrategyKind,
    /// Maximum number of restarts, `None` for unlimited.
    max_retries: Option<u32>,
    /// Window the retries are counted in, `None` to count forever.
    within: Option<Duration>,
    decider: Decider,
}

impl SupervisorStrategy {
    /// Applies the directive to the failed child only.
    pub fn one_for_one(decider: Decider) -> Self {
        SupervisorStrategy {
            kind: StrategyKind::OneForOne,
            max_retries: None,
            within: None,
            decider,
        }
    }

    /// Applies the directive to all children.
    pub fn all_for_one(decider: Decider) -> Self {
        SupervisorStrategy {
            kind: StrategyKind::AllForOne,
            max_retries: None,
            within: None,
            decider,
        }
    }

    /// Bounds restarts to `max_retries`, optionally inside a time window.
    pub fn with_retries(
        mut self,
        max_retries: u32,
        within: Option<Duration>,
    ) -> Self {
        self.max_retries = Some(max_retries);
        self.within = within;
        self
    }

    /// Which children a directive applies to.
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Maximum number of restarts.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Window the restarts are counted in.
    pub fn within(&self) -> Option<Duration> {
        self.within
    }

    /// Directive for `cause`.
    pub fn decide(&self, cause: &Error) -> Directive {
        (self.decider)(cause)
    }

    /// Stopping strategy: every failure stops the failed child.
    pub fn stopping() -> Self {
        Self::one_for_one(stopping_decider)
    }
}

impl Default for SupervisorStrategy {
    fn default() -> Self {
        Self::one_for_one(default_decider)
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::ActorPath;

    #[test]
    fn test_default_decider() {
        let path = ActorPath::from("/user/child");
        assert_eq!(
            default_decider(&Error::Initialization(path.clone(), "x".into())),
            Directive::Stop
        );
        assert_eq!(
            default_decider(&Error::ActorKilled(path)),
            Directive::Stop
        );
        assert_eq!(
            default_decider(&Error::Functional("x".into())),
            Directive::Restart
        );
    }

    #[test]
    fn test_strategy_limits() {
        let strategy = SupervisorStrategy::all_for_one(escalating_decider)
            .with_retries(3, Some(Duration::from_secs(1)));
        assert_eq!(strategy.kind(), StrategyKind::AllForOne);
        assert_eq!(strategy.max_retries(), Some(3));
        assert_eq!(strategy.within(), Some(Duration::from_secs(1)));
        assert_eq!(
            strategy.decide(&Error::Functional("boom".to_owned())),
            Directive::Escalate
        );
    }

    #[test]
    fn test_default_strategy() {
        let strategy = SupervisorStrategy::default();
        assert_eq!(strategy.kind(), StrategyKind::OneForOne);
        assert_eq!(strategy.max_retries(), None);
        assert_eq!(
            SupervisorStrategy::stopping().decide(&Error::Functional("boom".to_owned())),
            Directive::Stop
        );
    }
}
