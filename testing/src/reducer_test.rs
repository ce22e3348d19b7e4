//! Given-When-Then harness for reducers.
//!
//! Reducers are pure, so a test only needs a state, an environment and the
//! actions to feed in. Effects of the *last* action are handed to the effect
//! assertions; earlier actions are treated as setup.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use chairline_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use chairline_testing::ReducerTest;
///
/// ReducerTest::new(QueueReducer::new())
///     .with_env(test_environment())
///     .given_state(queue_with_three_waiting())
///     .when_action(QueueAction::transition(ticket_id, TicketStatus::CheckedIn, actor))
///     .then_state(|queue| assert!(queue.last_error.is_none()))
///     .then_effects(|effects| assert!(!effects.is_empty()))
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    setup_actions: Vec<A>,
    action: Option<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            setup_actions: Vec::new(),
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Apply actions before the one under test (Given)
    ///
    /// Their effects are discarded.
    #[must_use]
    pub fn given_actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.setup_actions.extend(actions);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        for setup in self.setup_actions {
            let _ = self.reducer.reduce(&mut state, setup, &env);
        }

        let effects = self.reducer.reduce(&mut state, action, &env);

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions;
    use chairline_core::effect::Effect;
    use chairline_core::reducer::Reducer;

    #[derive(Clone, Debug)]
    struct ChairState {
        waiting: u32,
        served: u32,
    }

    #[derive(Clone, Debug)]
    enum ChairAction {
        Join,
        Serve,
    }

    struct ChairReducer;

    struct ChairEnv;

    impl Reducer for ChairReducer {
        type State = ChairState;
        type Action = ChairAction;
        type Environment = ChairEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> smallvec::SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                ChairAction::Join => {
                    state.waiting += 1;
                    smallvec::smallvec![Effect::None]
                }
                ChairAction::Serve if state.waiting > 0 => {
                    state.waiting -= 1;
                    state.served += 1;
                    smallvec::smallvec![Effect::Future(Box::pin(async { None }))]
                }
                ChairAction::Serve => smallvec::smallvec![],
            }
        }
    }

    #[test]
    fn test_join_adds_to_waiting() {
        ReducerTest::new(ChairReducer)
            .with_env(ChairEnv)
            .given_state(ChairState { waiting: 0, served: 0 })
            .when_action(ChairAction::Join)
            .then_state(|state| {
                assert_eq!(state.waiting, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_setup_actions_run_before_the_action_under_test() {
        ReducerTest::new(ChairReducer)
            .with_env(ChairEnv)
            .given_state(ChairState { waiting: 0, served: 0 })
            .given_actions([ChairAction::Join, ChairAction::Join])
            .when_action(ChairAction::Serve)
            .then_state(|state| {
                assert_eq!(state.waiting, 1);
                assert_eq!(state.served, 1);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_leaf_effects(effects, 1);
            })
            .run();
    }

    #[test]
    fn test_serving_an_empty_queue_does_nothing() {
        ReducerTest::new(ChairReducer)
            .with_env(ChairEnv)
            .given_state(ChairState { waiting: 0, served: 0 })
            .when_action(ChairAction::Serve)
            .then_state(|state| assert_eq!(state.served, 0))
            .then_effects(|effects| assertions::assert_effects_count(effects, 0))
            .run();
    }
}
