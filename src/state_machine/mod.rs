// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Lifecycles of the login flow are modeled as pure state machines. Write
//! models hold the current state; commands ask the machine whether an input
//! is allowed before they emit the matching fact.
//!
//! # State Machine Type
//!
//! Both machines are **Mealy machines**: the output depends on state and input.
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! # Machines
//!
//! - [`auth_request`] - OIDC auth requests and SAML requests
//!   (`pending → code added → code exchanged → succeeded`, or `failed`)
//! - [`session`] - login sessions (`active → terminated`)
//!
//! # Design Principles
//!
//! 1. **Type Safety**: States are strongly typed enums
//! 2. **Pure Functions**: All transitions are pure
//! 3. **Explicit**: All transitions explicitly defined
//!
//! # Example
//!
//! ```rust,ignore
//! use cim_iam_commands::state_machine::*;
//!
//! let state = AuthRequestState::Added;
//! let (next, ()) = state.transition(&AuthRequestInput::Succeed)?;
//! assert_eq!(next, AuthRequestState::Succeeded);
//! assert!(!next.can_transition(&AuthRequestInput::Fail));
//! ```

pub mod auth_request;
pub mod session;

pub use auth_request::{AuthRequestInput, AuthRequestState};
pub use session::{SessionEffect, SessionInput, SessionState};

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The machine was never started
    #[error("{machine} does not exist")]
    NotStarted { machine: &'static str },

    /// Transition from current state on this input is not allowed
    #[error("invalid {machine} transition from {from} on {input}")]
    InvalidTransition {
        machine: &'static str,
        from: String,
        input: String,
    },
}

impl TransitionError {
    pub(crate) fn invalid(
        machine: &'static str,
        from: &impl std::fmt::Debug,
        input: &impl std::fmt::Debug,
    ) -> Self {
        Self::InvalidTransition {
            machine,
            from: format!("{from:?}"),
            input: format!("{input:?}"),
        }
    }
}

/// Trait for finite state machines
///
/// Implement this trait to define a state machine with typed states,
/// inputs, and outputs.
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    ///
    /// # Returns
    /// - Ok((new_state, output)) if transition is valid
    /// - Err(TransitionError) if transition is invalid
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }
}
