// Copyright (c) 2025 - Cowboy AI, Inc.
//! Login Session Lifecycle State Machine
//!
//! # States
//!
//! - Unspecified: no fact yet
//! - Active: accumulating checks
//! - Terminated: logged out (terminal)
//!
//! # Inputs
//!
//! - Start: Unspecified → Active
//! - Update: Active → Active (checks, metadata, lifetime)
//! - Terminate: Active → Terminated; Terminated → Terminated without a new fact

use super::{StateMachine, TransitionError, TransitionResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Unspecified,
    Active,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    Start,
    Update,
    Terminate,
}

/// Whether a transition needs a new fact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    Emit,
    Unchanged,
}

const MACHINE: &str = "session";

impl StateMachine for SessionState {
    type Input = SessionInput;
    type Output = SessionEffect;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use SessionInput::*;
        use SessionState::*;

        match (self, input) {
            (Unspecified, Start) => Ok((Active, SessionEffect::Emit)),
            (Unspecified, _) => Err(TransitionError::NotStarted { machine: MACHINE }),
            (Active, Update) => Ok((Active, SessionEffect::Emit)),
            (Active, Terminate) => Ok((Terminated, SessionEffect::Emit)),
            (Terminated, Terminate) => Ok((Terminated, SessionEffect::Unchanged)),
            (state, input) => Err(TransitionError::invalid(MACHINE, state, input)),
        }
    }
}
