// Copyright (c) 2025 - Cowboy AI, Inc.
//! Auth Request Lifecycle State Machine
//!
//! Shared by OIDC auth requests and SAML requests. A SAML request never
//! receives a code, so it only uses the `Add`, `LinkSession`, `Succeed` and
//! `Fail` inputs.
//!
//! # States
//!
//! - Unspecified: no fact yet
//! - Added: pending, waiting for a session (may be linked repeatedly)
//! - CodeAdded: an authorization code was issued
//! - CodeExchanged: the code was redeemed for tokens
//! - Succeeded: consumed by an OIDC or SAML session (terminal)
//! - Failed: rejected by the login UI (terminal)
//!
//! # Inputs
//!
//! - Add: Unspecified → Added
//! - LinkSession: Added → Added
//! - AddCode: Added → CodeAdded
//! - ExchangeCode: CodeAdded → CodeExchanged
//! - Succeed: Added | CodeAdded | CodeExchanged → Succeeded
//! - Fail: Added | CodeAdded → Failed

use super::{StateMachine, TransitionError, TransitionResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthRequestState {
    #[default]
    Unspecified,
    Added,
    CodeAdded,
    CodeExchanged,
    Succeeded,
    Failed,
}

impl AuthRequestState {
    /// Succeeded or failed
    pub fn is_handled(&self) -> bool {
        matches!(self, AuthRequestState::Succeeded | AuthRequestState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequestInput {
    Add,
    LinkSession,
    AddCode,
    ExchangeCode,
    Succeed,
    Fail,
}

const MACHINE: &str = "auth request";

impl StateMachine for AuthRequestState {
    type Input = AuthRequestInput;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use AuthRequestInput::*;
        use AuthRequestState::*;

        let next = match (self, input) {
            (Unspecified, Add) => Added,
            (Unspecified, _) => return Err(TransitionError::NotStarted { machine: MACHINE }),
            (Added, LinkSession) => Added,
            (Added, AddCode) => CodeAdded,
            (CodeAdded, ExchangeCode) => CodeExchanged,
            (Added | CodeAdded | CodeExchanged, Succeed) => Succeeded,
            (Added | CodeAdded, Fail) => Failed,
            (state, input) => return Err(TransitionError::invalid(MACHINE, state, input)),
        };
        Ok((next, ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AuthRequestInput::*;
    use AuthRequestState::*;

    #[test]
    fn test_code_flow() {
        let state = Unspecified;
        let (state, _) = state.transition(&Add).unwrap();
        let (state, _) = state.transition(&LinkSession).unwrap();
        let (state, _) = state.transition(&AddCode).unwrap();
        let (state, _) = state.transition(&ExchangeCode).unwrap();
        let (state, _) = state.transition(&Succeed).unwrap();
        assert_eq!(state, Succeeded);
    }

    #[test]
    fn test_handled_requests_are_terminal() {
        for state in [Succeeded, Failed] {
            assert!(state.is_handled());
            for input in [Add, LinkSession, AddCode, ExchangeCode, Succeed, Fail] {
                assert!(
                    matches!(
                        state.transition(&input),
                        Err(TransitionError::InvalidTransition { .. })
                    ),
                    "{state:?} accepted {input:?}"
                );
            }
        }
    }

    #[test]
    fn test_unknown_request_is_not_started() {
        assert_eq!(
            Unspecified.transition(&Succeed),
            Err(TransitionError::NotStarted { machine: MACHINE })
        );
    }

    #[test]
    fn test_code_cannot_be_exchanged_twice() {
        assert!(!CodeExchanged.can_transition(&ExchangeCode));
        assert!(!Added.can_transition(&ExchangeCode));
        assert!(!CodeExchanged.can_transition(&Fail));
    }
}
