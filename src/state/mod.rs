//! Conversation state and the machine that guards every change to it.

mod machine;
mod session;
mod update;

pub use machine::{ConversationState, StateMachine, TRANSITIONS, can_transition};
pub use session::{Metadata, SessionState, Speaker, TurnRecord};
pub use update::StateUpdate;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::SlotMap;
    use crate::stack::FlowStack;

    fn active_stack() -> FlowStack {
        let mut stack = FlowStack::new();
        stack.start("booking", SlotMap::new()).unwrap();
        stack
    }

    #[test]
    fn idle_may_only_move_to_understanding_or_error() {
        assert!(can_transition(ConversationState::Idle, ConversationState::Understanding));
        assert!(can_transition(ConversationState::Idle, ConversationState::Error));
        assert!(!can_transition(ConversationState::Idle, ConversationState::Confirming));
    }

    #[test]
    fn every_state_has_a_row_in_the_table() {
        let states = [
            ConversationState::Idle,
            ConversationState::Understanding,
            ConversationState::WaitingForSlot,
            ConversationState::Confirming,
            ConversationState::ExecutingAction,
            ConversationState::GeneratingResponse,
            ConversationState::Error,
        ];
        for state in states {
            assert!(TRANSITIONS.iter().any(|(from, _)| *from == state), "{state}");
        }
    }

    #[test]
    fn history_is_bounded_by_the_window() {
        let mut machine = StateMachine::new(2);
        for text in ["one", "two", "three"] {
            machine
                .update(StateUpdate::new().recording(TurnRecord::user(text)))
                .unwrap();
        }
        let texts: Vec<&str> = machine.state().history().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn restore_skips_only_the_transition_check() {
        let mut source = StateMachine::new(10);
        source
            .update(
                StateUpdate::transition(ConversationState::Understanding).with_stack(active_stack()),
            )
            .unwrap();
        source
            .update(StateUpdate::transition(ConversationState::Confirming))
            .unwrap();

        let restored = StateMachine::restore(source.state().clone(), 10).unwrap();
        assert_eq!(restored.state(), source.state());

        let mut broken = source.into_state();
        broken.flow_stack = FlowStack::new();
        assert!(matches!(
            StateMachine::restore(broken, 10),
            Err(crate::error::StateError::Inconsistent(_))
        ));
    }
}
