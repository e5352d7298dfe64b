use crate::controller::DialogueState;
use chrono::Utc;
use helmsman_services::{ConversationTurn, Role};
use uuid::Uuid;

/// One intervention conversation: an ordered turn sequence plus the state
/// machine position. Owned by the controller for the dialogue's lifetime
/// and discarded when it ends.
#[derive(Debug)]
pub struct DialogueSession {
    /// Local id until the dialogue service assigns its own.
    pub conversation_id: String,
    pub turns: Vec<ConversationTurn>,
    pub state: DialogueState,
}

impl DialogueSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            turns: Vec::new(),
            state: DialogueState::Idle,
        }
    }

    /// Append a turn with the next monotonic number (0 for the opener).
    pub fn append(&mut self, role: Role, content: String) -> ConversationTurn {
        let turn = ConversationTurn {
            number: self.turns.len() as u32,
            role,
            content,
            timestamp: Utc::now(),
            audio_ref: None,
        };
        self.turns.push(turn.clone());
        turn
    }

    /// Turn history excluding the most recent turn, for service calls that
    /// take the newest user text separately.
    #[must_use]
    pub fn history_before_last(&self) -> &[ConversationTurn] {
        match self.turns.len() {
            0 => &[],
            n => &self.turns[..n - 1],
        }
    }
}

impl Default for DialogueSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_numbers_are_monotonic_from_zero() {
        let mut session = DialogueSession::new();
        let opener = session.append(Role::Assistant, "still with me?".to_string());
        assert_eq!(opener.number, 0);
        let user = session.append(Role::User, "yeah, got distracted".to_string());
        assert_eq!(user.number, 1);
        let reply = session.append(Role::Assistant, "let's get back to it".to_string());
        assert_eq!(reply.number, 2);
    }

    #[test]
    fn test_new_session_resets_numbering_and_id() {
        let mut first = DialogueSession::new();
        first.append(Role::Assistant, "hello".to_string());
        first.append(Role::User, "hi".to_string());

        let mut second = DialogueSession::new();
        assert_ne!(first.conversation_id, second.conversation_id);
        assert_eq!(second.append(Role::Assistant, "hello again".to_string()).number, 0);
    }

    #[test]
    fn test_history_excludes_latest_turn() {
        let mut session = DialogueSession::new();
        assert!(session.history_before_last().is_empty());

        session.append(Role::Assistant, "opener".to_string());
        session.append(Role::User, "reply".to_string());
        let history = session.history_before_last();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);
    }
}
