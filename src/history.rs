//! Conversation history budget applied before forwarding turns upstream.

use crate::serving::{ChatTurn, Role};

/// Bounds on how much history is forwarded to the agent endpoint.
#[derive(Debug, Clone)]
pub struct HistoryBudget {
    /// Maximum earlier user/assistant exchanges (two turns each).
    pub max_turns: usize,
    /// Maximum total characters across the earlier turns.
    pub max_chars: usize,
    /// Prepended as a system turn when set.
    pub system_prompt: Option<String>,
}

impl HistoryBudget {
    /// Trim `turns` to the budget.
    ///
    /// The final turn (the one being answered) is always kept and does not
    /// count against the character budget.
    pub fn apply(&self, mut turns: Vec<ChatTurn>) -> Vec<ChatTurn> {
        let Some(current) = turns.pop() else {
            return self.system_turn().into_iter().collect();
        };

        let window = turns.len().saturating_sub(self.max_turns.saturating_mul(2));
        let mut kept = Vec::new();
        let mut total = 0usize;
        for turn in turns.into_iter().skip(window).rev() {
            let len = turn.content.chars().count();
            if total + len > self.max_chars {
                break;
            }
            total += len;
            kept.push(turn);
        }
        kept.reverse();

        let mut out = Vec::with_capacity(kept.len() + 2);
        out.extend(self.system_turn());
        out.extend(kept);
        out.push(current);
        out
    }

    fn system_turn(&self) -> Option<ChatTurn> {
        self.system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| ChatTurn {
                role: Role::System,
                content: p.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
        }
    }

    fn budget(max_turns: usize, max_chars: usize) -> HistoryBudget {
        HistoryBudget {
            max_turns,
            max_chars,
            system_prompt: None,
        }
    }

    #[test]
    fn keeps_everything_within_budget() {
        let turns = vec![
            turn(Role::User, "a"),
            turn(Role::Assistant, "b"),
            turn(Role::User, "c"),
        ];
        assert_eq!(budget(10, 100).apply(turns.clone()), turns);
    }

    #[test]
    fn turn_window_keeps_most_recent_pairs() {
        let turns = vec![
            turn(Role::User, "1"),
            turn(Role::Assistant, "2"),
            turn(Role::User, "3"),
            turn(Role::Assistant, "4"),
            turn(Role::User, "now"),
        ];
        let out = budget(1, 100).apply(turns);
        let contents: Vec<_> = out.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["3", "4", "now"]);
    }

    #[test]
    fn char_budget_drops_oldest_first() {
        let turns = vec![
            turn(Role::User, "aaaa"),
            turn(Role::Assistant, "bbbb"),
            turn(Role::User, "this final question is long"),
        ];
        let out = budget(10, 5).apply(turns);
        let contents: Vec<_> = out.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["bbbb", "this final question is long"]);
    }

    #[test]
    fn system_prompt_is_prepended() {
        let b = HistoryBudget {
            system_prompt: Some("You are an analyst.".to_string()),
            ..budget(10, 100)
        };
        let out = b.apply(vec![turn(Role::User, "hi")]);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[1].content, "hi");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(budget(10, 100).apply(Vec::new()).is_empty());
    }
}
