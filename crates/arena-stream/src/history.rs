use serde::{Deserialize, Serialize};

use crate::event::{EloUpdate, EloUpdateData, JudgeResult, StreamEvent, Turn};

/// A previously completed match as the history endpoint returns it. Mapped
/// into the same event shapes the live stream uses so the engine replays it
/// without knowing the difference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchHistory {
    #[serde(default)]
    pub transcript: Vec<Turn>,
    #[serde(default)]
    pub judge_result: Option<JudgeResult>,
    #[serde(default)]
    pub elo_changes: Option<EloUpdate>,
}

impl MatchHistory {
    /// One `turn_complete` per transcript entry, then the judge result, then
    /// the rating change. Feed the output to `StreamManager::load_history`.
    pub fn into_events(self) -> Vec<StreamEvent> {
        let mut events: Vec<StreamEvent> = self
            .transcript
            .into_iter()
            .map(|turn| StreamEvent::TurnComplete { turn })
            .collect();
        if let Some(result) = self.judge_result {
            events.push(StreamEvent::JudgeComplete { result });
        }
        if let Some(update) = self.elo_changes {
            events.push(StreamEvent::EloUpdate {
                data: EloUpdateData::Ratings(update),
            });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::MatchHistory;
    use crate::event::{
        JudgeResult, JudgeScores, SpeakerRole, StreamEvent, Turn, Winner,
    };

    #[test]
    fn maps_transcript_then_result_in_order() {
        let history = MatchHistory {
            transcript: vec![
                Turn {
                    speaker_role: SpeakerRole::Proponent,
                    round_number: 1,
                    content: "yes".to_string(),
                    tool_calls: Vec::new(),
                },
                Turn {
                    speaker_role: SpeakerRole::Opponent,
                    round_number: 1,
                    content: "no".to_string(),
                    tool_calls: Vec::new(),
                },
            ],
            judge_result: Some(JudgeResult {
                final_scores: JudgeScores {
                    proponent: 6.0,
                    opponent: 9.0,
                },
                winner: Winner::Opponent,
                reasoning: "rebuttals landed".to_string(),
            }),
            elo_changes: None,
        };

        let events = history.into_events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], StreamEvent::TurnComplete { .. }));
        assert!(matches!(events[1], StreamEvent::TurnComplete { .. }));
        assert!(matches!(events[2], StreamEvent::JudgeComplete { .. }));
    }

    #[test]
    fn empty_history_maps_to_no_events() {
        assert!(MatchHistory::default().into_events().is_empty());
    }
}
