//! Interview state machine.
//!
//! `InterviewState` holds everything about one onboarding conversation that
//! is not an identity or a chat handle. Every transition is a plain method
//! that mutates the state and returns the `Effect`s the runtime has to carry
//! out (persist a column, post a notice, start the question loop, ...), so
//! the whole machine is testable without a chat backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chat::model::{ChannelId, Emoji, UserId};
use crate::store::InterviewField;

/// Emoji that counts as handled (not stripped) once a track is committed.
pub const RESET_EMOJI: &str = "<:back:706947547305869322>";

/// Interview track chosen by reaction on the type prompt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InterviewType {
    #[default]
    NotStarted,
    NewSystem,
    NewQuestioning,
    NewSinglet,
    NewTulpa,
    ExistingMember,
    Other,
}

/// The six selectable tracks, in prompt order.
pub const TRACKS: [(&str, InterviewType); 6] = [
    ("👥", InterviewType::NewSystem),
    ("❓", InterviewType::NewQuestioning),
    ("👤", InterviewType::NewSinglet),
    ("<:tupla:652995996468379677>", InterviewType::NewTulpa),
    ("<:altAccount:652989510996721675>", InterviewType::ExistingMember),
    ("ℹ️", InterviewType::Other),
];

impl InterviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::NewSystem => "new_system",
            Self::NewQuestioning => "new_questioning",
            Self::NewSinglet => "new_singlet",
            Self::NewTulpa => "new_tulpa",
            Self::ExistingMember => "existing_member",
            Self::Other => "other",
        }
    }

    /// Tracks that run the question loop.
    pub fn has_questions(&self) -> bool {
        matches!(
            self,
            Self::NewSystem | Self::NewQuestioning | Self::NewSinglet | Self::NewTulpa
        )
    }

    pub fn emoji(&self) -> Option<&'static str> {
        TRACKS.iter().find(|(_, t)| t == self).map(|(e, _)| *e)
    }

    pub fn from_emoji(emoji: &Emoji) -> Option<Self> {
        TRACKS
            .iter()
            .find(|(e, _)| *e == emoji.as_str())
            .map(|(_, t)| *t)
    }

    /// Tracks that take questions, in prompt order.
    pub fn question_tracks() -> impl Iterator<Item = InterviewType> {
        TRACKS
            .iter()
            .map(|(_, t)| *t)
            .filter(InterviewType::has_questions)
    }
}

impl fmt::Display for InterviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "not started",
            Self::NewSystem => "new system",
            Self::NewQuestioning => "new questioning",
            Self::NewSinglet => "new singlet",
            Self::NewTulpa => "new tulpa",
            Self::ExistingMember => "existing member",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

impl FromStr for InterviewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both the storage form and the human label.
        match s.trim().replace(' ', "_").to_lowercase().as_str() {
            "not_started" => Ok(Self::NotStarted),
            "new_system" => Ok(Self::NewSystem),
            "new_questioning" => Ok(Self::NewQuestioning),
            "new_singlet" => Ok(Self::NewSinglet),
            "new_tulpa" => Ok(Self::NewTulpa),
            "existing_member" => Ok(Self::ExistingMember),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown interview type: {other}")),
        }
    }
}

/// Fixed channel notices the state machine asks the runtime to post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Paused,
    Resumed,
    ResumeNudge,
    TypeReset,
    ExistingMember,
    Other,
    Finished,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Persist(InterviewField),
    Notify(Notice),
    SendTypePrompt,
    /// Spawn the question loop for the committed track.
    StartQuestionLoop,
    /// Send the next question inside an already-running loop.
    AskNextQuestion,
    /// Stop any running question loop.
    CancelQuestionLoop,
    /// Remove the reaction that triggered the transition.
    StripReaction,
}

/// What the question loop does after an accepted reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The track changed while waiting; stop without finishing.
    Abort,
    /// Every question was asked; finish the interview.
    Finish,
    /// Ask the next question.
    Continue,
}

/// Mutable state of one interview.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterviewState {
    /// Index of the next question to send (i.e. questions sent so far).
    pub question_number: u32,
    pub interview_finished: bool,
    pub paused: bool,
    pub interview_type: InterviewType,
    pub rule_confirmations: Vec<String>,
    /// A question loop is running and waiting for replies. Not persisted.
    pub waiting_for_messages: bool,
}

impl InterviewState {
    pub fn read_rules(&self) -> bool {
        !self.rule_confirmations.is_empty()
    }

    /// Whether the interview is in a track and not yet done.
    pub fn in_progress(&self) -> bool {
        !self.interview_finished && self.interview_type != InterviewType::NotStarted
    }

    // ── Type selection ──────────────────────────────────────────────

    /// A reaction was added to a message in the interview channel.
    ///
    /// The first track emoji from the interviewee commits the track. Every
    /// other reaction is stripped, except the reset emoji after commit.
    pub fn reaction_added(&mut self, user: UserId, member: UserId, emoji: &Emoji) -> Vec<Effect> {
        if user != member {
            return vec![Effect::StripReaction];
        }

        if self.interview_type != InterviewType::NotStarted {
            if emoji.as_str() == RESET_EMOJI {
                return Vec::new();
            }
            return vec![Effect::StripReaction];
        }

        let Some(track) = InterviewType::from_emoji(emoji) else {
            return vec![Effect::StripReaction];
        };

        self.interview_type = track;
        let mut effects = vec![Effect::Persist(InterviewField::Type(track))];
        effects.extend(self.start_track());
        effects
    }

    /// A reaction was removed. Only removing the emoji of the committed track
    /// by the interviewee resets the interview; everything else is ignored.
    pub fn reaction_removed(&mut self, user: UserId, member: UserId, emoji: &Emoji) -> Vec<Effect> {
        if user != member || self.interview_type == InterviewType::NotStarted {
            return Vec::new();
        }
        match InterviewType::from_emoji(emoji) {
            Some(track) if track == self.interview_type => {
                let mut effects = vec![Effect::Notify(Notice::TypeReset)];
                effects.extend(self.restart(true));
                effects
            }
            _ => Vec::new(),
        }
    }

    /// Kick off the committed track.
    pub fn start_track(&mut self) -> Vec<Effect> {
        if self.interview_type.has_questions() {
            return vec![Effect::StartQuestionLoop];
        }
        self.interview_finished = true;
        let notice = if self.interview_type == InterviewType::ExistingMember {
            Notice::ExistingMember
        } else {
            Notice::Other
        };
        vec![
            Effect::Persist(InterviewField::Finished(true)),
            Effect::Notify(notice),
        ]
    }

    // ── Question loop ───────────────────────────────────────────────

    /// Index of the question to send next, or `None` when nothing may be
    /// sent (paused, finished, or out of questions).
    pub fn pending_question(&self, question_count: usize) -> Option<usize> {
        if self.paused || self.interview_finished {
            return None;
        }
        let idx = self.question_number as usize;
        (idx < question_count).then_some(idx)
    }

    /// Record that the pending question was delivered.
    ///
    /// The counter moves when a question goes out, not when it is answered:
    /// after the first answer the second question is already sent, so it
    /// reads 2 rather than 1.
    pub fn question_sent(&mut self) -> Effect {
        self.question_number += 1;
        Effect::Persist(InterviewField::QuestionNumber(self.question_number))
    }

    /// Whether a message qualifies as a reply to the current question.
    /// Commands never do: `pause` and `resume` flip the state this check
    /// reads, possibly before the loop sees their message.
    pub fn accepts_reply(&self, author: UserId, member: UserId, content: &str, prefix: &str) -> bool {
        author == member && !self.paused && !content.trim_start().starts_with(prefix)
    }

    /// Decide what follows an accepted reply. `loop_track` is the track the
    /// loop was started for.
    pub fn after_reply(&self, loop_track: InterviewType, question_count: usize) -> ReplyOutcome {
        if self.interview_type != loop_track {
            ReplyOutcome::Abort
        } else if self.question_number as usize >= question_count {
            ReplyOutcome::Finish
        } else {
            ReplyOutcome::Continue
        }
    }

    pub fn finish(&mut self) -> Effect {
        self.interview_finished = true;
        Effect::Persist(InterviewField::Finished(true))
    }

    // ── Pause / resume / restart ────────────────────────────────────

    pub fn pause(&mut self) -> Vec<Effect> {
        self.paused = true;
        vec![
            Effect::Persist(InterviewField::Paused(true)),
            Effect::Notify(Notice::Paused),
        ]
    }

    /// Unpause. An in-progress interview rewinds one question (so the
    /// question asked right before the pause is asked again) and continues
    /// the running loop, or restarts the track if no loop is running.
    pub fn resume(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.paused {
            self.paused = false;
            effects.push(Effect::Persist(InterviewField::Paused(false)));
        }
        if !self.in_progress() {
            return effects;
        }

        effects.push(Effect::Notify(Notice::Resumed));
        if self.question_number > 0 {
            self.question_number -= 1;
            effects.push(Effect::Persist(InterviewField::QuestionNumber(
                self.question_number,
            )));
        }
        if self.waiting_for_messages {
            effects.push(Effect::AskNextQuestion);
        } else {
            effects.extend(self.start_track());
        }
        effects
    }

    /// Reset to the type prompt. A soft restart does not re-send the prompt.
    pub fn restart(&mut self, soft: bool) -> Vec<Effect> {
        self.question_number = 0;
        self.interview_finished = false;
        self.interview_type = InterviewType::NotStarted;
        self.paused = false;
        self.waiting_for_messages = false;

        let mut effects = vec![
            Effect::CancelQuestionLoop,
            Effect::Persist(InterviewField::QuestionNumber(0)),
            Effect::Persist(InterviewField::Finished(false)),
            Effect::Persist(InterviewField::Type(InterviewType::NotStarted)),
            Effect::Persist(InterviewField::Paused(false)),
        ];
        if !soft {
            effects.push(Effect::SendTypePrompt);
        }
        effects
    }

    /// Nudge sent after a reload interrupted an interview.
    pub fn prompt_to_resume(&self) -> Option<Effect> {
        self.in_progress()
            .then_some(Effect::Notify(Notice::ResumeNudge))
    }

    // ── Rules ───────────────────────────────────────────────────────

    /// Record a rule confirmation. Persists only on the first one.
    pub fn confirm_rules(&mut self, text: impl Into<String>) -> Option<Effect> {
        self.rule_confirmations.push(text.into());
        (self.rule_confirmations.len() == 1)
            .then_some(Effect::Persist(InterviewField::ReadRules(true)))
    }

    /// One-line summary for staff.
    pub fn status_line(&self, member: UserId, channel: ChannelId) -> String {
        let overall = if self.interview_finished {
            format!("<@{member}> has completed their interview in <#{channel}>.")
        } else {
            format!("<@{member}> has an ongoing interview in <#{channel}>.")
        };

        let mut read_rules = if self.read_rules() {
            "They have read the rules."
        } else {
            "They have NOT read the rules."
        };

        let track = match self.interview_type {
            InterviewType::NotStarted => "They have not yet selected an interview type.",
            InterviewType::NewSystem => "They are a new user, taking the system interview.",
            InterviewType::NewQuestioning => {
                "They are a new user, taking the questioning interview."
            }
            InterviewType::NewSinglet => "They are a new user, taking the singlet interview.",
            InterviewType::NewTulpa => "They are a new user, looking to make a tulpa.",
            InterviewType::ExistingMember => {
                read_rules = "";
                "They are an alt-account of an existing member."
            }
            InterviewType::Other => "They have selected other.",
        };

        format!("{overall} {track} {read_rules}").trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMBER: UserId = UserId(42);
    const STRANGER: UserId = UserId(7);

    fn committed(track: InterviewType) -> InterviewState {
        InterviewState {
            interview_type: track,
            ..Default::default()
        }
    }

    #[test]
    fn interview_type_string_forms() {
        for (_, t) in TRACKS {
            assert_eq!(t.as_str().parse::<InterviewType>().unwrap(), t);
            assert_eq!(t.to_string().parse::<InterviewType>().unwrap(), t);
        }
        assert!("bogus".parse::<InterviewType>().is_err());
        assert_eq!(
            serde_json::to_string(&InterviewType::NewTulpa).unwrap(),
            "\"new_tulpa\""
        );
    }

    #[test]
    fn question_tracks_in_prompt_order() {
        let tracks: Vec<_> = InterviewType::question_tracks().collect();
        assert_eq!(
            tracks,
            vec![
                InterviewType::NewSystem,
                InterviewType::NewQuestioning,
                InterviewType::NewSinglet,
                InterviewType::NewTulpa
            ]
        );
    }

    #[test]
    fn selecting_question_track_starts_loop() {
        let mut s = InterviewState::default();
        let effects = s.reaction_added(MEMBER, MEMBER, &Emoji::new("👥"));
        assert_eq!(s.interview_type, InterviewType::NewSystem);
        assert_eq!(
            effects,
            vec![
                Effect::Persist(InterviewField::Type(InterviewType::NewSystem)),
                Effect::StartQuestionLoop
            ]
        );
    }

    #[test]
    fn existing_member_and_other_finish_immediately() {
        let mut s = InterviewState::default();
        let effects = s.reaction_added(MEMBER, MEMBER, &Emoji::new("<:altAccount:652989510996721675>"));
        assert!(s.interview_finished);
        assert!(effects.contains(&Effect::Notify(Notice::ExistingMember)));

        let mut s = InterviewState::default();
        let effects = s.reaction_added(MEMBER, MEMBER, &Emoji::new("ℹ️"));
        assert!(s.interview_finished);
        assert!(effects.contains(&Effect::Notify(Notice::Other)));
    }

    #[test]
    fn foreign_and_unknown_reactions_are_stripped() {
        let mut s = InterviewState::default();
        assert_eq!(
            s.reaction_added(STRANGER, MEMBER, &Emoji::new("👥")),
            vec![Effect::StripReaction]
        );
        assert_eq!(
            s.reaction_added(MEMBER, MEMBER, &Emoji::new("🍕")),
            vec![Effect::StripReaction]
        );
        assert_eq!(s.interview_type, InterviewType::NotStarted);
    }

    #[test]
    fn type_commit_is_one_shot() {
        let mut s = InterviewState::default();
        s.reaction_added(MEMBER, MEMBER, &Emoji::new("❓"));

        for (emoji, _) in TRACKS {
            let effects = s.reaction_added(MEMBER, MEMBER, &Emoji::new(emoji));
            assert_eq!(effects, vec![Effect::StripReaction]);
            assert_eq!(s.interview_type, InterviewType::NewQuestioning);
        }

        // The reset emoji is tolerated, not stripped.
        assert!(
            s.reaction_added(MEMBER, MEMBER, &Emoji::new(RESET_EMOJI))
                .is_empty()
        );
        assert_eq!(s.interview_type, InterviewType::NewQuestioning);
    }

    #[test]
    fn removing_committed_emoji_soft_resets() {
        let mut s = committed(InterviewType::NewSinglet);
        s.question_number = 2;
        let effects = s.reaction_removed(MEMBER, MEMBER, &Emoji::new("👤"));

        assert_eq!(s, InterviewState::default());
        assert_eq!(effects[0], Effect::Notify(Notice::TypeReset));
        assert!(effects.contains(&Effect::CancelQuestionLoop));
        assert!(!effects.contains(&Effect::SendTypePrompt));
    }

    #[test]
    fn non_matching_removals_are_ignored() {
        let mut s = committed(InterviewType::NewSinglet);
        assert!(
            s.reaction_removed(MEMBER, MEMBER, &Emoji::new("👥"))
                .is_empty()
        );
        assert!(
            s.reaction_removed(STRANGER, MEMBER, &Emoji::new("👤"))
                .is_empty()
        );
        assert_eq!(s.interview_type, InterviewType::NewSinglet);

        let mut fresh = InterviewState::default();
        assert!(
            fresh
                .reaction_removed(MEMBER, MEMBER, &Emoji::new("👤"))
                .is_empty()
        );
    }

    #[test]
    fn progression_is_monotonic_until_finished() {
        let mut s = committed(InterviewType::NewSystem);
        let count = 3;

        // First question goes out when the loop starts.
        assert_eq!(s.pending_question(count), Some(0));
        s.question_sent();

        // Each accepted reply either asks the next question or finishes.
        let mut outcomes = Vec::new();
        for _ in 0..count {
            let before = s.question_number;
            let outcome = s.after_reply(s.interview_type, count);
            outcomes.push(outcome);
            match outcome {
                ReplyOutcome::Continue => {
                    assert!(s.pending_question(count).is_some());
                    s.question_sent();
                    assert_eq!(s.question_number, before + 1);
                }
                ReplyOutcome::Finish => {
                    s.finish();
                    break;
                }
                ReplyOutcome::Abort => unreachable!(),
            }
        }

        assert_eq!(
            outcomes,
            vec![
                ReplyOutcome::Continue,
                ReplyOutcome::Continue,
                ReplyOutcome::Finish
            ]
        );
        assert_eq!(s.question_number, 3);
        assert!(s.interview_finished);
        assert_eq!(s.pending_question(count), None);
    }

    #[test]
    fn paused_interview_sends_nothing() {
        let mut s = committed(InterviewType::NewTulpa);
        s.question_number = 1;
        s.pause();
        let before = s.clone();
        for _ in 0..5 {
            assert_eq!(s.pending_question(4), None);
        }
        assert_eq!(s, before);
        assert!(!s.accepts_reply(MEMBER, MEMBER, "hello", ";"));
    }

    #[test]
    fn commands_are_not_replies() {
        let s = committed(InterviewType::NewSystem);
        assert!(!s.accepts_reply(MEMBER, MEMBER, "  ;PAUSE ", ";"));
        assert!(!s.accepts_reply(MEMBER, MEMBER, ";resume", ";"));
        assert!(!s.accepts_reply(MEMBER, MEMBER, ";status", ";"));
        assert!(!s.accepts_reply(STRANGER, MEMBER, "answer", ";"));
        assert!(s.accepts_reply(MEMBER, MEMBER, "answer", ";"));
    }

    #[test]
    fn resume_rewinds_exactly_one() {
        let mut s = committed(InterviewType::NewSystem);
        s.question_number = 2;
        s.waiting_for_messages = true;
        s.pause();

        let effects = s.resume();
        assert!(!s.paused);
        assert_eq!(s.question_number, 1);
        assert_eq!(
            effects,
            vec![
                Effect::Persist(InterviewField::Paused(false)),
                Effect::Notify(Notice::Resumed),
                Effect::Persist(InterviewField::QuestionNumber(1)),
                Effect::AskNextQuestion,
            ]
        );
    }

    #[test]
    fn resume_at_zero_stays_at_zero_and_restarts_track() {
        let mut s = committed(InterviewType::NewSystem);
        s.pause();
        let effects = s.resume();
        assert_eq!(s.question_number, 0);
        assert_eq!(effects.last(), Some(&Effect::StartQuestionLoop));
    }

    #[test]
    fn resume_on_finished_interview_only_unpauses() {
        let mut s = committed(InterviewType::Other);
        s.interview_finished = true;
        s.paused = true;
        assert_eq!(
            s.resume(),
            vec![Effect::Persist(InterviewField::Paused(false))]
        );
    }

    #[test]
    fn type_change_mid_wait_aborts_loop() {
        let mut s = committed(InterviewType::NewSystem);
        s.question_sent();
        s.restart(true);
        assert_eq!(
            s.after_reply(InterviewType::NewSystem, 3),
            ReplyOutcome::Abort
        );
    }

    #[test]
    fn hard_restart_resends_prompt() {
        let mut s = committed(InterviewType::NewQuestioning);
        s.interview_finished = true;
        s.waiting_for_messages = true;
        let effects = s.restart(false);
        assert_eq!(s, InterviewState::default());
        assert_eq!(effects.last(), Some(&Effect::SendTypePrompt));
    }

    #[test]
    fn first_rule_confirmation_persists() {
        let mut s = InterviewState::default();
        assert_eq!(
            s.confirm_rules("I read them"),
            Some(Effect::Persist(InterviewField::ReadRules(true)))
        );
        assert_eq!(s.confirm_rules("again"), None);
        assert!(s.read_rules());
    }

    #[test]
    fn nudge_only_for_interrupted_interviews() {
        assert!(InterviewState::default().prompt_to_resume().is_none());
        assert!(committed(InterviewType::NewSystem).prompt_to_resume().is_some());
        let mut done = committed(InterviewType::NewSystem);
        done.interview_finished = true;
        assert!(done.prompt_to_resume().is_none());
    }

    #[test]
    fn status_line_mentions_track_and_rules() {
        let mut s = committed(InterviewType::NewSystem);
        let line = s.status_line(MEMBER, ChannelId(9));
        assert!(line.starts_with("<@42> has an ongoing interview in <#9>."));
        assert!(line.contains("system interview"));
        assert!(line.ends_with("They have NOT read the rules."));

        s.interview_type = InterviewType::ExistingMember;
        s.interview_finished = true;
        let line = s.status_line(MEMBER, ChannelId(9));
        assert!(line.contains("completed"));
        assert!(!line.contains("rules"));
    }
}
