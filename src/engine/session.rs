// Breathing session state machine: phase sequencing and per-second countdown.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SettingsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreathingPhase {
    Inhale,
    Hold,
    Exhale,
}

impl BreathingPhase {
    pub fn label(self) -> &'static str {
        match self {
            BreathingPhase::Inhale => "inhale",
            BreathingPhase::Hold => "hold",
            BreathingPhase::Exhale => "exhale",
        }
    }
}

/// User-configurable breathing pattern, stored as JSON by the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreathingSettings {
    pub inhale_seconds: u32,
    /// Zero makes the hold instantaneous.
    pub hold_seconds: u32,
    pub exhale_seconds: u32,
    pub cycles: u32,
}

impl Default for BreathingSettings {
    fn default() -> Self {
        Self {
            inhale_seconds: 4,
            hold_seconds: 4,
            exhale_seconds: 4,
            cycles: 4,
        }
    }
}

impl BreathingSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let checks = [
            ("inhale_seconds", self.inhale_seconds),
            ("exhale_seconds", self.exhale_seconds),
            ("cycles", self.cycles),
        ];
        for (field, value) in checks {
            if value < 1 {
                return Err(SettingsError::OutOfRange {
                    field,
                    min: 1,
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn seconds_for(&self, phase: BreathingPhase) -> u32 {
        match phase {
            BreathingPhase::Inhale => self.inhale_seconds,
            BreathingPhase::Hold => self.hold_seconds,
            BreathingPhase::Exhale => self.exhale_seconds,
        }
    }

    /// Length of a full session in seconds.
    pub fn total_seconds(&self) -> u64 {
        let cycle = self.inhale_seconds as u64 + self.hold_seconds as u64 + self.exhale_seconds as u64;
        cycle * self.cycles as u64
    }
}

/// Notification emitted as a session advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreathingEvent {
    /// A phase with a visible countdown began.
    PhaseStarted {
        cycle: u32,
        phase: BreathingPhase,
        seconds: u32,
    },
    /// One second elapsed inside the current phase.
    Tick {
        cycle: u32,
        phase: BreathingPhase,
        remaining: u32,
    },
    /// The final exhale finished. Emitted once per session.
    Completed { cycles: u32 },
}

/// Runtime state of one breathing session.
#[derive(Debug, Clone)]
pub struct BreathingSession {
    settings: BreathingSettings,
    current_cycle: u32,
    phase: BreathingPhase,
    remaining: u32,
    paused: bool,
    complete: bool,
    elapsed_seconds: u64,
}

impl BreathingSession {
    /// Begin at the first inhale of cycle 1.
    pub fn new(settings: BreathingSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            settings,
            current_cycle: 1,
            phase: BreathingPhase::Inhale,
            remaining: settings.inhale_seconds,
            paused: false,
            complete: false,
            elapsed_seconds: 0,
        })
    }

    pub fn settings(&self) -> &BreathingSettings {
        &self.settings
    }

    pub fn current_cycle(&self) -> u32 {
        self.current_cycle
    }

    /// Current phase, `None` once complete.
    pub fn phase(&self) -> Option<BreathingPhase> {
        (!self.complete).then_some(self.phase)
    }

    pub fn remaining_seconds(&self) -> u32 {
        if self.complete {
            0
        } else {
            self.remaining
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Seconds of countdown consumed so far, excluding paused time.
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Event describing the phase currently being counted down.
    pub fn current_event(&self) -> Option<BreathingEvent> {
        self.phase().map(|phase| BreathingEvent::PhaseStarted {
            cycle: self.current_cycle,
            phase,
            seconds: self.remaining,
        })
    }

    /// Advance the countdown by one second.
    ///
    /// No-op while paused or after completion.
    pub fn tick(&mut self) -> Vec<BreathingEvent> {
        let mut events = Vec::new();
        if self.paused || self.complete {
            return events;
        }

        self.elapsed_seconds += 1;
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            events.push(BreathingEvent::Tick {
                cycle: self.current_cycle,
                phase: self.phase,
                remaining: self.remaining,
            });
        } else {
            self.advance(&mut events);
        }
        events
    }

    fn advance(&mut self, events: &mut Vec<BreathingEvent>) {
        loop {
            self.phase = match self.phase {
                BreathingPhase::Inhale => BreathingPhase::Hold,
                BreathingPhase::Hold => BreathingPhase::Exhale,
                BreathingPhase::Exhale => {
                    if self.current_cycle >= self.settings.cycles {
                        self.complete = true;
                        events.push(BreathingEvent::Completed {
                            cycles: self.settings.cycles,
                        });
                        return;
                    }
                    self.current_cycle += 1;
                    BreathingPhase::Inhale
                }
            };

            let seconds = self.settings.seconds_for(self.phase);
            if seconds == 0 {
                debug!("cycle {} {} skipped (zero length)", self.current_cycle, self.phase.label());
                continue;
            }

            self.remaining = seconds;
            events.push(BreathingEvent::PhaseStarted {
                cycle: self.current_cycle,
                phase: self.phase,
                seconds,
            });
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(inhale: u32, hold: u32, exhale: u32, cycles: u32) -> BreathingSettings {
        BreathingSettings {
            inhale_seconds: inhale,
            hold_seconds: hold,
            exhale_seconds: exhale,
            cycles,
        }
    }

    fn run_to_end(session: &mut BreathingSession) -> Vec<BreathingEvent> {
        let mut events = Vec::new();
        while !session.is_complete() {
            events.extend(session.tick());
        }
        events
    }

    #[test]
    fn test_phase_sequence_and_duration() {
        let mut session = BreathingSession::new(settings(4, 1, 6, 2)).unwrap();
        let events = run_to_end(&mut session);

        let phases: Vec<(u32, BreathingPhase)> = events
            .iter()
            .filter_map(|e| match e {
                BreathingEvent::PhaseStarted { cycle, phase, .. } => Some((*cycle, *phase)),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                (1, BreathingPhase::Hold),
                (1, BreathingPhase::Exhale),
                (2, BreathingPhase::Inhale),
                (2, BreathingPhase::Hold),
                (2, BreathingPhase::Exhale),
            ]
        );
        assert_eq!(session.elapsed_seconds(), 22);
        assert_eq!(session.elapsed_seconds(), session.settings().total_seconds());
        assert_eq!(
            events.iter().filter(|e| matches!(e, BreathingEvent::Completed { .. })).count(),
            1
        );
    }

    #[test]
    fn test_no_events_after_completion() {
        let mut session = BreathingSession::new(settings(1, 0, 1, 1)).unwrap();
        run_to_end(&mut session);
        assert!(session.tick().is_empty());
        assert_eq!(session.phase(), None);
        assert_eq!(session.remaining_seconds(), 0);
    }

    #[test]
    fn test_zero_hold_goes_straight_to_exhale() {
        let mut session = BreathingSession::new(settings(2, 0, 3, 1)).unwrap();
        assert_eq!(
            session.tick(),
            vec![BreathingEvent::Tick {
                cycle: 1,
                phase: BreathingPhase::Inhale,
                remaining: 1
            }]
        );
        assert_eq!(
            session.tick(),
            vec![BreathingEvent::PhaseStarted {
                cycle: 1,
                phase: BreathingPhase::Exhale,
                seconds: 3
            }]
        );
    }

    #[test]
    fn test_paused_session_does_not_advance() {
        let mut session = BreathingSession::new(settings(3, 1, 3, 1)).unwrap();
        session.tick();
        session.set_paused(true);
        assert!(session.tick().is_empty());
        assert_eq!(session.remaining_seconds(), 2);
        session.set_paused(false);
        session.tick();
        assert_eq!(session.remaining_seconds(), 1);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let err = BreathingSession::new(settings(0, 1, 1, 1)).unwrap_err();
        assert_eq!(
            err,
            SettingsError::OutOfRange {
                field: "inhale_seconds",
                min: 1,
                value: 0
            }
        );
        assert!(BreathingSession::new(settings(1, 1, 1, 0)).is_err());
        assert!(BreathingSession::new(settings(1, 0, 1, 3)).is_ok());
    }

    #[test]
    fn test_settings_json_uses_camel_case() {
        let json = serde_json::to_string(&settings(4, 7, 8, 3)).unwrap();
        assert_eq!(
            json,
            r#"{"inhaleSeconds":4,"holdSeconds":7,"exhaleSeconds":8,"cycles":3}"#
        );
    }
}
