//! Action routing with duplicate suppression.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Action;

/// Gesture seqs remembered for duplicate detection.
const RECENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteDecision {
    /// Start a dispatch job. `seq` is absent when no prompt is known to this
    /// process (a delivery that outlived the process that posted it).
    Dispatch { seq: Option<u64> },
    Cancelled { seq: Option<u64> },
    Duplicate { seq: Option<u64> },
}

#[derive(Debug)]
pub struct ActionRouter {
    dedupe_window_ms: u64,
    dispatched_seqs: VecDeque<u64>,
    /// Prompts closed by a cancel or by timeout.
    resolved_seqs: VecDeque<u64>,
    last_dispatch_ms: Option<u64>,
}

fn remember(seqs: &mut VecDeque<u64>, seq: u64) {
    if seqs.contains(&seq) {
        return;
    }
    if seqs.len() == RECENT_CAPACITY {
        seqs.pop_front();
    }
    seqs.push_back(seq);
}

impl ActionRouter {
    pub fn new(dedupe_window_ms: u64) -> Self {
        Self {
            dedupe_window_ms,
            dispatched_seqs: VecDeque::with_capacity(RECENT_CAPACITY),
            resolved_seqs: VecDeque::with_capacity(RECENT_CAPACITY),
            last_dispatch_ms: None,
        }
    }

    /// Close the prompt for `seq` without a job. A later `Send` for it is a duplicate.
    pub fn expire(&mut self, seq: u64) {
        remember(&mut self.resolved_seqs, seq);
    }

    /// Decide what an incoming action does.
    ///
    /// `prompt_seq` is the seq of the most recently posted prompt, if any.
    pub fn route(&mut self, action: Action, prompt_seq: Option<u64>, now_ms: u64) -> RouteDecision {
        match action {
            Action::Cancel => {
                info!(seq = ?prompt_seq, "emergency cancelled by user");
                if let Some(seq) = prompt_seq {
                    if !self.dispatched_seqs.contains(&seq) {
                        remember(&mut self.resolved_seqs, seq);
                    }
                }
                RouteDecision::Cancelled { seq: prompt_seq }
            }
            Action::Send => {
                if let Some(seq) = prompt_seq {
                    if self.dispatched_seqs.contains(&seq) {
                        debug!(seq, "send already dispatched for this gesture");
                        return RouteDecision::Duplicate { seq: prompt_seq };
                    }
                    if self.resolved_seqs.contains(&seq) {
                        info!(seq, "send for a cancelled or expired prompt, ignoring");
                        return RouteDecision::Duplicate { seq: prompt_seq };
                    }
                }
                if let Some(last) = self.last_dispatch_ms {
                    if now_ms.saturating_sub(last) < self.dedupe_window_ms {
                        debug!(seq = ?prompt_seq, since_ms = now_ms.saturating_sub(last), "send inside dedupe window");
                        return RouteDecision::Duplicate { seq: prompt_seq };
                    }
                }

                if let Some(seq) = prompt_seq {
                    remember(&mut self.dispatched_seqs, seq);
                }
                self.last_dispatch_ms = Some(now_ms);
                info!(seq = ?prompt_seq, "emergency confirmed by user");
                RouteDecision::Dispatch { seq: prompt_seq }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_dispatches_once_per_gesture() {
        let mut r = ActionRouter::new(1000);
        assert_eq!(r.route(Action::Send, Some(1), 0), RouteDecision::Dispatch { seq: Some(1) });
        assert_eq!(r.route(Action::Send, Some(1), 5000), RouteDecision::Duplicate { seq: Some(1) });
        assert_eq!(r.route(Action::Send, Some(2), 6000), RouteDecision::Dispatch { seq: Some(2) });
    }

    #[test]
    fn rapid_sends_are_deduplicated() {
        let mut r = ActionRouter::new(1000);
        assert!(matches!(r.route(Action::Send, None, 10_000), RouteDecision::Dispatch { .. }));
        assert!(matches!(r.route(Action::Send, None, 10_999), RouteDecision::Duplicate { .. }));
        assert!(matches!(r.route(Action::Send, None, 11_000), RouteDecision::Dispatch { .. }));
    }

    #[test]
    fn send_after_cancel_is_ignored() {
        let mut r = ActionRouter::new(1000);
        assert_eq!(r.route(Action::Cancel, Some(3), 0), RouteDecision::Cancelled { seq: Some(3) });
        assert_eq!(r.route(Action::Send, Some(3), 5000), RouteDecision::Duplicate { seq: Some(3) });
        assert_eq!(r.route(Action::Send, Some(4), 6000), RouteDecision::Dispatch { seq: Some(4) });
    }

    #[test]
    fn send_after_expiry_is_ignored() {
        let mut r = ActionRouter::new(1000);
        r.expire(7);
        assert_eq!(r.route(Action::Send, Some(7), 5000), RouteDecision::Duplicate { seq: Some(7) });
        // Deliveries with no prompt known to this process still go out.
        assert_eq!(r.route(Action::Send, None, 6000), RouteDecision::Dispatch { seq: None });
    }

    #[test]
    fn remembers_a_bounded_number_of_gestures() {
        let mut r = ActionRouter::new(0);
        for seq in 0..(RECENT_CAPACITY as u64 + 1) {
            r.route(Action::Send, Some(seq), seq * 10);
        }
        assert!(matches!(r.route(Action::Send, Some(0), 10_000), RouteDecision::Dispatch { .. }));
        assert!(matches!(
            r.route(Action::Send, Some(RECENT_CAPACITY as u64), 20_000),
            RouteDecision::Duplicate { .. }
        ));
    }
}
