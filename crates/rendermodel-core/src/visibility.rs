//! Whole-model show/hide decision

use crate::device::{DeviceLayer, InteractionMode, Side};

/// Inputs the show decision depends on, sampled once per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityInputs {
    pub has_focus: bool,
    pub connected: bool,
    pub tracked: bool,
    pub interaction_mode: InteractionMode,
}

impl VisibilityInputs {
    pub fn sample(devices: &dyn DeviceLayer, side: Side) -> Self {
        Self {
            has_focus: !devices.input_focus_captured_by_system(),
            connected: devices.is_connected(side),
            tracked: devices.is_tracked(side),
            interaction_mode: devices.current_interaction_mode(),
        }
    }
}

/// A change of the whole-model show state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTransition {
    Show,
    Hide,
}

#[derive(Debug, Clone, Default)]
pub struct VisibilityPolicy {
    check_interaction_mode: bool,
    shown: bool,
}

impl VisibilityPolicy {
    pub fn new(check_interaction_mode: bool) -> Self {
        Self {
            check_interaction_mode,
            shown: false,
        }
    }

    pub fn set_check_interaction_mode(&mut self, check: bool) {
        self.check_interaction_mode = check;
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    /// Pure show decision for a set of inputs
    pub fn should_show(&self, inputs: &VisibilityInputs) -> bool {
        let interactable = !self.check_interaction_mode || inputs.interaction_mode == InteractionMode::Controller;
        inputs.has_focus && inputs.connected && interactable && inputs.tracked
    }

    /// Recompute the decision; reports a transition only when it flips
    pub fn evaluate(&mut self, inputs: &VisibilityInputs) -> Option<ShowTransition> {
        let show = self.should_show(inputs);
        if show == self.shown {
            return None;
        }
        self.shown = show;
        Some(if show { ShowTransition::Show } else { ShowTransition::Hide })
    }

    /// Forget the current decision so the next shown frame flips again.
    /// Used when the model is torn down and rebuilt hidden.
    pub fn reset(&mut self) {
        self.shown = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible() -> VisibilityInputs {
        VisibilityInputs {
            has_focus: true,
            connected: true,
            tracked: true,
            interaction_mode: InteractionMode::Controller,
        }
    }

    #[test]
    fn test_all_inputs_required() {
        let policy = VisibilityPolicy::new(false);
        assert!(policy.should_show(&visible()));
        assert!(!policy.should_show(&VisibilityInputs { has_focus: false, ..visible() }));
        assert!(!policy.should_show(&VisibilityInputs { connected: false, ..visible() }));
        assert!(!policy.should_show(&VisibilityInputs { tracked: false, ..visible() }));
    }

    #[test]
    fn test_interaction_mode_check() {
        let hand = VisibilityInputs {
            interaction_mode: InteractionMode::Hand,
            ..visible()
        };
        assert!(VisibilityPolicy::new(false).should_show(&hand));
        assert!(!VisibilityPolicy::new(true).should_show(&hand));
    }

    #[test]
    fn test_transitions_only_on_change() {
        let mut policy = VisibilityPolicy::new(false);
        assert_eq!(policy.evaluate(&visible()), Some(ShowTransition::Show));
        assert_eq!(policy.evaluate(&visible()), None);

        let lost = VisibilityInputs { tracked: false, ..visible() };
        assert_eq!(policy.evaluate(&lost), Some(ShowTransition::Hide));
        assert_eq!(policy.evaluate(&lost), None);

        assert_eq!(policy.evaluate(&visible()), Some(ShowTransition::Show));
        policy.reset();
        assert_eq!(policy.evaluate(&visible()), Some(ShowTransition::Show));
    }
}
