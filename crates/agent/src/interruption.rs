use boulanger_core::flows::{Interruption, InterruptionSignal};

pub const CANCEL_MESSAGE: &str = "Cancelling your order.";
pub const HELP_MESSAGE: &str = "I can take an order for Pizza, Bun, Bread, Cake, Pastries or Eggs. \
I will ask for the product, the number of units, the size and the flavor, then read the order back \
for you to confirm. Say \"cancel\" at any time to stop.";

/// Decides whether a mid-order utterance should abort the slot-filling flow.
pub trait InterruptionDetector: Send + Sync {
    fn detect(&self, utterance: &str) -> InterruptionSignal;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordInterruptionDetector {
    pub cancel_keywords: Vec<String>,
    pub help_keywords: Vec<String>,
}

impl Default for KeywordInterruptionDetector {
    fn default() -> Self {
        Self {
            cancel_keywords: ["cancel", "quit", "stop", "never mind", "nevermind"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            help_keywords: ["help", "?", "what can you do"].into_iter().map(str::to_string).collect(),
        }
    }
}

impl InterruptionDetector for KeywordInterruptionDetector {
    fn detect(&self, utterance: &str) -> InterruptionSignal {
        let normalized = utterance.trim().trim_end_matches(['.', '!']).to_ascii_lowercase();
        if normalized.is_empty() {
            return InterruptionSignal::Continue;
        }

        if self.cancel_keywords.iter().any(|keyword| normalized == *keyword) {
            InterruptionSignal::Cancelled
        } else if self.help_keywords.iter().any(|keyword| normalized == *keyword) {
            InterruptionSignal::HelpRequested
        } else {
            InterruptionSignal::Continue
        }
    }
}

pub fn interruption_message(interruption: Interruption) -> &'static str {
    match interruption {
        Interruption::Cancelled => CANCEL_MESSAGE,
        Interruption::HelpRequested => HELP_MESSAGE,
    }
}

#[cfg(test)]
mod tests {
    use boulanger_core::flows::{Interruption, InterruptionSignal};

    use super::{
        interruption_message, InterruptionDetector, KeywordInterruptionDetector, CANCEL_MESSAGE,
    };

    #[test]
    fn cancel_keywords_interrupt_regardless_of_case() {
        let detector = KeywordInterruptionDetector::default();

        assert_eq!(detector.detect("Cancel"), InterruptionSignal::Cancelled);
        assert_eq!(detector.detect("  QUIT! "), InterruptionSignal::Cancelled);
        assert_eq!(detector.detect("help"), InterruptionSignal::HelpRequested);
    }

    #[test]
    fn answers_that_merely_contain_a_keyword_continue() {
        let detector = KeywordInterruptionDetector::default();

        assert_eq!(detector.detect("Bread"), InterruptionSignal::Continue);
        assert_eq!(detector.detect("please help me pick a cake"), InterruptionSignal::Continue);
        assert_eq!(detector.detect(""), InterruptionSignal::Continue);
    }

    #[test]
    fn cancel_message_is_used_for_cancellation() {
        assert_eq!(interruption_message(Interruption::Cancelled), CANCEL_MESSAGE);
    }
}
