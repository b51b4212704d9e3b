use crate::config::SelectorConfig;

/// Apply button most job boards render inside each listing card.
pub const GENERIC_APPLY_BUTTON_SELECTOR: &str = "button[data-test-id*='job-card-apply-button']";

/// One step of the click-target chain used by detail navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    Configured(String),
    /// [`GENERIC_APPLY_BUTTON_SELECTOR`].
    ApplyButton,
    Title(String),
    WholeCard,
}

impl ClickTarget {
    pub fn selector(&self) -> Option<&str> {
        match self {
            Self::Configured(selector) | Self::Title(selector) => Some(selector),
            Self::ApplyButton => Some(GENERIC_APPLY_BUTTON_SELECTOR),
            Self::WholeCard => None,
        }
    }
}

/// Ordered click targets for a card: configured target, generic apply button,
/// title, whole card. Blank selectors and repeats are skipped.
pub fn click_target_chain(config: &SelectorConfig) -> Vec<ClickTarget> {
    let mut chain: Vec<ClickTarget> = Vec::with_capacity(4);
    let mut push = |target: ClickTarget| {
        let duplicate = target
            .selector()
            .is_some_and(|s| chain.iter().any(|t| t.selector() == Some(s)));
        if !duplicate {
            chain.push(target);
        }
    };

    if let Some(selector) = non_blank(config.click_target_selector.as_deref()) {
        push(ClickTarget::Configured(selector.to_string()));
    }
    push(ClickTarget::ApplyButton);
    if let Some(selector) = non_blank(Some(&config.title_selector)) {
        push(ClickTarget::Title(selector.to_string()));
    }
    push(ClickTarget::WholeCard);
    chain
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChain {
    pub field: String,
    pub selectors: Vec<String>,
}

pub fn detail_field_chains(config: &SelectorConfig) -> Vec<FieldChain> {
    config
        .detail_selectors
        .iter()
        .map(|(field, selectors)| FieldChain {
            field: field.clone(),
            selectors: selectors
                .iter()
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .collect(),
        })
        .filter(|chain| !chain.selectors.is_empty())
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
