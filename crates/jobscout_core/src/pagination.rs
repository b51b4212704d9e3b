//! Pure pagination logic: the session phase machine and the bookkeeping
//! each policy needs between browser actions.
//!
//! The engine drives a page and reports what happened as [`PaginationMsg`];
//! [`update`] folds the message into [`PaginationState`] and answers with the
//! next [`PaginationCommand`]. Nothing here touches a browser.

use std::ops::Range;

use serde::Serialize;
use url::Url;

use crate::config::PaginationType;

pub const LOAD_MORE_BATCH_SIZE: usize = 10;
pub const MAX_CONSECUTIVE_EMPTY_SCROLLS: u32 = 3;
pub const MAX_SCROLL_ATTEMPTS: u32 = 20;
pub const MAX_LOAD_MORE_ATTEMPTS: u32 = 50;

/// Safety limits for the open-ended policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    pub batch_size: usize,
    pub max_consecutive_empty_scrolls: u32,
    pub max_scroll_attempts: u32,
    pub max_load_more_attempts: u32,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            batch_size: LOAD_MORE_BATCH_SIZE,
            max_consecutive_empty_scrolls: MAX_CONSECUTIVE_EMPTY_SCROLLS,
            max_scroll_attempts: MAX_SCROLL_ATTEMPTS,
            max_load_more_attempts: MAX_LOAD_MORE_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationPhase {
    Navigating,
    Extracting,
    Advancing,
    Done,
}

/// Why a session stopped paginating. All but the last four are designed
/// terminations rather than failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    SinglePage,
    MaxPagesReached,
    MaxJobsReached,
    ControlMissing,
    ControlDisabled,
    NoNewCards,
    ScrollLimitReached,
    LoadLimitReached,
    EmptyPage,
    ClickFailed,
    NavigationFailed,
    SessionTerminated,
    Cancelled,
}

impl StopReason {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::ClickFailed | Self::NavigationFailed | Self::SessionTerminated | Self::Cancelled
        )
    }
}

/// What the engine observed since the last command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMsg {
    Navigated,
    NavigationFailed,
    PageExtracted {
        accepted: usize,
        /// Set when the pass stopped the session itself: termination, a
        /// failed detail restore, or the end of a progressive load.
        stopped: Option<StopReason>,
        /// Trailing load-more clicks that rendered nothing.
        empty_loads: u32,
    },
    Advanced,
    /// The policy could not, or need not, move any further.
    AdvanceStopped(StopReason),
    /// Infinite scroll stopped loading after `empty_scrolls` scrolls in a
    /// row added no cards.
    ScrollSettled {
        reason: StopReason,
        empty_scrolls: u32,
    },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationCommand {
    ExtractPage,
    AdvancePage,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub policy: PaginationType,
    pub current_page: u32,
    pub total_collected: usize,
    pub consecutive_no_progress: u32,
    pub max_pages: u32,
    pub max_jobs: usize,
    pub phase: PaginationPhase,
    pub stop_reason: Option<StopReason>,
    /// Infinite scroll loads before it extracts; this remembers how loading ended.
    #[serde(skip)]
    pending_stop: Option<StopReason>,
}

impl PaginationState {
    pub fn new(policy: PaginationType, max_pages: u32, max_jobs: usize) -> Self {
        Self {
            policy,
            current_page: 1,
            total_collected: 0,
            consecutive_no_progress: 0,
            max_pages: max_pages.max(1),
            max_jobs,
            phase: PaginationPhase::Navigating,
            stop_reason: None,
            pending_stop: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == PaginationPhase::Done
    }

    pub fn remaining_jobs(&self) -> usize {
        self.max_jobs.saturating_sub(self.total_collected)
    }

    pub fn jobs_exhausted(&self) -> bool {
        self.remaining_jobs() == 0
    }

    pub fn command(&self) -> PaginationCommand {
        match self.phase {
            PaginationPhase::Navigating | PaginationPhase::Extracting => {
                PaginationCommand::ExtractPage
            }
            PaginationPhase::Advancing => PaginationCommand::AdvancePage,
            PaginationPhase::Done => PaginationCommand::Finish,
        }
    }

    fn finish(&mut self, reason: StopReason) -> PaginationCommand {
        self.phase = PaginationPhase::Done;
        self.stop_reason.get_or_insert(reason);
        PaginationCommand::Finish
    }

    fn extract(&mut self) -> PaginationCommand {
        self.phase = PaginationPhase::Extracting;
        PaginationCommand::ExtractPage
    }

    fn advance(&mut self) -> PaginationCommand {
        self.phase = PaginationPhase::Advancing;
        PaginationCommand::AdvancePage
    }
}

pub fn update(mut state: PaginationState, msg: PaginationMsg) -> (PaginationState, PaginationCommand) {
    if state.is_done() {
        return (state, PaginationCommand::Finish);
    }

    let command = match (state.phase, msg) {
        (_, PaginationMsg::Cancelled) => state.finish(StopReason::Cancelled),

        (PaginationPhase::Navigating, PaginationMsg::Navigated) => match state.policy {
            PaginationType::InfiniteScroll => state.advance(),
            _ => state.extract(),
        },
        (PaginationPhase::Navigating, PaginationMsg::NavigationFailed) => {
            state.finish(StopReason::NavigationFailed)
        }

        (
            PaginationPhase::Extracting,
            PaginationMsg::PageExtracted {
                accepted,
                stopped,
                empty_loads,
            },
        ) => {
            state.total_collected += accepted;
            if state.policy == PaginationType::LoadMoreProgressive {
                state.consecutive_no_progress = empty_loads;
            }
            if let Some(reason) = stopped {
                state.finish(reason)
            } else if state.jobs_exhausted() {
                state.finish(StopReason::MaxJobsReached)
            } else {
                match state.policy {
                    PaginationType::None => state.finish(StopReason::SinglePage),
                    PaginationType::InfiniteScroll | PaginationType::LoadMoreProgressive => {
                        let reason = state.pending_stop.unwrap_or(StopReason::NoNewCards);
                        state.finish(reason)
                    }
                    PaginationType::ButtonClick | PaginationType::UrlParam => {
                        if state.current_page >= state.max_pages {
                            state.finish(StopReason::MaxPagesReached)
                        } else {
                            state.advance()
                        }
                    }
                }
            }
        }

        (PaginationPhase::Advancing, PaginationMsg::Advanced) => {
            if state.policy != PaginationType::InfiniteScroll {
                state.current_page += 1;
            }
            state.consecutive_no_progress = 0;
            state.extract()
        }
        (
            PaginationPhase::Advancing,
            PaginationMsg::ScrollSettled {
                reason,
                empty_scrolls,
            },
        ) => {
            state.consecutive_no_progress = empty_scrolls;
            if state.policy == PaginationType::InfiniteScroll {
                state.pending_stop = Some(reason);
                state.extract()
            } else {
                state.finish(reason)
            }
        }
        (PaginationPhase::Advancing, PaginationMsg::AdvanceStopped(reason)) => {
            if state.policy == PaginationType::InfiniteScroll {
                state.pending_stop = Some(reason);
                state.extract()
            } else {
                state.finish(reason)
            }
        }

        // Out-of-order messages leave the state alone.
        _ => state.command(),
    };

    (state, command)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollTracker {
    limits: PaginationLimits,
    attempts: u32,
    consecutive_no_progress: u32,
    last_count: usize,
}

impl ScrollTracker {
    pub fn new(initial_count: usize, limits: PaginationLimits) -> Self {
        Self {
            limits,
            attempts: 0,
            consecutive_no_progress: 0,
            last_count: initial_count,
        }
    }

    pub fn should_scroll(&self) -> bool {
        self.consecutive_no_progress < self.limits.max_consecutive_empty_scrolls
            && self.attempts < self.limits.max_scroll_attempts
    }

    /// Records the card count observed after one scroll. Returns true when
    /// the count grew.
    pub fn record_scroll(&mut self, count_after: usize) -> bool {
        self.attempts += 1;
        let grew = count_after > self.last_count;
        if grew {
            self.consecutive_no_progress = 0;
        } else {
            self.consecutive_no_progress += 1;
        }
        self.last_count = self.last_count.max(count_after);
        grew
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn consecutive_no_progress(&self) -> u32 {
        self.consecutive_no_progress
    }

    pub fn last_count(&self) -> usize {
        self.last_count
    }

    pub fn stop_reason(&self) -> StopReason {
        if self.consecutive_no_progress >= self.limits.max_consecutive_empty_scrolls {
            StopReason::NoNewCards
        } else {
            StopReason::ScrollLimitReached
        }
    }
}

/// Batch cursor for `load_more_progressive`: walks rendered cards in batches
/// and decides when another load-more click is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMoreCursor {
    limits: PaginationLimits,
    processed: usize,
    load_attempts: u32,
    empty_loads: u32,
}

impl LoadMoreCursor {
    pub fn new(limits: PaginationLimits) -> Self {
        Self {
            limits,
            processed: 0,
            load_attempts: 0,
            empty_loads: 0,
        }
    }

    /// Indices of the next batch among `rendered` cards, or `None` when every
    /// rendered card has been visited.
    pub fn next_batch(&self, rendered: usize) -> Option<Range<usize>> {
        if self.processed >= rendered {
            return None;
        }
        let end = rendered.min(self.processed + self.limits.batch_size.max(1));
        Some(self.processed..end)
    }

    pub fn mark_visited(&mut self) {
        self.processed += 1;
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn can_load_more(&self) -> bool {
        self.load_attempts < self.limits.max_load_more_attempts
    }

    /// Records a load-more click. Returns true when it rendered new cards.
    pub fn record_load(&mut self, before: usize, after: usize) -> bool {
        self.load_attempts += 1;
        let grew = after > before;
        if grew {
            self.empty_loads = 0;
        } else {
            self.empty_loads += 1;
        }
        grew
    }

    pub fn empty_loads(&self) -> u32 {
        self.empty_loads
    }

    pub fn load_attempts(&self) -> u32 {
        self.load_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamFamily {
    /// Page numbers: `page`, `p` and any unrecognised name.
    Linear,
    /// Row offsets: `startrow`, `jobOffset`, `offset`, `start`.
    Offset,
}

impl ParamFamily {
    pub fn for_param(name: &str) -> Self {
        match name {
            "startrow" | "jobOffset" | "offset" | "start" => Self::Offset,
            _ => Self::Linear,
        }
    }
}

/// Parameter value addressing the page after `page_number` (1-based).
pub fn next_param_value(param: &str, page_number: u32, step: u32) -> u64 {
    let page = u64::from(page_number.max(1));
    let step = u64::from(step.max(1));
    match ParamFamily::for_param(param) {
        ParamFamily::Linear => page + 1,
        ParamFamily::Offset => (page - 1) * step + step,
    }
}

/// Replaces `param` in `current_url`'s query with `value`, or appends it when
/// absent. Other query pairs keep their order.
pub fn rewrite_page_param(current_url: &str, param: &str, value: u64) -> String {
    let value = value.to_string();
    let Ok(mut url) = Url::parse(current_url) else {
        let separator = if current_url.contains('?') { '&' } else { '?' };
        return format!("{current_url}{separator}{param}={value}");
    };

    let mut replaced = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, existing)| {
            if key == param && !replaced {
                replaced = true;
                (key.into_owned(), value.clone())
            } else {
                (key.into_owned(), existing.into_owned())
            }
        })
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, existing) in &pairs {
            query.append_pair(key, existing);
        }
        if !replaced {
            query.append_pair(param, &value);
        }
    }
    url.into()
}

/// A pagination control counts as disabled when it has a `disabled`
/// attribute (unless explicitly `"false"`), a `disabled` class token, or
/// `aria-disabled="true"`.
pub fn is_disabled_control(
    disabled_attr: Option<&str>,
    class_attr: Option<&str>,
    aria_disabled: Option<&str>,
) -> bool {
    let attr_disabled = disabled_attr.is_some_and(|v| !v.trim().eq_ignore_ascii_case("false"));
    let class_disabled = class_attr
        .is_some_and(|classes| classes.split_whitespace().any(|c| c == "disabled"));
    let aria = aria_disabled.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
    attr_disabled || class_disabled || aria
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_honoured_in_every_phase() {
        let state = PaginationState::new(PaginationType::ButtonClick, 5, 100);
        let (state, command) = update(state, PaginationMsg::Cancelled);
        assert_eq!(command, PaginationCommand::Finish);
        assert_eq!(state.stop_reason, Some(StopReason::Cancelled));
    }

    #[test]
    fn out_of_order_messages_repeat_the_current_command() {
        let state = PaginationState::new(PaginationType::UrlParam, 5, 100);
        let (state, command) = update(state, PaginationMsg::Advanced);
        assert_eq!(state.phase, PaginationPhase::Navigating);
        assert_eq!(command, PaginationCommand::ExtractPage);
    }

    #[test]
    fn settled_scroll_carries_its_empty_streak_into_the_state() {
        let state = PaginationState::new(PaginationType::InfiniteScroll, 5000, 100);
        let (state, _) = update(state, PaginationMsg::Navigated);
        let (state, command) = update(
            state,
            PaginationMsg::ScrollSettled {
                reason: StopReason::NoNewCards,
                empty_scrolls: 3,
            },
        );
        assert_eq!(command, PaginationCommand::ExtractPage);
        assert_eq!(state.consecutive_no_progress, 3);
    }

    #[test]
    fn first_stop_reason_sticks() {
        let mut state = PaginationState::new(PaginationType::None, 1, 10);
        state.finish(StopReason::SessionTerminated);
        state.finish(StopReason::SinglePage);
        assert_eq!(state.stop_reason, Some(StopReason::SessionTerminated));
    }
}
