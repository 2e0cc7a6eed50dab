use std::time::Duration;
use tracing::{debug, info, warn};

use super::session::{HarvestSession, Phase};
use super::traffic::TrafficMark;
use crate::browser::BrowserDriver;
use crate::core::config::HarvestSettings;
use crate::types::StopReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// Performing scroll number `n` (1-based).
    Scrolling(u32),
    Settling,
    Done,
}

/// Summary of one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollReport {
    pub scrolls_performed: u32,
    pub comments: usize,
    pub stop_reason: StopReason,
}

/// Bounded scroll loop driving infinite-scroll comment loading.
///
/// Each round scrolls once, waits a fixed settle interval, then extracts any
/// comment pages that arrived. The loop ends when the budget is spent, when a
/// scroll moves nothing and no new comment page shows up, or when the browser
/// refuses to scroll.
#[derive(Debug, Clone)]
pub struct ScrollScheduler {
    scroll_pixels: i64,
    settle_interval: Duration,
}

impl ScrollScheduler {
    pub fn new(scroll_pixels: i64, settle_interval: Duration) -> Self {
        Self {
            scroll_pixels,
            settle_interval,
        }
    }

    pub fn from_settings(settings: &HarvestSettings) -> Self {
        Self::new(settings.scroll_pixels, settings.settle_interval)
    }

    pub async fn run<D>(&self, session: &mut HarvestSession<'_, D>, budget: u32) -> ScrollReport
    where
        D: BrowserDriver + ?Sized,
    {
        if budget == 0 {
            debug!("scroll budget is zero, page left untouched");
            session.record_scrolls(0, StopReason::BudgetExhausted);
            return ScrollReport {
                scrolls_performed: 0,
                comments: 0,
                stop_reason: StopReason::BudgetExhausted,
            };
        }

        info!("Scrolling for more comments (budget: {})", budget);
        let driver = session.driver();
        let target = driver.resolve_scroll_target().await;

        let mut state = SchedulerState::Idle;
        let mut performed = 0u32;
        let mut comments = 0usize;
        let mut mark = TrafficMark::START;
        let mut delta = 0i64;
        let mut stop_reason = StopReason::BudgetExhausted;

        loop {
            state = match state {
                SchedulerState::Idle if performed >= budget => {
                    stop_reason = StopReason::BudgetExhausted;
                    SchedulerState::Done
                }
                SchedulerState::Idle => SchedulerState::Scrolling(performed + 1),
                SchedulerState::Scrolling(n) => {
                    mark = session.mark();
                    match driver.scroll_by(&target, self.scroll_pixels).await {
                        Ok(offsets) => {
                            performed = n;
                            delta = offsets.delta();
                            info!(
                                "Scroll {}/{} (distance: {}px, position: {}px)",
                                n, budget, delta, offsets.after
                            );
                            SchedulerState::Settling
                        }
                        Err(e) => {
                            warn!("Scroll {}/{} failed: {}", n, budget, e);
                            stop_reason = StopReason::ScrollFailed;
                            SchedulerState::Done
                        }
                    }
                }
                SchedulerState::Settling => {
                    tokio::time::sleep(self.settle_interval).await;
                    session.observe().await;
                    let stats = session.consume_since(mark, Phase::Scroll).await;
                    comments += stats.comments;

                    if stats.matched > 0 {
                        info!("  {} comment API responses after this scroll", stats.matched);
                        SchedulerState::Idle
                    } else if delta == 0 {
                        debug!("    zero scroll distance and no new responses");
                        info!("  Reached the bottom, stopping early");
                        stop_reason = StopReason::ReachedBottom;
                        SchedulerState::Done
                    } else {
                        warn!("  No new comment API responses (possibly still loading)");
                        SchedulerState::Idle
                    }
                }
                SchedulerState::Done => break,
            };
        }

        info!(
            "Scrolling finished: {} scrolls, {} comments collected",
            performed, comments
        );
        session.record_scrolls(performed, stop_reason);
        ScrollReport {
            scrolls_performed: performed,
            comments,
            stop_reason,
        }
    }
}
