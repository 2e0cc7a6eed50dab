#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use note_scout::{
    BrowserDriver, DriverError, HarvestSettings, ScrollOffsets, ScrollTarget, TranscriptEntry,
};

pub const NOTE_ID: &str = "64f1a2b3c4d5e6f7a8b9c0d1";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Harvest settings with every wait removed.
pub fn instant_settings() -> HarvestSettings {
    HarvestSettings {
        settle_interval: Duration::ZERO,
        initial_delay: Duration::ZERO,
        post_initial_delay: Duration::ZERO,
        ..HarvestSettings::default()
    }
}

pub fn comment_page_url(note_id: &str, cursor: &str) -> String {
    format!(
        "https://edith.example.com/api/sns/web/v2/comment/page?note_id={}&cursor={}&top_comment_id=&image_formats=jpg,webp",
        note_id, cursor
    )
}

/// Body with one top-level comment per id.
pub fn page_body(ids: &[&str]) -> String {
    let comments: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "content": format!("comment {}", id),
                "like_count": "1",
                "user_info": {"user_id": format!("u-{}", id), "nickname": format!("user {}", id)}
            })
        })
        .collect();
    serde_json::json!({"code": 0, "success": true, "data": {"comments": comments, "has_more": true}})
        .to_string()
}

/// One network response the fake page "receives".
#[derive(Clone, Debug)]
pub struct Arrival {
    pub exchange_id: String,
    pub url: String,
    pub body: Option<String>,
}

impl Arrival {
    pub fn comments(exchange_id: &str, note_id: &str, ids: &[&str]) -> Self {
        Self {
            exchange_id: exchange_id.to_string(),
            url: comment_page_url(note_id, exchange_id),
            body: Some(page_body(ids)),
        }
    }

    pub fn other(exchange_id: &str, url: &str) -> Self {
        Self {
            exchange_id: exchange_id.to_string(),
            url: url.to_string(),
            body: Some("{}".to_string()),
        }
    }
}

/// What one scroll action does to the fake page.
#[derive(Clone, Debug, Default)]
pub struct ScrollStep {
    pub delta: i64,
    pub arrivals: Vec<Arrival>,
}

impl ScrollStep {
    pub fn new(delta: i64, arrivals: Vec<Arrival>) -> Self {
        Self { delta, arrivals }
    }
}

#[derive(Default)]
struct State {
    transcript: Vec<TranscriptEntry>,
    bodies: HashMap<String, String>,
    steps: VecDeque<ScrollStep>,
    position: i64,
    scroll_calls: u32,
    target_lookups: u32,
    fetches: HashMap<String, usize>,
    evict_once: HashSet<String>,
    broken: HashSet<String>,
}

/// In-memory `BrowserDriver` whose traffic is scripted per scroll action.
#[derive(Default)]
pub struct ScriptedDriver {
    state: Mutex<State>,
    /// When the script runs out, keep producing a new comment page per scroll.
    endless: bool,
    fail_scroll_at: Option<u32>,
    page_url: String,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            page_url: format!("https://www.example.com/explore/{}", NOTE_ID),
            ..Self::default()
        }
    }

    pub fn endless(mut self) -> Self {
        self.endless = true;
        self
    }

    pub fn fail_scroll_at(mut self, n: u32) -> Self {
        self.fail_scroll_at = Some(n);
        self
    }

    /// Responses present before harvesting starts.
    pub fn preload(self, arrivals: Vec<Arrival>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for a in arrivals {
                Self::arrive(&mut state, a);
            }
        }
        self
    }

    pub fn script(self, steps: Vec<ScrollStep>) -> Self {
        self.state.lock().unwrap().steps.extend(steps);
        self
    }

    /// First body fetch of `exchange_id` reports the body as evicted.
    pub fn evict_once(self, exchange_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .evict_once
            .insert(exchange_id.to_string());
        self
    }

    /// Every body fetch of `exchange_id` fails with a CDP error.
    pub fn broken(self, exchange_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .broken
            .insert(exchange_id.to_string());
        self
    }

    /// Push a raw transcript entry that is not a response (noise).
    pub fn noise(self, method: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .transcript
            .push(TranscriptEntry::new(method, serde_json::json!({"requestId": "noise"})));
        self
    }

    pub fn scroll_calls(&self) -> u32 {
        self.state.lock().unwrap().scroll_calls
    }

    pub fn target_lookups(&self) -> u32 {
        self.state.lock().unwrap().target_lookups
    }

    pub fn fetches(&self, exchange_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .fetches
            .get(exchange_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_fetches_per_exchange(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .fetches
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }

    fn arrive(state: &mut State, arrival: Arrival) {
        state.transcript.push(TranscriptEntry::response_received(
            &arrival.exchange_id,
            &arrival.url,
        ));
        if let Some(body) = arrival.body {
            state.bodies.insert(arrival.exchange_id, body);
        }
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn resolve_scroll_target(&self) -> ScrollTarget {
        self.state.lock().unwrap().target_lookups += 1;
        ScrollTarget::Window
    }

    async fn scroll_by(
        &self,
        _target: &ScrollTarget,
        _pixels: i64,
    ) -> Result<ScrollOffsets, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.scroll_calls += 1;
        let call = state.scroll_calls;

        if self.fail_scroll_at == Some(call) {
            return Err(DriverError::Script("page crashed".to_string()));
        }

        let step = match state.steps.pop_front() {
            Some(step) => step,
            None if self.endless => {
                let id = format!("endless-{}", call);
                let comment = format!("e{}", call);
                ScrollStep::new(
                    300,
                    vec![Arrival::comments(&id, NOTE_ID, &[comment.as_str()])],
                )
            }
            None => ScrollStep::default(),
        };

        let before = state.position;
        state.position += step.delta;
        for a in step.arrivals {
            Self::arrive(&mut state, a);
        }
        Ok(ScrollOffsets {
            before,
            after: state.position,
        })
    }

    async fn network_transcript(&self) -> Result<Vec<TranscriptEntry>, DriverError> {
        Ok(self.state.lock().unwrap().transcript.clone())
    }

    async fn fetch_exchange_body(&self, exchange_id: &str) -> Result<String, DriverError> {
        let mut state = self.state.lock().unwrap();
        *state.fetches.entry(exchange_id.to_string()).or_insert(0) += 1;

        if state.broken.contains(exchange_id) {
            return Err(DriverError::Cdp("target closed".to_string()));
        }
        if state.evict_once.remove(exchange_id) {
            return Err(DriverError::ExchangeNotFound(exchange_id.to_string()));
        }
        state
            .bodies
            .get(exchange_id)
            .cloned()
            .ok_or_else(|| DriverError::ExchangeNotFound(exchange_id.to_string()))
    }

    async fn current_page_url(&self) -> Result<String, DriverError> {
        Ok(self.page_url.clone())
    }
}
