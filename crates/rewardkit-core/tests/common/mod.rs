#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rewardkit_core::{
    AdMetaInfo, AdRequestOptions, AdResponse, ApiRequest, Completion, Error, InstallId,
    ManualScheduler, Placement, PlacementConfig, PlacementObserver, PlacementState, ShowAd,
    Transactions, Transport, TransportError,
};
use serde_json::{json, Value};

/// Keeps every request and lets the test decide when and how it completes.
#[derive(Default)]
pub struct RecordingTransport {
    requests: RefCell<Vec<ApiRequest>>,
    completions: RefCell<Vec<Option<Completion>>>,
}

impl Transport for RecordingTransport {
    fn send(&self, request: ApiRequest, on_complete: Completion) {
        self.requests.borrow_mut().push(request);
        self.completions.borrow_mut().push(Some(on_complete));
    }
}

impl RecordingTransport {
    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn request(&self, i: usize) -> ApiRequest {
        self.requests.borrow()[i].clone()
    }

    pub fn body(&self, i: usize) -> Value {
        serde_json::from_str(&self.request(i).body().unwrap()).unwrap()
    }

    pub fn last_body(&self) -> Value {
        self.body(self.request_count() - 1)
    }

    pub fn complete(&self, i: usize, result: Result<Value, TransportError>) {
        let completion = self.completions.borrow_mut()[i]
            .take()
            .expect("request already completed");
        completion(result);
    }

    pub fn respond(&self, i: usize, body: Value) {
        self.complete(i, Ok(body));
    }

    pub fn respond_last(&self, body: Value) {
        self.respond(self.request_count() - 1, body);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Hook {
    AdLoading(PlacementState),
    Error(String),
    NoFill,
    AdResponse(String),
    AdAvailable,
    OpenTransactions(usize),
    Show,
}

#[derive(Default)]
pub struct RecordingObserver {
    pub hooks: RefCell<Vec<Hook>>,
    pub show_ads: RefCell<Vec<ShowAd>>,
    pub metas: RefCell<Vec<AdMetaInfo>>,
    pub transactions: RefCell<Vec<Transactions>>,
}

impl RecordingObserver {
    pub fn hooks(&self) -> Vec<Hook> {
        self.hooks.borrow().clone()
    }

    pub fn count(&self, hook: &Hook) -> usize {
        self.hooks.borrow().iter().filter(|h| *h == hook).count()
    }
}

impl PlacementObserver for RecordingObserver {
    fn on_ad_loading(&self, placement: &Placement) {
        self.hooks
            .borrow_mut()
            .push(Hook::AdLoading(placement.state()));
    }

    fn on_error(&self, error: &Error) {
        self.hooks.borrow_mut().push(Hook::Error(error.to_string()));
    }

    fn on_no_fill(&self, _placement: &Placement) {
        self.hooks.borrow_mut().push(Hook::NoFill);
    }

    fn on_ad_response(&self, response: &AdResponse, _options: &AdRequestOptions) {
        self.hooks
            .borrow_mut()
            .push(Hook::AdResponse(response.ad_id.clone()));
    }

    fn on_ad_available(&self, show_ad: ShowAd, meta: AdMetaInfo) {
        self.hooks.borrow_mut().push(Hook::AdAvailable);
        self.show_ads.borrow_mut().push(show_ad);
        self.metas.borrow_mut().push(meta);
    }

    fn on_open_transactions(&self, transactions: Transactions) {
        self.hooks
            .borrow_mut()
            .push(Hook::OpenTransactions(transactions.len()));
        self.transactions.borrow_mut().push(transactions);
    }

    fn on_show(&self) {
        self.hooks.borrow_mut().push(Hook::Show);
    }
}

pub struct Harness {
    pub placement: Placement,
    pub transport: Rc<RecordingTransport>,
    pub scheduler: Rc<ManualScheduler>,
    pub observer: Rc<RecordingObserver>,
    pub clock: Rc<Cell<DateTime<Utc>>>,
    pub states: Rc<RefCell<Vec<PlacementState>>>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 4, 24, 16, 0, 0).unwrap()
}

pub fn config() -> PlacementConfig {
    PlacementConfig::new("https://api.example.com/api/sdk/", "apikey", "tvsa")
}

pub fn harness() -> Harness {
    let transport = Rc::new(RecordingTransport::default());
    let scheduler = Rc::new(ManualScheduler::new());
    let clock = Rc::new(Cell::new(start_time()));
    let states = Rc::new(RefCell::new(Vec::new()));

    let now = Rc::clone(&clock);
    let sink = Rc::clone(&states);
    let placement = Placement::builder(config())
        .transport(transport.clone())
        .scheduler(scheduler.clone())
        .install_id(InstallId::Fixed("install-1".to_string()))
        .clock(move || now.get())
        .on_state_change(move |_, state| sink.borrow_mut().push(state))
        .build()
        .unwrap();

    Harness {
        placement,
        transport,
        scheduler,
        observer: Rc::new(RecordingObserver::default()),
        clock,
        states,
    }
}

impl Harness {
    pub fn options(&self) -> AdRequestOptions {
        AdRequestOptions::new("1.0.0").with_observer(self.observer.clone())
    }

    /// Moves both the wall clock and the scheduler.
    pub fn advance(&self, by: std::time::Duration) -> usize {
        let delta = Duration::from_std(by).unwrap();
        self.clock.set(self.clock.get() + delta);
        self.scheduler.advance(by)
    }

    pub fn pending_ms(&self) -> Vec<u128> {
        self.scheduler
            .pending_delays()
            .into_iter()
            .map(|d| d.as_millis())
            .collect()
    }

    /// Request an ad and answer with a valid response expiring `expires_in` from now.
    pub fn load_ad(&self, expires_in: Duration) {
        self.placement.request_ad(self.options()).unwrap();
        self.transport
            .respond_last(json!([ad_response(self.clock.get() + expires_in)]));
    }
}

pub fn ad_response(expiry: DateTime<Utc>) -> Value {
    json!({
        "type": "adResponse",
        "url": "http://komet.example.com",
        "placementId": "tvsa",
        "adId": "xyz",
        "expiry": expiry.to_rfc3339(),
        "rewards": [
            {"type": "call2ActionStarted", "amount": 3, "maxAmount": 5, "currency": "spears"},
            {"type": "callback", "amount": 3, "maxAmount": 5, "currency": "spears"}
        ],
        "ad": {"headline": "War of Clans", "teaser": "Vikings!", "brand": "War of Clans"}
    })
}

pub fn open_transactions() -> Value {
    json!({
        "type": "openTransactions",
        "transactions": [
            {
                "adId": "adId2",
                "transactionId": "4712",
                "conversionTimestamp": "2016-04-24T16:00:00Z",
                "reward": {"amount": 5, "currency": "spears", "type": "call2ActionStarted"}
            },
            {
                "adId": "adId1",
                "transactionId": "4711",
                "conversionTimestamp": "2016-04-24T16:00:00Z",
                "reward": {"amount": 20, "currency": "flintstones", "type": "callback"}
            }
        ]
    })
}
