//! The ad slot state machine.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::PlacementConfig;
use crate::device::DeviceInfo;
use crate::error::{Error, Result};
use crate::i18n::Localizer;
use crate::meta::AdMetaInfo;
use crate::protocol::{
    AdDismissed, AdRequest, AdResponse, AdStarted, CustomParameter, OutboundEvent, ResponseEvent,
    TransactionConfirmed, UserData, API_VERSION, SDK_TYPE,
};
use crate::scheduler::{Scheduler, Task, TimerId};
use crate::subscription::{MessageHub, Subscription, CLOSE_MESSAGE};
use crate::transaction::{transactions_from_json, ConfirmFn, Transaction, Transactions};
use crate::transport::{ApiRequest, Completion, Method, Transport, TransportError};

/// Delay before asking for a new ad after a dismissal or an expired show.
pub const RETRY_AFTER_DISMISS: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PlacementState {
    #[default]
    Initial,
    RequestingAd,
    NoFill,
    ReceivedAd,
    LoadingAd,
    AdReady,
    ShowingAd,
    Call2Action,
    Call2ActionClicked,
    GoalReached,
    Dismissed,
}

impl PlacementState {
    pub const ALL: [PlacementState; 11] = [
        PlacementState::Initial,
        PlacementState::RequestingAd,
        PlacementState::NoFill,
        PlacementState::ReceivedAd,
        PlacementState::LoadingAd,
        PlacementState::AdReady,
        PlacementState::ShowingAd,
        PlacementState::Call2Action,
        PlacementState::Call2ActionClicked,
        PlacementState::GoalReached,
        PlacementState::Dismissed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementState::Initial => "INITIAL",
            PlacementState::RequestingAd => "REQUESTING_AD",
            PlacementState::NoFill => "NOFILL",
            PlacementState::ReceivedAd => "RECEIVED_AD",
            PlacementState::LoadingAd => "LOADING_AD",
            PlacementState::AdReady => "AD_READY",
            PlacementState::ShowingAd => "SHOWING_AD",
            PlacementState::Call2Action => "CALL2ACTION",
            PlacementState::Call2ActionClicked => "CALL2ACTIONCLICKED",
            PlacementState::GoalReached => "GOAL_REACHED",
            PlacementState::Dismissed => "DISMISSED",
        }
    }

    /// Whether a new ad may be requested from this state. `AD_READY` counts
    /// as a refresh of a possibly stale ad.
    pub fn accepts_request(&self) -> bool {
        matches!(
            self,
            PlacementState::Initial
                | PlacementState::NoFill
                | PlacementState::AdReady
                | PlacementState::Dismissed
        )
    }
}

impl fmt::Display for PlacementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlacementState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("invalid placement state {:?}", s)))
    }
}

/// Who the ad is shown to. Absent fields are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub facebook_user_id: Option<String>,
}

/// Hooks into the placement lifecycle. Every method defaults to a no-op.
///
/// Hooks run synchronously with no internal borrow held, so they may call
/// back into the placement.
pub trait PlacementObserver {
    fn on_ad_loading(&self, _placement: &Placement) {}
    fn on_error(&self, _error: &Error) {}
    fn on_no_fill(&self, _placement: &Placement) {}
    fn on_ad_response(&self, _response: &AdResponse, _options: &AdRequestOptions) {}
    fn on_ad_available(&self, _show_ad: ShowAd, _meta: AdMetaInfo) {}
    fn on_open_transactions(&self, _transactions: Transactions) {}
    fn on_show(&self) {}
}

/// Arguments of one ad request, replayed as is by retries.
#[derive(Clone, Default)]
pub struct AdRequestOptions {
    pub sdk_version: Option<String>,
    pub user: Option<UserInfo>,
    pub observer: Option<Rc<dyn PlacementObserver>>,
}

impl fmt::Debug for AdRequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdRequestOptions")
            .field("sdk_version", &self.sdk_version)
            .field("user", &self.user)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl AdRequestOptions {
    pub fn new(sdk_version: impl Into<String>) -> Self {
        Self {
            sdk_version: Some(sdk_version.into()),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_observer(mut self, observer: Rc<dyn PlacementObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Identifies this installation towards the ad server.
#[derive(Clone)]
pub enum InstallId {
    Fixed(String),
    /// Asked for the id on every request.
    Resolver(Rc<dyn Fn() -> String>),
}

impl fmt::Debug for InstallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallId::Fixed(id) => f.debug_tuple("Fixed").field(id).finish(),
            InstallId::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl InstallId {
    /// A uuid generated once per process.
    pub fn generated() -> Self {
        static ID: OnceLock<String> = OnceLock::new();
        InstallId::Fixed(
            ID.get_or_init(|| uuid::Uuid::now_v7().to_string())
                .clone(),
        )
    }

    pub fn resolve(&self) -> String {
        match self {
            InstallId::Fixed(id) => id.clone(),
            InstallId::Resolver(resolve) => resolve(),
        }
    }
}

pub type StateListener = Rc<dyn Fn(&Placement, PlacementState)>;
pub type Clock = Rc<dyn Fn() -> DateTime<Utc>>;

#[derive(Default)]
struct Inner {
    state: PlacementState,
    ad_id: Option<String>,
    user_id: Option<String>,
    last_options: Option<AdRequestOptions>,
    last_response: Option<AdResponse>,
    meta: Option<AdMetaInfo>,
    timer: Option<TimerId>,
}

struct Shared {
    config: PlacementConfig,
    install_id: InstallId,
    device: DeviceInfo,
    l10n: Localizer,
    transport: Rc<dyn Transport>,
    scheduler: Rc<dyn Scheduler>,
    clock: Clock,
    on_state_change: Option<StateListener>,
    inner: RefCell<Inner>,
}

pub struct PlacementBuilder {
    config: PlacementConfig,
    transport: Option<Rc<dyn Transport>>,
    scheduler: Option<Rc<dyn Scheduler>>,
    device: DeviceInfo,
    install_id: Option<InstallId>,
    on_state_change: Option<StateListener>,
    clock: Option<Clock>,
}

impl PlacementBuilder {
    pub fn transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Takes precedence over `install_id` from the configuration.
    pub fn install_id(mut self, install_id: InstallId) -> Self {
        self.install_id = Some(install_id);
        self
    }

    pub fn on_state_change(
        mut self,
        listener: impl Fn(&Placement, PlacementState) + 'static,
    ) -> Self {
        self.on_state_change = Some(Rc::new(listener));
        self
    }

    pub fn clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'static) -> Self {
        self.clock = Some(Rc::new(clock));
        self
    }

    pub fn build(self) -> Result<Placement> {
        self.config.check()?;
        let transport = self
            .transport
            .ok_or_else(|| Error::InvalidArgument("a transport is required".to_string()))?;
        let scheduler = self
            .scheduler
            .ok_or_else(|| Error::InvalidArgument("a scheduler is required".to_string()))?;
        let install_id = match (self.install_id, &self.config.install_id) {
            (Some(install_id), _) => install_id,
            (None, Some(id)) => InstallId::Fixed(id.clone()),
            (None, None) => InstallId::generated(),
        };
        let l10n = Localizer::new(self.config.locale.clone(), self.device.languages.clone());
        Ok(Placement {
            shared: Rc::new(Shared {
                config: self.config,
                install_id,
                device: self.device,
                l10n,
                transport,
                scheduler,
                clock: self.clock.unwrap_or_else(|| Rc::new(Utc::now)),
                on_state_change: self.on_state_change,
                inner: RefCell::new(Inner::default()),
            }),
        })
    }
}

/// One ad slot. Cloning yields another handle to the same placement.
#[derive(Clone)]
pub struct Placement {
    shared: Rc<Shared>,
}

impl fmt::Debug for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.borrow();
        f.debug_struct("Placement")
            .field("placement_id", &self.shared.config.placement_id)
            .field("state", &inner.state)
            .field("ad_id", &inner.ad_id)
            .finish_non_exhaustive()
    }
}

/// Shows the ad that was just announced through
/// [`PlacementObserver::on_ad_available`].
#[derive(Clone)]
pub struct ShowAd {
    placement: Weak<Shared>,
}

impl fmt::Debug for ShowAd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShowAd(..)")
    }
}

impl ShowAd {
    pub fn show(&self) {
        match self.placement.upgrade() {
            Some(shared) => Placement { shared }.show_ad(),
            None => log::warn!("cannot show ad of a dropped placement"),
        }
    }
}

impl Placement {
    pub fn builder(config: PlacementConfig) -> PlacementBuilder {
        PlacementBuilder {
            config,
            transport: None,
            scheduler: None,
            device: DeviceInfo::default(),
            install_id: None,
            on_state_change: None,
            clock: None,
        }
    }

    fn from_weak(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Placement { shared })
    }

    pub fn state(&self) -> PlacementState {
        self.shared.inner.borrow().state
    }

    /// Move to `state` and notify the state-change listener. Embedders use
    /// this to report creative progress such as [`PlacementState::Call2Action`].
    pub fn set_state(&self, state: PlacementState) {
        let previous = std::mem::replace(&mut self.shared.inner.borrow_mut().state, state);
        log::info!(
            "placement {} going from {} -> {}",
            self.shared.config.placement_id,
            previous,
            state
        );
        if let Some(listener) = &self.shared.on_state_change {
            listener(self, state);
        }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.shared.config
    }

    pub fn localizer(&self) -> &Localizer {
        &self.shared.l10n
    }

    pub fn install_id(&self) -> String {
        self.shared.install_id.resolve()
    }

    pub fn ad_id(&self) -> Option<String> {
        self.shared.inner.borrow().ad_id.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.shared.inner.borrow().user_id.clone()
    }

    pub fn last_ad_response(&self) -> Option<AdResponse> {
        self.shared.inner.borrow().last_response.clone()
    }

    pub fn ad_meta_info(&self) -> Option<AdMetaInfo> {
        self.shared.inner.borrow().meta.clone()
    }

    pub fn has_pending_retry(&self) -> bool {
        self.shared.inner.borrow().timer.is_some()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.shared.clock)()
    }

    fn last_options(&self) -> Option<AdRequestOptions> {
        self.shared.inner.borrow().last_options.clone()
    }

    fn observer_of(options: Option<&AdRequestOptions>) -> Option<Rc<dyn PlacementObserver>> {
        options.and_then(|o| o.observer.clone())
    }

    // ---------- Timers ----------

    fn cancel_timer(&self) {
        let pending = self.shared.inner.borrow_mut().timer.take();
        if let Some(id) = pending {
            log::debug!("cancelling retry timer {:?}", id);
            self.shared.scheduler.cancel(id);
        }
    }

    fn arm_retry(&self, delay: Duration) {
        self.cancel_timer();
        let weak = Rc::downgrade(&self.shared);
        let task: Task = Box::new(move || {
            if let Some(placement) = Placement::from_weak(&weak) {
                placement.shared.inner.borrow_mut().timer = None;
                placement.replay_last_request();
            }
        });
        log::debug!("requesting another ad in {}ms", delay.as_millis());
        let id = self.shared.scheduler.schedule(delay, task);
        self.shared.inner.borrow_mut().timer = Some(id);
    }

    fn replay_last_request(&self) {
        if let Some(options) = self.last_options() {
            if let Err(e) = self.request_ad(options) {
                log::error!("repeated ad request failed: {}", e);
            }
        }
    }

    /// Repeat the last ad request after `ms` milliseconds, replacing any
    /// pending retry. Does nothing before the first request.
    pub fn request_another_ad_after(&self, ms: i64) -> Result<()> {
        let Ok(ms) = u64::try_from(ms) else {
            return Err(Error::InvalidArgument(format!(
                "invalid time interval {}ms",
                ms
            )));
        };
        if self.shared.inner.borrow().last_options.is_none() {
            log::info!("no previous ad request to repeat");
            return Ok(());
        }
        self.arm_retry(Duration::from_millis(ms));
        Ok(())
    }

    /// Repeat the last ad request at `at`, if that lies in the future.
    pub fn request_another_ad_at(&self, at: DateTime<Utc>) -> Result<()> {
        let ms = (at - self.now()).num_milliseconds();
        if ms > 0 {
            self.request_another_ad_after(ms)
        } else {
            log::debug!("not retrying at {} which is not in the future", at);
            Ok(())
        }
    }

    // ---------- Requests ----------

    fn send(&self, events: Vec<OutboundEvent>, on_complete: Completion) {
        let request = ApiRequest {
            url: self.shared.config.endpoint(&self.install_id()),
            method: Method::Post,
            events,
        };
        log::info!(
            "{} {} with {} event(s)",
            request.method.as_str(),
            request.url,
            request.events.len()
        );
        self.shared.transport.send(request, on_complete);
    }

    fn ad_request_event(&self, sdk_version: String, user: UserInfo) -> OutboundEvent {
        let device = &self.shared.device;
        OutboundEvent::AdRequest(AdRequest {
            placement_id: self.shared.config.placement_id.clone(),
            device_information: device.user_agent.clone(),
            language: self.shared.l10n.language_code(),
            languages: device.language_codes(),
            user_data: UserData {
                api_version: API_VERSION.to_string(),
                platform_type: device.platform_type().to_string(),
                sdk_type: SDK_TYPE.to_string(),
                user_id: user.id,
                user_name: user.name,
                sdk_version,
                user_agent: device.user_agent.clone(),
                gender: user.gender.map(|g| g.to_uppercase()),
                facebook_user_id: user.facebook_user_id,
            },
        })
    }

    /// Ask the ad server for an ad.
    ///
    /// Ignored unless the current state [accepts requests]. Only a missing
    /// `sdk_version` is reported here; everything that happens once the
    /// request is on its way goes to the observer.
    ///
    /// [accepts requests]: PlacementState::accepts_request
    pub fn request_ad(&self, options: AdRequestOptions) -> Result<()> {
        self.cancel_timer();
        let previous = self.state();
        if !previous.accepts_request() {
            log::info!("not requesting an ad while {}", previous);
            return Ok(());
        }

        self.set_state(PlacementState::RequestingAd);
        let observer = Self::observer_of(Some(&options));
        if let Some(observer) = &observer {
            observer.on_ad_loading(self);
        }

        let Some(sdk_version) = options.sdk_version.clone() else {
            self.set_state(previous);
            return Err(Error::MissingSdkVersion);
        };
        {
            let mut inner = self.shared.inner.borrow_mut();
            inner.last_options = Some(options.clone());
            inner.user_id = options.user.as_ref().and_then(|u| u.id.clone());
        }

        let event = self.ad_request_event(sdk_version, options.user.clone().unwrap_or_default());
        let weak = Rc::downgrade(&self.shared);
        self.send(
            vec![event],
            Box::new(move |result| {
                if let Some(placement) = Placement::from_weak(&weak) {
                    placement.handle_ad_request_result(result, &options);
                }
            }),
        );
        Ok(())
    }

    fn handle_ad_request_result(
        &self,
        result: std::result::Result<Value, TransportError>,
        options: &AdRequestOptions,
    ) {
        let error = match result {
            Ok(Value::Array(events)) => {
                self.dispatch_events(&events, options);
                return;
            }
            Ok(other) => {
                log::warn!("unexpected ad response format: {}", other);
                Error::UnexpectedResponseFormat
            }
            Err(e) => {
                log::error!("ad request failed: {}", e);
                Error::Transport(e)
            }
        };
        self.set_state(PlacementState::NoFill);
        if let Some(observer) = Self::observer_of(Some(options)) {
            observer.on_error(&error);
        }
    }

    fn dispatch_events(&self, events: &[Value], options: &AdRequestOptions) {
        let observer = Self::observer_of(Some(options));
        for value in events {
            match ResponseEvent::from_value(value) {
                ResponseEvent::AdResponse(response) => {
                    self.handle_ad_response(*response, options, observer.as_deref())
                }
                ResponseEvent::InvalidAdResponse(raw) => {
                    log::warn!("invalid ad response: {}", raw);
                    self.set_state(PlacementState::NoFill);
                }
                ResponseEvent::OpenTransactions(raw) => {
                    let transactions =
                        transactions_from_json(raw.as_ref(), self.confirm_fn(), &self.shared.l10n);
                    log::info!("{} open transaction(s)", transactions.len());
                    if let Some(observer) = &observer {
                        observer.on_open_transactions(transactions);
                    }
                }
                ResponseEvent::AdNoFill { retry_after } => {
                    self.set_state(PlacementState::NoFill);
                    if let Some(observer) = &observer {
                        observer.on_no_fill(self);
                    }
                    if let Some(at) = retry_after {
                        if let Err(e) = self.request_another_ad_at(at) {
                            log::warn!("cannot retry after no fill: {}", e);
                        }
                    }
                }
                ResponseEvent::Unknown(kind) => {
                    log::warn!("ignoring response event of type {:?}", kind);
                }
            }
        }
    }

    fn handle_ad_response(
        &self,
        response: AdResponse,
        options: &AdRequestOptions,
        observer: Option<&dyn PlacementObserver>,
    ) {
        {
            let mut inner = self.shared.inner.borrow_mut();
            inner.ad_id = Some(response.ad_id.clone());
            inner.last_response = Some(response.clone());
        }
        if let Some(observer) = observer {
            observer.on_ad_response(&response, options);
        }
        self.set_state(PlacementState::LoadingAd);

        if let Some(expiry) = response.expiry {
            let ms = (expiry - self.now()).num_milliseconds().max(0);
            if let Err(e) = self.request_another_ad_after(ms) {
                log::warn!("cannot arm expiry retry: {}", e);
            }
        }

        self.set_state(PlacementState::AdReady);
        let meta = AdMetaInfo::from_response(&response, &self.shared.l10n);
        self.shared.inner.borrow_mut().meta = Some(meta.clone());
        if let Some(observer) = observer {
            observer.on_ad_available(
                ShowAd {
                    placement: Rc::downgrade(&self.shared),
                },
                meta,
            );
        }
    }

    // ---------- Ad lifecycle ----------

    /// Show the loaded ad, or give up on it and retry shortly if it expired.
    /// Ignored unless an ad is [`PlacementState::AdReady`].
    pub fn show_ad(&self) {
        let state = self.state();
        if state != PlacementState::AdReady {
            log::info!("no ad ready to show while {}", state);
            return;
        }
        let now = self.now();
        let (expired, ad_id, user_id) = {
            let inner = self.shared.inner.borrow();
            (
                inner
                    .last_response
                    .as_ref()
                    .is_some_and(|r| r.is_expired_at(now)),
                inner.ad_id.clone(),
                inner.user_id.clone(),
            )
        };

        if expired {
            log::info!("ad {:?} expired before it was shown", ad_id);
            self.set_state(PlacementState::Dismissed);
            self.arm_retry(RETRY_AFTER_DISMISS);
            return;
        }

        self.set_state(PlacementState::ShowingAd);
        self.cancel_timer();
        if let Some(observer) = Self::observer_of(self.last_options().as_ref()) {
            observer.on_show();
        }

        let custom_parameters = user_id
            .map(|value| {
                vec![CustomParameter {
                    key: "userId".to_string(),
                    value,
                }]
            })
            .unwrap_or_default();
        self.send(
            vec![OutboundEvent::AdStarted(AdStarted {
                ad_id,
                custom_parameters,
            })],
            Box::new(|result| {
                if let Err(e) = result {
                    log::debug!("ad start notification failed: {}", e);
                }
            }),
        );
    }

    /// Close the ad. A successful acknowledgement schedules the next request
    /// and may itself carry response events.
    pub fn dismiss_ad(&self) {
        self.cancel_timer();
        self.set_state(PlacementState::Dismissed);
        let ad_id = self.ad_id();
        let weak = Rc::downgrade(&self.shared);
        self.send(
            vec![OutboundEvent::AdDismissed(AdDismissed { ad_id })],
            Box::new(move |result| {
                let Some(placement) = Placement::from_weak(&weak) else {
                    return;
                };
                match result {
                    Ok(Value::Array(events)) => {
                        placement.arm_retry(RETRY_AFTER_DISMISS);
                        let options = placement.last_options().unwrap_or_default();
                        placement.dispatch_events(&events, &options);
                    }
                    Ok(other) => log::warn!("unexpected dismiss acknowledgement: {}", other),
                    Err(e) => log::error!("dismissing ad failed: {}", e),
                }
            }),
        );
    }

    /// Dismiss whenever the creative posts its close message, for as long as
    /// the returned subscription is kept.
    pub fn dismiss_on_close_message(&self, hub: &MessageHub) -> Subscription {
        let weak = Rc::downgrade(&self.shared);
        hub.subscribe(move |message| {
            if message == CLOSE_MESSAGE {
                if let Some(placement) = Placement::from_weak(&weak) {
                    placement.dismiss_ad();
                }
            }
        })
    }

    pub fn should_close_button_be_visible(&self) -> bool {
        use crate::protocol::CloseButtonVisibility as Visibility;
        use PlacementState::*;

        let inner = self.shared.inner.borrow();
        let visibility = inner
            .last_response
            .as_ref()
            .and_then(|r| r.close_button_visibility)
            .unwrap_or_default();
        match visibility {
            Visibility::Overall => true,
            Visibility::BeforeCall2Action => {
                matches!(inner.state, Call2Action | Call2ActionClicked | GoalReached)
            }
            Visibility::AfterCall2Action | Visibility::AfterCall2ActionPlus => {
                matches!(inner.state, Call2ActionClicked | GoalReached)
            }
        }
    }

    // ---------- Transactions ----------

    fn confirm_fn(&self) -> ConfirmFn {
        let weak = Rc::downgrade(&self.shared);
        Rc::new(move |batch: &[Transaction]| {
            if let Some(placement) = Placement::from_weak(&weak) {
                placement.confirm_transactions(batch);
            }
        })
    }

    /// Tell the server the transactions were granted, in one request.
    pub fn confirm_transactions(&self, transactions: &[Transaction]) {
        if transactions.is_empty() {
            return;
        }
        let events = transactions
            .iter()
            .map(|t| {
                OutboundEvent::TransactionConfirmed(TransactionConfirmed {
                    ad_id: t.ad_id.clone(),
                    transaction_id: t.transaction_id.clone(),
                })
            })
            .collect();
        self.send(
            events,
            Box::new(|result| {
                if let Err(e) = result {
                    log::error!("confirming transactions failed: {}", e);
                }
            }),
        );
    }
}
