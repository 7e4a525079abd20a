//! Rewarded-ad placement client.
//!
//! A [`Placement`] owns one ad slot: it requests inventory from the ad server,
//! walks the ad through its lifecycle states, summarizes the rewards on offer
//! and hands open reward transactions back to the embedder for confirmation.
//! Network I/O and timers are supplied by the embedder through the
//! [`Transport`] and [`Scheduler`] traits.

pub mod config;
pub mod device;
pub mod error;
pub mod i18n;
pub mod meta;
pub mod placement;
pub mod protocol;
pub mod reward;
pub mod scheduler;
pub mod subscription;
pub mod transaction;
pub mod transport;

pub use config::{AppConfig, PlacementConfig};
pub use device::DeviceInfo;
pub use error::{ConfigError, Error, Result};
pub use i18n::Localizer;
pub use meta::{AdImage, AdMetaInfo};
pub use placement::{
    AdRequestOptions, InstallId, Placement, PlacementBuilder, PlacementObserver, PlacementState,
    ShowAd, UserInfo,
};
pub use protocol::{AdCreative, AdResponse, CloseButtonVisibility, OutboundEvent, ResponseEvent};
pub use reward::Reward;
pub use scheduler::{ManualScheduler, Scheduler, Task, TimerId};
pub use subscription::{MessageHub, Subscription};
pub use transaction::{Transaction, Transactions};
pub use transport::{ApiRequest, Completion, Method, Transport, TransportError};
