use std::rc::Rc;

use anyhow::Context;
use rewardkit_adapter_tokio::{HttpTransport, TokioScheduler, DEFAULT_TIMEOUT};
use rewardkit_core::{
    AdMetaInfo, AdRequestOptions, AppConfig, Error, Placement, PlacementObserver, ShowAd,
    Transactions,
};

struct LoggingObserver;

impl PlacementObserver for LoggingObserver {
    fn on_error(&self, error: &Error) {
        log::error!("ad request failed: {}", error);
    }

    fn on_no_fill(&self, placement: &Placement) {
        log::info!("no ad for placement {}", placement.config().placement_id);
    }

    fn on_ad_available(&self, show_ad: ShowAd, meta: AdMetaInfo) {
        log::info!(
            "ad available: {}",
            meta.incentive_text.as_deref().unwrap_or("no reward")
        );
        show_ad.show();
    }

    fn on_open_transactions(&self, transactions: Transactions) {
        if let Some(text) = transactions.summarized_reward_confirmation_text() {
            log::info!("{}", text);
        }
        transactions.confirm_all();
    }
}

async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let mut builder = Placement::builder(cfg.placement.clone())
        .transport(Rc::new(HttpTransport::new(DEFAULT_TIMEOUT)?))
        .scheduler(Rc::new(TokioScheduler::new()))
        .on_state_change(|placement, state| {
            log::debug!("{} is now {}", placement.config().placement_id, state);
        });
    if let Some(device) = cfg.device.clone() {
        builder = builder.device(device);
    }
    let placement = builder.build()?;

    let sdk_version = cfg
        .request
        .map(|r| r.sdk_version)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    placement.request_ad(AdRequestOptions::new(sdk_version).with_observer(Rc::new(LoggingObserver)))?;

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down in state {}", placement.state());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_toml_str(include_str!("../../../rewardkit.toml"))
        .context("invalid rewardkit.toml")?;
    simple_logger::SimpleLogger::new()
        .with_level(cfg.logging.level)
        .init()?;
    tokio::task::LocalSet::new().run_until(run(cfg)).await
}
