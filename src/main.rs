use anyhow::Context;
use log::{info, warn};
use lqd_client::{
    applier::Applier,
    config::Config,
    operator::{HttpOperator, OperatorApi},
    Synchronizer, WalletState,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "lqd.toml".to_string());
    let config = Config::load(&path)?;
    if config.wallets.is_empty() {
        return Err(anyhow::anyhow!("no wallets configured in {}", path));
    }

    let operator = HttpOperator::new(config.operator_url.clone());
    let cancel = CancellationToken::new();
    let synchronizer = Synchronizer::new(config.sync_config(), cancel.child_token());
    let handle = synchronizer.handle();
    let sync = tokio::spawn(synchronizer.run());

    let eon_number = operator
        .current_eon()
        .await
        .context("fetching current eon")?;
    info!("operator is in eon {}", eon_number);

    let mut appliers = Vec::new();
    for w in &config.wallets {
        let records = operator
            .wallet_data(w.wallet, w.token, eon_number)
            .await
            .with_context(|| format!("fetching wallet data of {:?}", w.wallet))?;
        let previous_records = match eon_number.checked_sub(1) {
            Some(previous) => Some(
                operator
                    .wallet_data(w.wallet, w.token, previous)
                    .await
                    .with_context(|| {
                        format!("fetching eon {} data of {:?}", previous, w.wallet)
                    })?,
            ),
            None => None,
        };
        let registration = operator
            .registration_data(w.wallet, w.token)
            .await
            .with_context(|| format!("fetching registration of {:?}", w.wallet))?;

        let wallet = Arc::new(WalletState::from_wallet_data(
            w.wallet,
            w.token,
            config.contract_address,
            eon_number,
            records,
            previous_records,
            registration.as_ref(),
        ));
        match wallet.ledger().balance() {
            Ok(balance) => info!("{:?}/{:?} starts at {}", w.token, w.wallet, balance),
            Err(e) => warn!("{:?}/{:?} balance unavailable: {}", w.token, w.wallet, e),
        }

        let queue = handle.subscribe(w.wallet, w.token).await?;
        appliers.push(tokio::spawn(
            Applier::new(wallet, queue).run(cancel.child_token()),
        ));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();
    sync.await?;
    for applier in appliers {
        applier.await?;
    }
    Ok(())
}
