//! `leadgen-broker` service binary: loads configuration, serves the webhook and OAuth routes,
//! and logs every emitted lead event.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
use tokio::{net::TcpListener, signal, sync::mpsc::UnboundedReceiver};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
// self
use leadgen_broker::{
	config::{ConfigHandle, StoreSettings},
	flows::ReqwestOAuthClient,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	ops::{LeadAdsService, Operator},
	provider::{DefaultProviderStrategy, ProviderStrategy},
	server::{self, ServerState},
	store::{FileTokenStore, MemoryTokenStore, TokenStore},
	webhook::LeadEvent,
};

type Service = LeadAdsService<ReqwestHttpClient, ReqwestTransportErrorMapper>;

const CONFIG_ENV: &str = "LEADGEN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/leadgen.toml";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(fmt::layer().with_target(true))
		.init();

	let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
	let config = ConfigHandle::load(&path)?;
	let snapshot = config.current();
	let store: Arc<dyn TokenStore> = match &snapshot.store {
		StoreSettings::Memory => Arc::new(MemoryTokenStore::default()),
		StoreSettings::File { path } => Arc::new(FileTokenStore::open(path)?),
	};
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let oauth = ReqwestOAuthClient::new(store, strategy, snapshot.http.timeout())?;
	let (service, events) = LeadAdsService::new(config.clone(), oauth)?;
	let service = Arc::new(service);
	let receiver = service.receiver().clone();
	let operator: Arc<dyn Operator> = service.clone();
	let listener = TcpListener::bind(snapshot.server.listen).await?;

	tracing::info!(
		config = %path,
		subscriptions = operator.subscriptions().len(),
		enabled = snapshot.enabled,
		"Lead Ads broker starting."
	);

	if snapshot.server.operator_token.is_none() {
		tracing::warn!("No server.operator_token configured; operator routes will refuse requests.");
	}

	tokio::spawn(log_events(events));
	#[cfg(unix)]
	tokio::spawn(reload_on_hangup(service.clone()));

	let state = ServerState::new(operator, receiver, snapshot.server.operator_token.clone());

	server::serve(listener, state, shutdown_signal()).await?;

	tracing::info!("Lead Ads broker stopped.");

	Ok(())
}

async fn log_events(mut events: UnboundedReceiver<LeadEvent>) {
	while let Some(event) = events.recv().await {
		tracing::info!(
			lead_id = %event.lead_id,
			subscription = %event.subscription,
			form_id = %event.form_id,
			page_id = %event.page_id,
			enriched = event.enriched,
			fields = event.field_data.len(),
			"Lead received."
		);
	}
}

#[cfg(unix)]
async fn reload_on_hangup(service: Arc<Service>) {
	let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
		Ok(hangup) => hangup,
		Err(e) => {
			tracing::warn!(error = %e, "SIGHUP handler unavailable; configuration reload disabled.");

			return;
		},
	};

	while hangup.recv().await.is_some() {
		if let Err(e) = service.reload_config() {
			tracing::error!(error = %e, "Configuration reload failed; keeping the previous one.");
		}
	}
}

async fn shutdown_signal() {
	if let Err(e) = signal::ctrl_c().await {
		tracing::error!(error = %e, "Ctrl-C handler unavailable.");

		std::future::pending::<()>().await;
	}

	tracing::info!("Shutdown requested.");
}
