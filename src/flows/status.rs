//! Local token status evaluation.

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenStatusReport},
	flows::OAuthClient,
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome},
};

/// Evaluates `record` against the current clock without touching the network.
pub fn check_status(record: Option<&TokenRecord>) -> TokenStatusReport {
	TokenStatusReport::at(record, OffsetDateTime::now_utc())
}

impl<C, M> OAuthClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Reads the stored record and reports its status.
	pub async fn token_status(&self) -> Result<TokenStatusReport> {
		let record = self.store.get().await.inspect_err(|_| {
			obs::record_flow_outcome(FlowKind::StatusCheck, FlowOutcome::Failure);
		})?;

		obs::record_flow_outcome(FlowKind::StatusCheck, FlowOutcome::Success);

		Ok(check_status(record.as_ref()))
	}
}
