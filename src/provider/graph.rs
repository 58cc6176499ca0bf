//! Graph API reads for leads, forms, and pages.

// self
use crate::{
	_prelude::*,
	auth::{AppCredential, FormId, LeadId, PageId, Secret},
	http::ProviderHttpClient,
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderStrategy,
	store::TokenStore,
};

const LEAD_FIELDS: &str =
	"field_data,created_time,ad_id,ad_name,adset_id,adset_name,campaign_id,campaign_name,form_id";
const FORM_FIELDS: &str = "id,name,locale,status,page";
const FORM_LIST_FIELDS: &str = "id,name,status,locale";
const PAGE_FIELDS: &str = "id,name,access_token";
const MAX_LIST_PAGES: usize = 50;

/// One answered question of a lead form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadFieldValue {
	/// Question key.
	pub name: String,
	/// Submitted values (multi-choice questions carry several).
	#[serde(default)]
	pub values: Vec<String>,
}

/// Lead detail returned by `GET /{lead_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadDetail {
	/// Lead identifier.
	pub id: LeadId,
	/// Submission time as reported by the Graph API.
	#[serde(default)]
	pub created_time: Option<String>,
	/// Ad that produced the lead, if any.
	#[serde(default)]
	pub ad_id: Option<String>,
	/// Ad display name.
	#[serde(default)]
	pub ad_name: Option<String>,
	/// Ad set that produced the lead, if any.
	#[serde(default)]
	pub adset_id: Option<String>,
	/// Ad set display name.
	#[serde(default)]
	pub adset_name: Option<String>,
	/// Campaign that produced the lead, if any.
	#[serde(default)]
	pub campaign_id: Option<String>,
	/// Campaign display name.
	#[serde(default)]
	pub campaign_name: Option<String>,
	/// Form the lead was submitted through.
	#[serde(default)]
	pub form_id: Option<FormId>,
	/// Submitted answers.
	#[serde(default)]
	pub field_data: Vec<LeadFieldValue>,
}
impl LeadDetail {
	/// Collapses `field_data` to one value per question (the first submitted value).
	pub fn simplified(&self) -> BTreeMap<String, Option<String>> {
		simplify_field_data(&self.field_data)
	}
}

/// Collapses multi-valued answers to their first value; empty answers become `None`.
pub fn simplify_field_data(fields: &[LeadFieldValue]) -> BTreeMap<String, Option<String>> {
	fields.iter().map(|field| (field.name.clone(), field.values.first().cloned())).collect()
}

/// Page reference embedded in form details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
	/// Page identifier.
	pub id: PageId,
	/// Page display name.
	#[serde(default)]
	pub name: Option<String>,
}

/// Form detail returned by `GET /{form_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadForm {
	/// Form identifier.
	pub id: FormId,
	/// Form display name.
	#[serde(default)]
	pub name: Option<String>,
	/// Form locale, e.g. `en_US`.
	#[serde(default)]
	pub locale: Option<String>,
	/// Form status, e.g. `ACTIVE` or `ARCHIVED`.
	#[serde(default)]
	pub status: Option<String>,
	/// Owning page.
	#[serde(default)]
	pub page: Option<PageRef>,
}

/// Page the token can manage, with its page-scoped access token.
#[derive(Clone, Debug, Deserialize)]
pub struct Page {
	/// Page identifier.
	pub id: PageId,
	/// Page display name.
	#[serde(default)]
	pub name: Option<String>,
	/// Page access token used for page-owned resources.
	pub access_token: Option<Secret>,
}

/// Entry of `GET /{page_id}/leadgen_forms`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSummary {
	/// Form identifier.
	pub id: FormId,
	/// Form display name.
	#[serde(default)]
	pub name: Option<String>,
	/// Form status.
	#[serde(default)]
	pub status: Option<String>,
	/// Form locale.
	#[serde(default)]
	pub locale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
	#[serde(default = "Vec::new")]
	data: Vec<T>,
	#[serde(default)]
	paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
	#[serde(default)]
	cursors: Option<Cursors>,
	#[serde(default)]
	next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cursors {
	#[serde(default)]
	after: Option<String>,
}

/// Reads Lead Ads objects with the stored access token.
///
/// Every read checks the token first: a missing token yields [`Error::MissingToken`] and an
/// expired one [`Error::TokenExpired`], without contacting the provider.
pub struct GraphClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	strategy: Arc<dyn ProviderStrategy>,
	store: Arc<dyn TokenStore>,
	credential: AppCredential,
}
impl<C, M> GraphClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a reader for `credential` backed by the shared transport and token store.
	pub fn new(
		credential: AppCredential,
		store: Arc<dyn TokenStore>,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
		transport_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: transport_mapper.into(),
			strategy,
			store,
			credential,
		}
	}

	/// Credential the reader was built for.
	pub fn credential(&self) -> &AppCredential {
		&self.credential
	}

	/// Returns the stored token if it may be used now.
	pub async fn access_token(&self) -> Result<Secret> {
		let record = self.store.get().await?.ok_or(Error::MissingToken)?;

		record.ensure_usable_at(OffsetDateTime::now_utc()).cloned()
	}

	/// Fetches a lead with its answers and ad attribution.
	pub async fn lead(&self, lead_id: &LeadId) -> Result<LeadDetail> {
		let token = self.access_token().await?;
		let url = self.object_url(lead_id, LEAD_FIELDS);

		self.get_json(FlowKind::LeadEnrichment, "lead", &url, &token).await
	}

	/// Fetches form metadata.
	pub async fn form(&self, form_id: &FormId) -> Result<LeadForm> {
		let token = self.access_token().await?;
		let url = self.object_url(form_id, FORM_FIELDS);

		self.get_json(FlowKind::GraphRead, "form", &url, &token).await
	}

	/// Lists every page the token can manage, following pagination cursors.
	pub async fn pages(&self) -> Result<Vec<Page>> {
		let token = self.access_token().await?;
		let url = self.object_url("me/accounts", PAGE_FIELDS);

		self.collect_listing("pages", url, &token).await
	}

	/// Lists the lead forms of `page_id`.
	///
	/// The page access token from [`pages`](Self::pages) is used when the page is listed there;
	/// otherwise the stored token is used directly.
	pub async fn forms(&self, page_id: &PageId) -> Result<Vec<FormSummary>> {
		let token = self.access_token().await?;
		let page_token = self
			.pages()
			.await?
			.into_iter()
			.find(|page| &page.id == page_id)
			.and_then(|page| page.access_token)
			.unwrap_or(token);
		let url = self.object_url(&format!("{page_id}/leadgen_forms"), FORM_LIST_FIELDS);

		self.collect_listing("forms", url, &page_token).await
	}

	fn object_url(&self, path: &str, fields: &str) -> Url {
		let mut url = self.credential.graph_endpoint(path);

		url.query_pairs_mut().append_pair("fields", fields);

		url
	}

	async fn collect_listing<T>(&self, stage: &'static str, url: Url, token: &Secret) -> Result<Vec<T>>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut items = Vec::new();
		let mut next = Some(url);
		let mut fetched = 0;

		while let Some(url) = next.take() {
			let listing: Listing<T> = self.get_json(FlowKind::GraphRead, stage, &url, token).await?;

			items.extend(listing.data);
			fetched += 1;

			if fetched >= MAX_LIST_PAGES {
				break;
			}

			let after = listing
				.paging
				.filter(|paging| paging.next.is_some())
				.and_then(|paging| paging.cursors)
				.and_then(|cursors| cursors.after);

			if let Some(after) = after {
				let mut following = url.clone();
				let retained = url
					.query_pairs()
					.filter(|(k, _)| k != "after")
					.map(|(k, v)| (k.into_owned(), v.into_owned()))
					.collect::<Vec<_>>();

				following.query_pairs_mut().clear().extend_pairs(retained).append_pair("after", &after);
				next = Some(following);
			}
		}

		Ok(items)
	}

	async fn get_json<T>(
		&self,
		step: FlowKind,
		stage: &'static str,
		url: &Url,
		token: &Secret,
	) -> Result<T>
	where
		T: serde::de::DeserializeOwned,
	{
		let span = FlowSpan::new(step, stage).with_subject(url.path());

		obs::record_flow_outcome(step, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let request = oauth::bearer_get(url, token)?;
				let response = oauth::send(
					self.http_client.as_ref(),
					self.transport_mapper.as_ref(),
					step,
					request,
				)
				.await?;

				if response.is_failure() {
					return Err(oauth::map_error_response(
						self.strategy.as_ref(),
						&self.credential.app_id,
						step,
						&response,
					));
				}

				oauth::decode_json(step, &response)
			})
			.await;

		obs::record_flow_outcome(
			step,
			if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		result
	}
}
impl<C, M> Debug for GraphClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GraphClient")
			.field("app_id", &self.credential.app_id)
			.field("graph_url", &self.credential.graph_url.as_str())
			.field("api_version", &self.credential.api_version)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn simplify_takes_first_value_per_field() {
		let fields = vec![
			LeadFieldValue { name: "email".into(), values: vec!["a@example.com".into()] },
			LeadFieldValue {
				name: "interests".into(),
				values: vec!["solar".into(), "wind".into()],
			},
			LeadFieldValue { name: "comment".into(), values: Vec::new() },
		];
		let simplified = simplify_field_data(&fields);

		assert_eq!(simplified.get("email"), Some(&Some("a@example.com".to_owned())));
		assert_eq!(simplified.get("interests"), Some(&Some("solar".to_owned())));
		assert_eq!(simplified.get("comment"), Some(&None));
	}

	#[test]
	fn lead_detail_tolerates_missing_attribution() {
		let lead: LeadDetail = serde_json::from_str(
			r#"{"id":"444","created_time":"2025-01-01T10:00:00+0000","field_data":[{"name":"full_name","values":["Ada"]}]}"#,
		)
		.expect("Organic lead should deserialize.");

		assert_eq!(lead.ad_id, None);
		assert_eq!(lead.simplified().get("full_name"), Some(&Some("Ada".to_owned())));
	}

	#[test]
	fn listing_reads_after_cursor() {
		let listing: Listing<FormSummary> = serde_json::from_str(
			r#"{"data":[{"id":"1","name":"A"}],"paging":{"cursors":{"before":"b","after":"c2"},"next":"https://graph/next"}}"#,
		)
		.expect("Listing should deserialize.");
		let after = listing.paging.and_then(|p| p.cursors).and_then(|c| c.after);

		assert_eq!(listing.data.len(), 1);
		assert_eq!(after.as_deref(), Some("c2"));
	}
}
