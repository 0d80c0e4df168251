use chrono::Utc;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::device::DeviceGate;
use crate::models::{CancellationResponse, DeviceId, FollowupResponse, RecordId, SurveyKind};
use crate::store::{ResponseStore, Responses, StoreError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("a contact name and phone are required when requesting contact")]
    MissingContact,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What to do when the gate cannot be reached. Only an unavailable store is
/// ever treated as "not gated".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatePolicy {
    #[default]
    FailOpen,
    FailClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Recorded(RecordId),
    AlreadyResponded,
}

#[derive(Debug, Clone, Default)]
pub struct CancellationDraft {
    pub proposal_adjusted: bool,
    pub attention_met: bool,
    pub found_alternative: bool,
    pub main_reason: String,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
}

impl CancellationDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("main reason", &self.main_reason)
    }

    fn into_response(self, device_id: &DeviceId) -> CancellationResponse {
        CancellationResponse {
            id: Uuid::nil(),
            submitted_at: Utc::now(),
            proposal_adjusted: self.proposal_adjusted,
            attention_met: self.attention_met,
            found_alternative: self.found_alternative,
            main_reason: self.main_reason,
            contact_name: non_blank(self.contact_name),
            contact_phone: non_blank(self.contact_phone),
            device_id: Some(device_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FollowupDraft {
    pub blocking_aspect: String,
    pub wants_adjustment: bool,
    pub team_attention: String,
    pub wants_visit_or_call: bool,
    pub wants_contact_24h: bool,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
}

impl FollowupDraft {
    pub fn requests_contact(&self) -> bool {
        self.wants_visit_or_call || self.wants_contact_24h
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("blocking aspect", &self.blocking_aspect)?;
        require("team attention", &self.team_attention)?;

        if self.requests_contact() {
            let has_name = self.contact_name.as_deref().is_some_and(|v| !v.trim().is_empty());
            let has_phone = self.contact_phone.as_deref().is_some_and(|v| !v.trim().is_empty());
            if !has_name || !has_phone {
                return Err(ValidationError::MissingContact);
            }
        }

        Ok(())
    }

    fn into_response(self, device_id: &DeviceId) -> FollowupResponse {
        FollowupResponse {
            id: Uuid::nil(),
            submitted_at: Utc::now(),
            blocking_aspect: self.blocking_aspect,
            wants_adjustment: self.wants_adjustment,
            team_attention: self.team_attention,
            wants_visit_or_call: self.wants_visit_or_call,
            wants_contact_24h: self.wants_contact_24h,
            contact_name: non_blank(self.contact_name),
            contact_phone: non_blank(self.contact_phone),
            device_id: Some(device_id.clone()),
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Gate check and gate write around a single response write.
pub struct Submission<'a> {
    store: &'a dyn ResponseStore,
    policy: GatePolicy,
    client: Option<String>,
}

impl<'a> Submission<'a> {
    pub fn new(store: &'a dyn ResponseStore, policy: GatePolicy) -> Self {
        Self {
            store,
            policy,
            client: None,
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub async fn cancellation(
        &self,
        device_id: &DeviceId,
        draft: CancellationDraft,
    ) -> Result<SubmitOutcome, SubmitError> {
        draft.validate()?;
        if self.is_gated(device_id, SurveyKind::Cancellation).await? {
            return Ok(SubmitOutcome::AlreadyResponded);
        }

        let response = draft.into_response(device_id);
        let id = Responses::new(self.store)
            .append_cancellation(&response)
            .await?;
        self.mark(device_id, SurveyKind::Cancellation).await;
        tracing::info!(%id, device_id = %device_id, "cancellation response recorded");
        Ok(SubmitOutcome::Recorded(id))
    }

    pub async fn followup(
        &self,
        device_id: &DeviceId,
        draft: FollowupDraft,
    ) -> Result<SubmitOutcome, SubmitError> {
        draft.validate()?;
        if self.is_gated(device_id, SurveyKind::Followup).await? {
            return Ok(SubmitOutcome::AlreadyResponded);
        }

        let response = draft.into_response(device_id);
        let id = Responses::new(self.store).append_followup(&response).await?;
        self.mark(device_id, SurveyKind::Followup).await;
        tracing::info!(%id, device_id = %device_id, "follow-up response recorded");
        Ok(SubmitOutcome::Recorded(id))
    }

    async fn is_gated(&self, device_id: &DeviceId, kind: SurveyKind) -> Result<bool, StoreError> {
        match DeviceGate::new(self.store).has_responded(device_id, kind).await {
            Ok(gated) => Ok(gated),
            Err(err @ StoreError::Unavailable(_)) if self.policy == GatePolicy::FailOpen => {
                tracing::warn!(error = %err, %kind, "gate check failed, treating device as ungated");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn mark(&self, device_id: &DeviceId, kind: SurveyKind) {
        if let Err(err) = DeviceGate::new(self.store)
            .mark_responded(device_id, kind, self.client.as_deref())
            .await
        {
            tracing::warn!(error = %err, %kind, device_id = %device_id, "failed to record gate after response");
        }
    }
}

/// WhatsApp deep link carrying a follow-up's answers to the sales team.
pub fn contact_link(number: &str, draft: &FollowupDraft) -> Result<Url, url::ParseError> {
    let yes_no = |value: bool| if value { "Yes" } else { "No" };
    let message = format!(
        "*Contact request - follow-up survey*\n\n\
         Name: {}\n\
         Phone: {}\n\n\
         *Answers:*\n\
         - Blocking aspect: {}\n\
         - Adjust proposal: {}\n\
         - Team attention: {}\n\
         - Visit/call: {}\n\
         - Contact within 24h: {}\n",
        draft.contact_name.as_deref().unwrap_or_default(),
        draft.contact_phone.as_deref().unwrap_or_default(),
        draft.blocking_aspect,
        yes_no(draft.wants_adjustment),
        draft.team_attention,
        yes_no(draft.wants_visit_or_call),
        yes_no(draft.wants_contact_24h),
    );

    Url::parse_with_params(&format!("https://wa.me/{number}"), &[("text", message)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::OfflineStore;
    use crate::store::{Collection, MemoryStore};

    fn cancellation_draft() -> CancellationDraft {
        CancellationDraft {
            proposal_adjusted: true,
            attention_met: true,
            found_alternative: false,
            main_reason: "Precio".to_string(),
            contact_name: Some("   ".to_string()),
            contact_phone: None,
        }
    }

    fn followup_draft() -> FollowupDraft {
        FollowupDraft {
            blocking_aspect: "Precio".to_string(),
            wants_adjustment: true,
            team_attention: "Buena".to_string(),
            wants_visit_or_call: true,
            wants_contact_24h: false,
            contact_name: Some("Avery Lee".to_string()),
            contact_phone: Some("5551234567".to_string()),
        }
    }

    #[test]
    fn blank_required_text_is_rejected() {
        let mut draft = cancellation_draft();
        draft.main_reason = "  ".to_string();
        assert_eq!(
            draft.validate(),
            Err(ValidationError::MissingField("main reason"))
        );

        let mut followup = followup_draft();
        followup.team_attention.clear();
        assert_eq!(
            followup.validate(),
            Err(ValidationError::MissingField("team attention"))
        );
    }

    #[test]
    fn contact_request_needs_name_and_phone() {
        let mut draft = followup_draft();
        draft.contact_phone = None;
        assert_eq!(draft.validate(), Err(ValidationError::MissingContact));

        draft.wants_visit_or_call = false;
        assert_eq!(draft.validate(), Ok(()));
    }

    #[tokio::test]
    async fn first_submission_is_recorded_and_second_is_gated() {
        let store = MemoryStore::new();
        let submission = Submission::new(&store, GatePolicy::FailOpen).with_client("test");
        let device_id = DeviceId::generate();

        let first = submission
            .cancellation(&device_id, cancellation_draft())
            .await
            .unwrap();
        let SubmitOutcome::Recorded(recorded_id) = first else {
            panic!("expected a recorded response, got {first:?}");
        };

        let second = submission
            .cancellation(&device_id, cancellation_draft())
            .await
            .unwrap();
        assert_eq!(second, SubmitOutcome::AlreadyResponded);

        let stored = Responses::new(&store).cancellations().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, recorded_id);
        assert_eq!(stored[0].device_id.as_ref(), Some(&device_id));
        assert_eq!(stored[0].contact_name, None);
    }

    #[tokio::test]
    async fn followup_outcome_names_the_listed_record() {
        let store = MemoryStore::new();
        let outcome = Submission::new(&store, GatePolicy::FailOpen)
            .followup(&DeviceId::generate(), followup_draft())
            .await
            .unwrap();

        let listed = Responses::new(&store).followups().await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Recorded(listed[0].id));
    }

    #[tokio::test]
    async fn stray_gate_documents_keep_the_device_gated() {
        let store = MemoryStore::new();
        let submission = Submission::new(&store, GatePolicy::FailOpen);
        let device_id = DeviceId::generate();

        submission
            .cancellation(&device_id, cancellation_draft())
            .await
            .unwrap();
        store
            .append(
                Collection::CancellationGates,
                serde_json::json!({"deviceId": "other"}),
            )
            .await
            .unwrap();

        let again = submission
            .cancellation(&device_id, cancellation_draft())
            .await
            .unwrap();
        assert_eq!(again, SubmitOutcome::AlreadyResponded);
    }

    #[tokio::test]
    async fn gating_is_per_survey_kind() {
        let store = MemoryStore::new();
        let submission = Submission::new(&store, GatePolicy::FailOpen);
        let device_id = DeviceId::generate();

        submission
            .cancellation(&device_id, cancellation_draft())
            .await
            .unwrap();
        let outcome = submission
            .followup(&device_id, followup_draft())
            .await
            .unwrap();

        assert!(matches!(outcome, SubmitOutcome::Recorded(_)));
        assert_eq!(
            store.list_all(Collection::FollowupGates).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_store() {
        let store = MemoryStore::new();
        let mut draft = followup_draft();
        draft.contact_name = None;

        let err = Submission::new(&store, GatePolicy::FailOpen)
            .followup(&DeviceId::generate(), draft)
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Invalid(ValidationError::MissingContact)));
        assert!(Responses::new(&store).followups().await.unwrap().is_empty());
    }

    /// Responses persist normally, gate collections are unreachable.
    struct GateOutageStore(MemoryStore);

    fn is_response(collection: Collection) -> bool {
        matches!(
            collection,
            Collection::CancellationResponses | Collection::FollowupResponses
        )
    }

    #[async_trait::async_trait]
    impl ResponseStore for GateOutageStore {
        async fn append(
            &self,
            collection: Collection,
            document: serde_json::Value,
        ) -> Result<RecordId, StoreError> {
            if is_response(collection) {
                self.0.append(collection, document).await
            } else {
                Err(StoreError::Unavailable("gates offline".to_string()))
            }
        }

        async fn list_all(
            &self,
            collection: Collection,
        ) -> Result<Vec<crate::store::StoredDocument>, StoreError> {
            if is_response(collection) {
                self.0.list_all(collection).await
            } else {
                Err(StoreError::Unavailable("gates offline".to_string()))
            }
        }

        async fn delete_all(&self, collection: Collection) -> Result<(), StoreError> {
            self.0.delete_all(collection).await
        }
    }

    #[tokio::test]
    async fn fail_open_records_despite_gate_outage() {
        let store = GateOutageStore(MemoryStore::new());
        let submission = Submission::new(&store, GatePolicy::FailOpen);
        let device_id = DeviceId::generate();

        for _ in 0..2 {
            let outcome = submission
                .cancellation(&device_id, cancellation_draft())
                .await
                .unwrap();
            assert!(matches!(outcome, SubmitOutcome::Recorded(_)));
        }

        // The gate write failed both times, so the device was never gated.
        assert_eq!(Responses::new(&store).cancellations().await.unwrap().len(), 2);
    }

    /// Gate reads report corrupt data instead of an outage.
    struct CorruptGateStore(MemoryStore);

    #[async_trait::async_trait]
    impl ResponseStore for CorruptGateStore {
        async fn append(
            &self,
            collection: Collection,
            document: serde_json::Value,
        ) -> Result<RecordId, StoreError> {
            self.0.append(collection, document).await
        }

        async fn list_all(
            &self,
            collection: Collection,
        ) -> Result<Vec<crate::store::StoredDocument>, StoreError> {
            if is_response(collection) {
                self.0.list_all(collection).await
            } else {
                Err(StoreError::Corrupt {
                    collection,
                    reason: "unreadable".to_string(),
                })
            }
        }

        async fn delete_all(&self, collection: Collection) -> Result<(), StoreError> {
            self.0.delete_all(collection).await
        }
    }

    #[tokio::test]
    async fn fail_open_does_not_cover_corrupt_data() {
        let store = CorruptGateStore(MemoryStore::new());

        let err = Submission::new(&store, GatePolicy::FailOpen)
            .cancellation(&DeviceId::generate(), cancellation_draft())
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Store(StoreError::Corrupt { .. })));
        assert!(Responses::new(&store).cancellations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fail_closed_propagates_gate_outage() {
        let store = GateOutageStore(MemoryStore::new());

        let err = Submission::new(&store, GatePolicy::FailClosed)
            .followup(&DeviceId::generate(), followup_draft())
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Store(StoreError::Unavailable(_))));
        assert!(Responses::new(&store).followups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn response_write_failure_is_returned() {
        let err = Submission::new(&OfflineStore, GatePolicy::FailOpen)
            .cancellation(&DeviceId::generate(), cancellation_draft())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Store(StoreError::Unavailable(_))));
    }

    #[test]
    fn contact_link_encodes_answers() {
        let url = contact_link("5212713977168", &followup_draft()).unwrap();
        assert_eq!(url.host_str(), Some("wa.me"));
        assert_eq!(url.path(), "/5212713977168");

        let text = url
            .query_pairs()
            .find(|(key, _)| key == "text")
            .map(|(_, value)| value.into_owned())
            .unwrap();
        assert!(text.contains("Name: Avery Lee"));
        assert!(text.contains("- Visit/call: Yes"));
        assert!(text.contains("- Contact within 24h: No"));
    }
}
