use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::MembershipError;
use crate::membership::lifecycle::{purchase_expiry, renewal_expiry, renewal_price};
use crate::membership::resolver::{resolve, MembershipView, SelectionPolicy};
use crate::models::{
    payment::PurchaseRequest,
    subscription::{CreateSubscriptionRequest, Subscription, UpdateSubscriptionRequest},
    user::UserProfile,
};
use crate::services::notifier::{MembershipNotification, Notifier};
use crate::services::store::SubscriptionStore;

/// Result of a successful purchase or renewal.
///
/// `membership` is `None` when the write succeeded but the follow-up profile
/// read failed; the caller shows the previous tier until the next fetch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipOutcome {
    pub subscription: Subscription,
    pub membership: Option<MembershipView>,
}

#[derive(Clone)]
pub struct MembershipService {
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn Notifier>,
    policy: SelectionPolicy,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Holds a user's in-flight slot and frees it when dropped.
struct InFlightGuard {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_in_flight(&self.in_flight).remove(&self.key);
    }
}

// The set only sees insert/remove, so a poisoned lock still holds a consistent set.
fn lock_in_flight(in_flight: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MembershipService {
    pub fn new(store: Arc<dyn SubscriptionStore>, notifier: Arc<dyn Notifier>, policy: SelectionPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    fn view_of(&self, profile: &UserProfile, now: DateTime<Utc>) -> MembershipView {
        resolve(Some(profile.subscriptions.as_slice()), now, self.policy)
    }

    fn begin(&self, email: &str) -> Result<InFlightGuard, MembershipError> {
        let key = email.trim().to_lowercase();
        if !lock_in_flight(&self.in_flight).insert(key.clone()) {
            log::warn!("Rejected concurrent membership request for {}", key);
            return Err(MembershipError::WorkflowInFlight);
        }
        Ok(InFlightGuard {
            key,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Current membership of the user, recomputed from a fresh profile read.
    pub async fn membership(&self, email: &str, now: DateTime<Utc>) -> Result<MembershipView, MembershipError> {
        let profile = self.store.get_profile(email).await?;
        Ok(self.view_of(&profile, now))
    }

    /// Upgrades a free user to gold for the chosen plan.
    pub async fn purchase(&self, request: &PurchaseRequest, now: DateTime<Utc>) -> Result<MembershipOutcome, MembershipError> {
        let _guard = self.begin(&request.email)?;

        request.card.check().map_err(MembershipError::Validation)?;

        let profile = self.store.get_profile(&request.email).await?;
        if self.view_of(&profile, now).is_gold() {
            return Err(MembershipError::AlreadyGold);
        }

        let create = CreateSubscriptionRequest {
            userid: profile.id.clone(),
            expireson: purchase_expiry(request.plan, now),
            amountpaid: request.plan.price(),
        };

        let subscription = self.store.create_subscription(create).await.map_err(|e| {
            log::error!("Failed to create {} subscription for {}: {}", request.plan, profile.email, e);
            MembershipError::remote_write("Failed to create subscription", e.into())
        })?;

        log::info!(
            "User {} upgraded to gold ({}) until {}",
            profile.email,
            request.plan,
            subscription.expireson
        );

        self.notify(&profile, &subscription).await;
        let membership = self.refresh(&profile.email, now).await;

        Ok(MembershipOutcome { subscription, membership })
    }

    /// Extends a gold membership by a year from its expiry, or from now if it already lapsed.
    pub async fn renew(&self, email: &str, now: DateTime<Utc>) -> Result<MembershipOutcome, MembershipError> {
        let _guard = self.begin(email)?;

        let profile = self.store.get_profile(email).await?;
        let view = self.view_of(&profile, now);
        let (subscription_id, current_expiry) = match (view.subscription_id, view.expiry_date) {
            (Some(id), Some(expiry)) if view.tier.is_paid() => (id, expiry),
            _ => return Err(MembershipError::NotGold),
        };

        let update = UpdateSubscriptionRequest {
            id: subscription_id,
            expireson: renewal_expiry(current_expiry, now),
            amountpaid: renewal_price(),
        };

        let subscription = self.store.update_subscription(update).await.map_err(|e| {
            log::error!("Failed to renew subscription for {}: {}", profile.email, e);
            MembershipError::remote_write("Failed to renew subscription", e.into())
        })?;

        log::info!("Renewed gold membership for {} until {}", profile.email, subscription.expireson);

        self.notify(&profile, &subscription).await;
        let membership = self.refresh(&profile.email, now).await;

        Ok(MembershipOutcome { subscription, membership })
    }

    async fn notify(&self, profile: &UserProfile, subscription: &Subscription) {
        let notification = MembershipNotification {
            name: profile.name.clone(),
            amount_paid: subscription.amountpaid,
            expires_on: subscription.expireson,
            email: profile.email.clone(),
        };

        if let Err(e) = self.notifier.send_membership_confirmation(&notification).await {
            log::warn!("Membership confirmation for {} not sent: {}", profile.email, e);
        }
    }

    /// Read-after-write. A failure leaves the caller with a stale tier, never lost data.
    async fn refresh(&self, email: &str, now: DateTime<Utc>) -> Option<MembershipView> {
        match self.membership(email, now).await {
            Ok(view) => Some(view),
            Err(e) => {
                log::warn!("Profile refetch after membership change failed for {}: {}", email, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::membership::tier::MembershipTier;
    use crate::models::common::SubscriptionPlan;
    use crate::models::payment::CardDetails;
    use crate::services::memory_store::InMemoryStore;
    use crate::services::notifier::HttpNotifier;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const EMAIL: &str = "jane@example.com";

    /// In-memory store that records writes and can be told to fail.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryStore,
        creates: Mutex<Vec<CreateSubscriptionRequest>>,
        updates: Mutex<Vec<UpdateSubscriptionRequest>>,
        profile_reads: AtomicUsize,
        fail_writes: AtomicBool,
        fail_reads_after_write: AtomicBool,
        written: AtomicBool,
    }

    #[async_trait]
    impl SubscriptionStore for RecordingStore {
        async fn get_profile(&self, email: &str) -> Result<UserProfile, StoreError> {
            self.profile_reads.fetch_add(1, Ordering::SeqCst);
            if self.written.load(Ordering::SeqCst) && self.fail_reads_after_write.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("profile service unavailable").into());
            }
            self.inner.get_profile(email).await
        }

        async fn create_subscription(&self, request: CreateSubscriptionRequest) -> Result<Subscription, StoreError> {
            self.creates.lock().unwrap().push(request.clone());
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("500 Internal Server Error").into());
            }
            self.written.store(true, Ordering::SeqCst);
            self.inner.create_subscription(request).await
        }

        async fn update_subscription(&self, request: UpdateSubscriptionRequest) -> Result<Subscription, StoreError> {
            self.updates.lock().unwrap().push(request.clone());
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("500 Internal Server Error").into());
            }
            self.written.store(true, Ordering::SeqCst);
            self.inner.update_subscription(request).await
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<MembershipNotification>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_membership_confirmation(&self, notification: &MembershipNotification) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                anyhow::bail!("smtp down");
            }
            Ok(())
        }
    }

    async fn setup(notifier: RecordingNotifier) -> (MembershipService, Arc<RecordingStore>, Arc<RecordingNotifier>, UserProfile) {
        setup_with_policy(notifier, SelectionPolicy::FirstMatch).await
    }

    async fn setup_with_policy(
        notifier: RecordingNotifier,
        policy: SelectionPolicy,
    ) -> (MembershipService, Arc<RecordingStore>, Arc<RecordingNotifier>, UserProfile) {
        let store = Arc::new(RecordingStore::default());
        let user = store.inner.add_user("Jane Doe", EMAIL).await;
        let notifier = Arc::new(notifier);
        let service = MembershipService::new(store.clone(), notifier.clone(), policy);
        (service, store, notifier, user)
    }

    /// Mail endpoint that accepts connections and never answers.
    async fn silent_mail_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
            }
        });
        format!("http://{}/send", addr)
    }

    fn valid_card() -> CardDetails {
        CardDetails {
            card_number: "1234567890123456".to_string(),
            cardholder_name: "Jane Doe".to_string(),
            expiry: "08/27".to_string(),
            cvv: "123".to_string(),
        }
    }

    fn purchase_request(plan: SubscriptionPlan, card: CardDetails) -> PurchaseRequest {
        PurchaseRequest {
            email: EMAIL.to_string(),
            plan,
            card,
        }
    }

    async fn give_subscription(store: &RecordingStore, user: &UserProfile, expireson: DateTime<Utc>) -> Subscription {
        store
            .inner
            .create_subscription(CreateSubscriptionRequest {
                userid: user.id.clone(),
                expireson,
                amountpaid: Decimal::new(199, 0),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_user_is_free() {
        let (service, _, _, _) = setup(RecordingNotifier::default()).await;
        let view = service.membership(EMAIL, Utc::now()).await.unwrap();
        assert_eq!(view, MembershipView::free());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (service, _, _, _) = setup(RecordingNotifier::default()).await;
        let result = service.membership("ghost@example.com", Utc::now()).await;
        assert!(matches!(result, Err(MembershipError::ProfileNotFound)));
    }

    #[tokio::test]
    async fn test_invalid_card_makes_no_store_call() {
        let (service, store, notifier, _) = setup(RecordingNotifier::default()).await;
        let card = CardDetails {
            card_number: "12345".to_string(),
            ..valid_card()
        };

        let result = service.purchase(&purchase_request(SubscriptionPlan::Monthly, card), Utc::now()).await;

        assert!(matches!(result, Err(MembershipError::Validation(_))));
        assert!(store.creates.lock().unwrap().is_empty());
        assert_eq!(store.profile_reads.load(Ordering::SeqCst), 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_monthly_purchase_creates_subscription() {
        let (service, store, notifier, user) = setup(RecordingNotifier::default()).await;
        let now = Utc::now();

        let outcome = service
            .purchase(&purchase_request(SubscriptionPlan::Monthly, valid_card()), now)
            .await
            .unwrap();

        let creates = store.creates.lock().unwrap().clone();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].userid, user.id);
        assert_eq!(creates[0].amountpaid, Decimal::new(19_99, 2));
        let drift = creates[0].expireson - (Utc::now() + Duration::days(30));
        assert!(drift.num_seconds().abs() < 5);

        let membership = outcome.membership.unwrap();
        assert_eq!(membership.tier, MembershipTier::Gold);
        assert_eq!(membership.subscription_id.as_deref(), Some(outcome.subscription.id.as_str()));

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].email, EMAIL);
        assert_eq!(sent[0].name, "Jane Doe");
        assert_eq!(sent[0].amount_paid, Decimal::new(19_99, 2));
    }

    #[tokio::test]
    async fn test_yearly_purchase_end_to_end() {
        let (service, _, _, _) = setup(RecordingNotifier::default()).await;
        let now = Utc::now();
        assert_eq!(service.membership(EMAIL, now).await.unwrap().tier, MembershipTier::Free);

        let outcome = service
            .purchase(&purchase_request(SubscriptionPlan::Yearly, valid_card()), now)
            .await
            .unwrap();
        assert_eq!(outcome.subscription.amountpaid, Decimal::new(199, 0));

        let view = service.membership(EMAIL, now).await.unwrap();
        assert_eq!(view.tier, MembershipTier::Gold);
        assert_eq!(view.expiry_date, Some(now + Duration::days(365)));
    }

    #[tokio::test]
    async fn test_purchase_blocked_for_gold_user() {
        let (service, store, _, user) = setup(RecordingNotifier::default()).await;
        let now = Utc::now();
        give_subscription(&store, &user, now + Duration::days(10)).await;

        let result = service
            .purchase(&purchase_request(SubscriptionPlan::Monthly, valid_card()), now)
            .await;

        assert!(matches!(result, Err(MembershipError::AlreadyGold)));
        assert!(store.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_generic_message() {
        let (service, store, notifier, _) = setup(RecordingNotifier::default()).await;
        store.fail_writes.store(true, Ordering::SeqCst);

        let err = service
            .purchase(&purchase_request(SubscriptionPlan::Monthly, valid_card()), Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to create subscription");
        assert!(notifier.sent.lock().unwrap().is_empty());

        // Retry after the store recovers goes through.
        store.fail_writes.store(false, Ordering::SeqCst);
        let outcome = service
            .purchase(&purchase_request(SubscriptionPlan::Monthly, valid_card()), Utc::now())
            .await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_purchase() {
        let (service, store, _, _) = setup(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        })
        .await;

        let outcome = service
            .purchase(&purchase_request(SubscriptionPlan::Monthly, valid_card()), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.membership.unwrap().tier, MembershipTier::Gold);
        assert_eq!(store.creates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refetch_failure_reports_stale_membership() {
        let (service, store, _, _) = setup(RecordingNotifier::default()).await;
        store.fail_reads_after_write.store(true, Ordering::SeqCst);

        let outcome = service
            .purchase(&purchase_request(SubscriptionPlan::Yearly, valid_card()), Utc::now())
            .await
            .unwrap();

        assert!(outcome.membership.is_none());
        assert_eq!(store.creates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_early_renewal_extends_from_current_expiry() {
        let (service, store, _, user) = setup(RecordingNotifier::default()).await;
        let now = Utc::now();
        let current = give_subscription(&store, &user, now + Duration::days(20)).await;

        let outcome = service.renew(EMAIL, now).await.unwrap();

        let updates = store.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, current.id);
        assert_eq!(updates[0].expireson, current.expireson + Duration::days(365));
        assert_eq!(updates[0].amountpaid, Decimal::new(199_00, 2));
        assert_eq!(outcome.membership.unwrap().expiry_date, Some(current.expireson + Duration::days(365)));
    }

    #[tokio::test]
    async fn test_first_match_renews_first_live_record() {
        let (service, store, _, user) = setup(RecordingNotifier::default()).await;
        let now = Utc::now();
        // Inserted newest first, so the stored order reads [expired, live_a, live_b].
        let live_b = give_subscription(&store, &user, now + Duration::days(200)).await;
        let live_a = give_subscription(&store, &user, now + Duration::days(40)).await;
        give_subscription(&store, &user, now - Duration::days(1)).await;

        service.renew(EMAIL, now).await.unwrap();

        let updates = store.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, live_a.id);
        assert_ne!(updates[0].id, live_b.id);
        assert_eq!(updates[0].expireson, live_a.expireson + Duration::days(365));
    }

    #[tokio::test]
    async fn test_max_expiry_renews_longest_record() {
        let (service, store, _, user) = setup_with_policy(RecordingNotifier::default(), SelectionPolicy::MaxExpiry).await;
        let now = Utc::now();
        // Stored order reads [short, long].
        let long = give_subscription(&store, &user, now + Duration::days(300)).await;
        give_subscription(&store, &user, now + Duration::days(10)).await;

        let outcome = service.renew(EMAIL, now).await.unwrap();

        let updates = store.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, long.id);
        assert_eq!(updates[0].expireson, long.expireson + Duration::days(365));
        assert_eq!(outcome.membership.unwrap().subscription_id.as_deref(), Some(long.id.as_str()));
    }

    #[tokio::test]
    async fn test_renewal_requires_gold() {
        let (service, store, _, user) = setup(RecordingNotifier::default()).await;
        let now = Utc::now();
        give_subscription(&store, &user, now - Duration::days(3)).await;

        let result = service.renew(EMAIL, now).await;

        assert!(matches!(result, Err(MembershipError::NotGold)));
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_renewal_failure_surfaces_generic_message() {
        let (service, store, _, user) = setup(RecordingNotifier::default()).await;
        let now = Utc::now();
        give_subscription(&store, &user, now + Duration::days(5)).await;
        store.fail_writes.store(true, Ordering::SeqCst);

        let err = service.renew(EMAIL, now).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to renew subscription");

        let view = service.membership(EMAIL, now).await.unwrap();
        assert_eq!(view.expiry_date, Some(now + Duration::days(5)));
    }

    #[tokio::test]
    async fn test_in_flight_guard_rejects_then_releases() {
        let (service, store, _, _) = setup(RecordingNotifier::default()).await;

        let guard = service.begin("Jane@Example.com").unwrap();
        let result = service
            .purchase(&purchase_request(SubscriptionPlan::Monthly, valid_card()), Utc::now())
            .await;
        assert!(matches!(result, Err(MembershipError::WorkflowInFlight)));
        assert!(store.creates.lock().unwrap().is_empty());

        drop(guard);
        let outcome = service
            .purchase(&purchase_request(SubscriptionPlan::Monthly, valid_card()), Utc::now())
            .await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn test_guard_released_after_failed_workflow() {
        let (service, _, _, _) = setup(RecordingNotifier::default()).await;
        let bad = CardDetails {
            cvv: "1".to_string(),
            ..valid_card()
        };

        let first = service.purchase(&purchase_request(SubscriptionPlan::Monthly, bad.clone()), Utc::now()).await;
        let second = service.purchase(&purchase_request(SubscriptionPlan::Monthly, bad), Utc::now()).await;

        assert!(matches!(first, Err(MembershipError::Validation(_))));
        assert!(matches!(second, Err(MembershipError::Validation(_))));
    }

    #[tokio::test]
    async fn test_silent_mail_endpoint_does_not_lock_out_user() {
        let store = Arc::new(RecordingStore::default());
        store.inner.add_user("Jane Doe", EMAIL).await;
        let notifier = HttpNotifier::new(silent_mail_endpoint().await, std::time::Duration::from_millis(200)).unwrap();
        let service = MembershipService::new(store.clone(), Arc::new(notifier), SelectionPolicy::FirstMatch);

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            service.purchase(&purchase_request(SubscriptionPlan::Monthly, valid_card()), Utc::now()),
        )
        .await
        .expect("purchase should finish once the mail request times out")
        .unwrap();
        assert_eq!(outcome.membership.unwrap().tier, MembershipTier::Gold);

        let renewal = tokio::time::timeout(std::time::Duration::from_secs(5), service.renew(EMAIL, Utc::now()))
            .await
            .expect("renewal should finish once the mail request times out");
        assert!(renewal.is_ok());
        assert_eq!(store.updates.lock().unwrap().len(), 1);
    }
}
