use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use crate::config::{AppEnvironment, ApplicationQuotas};
use crate::workflows::rental::domain::{
    Booking, HousingRequest, LeaseId, Listing, ListingId, MatchId, Notification,
    PaymentMethodId, Principal, RentalMatch, Trip, TripId,
};
use crate::workflows::rental::leasing::SignerRole;
use crate::workflows::rental::notifications::{DispatchError, NotificationDispatcher};
use crate::workflows::rental::pricing::{
    AdvertisedRentPricing, PricingError, PricingRule,
};
use crate::workflows::rental::router::RentalServices;
use crate::workflows::rental::store::MarketplaceStore;

/// Dispatcher that records every delivered notification for assertions.
#[derive(Default)]
pub(super) struct MemoryDispatcher {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryDispatcher {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("dispatcher mutex").clone()
    }
}

impl NotificationDispatcher for MemoryDispatcher {
    fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .expect("dispatcher mutex")
            .push(notification.clone());
        Ok(())
    }
}

/// Pricing rule that always fails, for atomicity tests.
pub(super) struct FailingPricing;

impl PricingRule for FailingPricing {
    fn calculate_rent(&self, _listing: &Listing, _trip: &Trip) -> Result<u32, PricingError> {
        Err(PricingError::Unavailable("pricing backend offline".to_string()))
    }
}

pub(super) struct TestEnv {
    pub store: Arc<MarketplaceStore>,
    pub dispatcher: Arc<MemoryDispatcher>,
    pub services: RentalServices<MemoryDispatcher>,
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn renter() -> Principal {
    Principal::user("renter-1")
}

pub(super) fn host() -> Principal {
    Principal::user("host-1")
}

pub(super) fn other_host() -> Principal {
    Principal::user("host-2")
}

pub(super) fn admin() -> Principal {
    Principal::admin("ops-1")
}

pub(super) fn stranger() -> Principal {
    Principal::user("nobody-9")
}

pub(super) fn build_env(
    quotas: ApplicationQuotas,
    environment: AppEnvironment,
    pricing: Arc<dyn PricingRule>,
) -> TestEnv {
    let store = Arc::new(MarketplaceStore::new());
    let dispatcher = Arc::new(MemoryDispatcher::default());

    store.seed(|state| {
        state.insert_trip(Trip {
            id: TripId::from("trip-1"),
            renter_id: "renter-1".into(),
            start_date: Some(date(2026, 1, 15)),
            end_date: Some(date(2026, 7, 15)),
        });
        state.insert_trip(Trip {
            id: TripId::from("trip-2"),
            renter_id: "renter-1".into(),
            start_date: Some(date(2026, 1, 1)),
            end_date: Some(date(2026, 6, 1)),
        });
        state.insert_trip(Trip {
            id: TripId::from("trip-undated"),
            renter_id: "renter-1".into(),
            start_date: None,
            end_date: None,
        });
        state.insert_listing(Listing {
            id: ListingId::from("listing-1"),
            host_id: "host-1".into(),
            title: "Maple Street Loft".to_string(),
            monthly_rent: 1000,
        });
        state.insert_listing(Listing {
            id: ListingId::from("listing-2"),
            host_id: "host-2".into(),
            title: "Cedar Court Studio".to_string(),
            monthly_rent: 1500,
        });
        state.insert_listing(Listing {
            id: ListingId::from("listing-own"),
            host_id: "renter-1".into(),
            title: "The Renter's Own Place".to_string(),
            monthly_rent: 900,
        });
    });

    let services = RentalServices::new(
        store.clone(),
        dispatcher.clone(),
        pricing,
        quotas,
        environment,
    );
    TestEnv {
        store,
        dispatcher,
        services,
    }
}

pub(super) fn env() -> TestEnv {
    build_env(
        ApplicationQuotas::default(),
        AppEnvironment::Test,
        Arc::new(AdvertisedRentPricing),
    )
}

/// Drives (trip-1, listing-1) from application to approved match.
pub(super) fn approved_match(env: &TestEnv) -> (HousingRequest, RentalMatch) {
    let request = env
        .services
        .applications
        .create(&renter(), &TripId::from("trip-1"), &ListingId::from("listing-1"))
        .expect("application created");
    env.services
        .applications
        .approve(&host(), &request.id)
        .expect("application approved")
}

/// An approved match with the lease fully signed and payment authorized.
pub(super) fn completed_match(env: &TestEnv) -> RentalMatch {
    let (_, rental_match) = approved_match(env);
    sign_and_authorize(env, &rental_match.id);
    env.store
        .read(|state| state.rental_match(&rental_match.id).cloned())
        .expect("store readable")
        .expect("match present")
}

pub(super) fn sign_and_authorize(env: &TestEnv, match_id: &MatchId) {
    let lease = env
        .services
        .leases
        .create_for_match(
            &host(),
            LeaseId(format!("lease-for-{match_id}")),
            match_id,
            None,
        )
        .expect("lease created");
    env.services
        .leases
        .record_signature(&renter(), &lease.id, SignerRole::Tenant)
        .expect("tenant signed");
    env.services
        .leases
        .record_signature(&host(), &lease.id, SignerRole::Landlord)
        .expect("landlord signed");
    env.services
        .matches
        .record_payment_authorization(&renter(), match_id, PaymentMethodId::from("pm-1"))
        .expect("payment authorized");
}

pub(super) fn confirmed_booking(env: &TestEnv) -> Booking {
    let rental_match = completed_match(env);
    env.services
        .bookings
        .create_from_match(&renter(), &rental_match.id)
        .expect("booking created")
}
