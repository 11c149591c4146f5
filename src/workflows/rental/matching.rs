use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::{
    Listing, ListingId, MatchId, PaymentMethodId, Principal, RentalMatch, Trip, TripId,
};
use super::error::LifecycleError;
use super::pricing::PricingRule;
use super::store::{MarketplaceStore, StoreState};

/// Find-or-create for the unique (trip, listing) pairing, runnable inside any
/// caller's transaction. Idempotent: callers must not assume they created the
/// returned match. An insert that loses a race to the store's uniqueness
/// constraint resolves by re-reading the surviving row.
pub fn find_or_create_match(
    state: &mut StoreState,
    trip: &Trip,
    listing: &Listing,
    monthly_rent: u32,
) -> Result<RentalMatch, LifecycleError> {
    if let Some(existing) = state.match_for_pair(&trip.id, &listing.id) {
        return Ok(existing.clone());
    }

    let rental_match = RentalMatch {
        id: MatchId(state.next_id("match")),
        trip_id: trip.id.clone(),
        listing_id: listing.id.clone(),
        monthly_rent: Some(monthly_rent),
        lease_document_id: None,
        payment_method_id: None,
        payment_authorized_at: None,
        booking_id: None,
    };

    match state.insert_match(rental_match.clone()) {
        Ok(()) => Ok(rental_match),
        Err(conflict) => state.expect_match(&conflict.existing).cloned(),
    }
}

/// Service surface over match creation, deletion, and payment authorization.
/// Entered directly by the lease-creation flow and webhook-driven completion.
pub struct MatchBroker {
    store: Arc<MarketplaceStore>,
    pricing: Arc<dyn PricingRule>,
}

impl MatchBroker {
    pub fn new(store: Arc<MarketplaceStore>, pricing: Arc<dyn PricingRule>) -> Self {
        Self { store, pricing }
    }

    pub fn find_or_create(
        &self,
        principal: &Principal,
        trip_id: &TripId,
        listing_id: &ListingId,
    ) -> Result<RentalMatch, LifecycleError> {
        let pricing = self.pricing.clone();
        self.store.run_in_transaction(|state| {
            let trip = state.expect_trip(trip_id)?.clone();
            let listing = state.expect_listing(listing_id)?.clone();
            require_party(principal, &trip, &listing)?;

            let monthly_rent = pricing
                .calculate_rent(&listing, &trip)
                .map_err(|err| LifecycleError::validation(err.to_string()))?;
            find_or_create_match(state, &trip, &listing, monthly_rent)
        })
    }

    /// Removes a match. Dependents are the caller's responsibility; the
    /// broker only guards the invariant that no booking may reference it.
    pub fn delete(&self, principal: &Principal, match_id: &MatchId) -> Result<(), LifecycleError> {
        self.store.run_in_transaction(|state| {
            let rental_match = state.expect_match(match_id)?.clone();
            let trip = state.expect_trip(&rental_match.trip_id)?.clone();
            let listing = state.expect_listing(&rental_match.listing_id)?.clone();
            require_party(principal, &trip, &listing)?;

            if state.booking_for_match(match_id).is_some() {
                return Err(LifecycleError::invalid_state(
                    "a booking references this match",
                ));
            }
            state.remove_match(match_id);
            Ok(())
        })?;
        info!(%match_id, "match deleted");
        Ok(())
    }

    /// Records the payment provider's authorization for the match. Renter
    /// only; called from the payment webhook glue.
    pub fn record_payment_authorization(
        &self,
        principal: &Principal,
        match_id: &MatchId,
        payment_method_id: PaymentMethodId,
    ) -> Result<RentalMatch, LifecycleError> {
        self.store.run_in_transaction(|state| {
            let rental_match = state.expect_match(match_id)?.clone();
            let trip = state.expect_trip(&rental_match.trip_id)?;
            if trip.renter_id != principal.user_id && !principal.is_admin() {
                return Err(LifecycleError::unauthorized(
                    "only the renter may authorize payment for this match",
                ));
            }

            state.update_match(match_id, |m| {
                m.payment_method_id = Some(payment_method_id);
                m.payment_authorized_at = Some(Utc::now());
            })?;
            state.expect_match(match_id).cloned()
        })
    }
}

fn require_party(
    principal: &Principal,
    trip: &Trip,
    listing: &Listing,
) -> Result<(), LifecycleError> {
    if principal.user_id == trip.renter_id
        || principal.user_id == listing.host_id
        || principal.is_admin()
    {
        Ok(())
    } else {
        Err(LifecycleError::unauthorized(
            "not a party to this trip or listing",
        ))
    }
}
