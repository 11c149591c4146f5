use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{Lease, LeaseId, MatchId, Principal, RentalMatch, UserId};
use super::error::LifecycleError;
use super::store::{MarketplaceStore, StoreState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerRole {
    Landlord,
    Tenant,
}

/// Links a match to its lease document and tracks signature state.
pub struct LeaseOrchestrator {
    store: Arc<MarketplaceStore>,
}

impl LeaseOrchestrator {
    pub fn new(store: Arc<MarketplaceStore>) -> Self {
        Self { store }
    }

    /// Creates the lease row keyed by the e-signature vendor's document id.
    /// One lease per match; landlord and primary tenant are derived from the
    /// match's listing and trip.
    pub fn create_for_match(
        &self,
        principal: &Principal,
        document_id: LeaseId,
        match_id: &MatchId,
        secondary_tenant_id: Option<UserId>,
    ) -> Result<Lease, LifecycleError> {
        let lease = self.store.run_in_transaction(|state| {
            let rental_match = state.expect_match(match_id)?.clone();
            let listing = state.expect_listing(&rental_match.listing_id)?.clone();
            let trip = state.expect_trip(&rental_match.trip_id)?.clone();

            if principal.user_id != listing.host_id
                && principal.user_id != trip.renter_id
                && !principal.is_admin()
            {
                return Err(LifecycleError::unauthorized(
                    "not a party to this match",
                ));
            }
            if state.lease_for_match(match_id).is_some() {
                return Err(LifecycleError::invalid_state(
                    "a lease already exists for this match",
                ));
            }

            let lease = Lease {
                id: document_id.clone(),
                match_id: match_id.clone(),
                landlord_id: listing.host_id,
                primary_tenant_id: trip.renter_id,
                secondary_tenant_id,
                landlord_signed: false,
                tenant_signed: false,
            };
            state.insert_lease(lease.clone());
            state.update_match(match_id, |m| {
                m.lease_document_id = Some(document_id.clone());
            })?;
            Ok(lease)
        })?;

        info!(lease = %lease.id, r#match = %match_id, "lease created");
        Ok(lease)
    }

    /// Records a signature for the given role. Driven by the e-signature
    /// vendor's completion webhook; the signer must be the named party.
    pub fn record_signature(
        &self,
        principal: &Principal,
        document_id: &LeaseId,
        role: SignerRole,
    ) -> Result<Lease, LifecycleError> {
        self.store.run_in_transaction(|state| {
            let lease = state.expect_lease(document_id)?.clone();
            let expected_signer = match role {
                SignerRole::Landlord => &lease.landlord_id,
                SignerRole::Tenant => &lease.primary_tenant_id,
            };
            if principal.user_id != *expected_signer && !principal.is_admin() {
                return Err(LifecycleError::unauthorized(
                    "only the named signer may sign this lease",
                ));
            }

            state.update_lease(document_id, |l| match role {
                SignerRole::Landlord => l.landlord_signed = true,
                SignerRole::Tenant => l.tenant_signed = true,
            })?;
            state.expect_lease(document_id).cloned()
        })
    }

    pub fn is_signed(
        &self,
        document_id: &LeaseId,
        role: SignerRole,
    ) -> Result<bool, LifecycleError> {
        self.store.read(|state| {
            state.lease(document_id).map(|lease| match role {
                SignerRole::Landlord => lease.landlord_signed,
                SignerRole::Tenant => lease.tenant_signed,
            })
        })?
        .ok_or_else(|| LifecycleError::not_found(format!("lease {document_id}")))
    }

    pub fn set_secondary_tenant(
        &self,
        principal: &Principal,
        document_id: &LeaseId,
        secondary_tenant_id: Option<UserId>,
    ) -> Result<Lease, LifecycleError> {
        self.store.run_in_transaction(|state| {
            let lease = state.expect_lease(document_id)?.clone();
            if principal.user_id != lease.landlord_id
                && principal.user_id != lease.primary_tenant_id
                && !principal.is_admin()
            {
                return Err(LifecycleError::unauthorized("not a party to this lease"));
            }
            state.update_lease(document_id, |l| {
                l.secondary_tenant_id = secondary_tenant_id;
            })?;
            state.expect_lease(document_id).cloned()
        })
    }

    /// Whether the match can be converted into a booking.
    pub fn ready_to_book(
        &self,
        match_id: &MatchId,
        require_landlord_signature: bool,
    ) -> Result<bool, LifecycleError> {
        self.store.read(|state| {
            let Some(rental_match) = state.rental_match(match_id) else {
                return false;
            };
            match_is_bookable(state, rental_match, require_landlord_signature)
        })
    }
}

/// Payment authorized on the match, tenant signed, and (for the batch
/// conversion path) landlord signed.
pub(crate) fn match_is_bookable(
    state: &StoreState,
    rental_match: &RentalMatch,
    require_landlord_signature: bool,
) -> bool {
    if rental_match.payment_authorized_at.is_none() {
        return false;
    }
    match state.lease_for_match(&rental_match.id) {
        Some(lease) => {
            lease.tenant_signed && (!require_landlord_signature || lease.landlord_signed)
        }
        None => false,
    }
}
