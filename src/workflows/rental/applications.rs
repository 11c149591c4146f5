use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::config::ApplicationQuotas;

use super::domain::{
    HousingRequest, HousingRequestId, HousingRequestStatus, ListingId, NotificationAction,
    Principal, RentalMatch, TripId,
};
use super::error::LifecycleError;
use super::matching::find_or_create_match;
use super::notifications::{self, NotificationDispatcher};
use super::pricing::PricingRule;
use super::store::MarketplaceStore;

/// Intake and approval workflow for housing requests (rental applications).
///
/// Quota accounting counts only open requests, i.e. requests whose (trip,
/// listing) pair has no match yet; a host's approval therefore immediately
/// frees capacity for the renter to apply elsewhere.
pub struct ApplicationManager<D> {
    store: Arc<MarketplaceStore>,
    dispatcher: Arc<D>,
    pricing: Arc<dyn PricingRule>,
    quotas: ApplicationQuotas,
}

impl<D> ApplicationManager<D>
where
    D: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<MarketplaceStore>,
        dispatcher: Arc<D>,
        pricing: Arc<dyn PricingRule>,
        quotas: ApplicationQuotas,
    ) -> Self {
        Self {
            store,
            dispatcher,
            pricing,
            quotas,
        }
    }

    /// Submits a new application for (trip, listing), enforcing the self-
    /// application ban, date presence, and both open-request quotas.
    pub fn create(
        &self,
        principal: &Principal,
        trip_id: &TripId,
        listing_id: &ListingId,
    ) -> Result<HousingRequest, LifecycleError> {
        let quotas = self.quotas;
        let created = self.store.run_in_transaction(|state| {
            let trip = state.expect_trip(trip_id)?.clone();
            let listing = state.expect_listing(listing_id)?.clone();

            if trip.renter_id != principal.user_id {
                return Err(LifecycleError::unauthorized(
                    "only the trip owner may apply with it",
                ));
            }
            if trip.renter_id == listing.host_id {
                return Err(LifecycleError::validation(
                    "cannot apply to your own listing",
                ));
            }
            if trip.start_date.is_none() || trip.end_date.is_none() {
                return Err(LifecycleError::validation(
                    "trip must have a start and end date before applying",
                ));
            }
            if state.housing_request_for_pair(trip_id, listing_id).is_some() {
                return Err(LifecycleError::invalid_state(
                    "an application already exists for this trip and listing",
                ));
            }

            let trip_open = state.open_requests_for_trip(trip_id);
            let renter_open = state.open_requests_for_renter(&trip.renter_id);
            if trip_open >= quotas.per_trip || renter_open >= quotas.per_renter {
                return Err(LifecycleError::QuotaExceeded {
                    trip_open,
                    renter_open,
                    per_trip_limit: quotas.per_trip,
                    global_limit: quotas.per_renter,
                });
            }

            let request = HousingRequest {
                id: HousingRequestId(state.next_id("hr")),
                trip_id: trip_id.clone(),
                listing_id: listing_id.clone(),
                renter_id: trip.renter_id.clone(),
                status: HousingRequestStatus::Pending,
                lease_document_id: None,
                submitted_at: Utc::now(),
            };
            state.insert_housing_request(request.clone());
            Ok((request, listing))
        })?;

        let (request, listing) = created;
        notifications::send(
            &self.store,
            self.dispatcher.as_ref(),
            listing.host_id.clone(),
            format!("New application for \"{}\".", listing.title),
            format!("/app/host/{}/applications/{}", listing.id, request.id),
            NotificationAction::ApplicationReceived {
                housing_request_id: request.id.clone(),
            },
        );
        Ok(request)
    }

    /// Approves a pending request. One atomic unit: status update, match
    /// find-or-create with the computed rent, and lease-document copy.
    pub fn approve(
        &self,
        principal: &Principal,
        request_id: &HousingRequestId,
    ) -> Result<(HousingRequest, RentalMatch), LifecycleError> {
        let pricing = self.pricing.clone();
        let (request, rental_match, listing) = self.store.run_in_transaction(|state| {
            let request = state.expect_housing_request(request_id)?.clone();
            let listing = state.expect_listing(&request.listing_id)?.clone();
            let trip = state.expect_trip(&request.trip_id)?.clone();

            if listing.host_id != principal.user_id {
                return Err(LifecycleError::unauthorized(
                    "only the listing owner may approve this application",
                ));
            }
            if request.status != HousingRequestStatus::Pending {
                return Err(LifecycleError::invalid_state(
                    "application is no longer pending",
                ));
            }

            state.update_housing_request(request_id, |r| {
                r.status = HousingRequestStatus::Approved;
            })?;

            let monthly_rent = pricing
                .calculate_rent(&listing, &trip)
                .map_err(|err| LifecycleError::validation(err.to_string()))?;
            let rental_match = find_or_create_match(state, &trip, &listing, monthly_rent)?;

            if let Some(document_id) = request.lease_document_id.clone() {
                state.update_match(&rental_match.id, |m| {
                    m.lease_document_id = Some(document_id);
                })?;
            }

            let request = state.expect_housing_request(request_id)?.clone();
            let rental_match = state.expect_match(&rental_match.id)?.clone();
            Ok((request, rental_match, listing))
        })?;

        info!(request = %request.id, r#match = %rental_match.id, "application approved");
        notifications::send(
            &self.store,
            self.dispatcher.as_ref(),
            request.renter_id.clone(),
            format!("Your application for \"{}\" was approved.", listing.title),
            format!("/app/rent/match/{}", rental_match.id),
            NotificationAction::ApplicationApproved {
                housing_request_id: request.id.clone(),
                match_id: rental_match.id.clone(),
            },
        );
        Ok((request, rental_match))
    }

    /// Declines a pending request.
    pub fn decline(
        &self,
        principal: &Principal,
        request_id: &HousingRequestId,
    ) -> Result<HousingRequest, LifecycleError> {
        let (request, listing) = self.store.run_in_transaction(|state| {
            let request = state.expect_housing_request(request_id)?.clone();
            let listing = state.expect_listing(&request.listing_id)?.clone();

            if listing.host_id != principal.user_id {
                return Err(LifecycleError::unauthorized(
                    "only the listing owner may decline this application",
                ));
            }
            if request.status != HousingRequestStatus::Pending {
                return Err(LifecycleError::invalid_state(
                    "application is no longer pending",
                ));
            }

            state.update_housing_request(request_id, |r| {
                r.status = HousingRequestStatus::Declined;
            })?;
            let request = state.expect_housing_request(request_id)?.clone();
            Ok((request, listing))
        })?;

        notifications::send(
            &self.store,
            self.dispatcher.as_ref(),
            request.renter_id.clone(),
            format!("Your application for \"{}\" was declined.", listing.title),
            format!("/app/rent/searches/{}", request.trip_id),
            NotificationAction::ApplicationDeclined {
                housing_request_id: request.id.clone(),
            },
        );
        Ok(request)
    }

    /// Reverses an approval while that is still possible. Refused once a
    /// booking exists for the match. One atomic unit: lease delete, match
    /// delete, status reset, lease-document clear, notification cleanup.
    pub fn undo_approval(
        &self,
        principal: &Principal,
        request_id: &HousingRequestId,
    ) -> Result<HousingRequest, LifecycleError> {
        self.store.run_in_transaction(|state| {
            let request = state.expect_housing_request(request_id)?.clone();
            let listing = state.expect_listing(&request.listing_id)?.clone();

            if listing.host_id != principal.user_id {
                return Err(LifecycleError::unauthorized(
                    "only the listing owner may undo this approval",
                ));
            }
            if request.status != HousingRequestStatus::Approved {
                return Err(LifecycleError::invalid_state("application is not approved"));
            }

            if let Some(rental_match) = state
                .match_for_pair(&request.trip_id, &request.listing_id)
                .cloned()
            {
                if state.booking_for_match(&rental_match.id).is_some() {
                    return Err(LifecycleError::invalid_state(
                        "a booking already exists for this match",
                    ));
                }
                if let Some(lease) = state.lease_for_match(&rental_match.id).cloned() {
                    state.remove_lease(&lease.id);
                }
                state.remove_match(&rental_match.id);
            }

            state.update_housing_request(request_id, |r| {
                r.status = HousingRequestStatus::Pending;
                r.lease_document_id = None;
            })?;
            // Only the approval notification is reversed; the host's intake
            // notification stays.
            state.remove_notifications_where(|action| {
                matches!(
                    action,
                    NotificationAction::ApplicationApproved { housing_request_id, .. }
                        if housing_request_id == request_id
                )
            });
            state.expect_housing_request(request_id).cloned()
        })
    }

    /// Reverses a decline, resetting the request to pending and removing the
    /// decline notification.
    pub fn undo_decline(
        &self,
        principal: &Principal,
        request_id: &HousingRequestId,
    ) -> Result<HousingRequest, LifecycleError> {
        self.store.run_in_transaction(|state| {
            let request = state.expect_housing_request(request_id)?.clone();
            let listing = state.expect_listing(&request.listing_id)?;

            if listing.host_id != principal.user_id {
                return Err(LifecycleError::unauthorized(
                    "only the listing owner may undo this decline",
                ));
            }
            if request.status != HousingRequestStatus::Declined {
                return Err(LifecycleError::invalid_state("application is not declined"));
            }

            state.update_housing_request(request_id, |r| {
                r.status = HousingRequestStatus::Pending;
            })?;
            state.remove_notifications_where(|action| {
                matches!(
                    action,
                    NotificationAction::ApplicationDeclined { housing_request_id }
                        if housing_request_id == request_id
                )
            });
            state.expect_housing_request(request_id).cloned()
        })
    }

    /// Withdraws (deletes) an application along with any notification
    /// referencing it. A missing notification is not an error.
    pub fn withdraw(
        &self,
        principal: &Principal,
        request_id: &HousingRequestId,
    ) -> Result<(), LifecycleError> {
        self.store.run_in_transaction(|state| {
            let request = state.expect_housing_request(request_id)?.clone();
            if request.renter_id != principal.user_id && !principal.is_admin() {
                return Err(LifecycleError::unauthorized(
                    "only the applicant may withdraw this application",
                ));
            }
            state.remove_housing_request(request_id);
            state.remove_notifications_for_action(&request_id.0);
            Ok(())
        })
    }
}
