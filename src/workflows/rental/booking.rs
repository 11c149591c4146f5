use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppEnvironment;

use super::domain::{
    Booking, BookingId, BookingStatus, MatchId, NotificationAction, Principal,
};
use super::error::LifecycleError;
use super::leasing::match_is_bookable;
use super::notifications::{self, NotificationDispatcher};
use super::schedule::generate_rent_payments;
use super::store::MarketplaceStore;

/// Result of a batch completion sweep. Per-item failures are recorded and
/// logged, never aborting the rest of the batch.
#[derive(Debug, Default, Serialize)]
pub struct SweepOutcome {
    pub created: Vec<BookingId>,
    pub skipped: Vec<SkippedMatch>,
}

#[derive(Debug, Serialize)]
pub struct SkippedMatch {
    pub match_id: MatchId,
    pub reason: String,
}

/// Turns completed matches into bookings and their rent-payment schedules.
pub struct BookingFactory<D> {
    store: Arc<MarketplaceStore>,
    dispatcher: Arc<D>,
    environment: AppEnvironment,
}

impl<D> BookingFactory<D>
where
    D: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<MarketplaceStore>,
        dispatcher: Arc<D>,
        environment: AppEnvironment,
    ) -> Self {
        Self {
            store,
            dispatcher,
            environment,
        }
    }

    /// Creates the booking and its full rent schedule from a match, in one
    /// atomic unit. Validation happens before any write; calling again for a
    /// match that already has a booking returns the existing booking.
    pub fn create_from_match(
        &self,
        principal: &Principal,
        match_id: &MatchId,
    ) -> Result<Booking, LifecycleError> {
        let (booking, listing, created) = self.store.run_in_transaction(|state| {
            let rental_match = state.expect_match(match_id)?.clone();
            let trip = state.expect_trip(&rental_match.trip_id)?.clone();
            let listing = state.expect_listing(&rental_match.listing_id)?.clone();

            if principal.user_id != trip.renter_id
                && principal.user_id != listing.host_id
                && !principal.is_admin()
            {
                return Err(LifecycleError::unauthorized("not a party to this match"));
            }

            if let Some(existing) = state.booking_for_match(match_id) {
                return Ok((existing.clone(), listing, false));
            }

            let monthly_rent = rental_match.monthly_rent.ok_or_else(|| {
                LifecycleError::validation("match has no agreed monthly rent")
            })?;
            let payment_method_id = rental_match.payment_method_id.clone().ok_or_else(|| {
                LifecycleError::validation("no payment method on file for this match")
            })?;
            if rental_match.payment_authorized_at.is_none() {
                return Err(LifecycleError::invalid_state(
                    "payment has not been authorized for this match",
                ));
            }
            let (Some(start_date), Some(end_date)) = (trip.start_date, trip.end_date) else {
                return Err(LifecycleError::validation(
                    "trip has no confirmed date range",
                ));
            };

            let booking = Booking {
                id: BookingId(state.next_id("booking")),
                match_id: match_id.clone(),
                trip_id: trip.id.clone(),
                listing_id: listing.id.clone(),
                renter_id: trip.renter_id.clone(),
                start_date,
                end_date,
                monthly_rent,
                status: BookingStatus::Confirmed,
                move_in_completed_at: None,
            };

            let payments = generate_rent_payments(
                &booking.id,
                monthly_rent,
                start_date,
                end_date,
                &payment_method_id,
                Utc::now(),
            )?;

            if let Err(conflict) = state.insert_booking(booking.clone()) {
                // Lost a race on the match uniqueness constraint.
                return state
                    .expect_booking(&conflict.existing)
                    .cloned()
                    .map(|existing| (existing, listing, false));
            }
            for payment in payments {
                state.insert_rent_payment(payment);
            }
            Ok((booking, listing, true))
        })?;

        if created {
            info!(booking = %booking.id, r#match = %match_id, "booking created");
            notifications::send(
                &self.store,
                self.dispatcher.as_ref(),
                listing.host_id.clone(),
                format!("A booking was confirmed for \"{}\".", listing.title),
                format!("/app/host/{}/bookings/{}", listing.id, booking.id),
                NotificationAction::BookingConfirmed {
                    booking_id: booking.id.clone(),
                },
            );
        }
        Ok(booking)
    }

    /// Scans for matches that are payment-authorized and fully signed but
    /// have no booking yet, and creates one for each. One bad match does not
    /// block the rest.
    pub fn sweep_completed_matches(
        &self,
        principal: &Principal,
    ) -> Result<SweepOutcome, LifecycleError> {
        if !principal.is_admin() {
            return Err(LifecycleError::unauthorized(
                "only an administrator may run the completion sweep",
            ));
        }

        let candidates: Vec<MatchId> = self.store.read(|state| {
            state
                .matches()
                .filter(|m| {
                    m.booking_id.is_none() && match_is_bookable(state, m, true)
                })
                .map(|m| m.id.clone())
                .collect()
        })?;

        let mut outcome = SweepOutcome::default();
        for match_id in candidates {
            match self.create_from_match(principal, &match_id) {
                Ok(booking) => outcome.created.push(booking.id),
                Err(err) => {
                    warn!(r#match = %match_id, error = %err, "sweep skipped match");
                    outcome.skipped.push(SkippedMatch {
                        match_id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    /// Marks move-in complete: stamps the timestamp, flips the booking to
    /// active, and asks the renter to authorize the next rent payment. Does
    /// not charge anything itself.
    pub fn complete_move_in(
        &self,
        principal: &Principal,
        booking_id: &BookingId,
    ) -> Result<Booking, LifecycleError> {
        let (booking, listing, first_unpaid) = self.store.run_in_transaction(|state| {
            let booking = state.expect_booking(booking_id)?.clone();
            let listing = state.expect_listing(&booking.listing_id)?.clone();

            if principal.user_id != listing.host_id && !principal.is_admin() {
                return Err(LifecycleError::unauthorized(
                    "only the host or an administrator may complete move-in",
                ));
            }
            if booking.move_in_completed_at.is_some() {
                return Err(LifecycleError::invalid_state("move-in already completed"));
            }

            state.update_booking(booking_id, |b| {
                b.move_in_completed_at = Some(Utc::now());
                b.status = BookingStatus::Active;
            })?;

            let first_unpaid = state
                .rent_payments_for_booking(booking_id)
                .into_iter()
                .find(|payment| !payment.is_paid && payment.payment_authorized_at.is_none())
                .map(|payment| payment.id.clone());
            let booking = state.expect_booking(booking_id)?.clone();
            Ok((booking, listing, first_unpaid))
        })?;

        notifications::send(
            &self.store,
            self.dispatcher.as_ref(),
            booking.renter_id.clone(),
            format!(
                "Move-in for \"{}\" is complete. Please authorize your next rent payment.",
                listing.title
            ),
            format!("/app/rent/bookings/{}", booking.id),
            NotificationAction::MoveInCompleted {
                booking_id: booking.id.clone(),
                first_payment_id: first_unpaid,
            },
        );
        Ok(booking)
    }

    /// Deletes a booking and everything hanging off it, in FK-safe order:
    /// payment modifications, booking modifications, reviews, rent payments,
    /// then the booking row. The owning match survives; its booking reference
    /// must be null afterwards or the whole group rolls back.
    pub fn delete(
        &self,
        principal: &Principal,
        booking_id: &BookingId,
    ) -> Result<(), LifecycleError> {
        if !principal.is_admin() && self.environment != AppEnvironment::Development {
            return Err(LifecycleError::unauthorized(
                "only an administrator may delete a booking",
            ));
        }

        self.store.run_in_transaction(|state| {
            let booking = state.expect_booking(booking_id)?.clone();

            let payment_ids: Vec<_> = state
                .rent_payments_for_booking(booking_id)
                .into_iter()
                .map(|payment| payment.id.clone())
                .collect();

            let payment_mod_ids: Vec<_> = state
                .payment_modifications()
                .filter(|record| payment_ids.contains(&record.target_id))
                .map(|record| record.id.clone())
                .collect();
            for id in payment_mod_ids {
                state.remove_payment_modification(&id);
            }

            let booking_mod_ids: Vec<_> = state
                .booking_modifications()
                .filter(|record| &record.target_id == booking_id)
                .map(|record| record.id.clone())
                .collect();
            for id in booking_mod_ids {
                state.remove_booking_modification(&id);
            }

            let review_ids: Vec<_> = state
                .reviews_for_booking(booking_id)
                .into_iter()
                .map(|review| review.id.clone())
                .collect();
            for id in review_ids {
                state.remove_review(&id);
            }

            for id in payment_ids {
                state.remove_rent_payment(&id);
            }

            state.remove_booking(booking_id);

            // Post-condition on the storage layer's relation handling.
            let owning = state.expect_match(&booking.match_id)?;
            if owning.booking_id.is_some() {
                return Err(LifecycleError::Consistency(format!(
                    "match {} still references booking {} after deletion",
                    owning.id, booking_id
                )));
            }
            Ok(())
        })?;

        info!(booking = %booking_id, "booking deleted");
        Ok(())
    }
}
