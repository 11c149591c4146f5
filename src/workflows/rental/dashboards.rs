use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{
    Booking, HousingRequest, ListingId, Principal, RentPayment, UserId,
};
use super::error::LifecycleError;
use super::store::{MarketplaceStore, StoreState};

/// One booking with its payment-schedule rollup.
#[derive(Debug, Clone, Serialize)]
pub struct BookingOverview {
    pub booking: Booking,
    pub total_scheduled: u32,
    pub total_collected: u32,
    pub next_due_date: Option<NaiveDate>,
}

/// The host's view over one listing's pipeline.
#[derive(Debug, Default, Serialize)]
pub struct HostDashboard {
    pub pending_applications: Vec<HousingRequest>,
    pub bookings: Vec<BookingOverview>,
    pub awaiting_move_in: usize,
    pub pending_change_requests: usize,
}

/// The renter's view over everything they have in flight.
#[derive(Debug, Default, Serialize)]
pub struct RenterDashboard {
    pub open_applications: Vec<HousingRequest>,
    pub bookings: Vec<BookingOverview>,
    pub next_payment: Option<RentPayment>,
    pub pending_change_requests: usize,
}

/// Read-only aggregation views. These never mutate, and a degraded store read
/// yields an empty dashboard rather than an error page.
pub struct DashboardReader {
    store: Arc<MarketplaceStore>,
}

impl DashboardReader {
    pub fn new(store: Arc<MarketplaceStore>) -> Self {
        Self { store }
    }

    pub fn host_dashboard(
        &self,
        principal: &Principal,
        listing_id: &ListingId,
    ) -> Result<HostDashboard, LifecycleError> {
        let listing = self
            .store
            .read(|state| state.listing(listing_id).cloned())?
            .ok_or_else(|| LifecycleError::not_found(format!("listing {listing_id}")))?;
        if principal.user_id != listing.host_id && !principal.is_admin() {
            return Err(LifecycleError::unauthorized(
                "only the listing owner may view this dashboard",
            ));
        }

        Ok(self.store.read_or_default(|state| {
            let pending_applications = state
                .housing_requests_for_listing(listing_id)
                .into_iter()
                .filter(|request| state.is_open_request(request))
                .cloned()
                .collect();

            let bookings: Vec<BookingOverview> = state
                .bookings_for_listing(listing_id)
                .into_iter()
                .map(|booking| booking_overview(state, booking))
                .collect();
            let awaiting_move_in = bookings
                .iter()
                .filter(|overview| overview.booking.move_in_completed_at.is_none())
                .count();

            let pending_change_requests =
                pending_changes_for_user(state, &listing.host_id);

            HostDashboard {
                pending_applications,
                bookings,
                awaiting_move_in,
                pending_change_requests,
            }
        }))
    }

    pub fn renter_dashboard(
        &self,
        principal: &Principal,
        renter_id: &UserId,
    ) -> Result<RenterDashboard, LifecycleError> {
        if principal.user_id != *renter_id && !principal.is_admin() {
            return Err(LifecycleError::unauthorized(
                "users may only view their own dashboard",
            ));
        }

        Ok(self.store.read_or_default(|state| {
            let open_applications = state
                .open_requests(renter_id)
                .into_iter()
                .cloned()
                .collect();

            let bookings: Vec<BookingOverview> = state
                .bookings_for_renter(renter_id)
                .into_iter()
                .map(|booking| booking_overview(state, booking))
                .collect();

            let next_payment = bookings
                .iter()
                .flat_map(|overview| state.rent_payments_for_booking(&overview.booking.id))
                .filter(|payment| !payment.is_paid)
                .min_by_key(|payment| payment.due_date)
                .cloned();

            let pending_change_requests = pending_changes_for_user(state, renter_id);

            RenterDashboard {
                open_applications,
                bookings,
                next_payment,
                pending_change_requests,
            }
        }))
    }
}

fn booking_overview(state: &StoreState, booking: &Booking) -> BookingOverview {
    let payments = state.rent_payments_for_booking(&booking.id);
    let total_scheduled = payments.iter().map(|payment| payment.amount).sum();
    let total_collected = payments
        .iter()
        .filter(|payment| payment.is_paid)
        .map(|payment| payment.amount)
        .sum();
    let next_due_date = payments
        .iter()
        .find(|payment| !payment.is_paid)
        .map(|payment| payment.due_date);
    BookingOverview {
        booking: booking.clone(),
        total_scheduled,
        total_collected,
        next_due_date,
    }
}

fn pending_changes_for_user(state: &StoreState, user_id: &UserId) -> usize {
    state
        .booking_modifications()
        .filter(|record| &record.recipient_id == user_id && !record.status.is_terminal())
        .count()
        + state
            .payment_modifications()
            .filter(|record| &record.recipient_id == user_id && !record.status.is_terminal())
            .count()
}
