use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::warn;

use super::domain::{
    Booking, BookingId, BookingModification, HousingRequest, HousingRequestId, Lease, LeaseId,
    Listing, ListingId, MatchId, ModificationId, Notification, NotificationAction, NotificationId,
    PaymentModification, RentPayment, RentPaymentId, RentalMatch, Review, ReviewId, Trip, TripId,
    UserId,
};
use super::error::LifecycleError;

/// Insert rejected because a match already exists for the (trip, listing)
/// pair. Carries the surviving row so callers can resolve by re-reading.
#[derive(Debug)]
pub struct MatchConflict {
    pub existing: MatchId,
}

/// Insert rejected because a booking already exists for the match.
#[derive(Debug)]
pub struct BookingConflict {
    pub existing: BookingId,
}

/// All persisted rows, one map per entity. A transaction works on a clone of
/// this value, so a failed transaction leaves the committed state untouched.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    trips: BTreeMap<TripId, Trip>,
    listings: BTreeMap<ListingId, Listing>,
    housing_requests: BTreeMap<HousingRequestId, HousingRequest>,
    matches: BTreeMap<MatchId, RentalMatch>,
    leases: BTreeMap<LeaseId, Lease>,
    bookings: BTreeMap<BookingId, Booking>,
    rent_payments: BTreeMap<RentPaymentId, RentPayment>,
    reviews: BTreeMap<ReviewId, Review>,
    booking_modifications: BTreeMap<ModificationId, BookingModification>,
    payment_modifications: BTreeMap<ModificationId, PaymentModification>,
    notifications: BTreeMap<NotificationId, Notification>,
    sequence: u64,
}

impl StoreState {
    /// Issues the next identifier for the given entity prefix. Allocation
    /// happens inside the transaction copy, so rolled-back ids are reused.
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{:06}", self.sequence)
    }

    // --- trips & listings (read-only collaborators, seeded externally) ---

    pub fn insert_trip(&mut self, trip: Trip) {
        self.trips.insert(trip.id.clone(), trip);
    }

    pub fn insert_listing(&mut self, listing: Listing) {
        self.listings.insert(listing.id.clone(), listing);
    }

    pub fn trip(&self, id: &TripId) -> Option<&Trip> {
        self.trips.get(id)
    }

    pub fn listing(&self, id: &ListingId) -> Option<&Listing> {
        self.listings.get(id)
    }

    pub fn expect_trip(&self, id: &TripId) -> Result<&Trip, LifecycleError> {
        self.trip(id)
            .ok_or_else(|| LifecycleError::not_found(format!("trip {id}")))
    }

    pub fn expect_listing(&self, id: &ListingId) -> Result<&Listing, LifecycleError> {
        self.listing(id)
            .ok_or_else(|| LifecycleError::not_found(format!("listing {id}")))
    }

    // --- housing requests ---

    pub fn insert_housing_request(&mut self, request: HousingRequest) {
        self.housing_requests.insert(request.id.clone(), request);
    }

    pub fn housing_request(&self, id: &HousingRequestId) -> Option<&HousingRequest> {
        self.housing_requests.get(id)
    }

    pub fn expect_housing_request(
        &self,
        id: &HousingRequestId,
    ) -> Result<&HousingRequest, LifecycleError> {
        self.housing_request(id)
            .ok_or_else(|| LifecycleError::not_found(format!("housing request {id}")))
    }

    pub fn update_housing_request(
        &mut self,
        id: &HousingRequestId,
        apply: impl FnOnce(&mut HousingRequest),
    ) -> Result<(), LifecycleError> {
        let request = self
            .housing_requests
            .get_mut(id)
            .ok_or_else(|| LifecycleError::not_found(format!("housing request {id}")))?;
        apply(request);
        Ok(())
    }

    pub fn remove_housing_request(&mut self, id: &HousingRequestId) -> Option<HousingRequest> {
        self.housing_requests.remove(id)
    }

    pub fn housing_request_for_pair(
        &self,
        trip_id: &TripId,
        listing_id: &ListingId,
    ) -> Option<&HousingRequest> {
        self.housing_requests
            .values()
            .find(|request| &request.trip_id == trip_id && &request.listing_id == listing_id)
    }

    pub fn housing_requests_for_listing(&self, listing_id: &ListingId) -> Vec<&HousingRequest> {
        self.housing_requests
            .values()
            .filter(|request| &request.listing_id == listing_id)
            .collect()
    }

    /// Open means no match exists yet for the request's (trip, listing) pair,
    /// independent of the request's approval state.
    pub fn is_open_request(&self, request: &HousingRequest) -> bool {
        self.match_for_pair(&request.trip_id, &request.listing_id)
            .is_none()
    }

    pub fn open_requests_for_trip(&self, trip_id: &TripId) -> u32 {
        self.housing_requests
            .values()
            .filter(|request| &request.trip_id == trip_id && self.is_open_request(request))
            .count() as u32
    }

    pub fn open_requests_for_renter(&self, renter_id: &UserId) -> u32 {
        self.housing_requests
            .values()
            .filter(|request| &request.renter_id == renter_id && self.is_open_request(request))
            .count() as u32
    }

    pub fn open_requests(&self, renter_id: &UserId) -> Vec<&HousingRequest> {
        self.housing_requests
            .values()
            .filter(|request| &request.renter_id == renter_id && self.is_open_request(request))
            .collect()
    }

    // --- matches ---

    /// Enforces the storage-level unique constraint on (trip_id, listing_id).
    pub fn insert_match(&mut self, rental_match: RentalMatch) -> Result<(), MatchConflict> {
        if let Some(existing) =
            self.match_for_pair(&rental_match.trip_id, &rental_match.listing_id)
        {
            return Err(MatchConflict {
                existing: existing.id.clone(),
            });
        }
        self.matches.insert(rental_match.id.clone(), rental_match);
        Ok(())
    }

    pub fn rental_match(&self, id: &MatchId) -> Option<&RentalMatch> {
        self.matches.get(id)
    }

    pub fn expect_match(&self, id: &MatchId) -> Result<&RentalMatch, LifecycleError> {
        self.rental_match(id)
            .ok_or_else(|| LifecycleError::not_found(format!("match {id}")))
    }

    pub fn update_match(
        &mut self,
        id: &MatchId,
        apply: impl FnOnce(&mut RentalMatch),
    ) -> Result<(), LifecycleError> {
        let rental_match = self
            .matches
            .get_mut(id)
            .ok_or_else(|| LifecycleError::not_found(format!("match {id}")))?;
        apply(rental_match);
        Ok(())
    }

    pub fn remove_match(&mut self, id: &MatchId) -> Option<RentalMatch> {
        self.matches.remove(id)
    }

    pub fn match_for_pair(&self, trip_id: &TripId, listing_id: &ListingId) -> Option<&RentalMatch> {
        self.matches
            .values()
            .find(|m| &m.trip_id == trip_id && &m.listing_id == listing_id)
    }

    pub fn matches(&self) -> impl Iterator<Item = &RentalMatch> {
        self.matches.values()
    }

    // --- leases ---

    pub fn insert_lease(&mut self, lease: Lease) {
        self.leases.insert(lease.id.clone(), lease);
    }

    pub fn lease(&self, id: &LeaseId) -> Option<&Lease> {
        self.leases.get(id)
    }

    pub fn expect_lease(&self, id: &LeaseId) -> Result<&Lease, LifecycleError> {
        self.lease(id)
            .ok_or_else(|| LifecycleError::not_found(format!("lease {id}")))
    }

    pub fn update_lease(
        &mut self,
        id: &LeaseId,
        apply: impl FnOnce(&mut Lease),
    ) -> Result<(), LifecycleError> {
        let lease = self
            .leases
            .get_mut(id)
            .ok_or_else(|| LifecycleError::not_found(format!("lease {id}")))?;
        apply(lease);
        Ok(())
    }

    pub fn remove_lease(&mut self, id: &LeaseId) -> Option<Lease> {
        self.leases.remove(id)
    }

    pub fn lease_for_match(&self, match_id: &MatchId) -> Option<&Lease> {
        self.leases.values().find(|lease| &lease.match_id == match_id)
    }

    // --- bookings ---

    /// Enforces the storage-level unique constraint on match_id, and mirrors
    /// the relation onto the owning match's booking reference.
    pub fn insert_booking(&mut self, booking: Booking) -> Result<(), BookingConflict> {
        if let Some(existing) = self.booking_for_match(&booking.match_id) {
            return Err(BookingConflict {
                existing: existing.id.clone(),
            });
        }
        if let Some(owning) = self.matches.get_mut(&booking.match_id) {
            owning.booking_id = Some(booking.id.clone());
        }
        self.bookings.insert(booking.id.clone(), booking);
        Ok(())
    }

    pub fn booking(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.get(id)
    }

    pub fn expect_booking(&self, id: &BookingId) -> Result<&Booking, LifecycleError> {
        self.booking(id)
            .ok_or_else(|| LifecycleError::not_found(format!("booking {id}")))
    }

    pub fn update_booking(
        &mut self,
        id: &BookingId,
        apply: impl FnOnce(&mut Booking),
    ) -> Result<(), LifecycleError> {
        let booking = self
            .bookings
            .get_mut(id)
            .ok_or_else(|| LifecycleError::not_found(format!("booking {id}")))?;
        apply(booking);
        Ok(())
    }

    /// Removes the row and nulls the owning match's booking reference, the
    /// relation handling a foreign-key-backed store would perform.
    pub fn remove_booking(&mut self, id: &BookingId) -> Option<Booking> {
        let booking = self.bookings.remove(id)?;
        if let Some(owning) = self.matches.get_mut(&booking.match_id) {
            if owning.booking_id.as_ref() == Some(id) {
                owning.booking_id = None;
            }
        }
        Some(booking)
    }

    pub fn booking_for_match(&self, match_id: &MatchId) -> Option<&Booking> {
        self.bookings
            .values()
            .find(|booking| &booking.match_id == match_id)
    }

    pub fn bookings_for_renter(&self, renter_id: &UserId) -> Vec<&Booking> {
        self.bookings
            .values()
            .filter(|booking| &booking.renter_id == renter_id)
            .collect()
    }

    pub fn bookings_for_listing(&self, listing_id: &ListingId) -> Vec<&Booking> {
        self.bookings
            .values()
            .filter(|booking| &booking.listing_id == listing_id)
            .collect()
    }

    // --- rent payments ---

    pub fn insert_rent_payment(&mut self, payment: RentPayment) {
        self.rent_payments.insert(payment.id.clone(), payment);
    }

    pub fn rent_payment(&self, id: &RentPaymentId) -> Option<&RentPayment> {
        self.rent_payments.get(id)
    }

    pub fn expect_rent_payment(&self, id: &RentPaymentId) -> Result<&RentPayment, LifecycleError> {
        self.rent_payment(id)
            .ok_or_else(|| LifecycleError::not_found(format!("rent payment {id}")))
    }

    pub fn update_rent_payment(
        &mut self,
        id: &RentPaymentId,
        apply: impl FnOnce(&mut RentPayment),
    ) -> Result<(), LifecycleError> {
        let payment = self
            .rent_payments
            .get_mut(id)
            .ok_or_else(|| LifecycleError::not_found(format!("rent payment {id}")))?;
        apply(payment);
        Ok(())
    }

    pub fn remove_rent_payment(&mut self, id: &RentPaymentId) -> Option<RentPayment> {
        self.rent_payments.remove(id)
    }

    pub fn rent_payments_for_booking(&self, booking_id: &BookingId) -> Vec<&RentPayment> {
        let mut payments: Vec<&RentPayment> = self
            .rent_payments
            .values()
            .filter(|payment| &payment.booking_id == booking_id)
            .collect();
        payments.sort_by_key(|payment| payment.due_date);
        payments
    }

    // --- reviews ---

    pub fn insert_review(&mut self, review: Review) {
        self.reviews.insert(review.id.clone(), review);
    }

    pub fn reviews_for_booking(&self, booking_id: &BookingId) -> Vec<&Review> {
        self.reviews
            .values()
            .filter(|review| &review.booking_id == booking_id)
            .collect()
    }

    pub fn remove_review(&mut self, id: &ReviewId) -> Option<Review> {
        self.reviews.remove(id)
    }

    // --- modifications ---

    pub fn insert_booking_modification(&mut self, record: BookingModification) {
        self.booking_modifications.insert(record.id.clone(), record);
    }

    pub fn booking_modification(&self, id: &ModificationId) -> Option<&BookingModification> {
        self.booking_modifications.get(id)
    }

    pub fn save_booking_modification(&mut self, record: BookingModification) {
        self.booking_modifications.insert(record.id.clone(), record);
    }

    pub fn remove_booking_modification(&mut self, id: &ModificationId) -> Option<BookingModification> {
        self.booking_modifications.remove(id)
    }

    pub fn booking_modifications(&self) -> impl Iterator<Item = &BookingModification> {
        self.booking_modifications.values()
    }

    pub fn insert_payment_modification(&mut self, record: PaymentModification) {
        self.payment_modifications.insert(record.id.clone(), record);
    }

    pub fn payment_modification(&self, id: &ModificationId) -> Option<&PaymentModification> {
        self.payment_modifications.get(id)
    }

    pub fn save_payment_modification(&mut self, record: PaymentModification) {
        self.payment_modifications.insert(record.id.clone(), record);
    }

    pub fn remove_payment_modification(&mut self, id: &ModificationId) -> Option<PaymentModification> {
        self.payment_modifications.remove(id)
    }

    pub fn payment_modifications(&self) -> impl Iterator<Item = &PaymentModification> {
        self.payment_modifications.values()
    }

    // --- notifications ---

    pub fn insert_notification(&mut self, notification: Notification) {
        self.notifications
            .insert(notification.id.clone(), notification);
    }

    pub fn notifications_for_user(&self, user_id: &UserId) -> Vec<&Notification> {
        self.notifications
            .values()
            .filter(|notification| &notification.user_id == user_id)
            .collect()
    }

    /// Removes every notification whose action points at the given record id.
    /// Removing zero rows is not an error.
    pub fn remove_notifications_for_action(&mut self, action_id: &str) {
        self.notifications
            .retain(|_, notification| notification.action.action_id() != action_id);
    }

    /// Removes notifications whose action matches the predicate, for undo
    /// flows that reverse one event without touching its neighbors.
    pub fn remove_notifications_where(&mut self, matched: impl Fn(&NotificationAction) -> bool) {
        self.notifications
            .retain(|_, notification| !matched(&notification.action));
    }
}

/// In-memory realization of the transactional persistence collaborator.
///
/// `run_in_transaction` gives all-or-nothing semantics: the closure mutates a
/// working copy of the state which replaces the committed state only when the
/// closure returns `Ok`.
#[derive(Debug, Default)]
pub struct MarketplaceStore {
    state: Mutex<StoreState>,
}

impl MarketplaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_in_transaction<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| LifecycleError::Consistency("store mutex poisoned".to_string()))?;
        let mut working = guard.clone();
        let value = f(&mut working)?;
        *guard = working;
        Ok(value)
    }

    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T, LifecycleError> {
        let guard = self
            .state
            .lock()
            .map_err(|_| LifecycleError::Consistency("store mutex poisoned".to_string()))?;
        Ok(f(&guard))
    }

    /// Read path for dashboards: degrades to the default value instead of
    /// surfacing an error, so aggregation views render rather than crash.
    pub fn read_or_default<T: Default>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        match self.read(f) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "store read degraded to empty result");
                T::default()
            }
        }
    }

    /// Seeds externally owned rows (trips, listings, reviews) outside any
    /// lifecycle operation.
    pub fn seed(&self, f: impl FnOnce(&mut StoreState)) {
        if let Err(err) = self.run_in_transaction(|state| {
            f(state);
            Ok(())
        }) {
            warn!(error = %err, "store seeding failed");
        }
    }
}
