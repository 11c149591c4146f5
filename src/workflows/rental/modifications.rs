use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::domain::{
    BookingId, BookingModification, DateWindow, ModificationId, ModificationRecord,
    ModificationStatus, NotificationAction, PaymentModification, PaymentTerms, Principal,
    RentPaymentId, UserId,
};
use super::error::LifecycleError;
use super::notifications::{self, NotificationDispatcher};
use super::store::{MarketplaceStore, StoreState};

/// A record type the change-request workflow can operate on. Implementations
/// bind one target entity (its id and the values under negotiation) to the
/// shared propose/approve/reject state machine.
pub trait ModificationTarget {
    type TargetId: Clone + PartialEq + Display;
    type Values: Clone;

    /// Short noun for log lines and notification copy.
    const NOUN: &'static str;

    /// Rejects proposed values that could never be applied.
    fn validate(proposed: &Self::Values) -> Result<(), LifecycleError>;

    /// Rejects targets that must not accept new change requests. Reads only;
    /// existing requests against the target stay listable regardless.
    fn ensure_open_for_changes(
        _state: &StoreState,
        _target_id: &Self::TargetId,
    ) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Reads the target's live values and owning booking. The originals are
    /// captured from here at request time, not supplied by the caller.
    fn current(
        state: &StoreState,
        target_id: &Self::TargetId,
    ) -> Result<(Self::Values, BookingId), LifecycleError>;

    /// Writes the approved values onto the live target.
    fn apply(
        state: &mut StoreState,
        target_id: &Self::TargetId,
        approved: &Self::Values,
    ) -> Result<(), LifecycleError>;

    fn record(
        state: &StoreState,
        id: &ModificationId,
    ) -> Option<ModificationRecord<Self::TargetId, Self::Values>>;

    fn save(state: &mut StoreState, record: ModificationRecord<Self::TargetId, Self::Values>);

    fn all(state: &StoreState) -> Vec<ModificationRecord<Self::TargetId, Self::Values>>;

    fn requested_action(
        record: &ModificationRecord<Self::TargetId, Self::Values>,
    ) -> NotificationAction;

    fn approved_action(
        record: &ModificationRecord<Self::TargetId, Self::Values>,
    ) -> NotificationAction;

    fn declined_action(
        record: &ModificationRecord<Self::TargetId, Self::Values>,
    ) -> NotificationAction;
}

/// Change requests against a booking's occupancy window.
pub struct BookingDates;

impl ModificationTarget for BookingDates {
    type TargetId = BookingId;
    type Values = DateWindow;

    const NOUN: &'static str = "booking dates";

    fn validate(proposed: &DateWindow) -> Result<(), LifecycleError> {
        if proposed.end_date <= proposed.start_date {
            return Err(LifecycleError::validation(
                "end date must be after start date",
            ));
        }
        Ok(())
    }

    fn current(
        state: &StoreState,
        target_id: &BookingId,
    ) -> Result<(DateWindow, BookingId), LifecycleError> {
        let booking = state.expect_booking(target_id)?;
        Ok((
            DateWindow {
                start_date: booking.start_date,
                end_date: booking.end_date,
            },
            booking.id.clone(),
        ))
    }

    fn apply(
        state: &mut StoreState,
        target_id: &BookingId,
        approved: &DateWindow,
    ) -> Result<(), LifecycleError> {
        state.update_booking(target_id, |booking| {
            booking.start_date = approved.start_date;
            booking.end_date = approved.end_date;
        })
    }

    fn record(state: &StoreState, id: &ModificationId) -> Option<BookingModification> {
        state.booking_modification(id).cloned()
    }

    fn save(state: &mut StoreState, record: BookingModification) {
        state.save_booking_modification(record);
    }

    fn all(state: &StoreState) -> Vec<BookingModification> {
        state.booking_modifications().cloned().collect()
    }

    fn requested_action(record: &BookingModification) -> NotificationAction {
        NotificationAction::BookingChangeRequested {
            modification_id: record.id.clone(),
            booking_id: record.booking_id.clone(),
        }
    }

    fn approved_action(record: &BookingModification) -> NotificationAction {
        NotificationAction::BookingChangeApproved {
            modification_id: record.id.clone(),
            booking_id: record.booking_id.clone(),
        }
    }

    fn declined_action(record: &BookingModification) -> NotificationAction {
        NotificationAction::BookingChangeDeclined {
            modification_id: record.id.clone(),
            booking_id: record.booking_id.clone(),
            reason: record.rejection_reason.clone(),
        }
    }
}

/// Change requests against one rent installment's amount and due date.
pub struct RentPaymentTerms;

impl ModificationTarget for RentPaymentTerms {
    type TargetId = RentPaymentId;
    type Values = PaymentTerms;

    const NOUN: &'static str = "rent payment";

    fn validate(proposed: &PaymentTerms) -> Result<(), LifecycleError> {
        if proposed.amount == 0 {
            return Err(LifecycleError::validation(
                "proposed amount must be greater than zero",
            ));
        }
        Ok(())
    }

    fn ensure_open_for_changes(
        state: &StoreState,
        target_id: &RentPaymentId,
    ) -> Result<(), LifecycleError> {
        let payment = state.expect_rent_payment(target_id)?;
        if payment.is_paid {
            return Err(LifecycleError::invalid_state(
                "cannot modify a payment that has already been collected",
            ));
        }
        Ok(())
    }

    fn current(
        state: &StoreState,
        target_id: &RentPaymentId,
    ) -> Result<(PaymentTerms, BookingId), LifecycleError> {
        let payment = state.expect_rent_payment(target_id)?;
        Ok((
            PaymentTerms {
                amount: payment.amount,
                due_date: payment.due_date,
            },
            payment.booking_id.clone(),
        ))
    }

    fn apply(
        state: &mut StoreState,
        target_id: &RentPaymentId,
        approved: &PaymentTerms,
    ) -> Result<(), LifecycleError> {
        state.update_rent_payment(target_id, |payment| {
            payment.amount = approved.amount;
            payment.due_date = approved.due_date;
        })
    }

    fn record(state: &StoreState, id: &ModificationId) -> Option<PaymentModification> {
        state.payment_modification(id).cloned()
    }

    fn save(state: &mut StoreState, record: PaymentModification) {
        state.save_payment_modification(record);
    }

    fn all(state: &StoreState) -> Vec<PaymentModification> {
        state.payment_modifications().cloned().collect()
    }

    fn requested_action(record: &PaymentModification) -> NotificationAction {
        NotificationAction::PaymentChangeRequested {
            modification_id: record.id.clone(),
            rent_payment_id: record.target_id.clone(),
        }
    }

    fn approved_action(record: &PaymentModification) -> NotificationAction {
        NotificationAction::PaymentChangeApproved {
            modification_id: record.id.clone(),
            rent_payment_id: record.target_id.clone(),
        }
    }

    fn declined_action(record: &PaymentModification) -> NotificationAction {
        NotificationAction::PaymentChangeDeclined {
            modification_id: record.id.clone(),
            rent_payment_id: record.target_id.clone(),
            reason: record.rejection_reason.clone(),
        }
    }
}

/// Propose/approve/reject workflow over one modification target type.
///
/// Either party to the owning booking may propose a change; only the
/// counterparty it was addressed to may resolve it. Approval writes the
/// proposed values onto the live target in the same atomic unit that flips
/// the record's status.
pub struct ModificationWorkflow<T, D> {
    store: Arc<MarketplaceStore>,
    dispatcher: Arc<D>,
    _target: std::marker::PhantomData<T>,
}

impl<T, D> ModificationWorkflow<T, D>
where
    T: ModificationTarget,
    D: NotificationDispatcher + 'static,
{
    pub fn new(store: Arc<MarketplaceStore>, dispatcher: Arc<D>) -> Self {
        Self {
            store,
            dispatcher,
            _target: std::marker::PhantomData,
        }
    }

    pub fn create(
        &self,
        principal: &Principal,
        target_id: &T::TargetId,
        proposed: T::Values,
        reason: Option<String>,
    ) -> Result<ModificationRecord<T::TargetId, T::Values>, LifecycleError> {
        T::validate(&proposed)?;

        let record = self.store.run_in_transaction(|state| {
            T::ensure_open_for_changes(state, target_id)?;
            let (original, booking_id) = T::current(state, target_id)?;
            let booking = state.expect_booking(&booking_id)?.clone();
            let listing = state.expect_listing(&booking.listing_id)?.clone();

            let recipient_id = if principal.user_id == booking.renter_id {
                listing.host_id.clone()
            } else if principal.user_id == listing.host_id {
                booking.renter_id.clone()
            } else {
                return Err(LifecycleError::unauthorized(
                    "only a party to the booking may propose a change",
                ));
            };

            let record = ModificationRecord {
                id: ModificationId(state.next_id("mod")),
                target_id: target_id.clone(),
                booking_id,
                requestor_id: principal.user_id.clone(),
                recipient_id,
                original,
                proposed: proposed.clone(),
                status: ModificationStatus::Pending,
                reason: reason.clone(),
                requested_at: Utc::now(),
                viewed_at: None,
                approved_at: None,
                rejected_at: None,
                rejection_reason: None,
            };
            T::save(state, record.clone());
            Ok(record)
        })?;

        info!(
            modification = %record.id,
            target = %record.target_id,
            "{} change requested", T::NOUN
        );
        notifications::send(
            &self.store,
            self.dispatcher.as_ref(),
            record.recipient_id.clone(),
            format!("A change to your {} was requested.", T::NOUN),
            format!("/app/bookings/{}/changes/{}", record.booking_id, record.id),
            T::requested_action(&record),
        );
        Ok(record)
    }

    /// Approves a pending request: status flip, timestamps, and the write of
    /// the proposed values onto the live target, all in one atomic unit.
    pub fn approve(
        &self,
        principal: &Principal,
        modification_id: &ModificationId,
    ) -> Result<ModificationRecord<T::TargetId, T::Values>, LifecycleError> {
        let record = self.store.run_in_transaction(|state| {
            let mut record = Self::expect_record(state, modification_id)?;
            Self::require_recipient(principal, &record)?;
            Self::require_pending(&record)?;

            let now = Utc::now();
            record.status = ModificationStatus::Approved;
            record.approved_at = Some(now);
            record.viewed_at = record.viewed_at.or(Some(now));
            T::apply(state, &record.target_id, &record.proposed)?;
            T::save(state, record.clone());
            Ok(record)
        })?;

        info!(modification = %record.id, "{} change approved", T::NOUN);
        notifications::send(
            &self.store,
            self.dispatcher.as_ref(),
            record.requestor_id.clone(),
            format!("Your {} change was approved.", T::NOUN),
            format!("/app/bookings/{}/changes/{}", record.booking_id, record.id),
            T::approved_action(&record),
        );
        Ok(record)
    }

    pub fn reject(
        &self,
        principal: &Principal,
        modification_id: &ModificationId,
        rejection_reason: Option<String>,
    ) -> Result<ModificationRecord<T::TargetId, T::Values>, LifecycleError> {
        let record = self.store.run_in_transaction(|state| {
            let mut record = Self::expect_record(state, modification_id)?;
            Self::require_recipient(principal, &record)?;
            Self::require_pending(&record)?;

            let now = Utc::now();
            record.status = ModificationStatus::Rejected;
            record.rejected_at = Some(now);
            record.viewed_at = record.viewed_at.or(Some(now));
            record.rejection_reason = rejection_reason.clone();
            T::save(state, record.clone());
            Ok(record)
        })?;

        info!(modification = %record.id, "{} change rejected", T::NOUN);
        notifications::send(
            &self.store,
            self.dispatcher.as_ref(),
            record.requestor_id.clone(),
            format!("Your {} change was declined.", T::NOUN),
            format!("/app/bookings/{}/changes/{}", record.booking_id, record.id),
            T::declined_action(&record),
        );
        Ok(record)
    }

    /// Stamps first-view time. Later calls keep the earliest timestamp.
    pub fn mark_viewed(
        &self,
        principal: &Principal,
        modification_id: &ModificationId,
    ) -> Result<ModificationRecord<T::TargetId, T::Values>, LifecycleError> {
        self.store.run_in_transaction(|state| {
            let mut record = Self::expect_record(state, modification_id)?;
            Self::require_recipient(principal, &record)?;
            if record.viewed_at.is_none() {
                record.viewed_at = Some(Utc::now());
                T::save(state, record.clone());
            }
            Ok(record)
        })
    }

    /// Every request ever made against one target, newest first. Parties to
    /// the owning booking only.
    pub fn list_for_target(
        &self,
        principal: &Principal,
        target_id: &T::TargetId,
    ) -> Result<Vec<ModificationRecord<T::TargetId, T::Values>>, LifecycleError> {
        self.store.run_in_transaction(|state| {
            let (_, booking_id) = T::current(state, target_id)?;
            let booking = state.expect_booking(&booking_id)?;
            let listing = state.expect_listing(&booking.listing_id)?;
            if principal.user_id != booking.renter_id
                && principal.user_id != listing.host_id
                && !principal.is_admin()
            {
                return Err(LifecycleError::unauthorized(
                    "only a party to the booking may view its change requests",
                ));
            }

            let mut records: Vec<_> = T::all(state)
                .into_iter()
                .filter(|record| &record.target_id == target_id)
                .collect();
            records.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
            Ok(records)
        })
    }

    /// Requests the user sent or received, newest first, optionally filtered
    /// by status. Users may only list their own.
    pub fn list_for_user(
        &self,
        principal: &Principal,
        user_id: &UserId,
        status: Option<ModificationStatus>,
    ) -> Result<Vec<ModificationRecord<T::TargetId, T::Values>>, LifecycleError> {
        if principal.user_id != *user_id && !principal.is_admin() {
            return Err(LifecycleError::unauthorized(
                "users may only list their own change requests",
            ));
        }
        self.store.read(|state| {
            let mut records: Vec<_> = T::all(state)
                .into_iter()
                .filter(|record| {
                    &record.requestor_id == user_id || &record.recipient_id == user_id
                })
                .filter(|record| status.map_or(true, |wanted| record.status == wanted))
                .collect();
            records.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
            records
        })
    }

    fn expect_record(
        state: &StoreState,
        id: &ModificationId,
    ) -> Result<ModificationRecord<T::TargetId, T::Values>, LifecycleError> {
        T::record(state, id)
            .ok_or_else(|| LifecycleError::not_found(format!("modification {id}")))
    }

    fn require_recipient(
        principal: &Principal,
        record: &ModificationRecord<T::TargetId, T::Values>,
    ) -> Result<(), LifecycleError> {
        if principal.user_id != record.recipient_id && !principal.is_admin() {
            return Err(LifecycleError::unauthorized(
                "only the recipient may act on this change request",
            ));
        }
        Ok(())
    }

    fn require_pending(
        record: &ModificationRecord<T::TargetId, T::Values>,
    ) -> Result<(), LifecycleError> {
        if record.status.is_terminal() {
            return Err(LifecycleError::invalid_state(
                "change request has already been resolved",
            ));
        }
        Ok(())
    }
}

/// One entry in the merged change-request feed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModificationEntry {
    BookingDates(BookingModification),
    PaymentTerms(PaymentModification),
}

impl ModificationEntry {
    fn requested_at(&self) -> DateTime<Utc> {
        match self {
            Self::BookingDates(record) => record.requested_at,
            Self::PaymentTerms(record) => record.requested_at,
        }
    }
}

/// All change requests a user sent or received, both target types merged and
/// sorted newest first.
pub fn modifications_for_user(
    store: &MarketplaceStore,
    principal: &Principal,
    user_id: &UserId,
    status: Option<ModificationStatus>,
) -> Result<Vec<ModificationEntry>, LifecycleError> {
    if principal.user_id != *user_id && !principal.is_admin() {
        return Err(LifecycleError::unauthorized(
            "users may only list their own change requests",
        ));
    }
    store.read(|state| {
        let involves = |requestor: &UserId, recipient: &UserId| {
            requestor == user_id || recipient == user_id
        };
        let matches_status =
            |record_status: ModificationStatus| status.map_or(true, |wanted| record_status == wanted);

        let mut entries: Vec<ModificationEntry> = state
            .booking_modifications()
            .filter(|r| involves(&r.requestor_id, &r.recipient_id) && matches_status(r.status))
            .cloned()
            .map(ModificationEntry::BookingDates)
            .chain(
                state
                    .payment_modifications()
                    .filter(|r| {
                        involves(&r.requestor_id, &r.recipient_id) && matches_status(r.status)
                    })
                    .cloned()
                    .map(ModificationEntry::PaymentTerms),
            )
            .collect();
        entries.sort_by(|a, b| b.requested_at().cmp(&a.requested_at()));
        entries
    })
}
