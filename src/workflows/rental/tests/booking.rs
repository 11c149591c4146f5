use std::sync::Arc;

use crate::config::{AppEnvironment, ApplicationQuotas};
use crate::workflows::rental::domain::{
    BookingStatus, ListingId, NotificationAction, Review, ReviewId, TripId, UserId,
};
use crate::workflows::rental::error::LifecycleError;
use crate::workflows::rental::pricing::AdvertisedRentPricing;

use super::common::{
    admin, approved_match, build_env, completed_match, confirmed_booking, date, env, host,
    renter, sign_and_authorize, stranger, TestEnv,
};

#[test]
fn booking_creation_requires_an_authorized_payment() {
    let env = env();

    let (_, rental_match) = approved_match(&env);
    let err = env
        .services
        .bookings
        .create_from_match(&renter(), &rental_match.id)
        .expect_err("no payment method yet");

    // No payment method on file is a validation failure, not a state one.
    assert!(matches!(err, LifecycleError::Validation(_)));
}

#[test]
fn booking_creation_writes_the_full_schedule_atomically() {
    let env = env();

    let booking = confirmed_booking(&env);

    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.start_date, date(2026, 1, 15));
    assert_eq!(booking.end_date, date(2026, 7, 15));
    assert_eq!(booking.monthly_rent, 1000);

    env.store
        .read(|state| {
            let payments = state.rent_payments_for_booking(&booking.id);
            assert_eq!(payments.len(), 7);
            assert_eq!(payments[0].amount, 548);
            assert!(payments[0].payment_authorized_at.is_some());
            assert!(payments[1..].iter().all(|p| p.payment_authorized_at.is_none()));

            let owning = state.rental_match(&booking.match_id).expect("match kept");
            assert_eq!(owning.booking_id, Some(booking.id.clone()));
        })
        .expect("store readable");

    let host_notifications: Vec<_> = env
        .dispatcher
        .sent()
        .into_iter()
        .filter(|n| matches!(n.action, NotificationAction::BookingConfirmed { .. }))
        .collect();
    assert_eq!(host_notifications.len(), 1);
    assert_eq!(host_notifications[0].user_id, UserId::from("host-1"));
}

#[test]
fn booking_creation_is_idempotent_per_match() {
    let env = env();

    let rental_match = completed_match(&env);
    let first = env
        .services
        .bookings
        .create_from_match(&renter(), &rental_match.id)
        .expect("created");
    let second = env
        .services
        .bookings
        .create_from_match(&host(), &rental_match.id)
        .expect("returned existing");

    assert_eq!(first.id, second.id);
    let payment_count = env
        .store
        .read(|state| state.rent_payments_for_booking(&first.id).len())
        .expect("store readable");
    assert_eq!(payment_count, 7);
}

#[test]
fn a_stranger_cannot_convert_someone_elses_match() {
    let env = env();

    let rental_match = completed_match(&env);
    let err = env
        .services
        .bookings
        .create_from_match(&stranger(), &rental_match.id)
        .expect_err("not a party");

    assert!(matches!(err, LifecycleError::Unauthorized(_)));
}

#[test]
fn a_stay_ending_on_the_first_is_not_billed_for_that_month() {
    let env = env();

    // trip-2 runs Jan 1 to Jun 1.
    let request = env
        .services
        .applications
        .create(&renter(), &TripId::from("trip-2"), &ListingId::from("listing-1"))
        .expect("application created");
    let (_, rental_match) = env
        .services
        .applications
        .approve(&host(), &request.id)
        .expect("approved");
    sign_and_authorize(&env, &rental_match.id);

    let booking = env
        .services
        .bookings
        .create_from_match(&renter(), &rental_match.id)
        .expect("booking created");

    env.store
        .read(|state| {
            let payments = state.rent_payments_for_booking(&booking.id);
            assert_eq!(payments.len(), 5);
            assert!(payments.iter().all(|p| p.amount == 1000));
        })
        .expect("store readable");
}

#[test]
fn the_completion_sweep_converts_only_fully_ready_matches() {
    let env = env();

    // Ready: signed lease plus authorized payment.
    let ready = completed_match(&env);
    // Not ready: approved but unsigned and unauthorized.
    let request = env
        .services
        .applications
        .create(&renter(), &TripId::from("trip-2"), &ListingId::from("listing-2"))
        .expect("application created");
    let (_, pending_match) = env
        .services
        .applications
        .approve(&super::common::other_host(), &request.id)
        .expect("approved");

    let outcome = env
        .services
        .bookings
        .sweep_completed_matches(&admin())
        .expect("sweep ran");

    assert_eq!(outcome.created.len(), 1);
    assert!(outcome.skipped.is_empty());
    env.store
        .read(|state| {
            assert!(state.booking_for_match(&ready.id).is_some());
            assert!(state.booking_for_match(&pending_match.id).is_none());
        })
        .expect("store readable");
}

#[test]
fn the_sweep_is_admin_only() {
    let env = env();

    let err = env
        .services
        .bookings
        .sweep_completed_matches(&host())
        .expect_err("not an admin");

    assert!(matches!(err, LifecycleError::Unauthorized(_)));
}

#[test]
fn move_in_completion_activates_the_booking_and_prompts_the_renter() {
    let env = env();

    let booking = confirmed_booking(&env);
    let updated = env
        .services
        .bookings
        .complete_move_in(&host(), &booking.id)
        .expect("move-in completed");

    assert_eq!(updated.status, BookingStatus::Active);
    assert!(updated.move_in_completed_at.is_some());

    let move_in_notices: Vec<_> = env
        .dispatcher
        .sent()
        .into_iter()
        .filter(|n| matches!(n.action, NotificationAction::MoveInCompleted { .. }))
        .collect();
    assert_eq!(move_in_notices.len(), 1);
    assert_eq!(move_in_notices[0].user_id, UserId::from("renter-1"));
    // The prompt points at the first installment still awaiting authorization.
    match &move_in_notices[0].action {
        NotificationAction::MoveInCompleted {
            first_payment_id, ..
        } => {
            let expected = env
                .store
                .read(|state| {
                    state
                        .rent_payments_for_booking(&booking.id)
                        .into_iter()
                        .find(|p| p.payment_authorized_at.is_none())
                        .map(|p| p.id.clone())
                })
                .expect("store readable");
            assert_eq!(first_payment_id, &expected);
        }
        other => panic!("unexpected action {other:?}"),
    }
}

#[test]
fn move_in_cannot_be_completed_twice_or_by_the_renter() {
    let env = env();

    let booking = confirmed_booking(&env);
    let err = env
        .services
        .bookings
        .complete_move_in(&renter(), &booking.id)
        .expect_err("renter refused");
    assert!(matches!(err, LifecycleError::Unauthorized(_)));

    env.services
        .bookings
        .complete_move_in(&host(), &booking.id)
        .expect("first completion");
    let err = env
        .services
        .bookings
        .complete_move_in(&host(), &booking.id)
        .expect_err("already completed");
    assert!(matches!(err, LifecycleError::InvalidState(_)));
}

fn seed_review(env: &TestEnv, booking: &crate::workflows::rental::domain::Booking) {
    env.store.seed(|state| {
        state.insert_review(Review {
            id: ReviewId::from("review-1"),
            booking_id: booking.id.clone(),
            author_id: booking.renter_id.clone(),
            rating: 5,
            comment: "Lovely stay".to_string(),
        });
    });
}

#[test]
fn deleting_a_booking_cascades_and_releases_the_match() {
    let env = env();

    let booking = confirmed_booking(&env);
    seed_review(&env, &booking);
    let change = env
        .services
        .booking_changes
        .create(
            &renter(),
            &booking.id,
            crate::workflows::rental::domain::DateWindow {
                start_date: booking.start_date,
                end_date: date(2026, 8, 15),
            },
            None,
        )
        .expect("change requested");

    env.services
        .bookings
        .delete(&admin(), &booking.id)
        .expect("deleted");

    env.store
        .read(|state| {
            assert!(state.booking(&booking.id).is_none());
            assert!(state.rent_payments_for_booking(&booking.id).is_empty());
            assert!(state.reviews_for_booking(&booking.id).is_empty());
            assert!(state.booking_modification(&change.id).is_none());

            let owning = state
                .rental_match(&booking.match_id)
                .expect("match survives");
            assert!(owning.booking_id.is_none());
        })
        .expect("store readable");
}

#[test]
fn deletion_is_admin_only_outside_development() {
    let env = env();

    let booking = confirmed_booking(&env);
    let err = env
        .services
        .bookings
        .delete(&host(), &booking.id)
        .expect_err("host refused in test env");

    assert!(matches!(err, LifecycleError::Unauthorized(_)));
}

#[test]
fn any_user_may_delete_in_development() {
    let env = build_env(
        ApplicationQuotas::default(),
        AppEnvironment::Development,
        Arc::new(AdvertisedRentPricing),
    );

    let booking = confirmed_booking(&env);
    env.services
        .bookings
        .delete(&renter(), &booking.id)
        .expect("allowed in development");
}

#[test]
fn deleting_one_booking_leaves_other_bookings_untouched() {
    let env = env();

    let first = confirmed_booking(&env);

    let request = env
        .services
        .applications
        .create(&renter(), &TripId::from("trip-2"), &ListingId::from("listing-1"))
        .expect("second application");
    let (_, second_match) = env
        .services
        .applications
        .approve(&host(), &request.id)
        .expect("approved");
    sign_and_authorize(&env, &second_match.id);
    let second = env
        .services
        .bookings
        .create_from_match(&renter(), &second_match.id)
        .expect("second booking");

    env.services
        .bookings
        .delete(&admin(), &first.id)
        .expect("deleted first");

    env.store
        .read(|state| {
            assert!(state.booking(&second.id).is_some());
            assert_eq!(state.rent_payments_for_booking(&second.id).len(), 5);
        })
        .expect("store readable");
}
