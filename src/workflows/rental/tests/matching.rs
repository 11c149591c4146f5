use crate::workflows::rental::domain::{ListingId, PaymentMethodId, TripId};
use crate::workflows::rental::error::LifecycleError;

use super::common::{completed_match, env, host, renter, stranger};

#[test]
fn find_or_create_returns_the_same_match_for_the_same_pair() {
    let env = env();

    let first = env
        .services
        .matches
        .find_or_create(&renter(), &TripId::from("trip-1"), &ListingId::from("listing-1"))
        .expect("match created");
    let second = env
        .services
        .matches
        .find_or_create(&host(), &TripId::from("trip-1"), &ListingId::from("listing-1"))
        .expect("match found");

    assert_eq!(first.id, second.id);
    assert_eq!(first.monthly_rent, Some(1000));
}

#[test]
fn only_parties_to_the_pair_may_touch_the_match() {
    let env = env();

    let err = env
        .services
        .matches
        .find_or_create(
            &stranger(),
            &TripId::from("trip-1"),
            &ListingId::from("listing-1"),
        )
        .expect_err("stranger refused");

    assert!(matches!(err, LifecycleError::Unauthorized(_)));
}

#[test]
fn payment_authorization_stamps_method_and_time() {
    let env = env();

    let rental_match = env
        .services
        .matches
        .find_or_create(&renter(), &TripId::from("trip-1"), &ListingId::from("listing-1"))
        .expect("match created");
    assert!(rental_match.payment_authorized_at.is_none());

    let updated = env
        .services
        .matches
        .record_payment_authorization(
            &renter(),
            &rental_match.id,
            PaymentMethodId::from("pm-77"),
        )
        .expect("authorized");

    assert_eq!(updated.payment_method_id, Some(PaymentMethodId::from("pm-77")));
    assert!(updated.payment_authorized_at.is_some());
}

#[test]
fn the_host_may_not_authorize_payment_for_the_renter() {
    let env = env();

    let rental_match = env
        .services
        .matches
        .find_or_create(&renter(), &TripId::from("trip-1"), &ListingId::from("listing-1"))
        .expect("match created");
    let err = env
        .services
        .matches
        .record_payment_authorization(&host(), &rental_match.id, PaymentMethodId::from("pm-1"))
        .expect_err("host refused");

    assert!(matches!(err, LifecycleError::Unauthorized(_)));
}

#[test]
fn a_match_with_a_booking_cannot_be_deleted() {
    let env = env();

    let rental_match = completed_match(&env);
    env.services
        .bookings
        .create_from_match(&renter(), &rental_match.id)
        .expect("booking created");

    let err = env
        .services
        .matches
        .delete(&host(), &rental_match.id)
        .expect_err("booking blocks deletion");
    assert!(matches!(err, LifecycleError::InvalidState(_)));
}

#[test]
fn an_unbooked_match_can_be_deleted_by_a_party() {
    let env = env();

    let rental_match = env
        .services
        .matches
        .find_or_create(&renter(), &TripId::from("trip-1"), &ListingId::from("listing-1"))
        .expect("match created");

    env.services
        .matches
        .delete(&renter(), &rental_match.id)
        .expect("deleted");
    env.store
        .read(|state| assert!(state.rental_match(&rental_match.id).is_none()))
        .expect("store readable");
}
