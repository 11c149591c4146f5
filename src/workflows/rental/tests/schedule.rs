use chrono::Utc;

use crate::workflows::rental::domain::{BookingId, PaymentMethodId, RentPaymentKind};
use crate::workflows::rental::error::LifecycleError;
use crate::workflows::rental::schedule::generate_rent_payments;

use super::common::date;

fn generate(
    monthly_rent: u32,
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
) -> Vec<crate::workflows::rental::domain::RentPayment> {
    generate_rent_payments(
        &BookingId::from("booking-1"),
        monthly_rent,
        start,
        end,
        &PaymentMethodId::from("pm-1"),
        Utc::now(),
    )
    .expect("schedule generated")
}

#[test]
fn mid_month_start_prorates_first_and_last_installments() {
    let payments = generate(1000, date(2026, 1, 15), date(2026, 2, 15));

    assert_eq!(payments.len(), 2);
    // Jan 15-31: 17 of 31 days.
    assert_eq!(payments[0].amount, 548);
    assert_eq!(payments[0].due_date, date(2026, 1, 15));
    // Feb 1-15: 15 of 28 days.
    assert_eq!(payments[1].amount, 536);
    assert_eq!(payments[1].due_date, date(2026, 2, 1));
}

#[test]
fn leap_year_february_uses_twenty_nine_days() {
    let payments = generate(1000, date(2024, 1, 15), date(2024, 2, 15));

    assert_eq!(payments.len(), 2);
    // Feb 1-15 of 29 days.
    assert_eq!(payments[1].amount, 517);
}

#[test]
fn fully_covered_months_bill_full_rent() {
    let payments = generate(1000, date(2026, 1, 1), date(2026, 3, 31));

    assert_eq!(payments.len(), 3);
    assert!(payments.iter().all(|payment| payment.amount == 1000));
    assert_eq!(payments[0].due_date, date(2026, 1, 1));
    assert_eq!(payments[1].due_date, date(2026, 2, 1));
    assert_eq!(payments[2].due_date, date(2026, 3, 1));
}

#[test]
fn leap_february_ending_on_the_28th_is_prorated() {
    let payments = generate(1000, date(2024, 2, 1), date(2024, 2, 28));

    assert_eq!(payments.len(), 1);
    // 28 of 29 days.
    assert_eq!(payments[0].amount, 966);
}

#[test]
fn six_month_stay_spans_seven_calendar_months() {
    let payments = generate(1000, date(2026, 1, 15), date(2026, 7, 15));

    assert_eq!(payments.len(), 7);
    assert_eq!(payments[0].amount, 548);
    assert!(payments[1..6].iter().all(|payment| payment.amount == 1000));
    // Jul 1-15: 15 of 31 days.
    assert_eq!(payments[6].amount, 484);
}

#[test]
fn full_calendar_year_bills_twelve_full_months() {
    let payments = generate(1000, date(2026, 1, 1), date(2026, 12, 31));

    assert_eq!(payments.len(), 12);
    assert!(payments.iter().all(|payment| payment.amount == 1000));
}

#[test]
fn short_stay_within_one_month_is_a_single_prorated_installment() {
    let payments = generate(1000, date(2026, 1, 28), date(2026, 1, 31));

    assert_eq!(payments.len(), 1);
    // 4 of 31 days.
    assert_eq!(payments[0].amount, 129);
    assert_eq!(payments[0].due_date, date(2026, 1, 28));
}

#[test]
fn proration_scales_with_the_monthly_rent() {
    // Jan 15-31: 17 of 31 days at different rents.
    for (rent, expected) in [(1500, 823), (2500, 1371), (750, 411)] {
        let payments = generate(rent, date(2026, 1, 15), date(2026, 1, 31));
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, expected, "rent {rent}");
    }
}

#[test]
fn end_date_on_the_first_of_a_later_month_is_a_move_out_boundary() {
    let payments = generate(1000, date(2026, 1, 1), date(2026, 6, 1));

    // January through May; June 1 is move-out day, not a billed month.
    assert_eq!(payments.len(), 5);
    assert!(payments.iter().all(|payment| payment.amount == 1000));
    assert_eq!(payments[4].due_date, date(2026, 5, 1));
}

#[test]
fn single_day_stay_on_the_first_bills_one_day() {
    let payments = generate(1000, date(2026, 1, 1), date(2026, 1, 1));

    assert_eq!(payments.len(), 1);
    // 1 of 31 days.
    assert_eq!(payments[0].amount, 32);
}

#[test]
fn only_the_first_installment_is_authorized_up_front() {
    let payments = generate(1000, date(2026, 1, 15), date(2026, 4, 15));

    assert!(payments[0].payment_authorized_at.is_some());
    assert!(payments[1..]
        .iter()
        .all(|payment| payment.payment_authorized_at.is_none()));
}

#[test]
fn installments_link_back_to_the_booking_in_due_date_order() {
    let payments = generate(1000, date(2026, 1, 15), date(2026, 4, 15));

    for (index, payment) in payments.iter().enumerate() {
        assert_eq!(payment.booking_id, BookingId::from("booking-1"));
        assert_eq!(payment.kind, RentPaymentKind::MonthlyRent);
        assert!(!payment.is_paid);
        assert_eq!(payment.id.0, format!("booking-1-pay-{:02}", index + 1));
    }
    assert!(payments.windows(2).all(|pair| pair[0].due_date < pair[1].due_date));
}

#[test]
fn inverted_date_range_is_rejected() {
    let result = generate_rent_payments(
        &BookingId::from("booking-1"),
        1000,
        date(2026, 2, 1),
        date(2026, 1, 1),
        &PaymentMethodId::from("pm-1"),
        Utc::now(),
    );

    assert!(matches!(result, Err(LifecycleError::Validation(_))));
}
