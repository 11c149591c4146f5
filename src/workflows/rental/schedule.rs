use chrono::{DateTime, Datelike, NaiveDate, Utc};

use super::domain::{BookingId, PaymentMethodId, RentPayment, RentPaymentId, RentPaymentKind};
use super::error::LifecycleError;

/// Produces the ordered rent-payment schedule for a booking.
///
/// One installment per calendar month the stay touches. The first installment
/// is due on the start date and prorated when the stay begins after the 1st;
/// later installments are due on the 1st of their month, with the final month
/// prorated when the stay ends before the month's last day. Proration rounds
/// `rent * covered_days / days_in_month` to whole dollars. An end date on the
/// 1st of a later month is a move-out boundary, not a billed month.
///
/// Only the first installment carries a payment authorization timestamp; the
/// remainder await authorization as each due date approaches.
pub fn generate_rent_payments(
    booking_id: &BookingId,
    monthly_rent: u32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    payment_method_id: &PaymentMethodId,
    authorized_at: DateTime<Utc>,
) -> Result<Vec<RentPayment>, LifecycleError> {
    if end_date < start_date {
        return Err(LifecycleError::validation(
            "end date must not precede start date",
        ));
    }

    let mut payments = Vec::new();
    let mut year = start_date.year();
    let mut month = start_date.month();

    loop {
        let month_start = first_of_month(year, month)?;
        if month_start > end_date {
            break;
        }

        let is_first = year == start_date.year() && month == start_date.month();
        let is_last = year == end_date.year() && month == end_date.month();

        // A trailing month covered only on its 1st is the move-out day.
        if is_last && !is_first && end_date.day() == 1 {
            break;
        }

        let total_days = days_in_month(year, month)?;
        let from_day = if is_first { start_date.day() } else { 1 };
        let to_day = if is_last { end_date.day() } else { total_days };
        let covered = to_day - from_day + 1;

        let amount = if covered == total_days {
            monthly_rent
        } else {
            prorate(monthly_rent, covered, total_days)
        };

        let index = payments.len();
        payments.push(RentPayment {
            id: RentPaymentId(format!("{}-pay-{:02}", booking_id.0, index + 1)),
            booking_id: booking_id.clone(),
            amount,
            due_date: if is_first { start_date } else { month_start },
            is_paid: false,
            kind: RentPaymentKind::MonthlyRent,
            payment_method_id: payment_method_id.clone(),
            payment_authorized_at: if index == 0 { Some(authorized_at) } else { None },
        });

        if is_last {
            break;
        }
        (year, month) = next_month(year, month);
    }

    Ok(payments)
}

fn prorate(monthly_rent: u32, covered_days: u32, total_days: u32) -> u32 {
    let exact = f64::from(monthly_rent) * f64::from(covered_days) / f64::from(total_days);
    exact.round() as u32
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, LifecycleError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| LifecycleError::validation(format!("invalid calendar month {year}-{month}")))
}

fn days_in_month(year: i32, month: u32) -> Result<u32, LifecycleError> {
    let this = first_of_month(year, month)?;
    let (next_year, next_month) = next_month(year, month);
    let next = first_of_month(next_year, next_month)?;
    Ok(next.signed_duration_since(this).num_days() as u32)
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}
