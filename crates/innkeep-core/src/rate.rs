//! # Rate Policy Resolver
//!
//! Converts elapsed stay time plus a checkout policy into a room charge.
//!
//! ## The Three Billing Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HOURLY (hours = 1)                                                     │
//! │    check-in ──┬── 60 min ──┬── grace ──┬── next slot starts             │
//! │               │  slot 1    │   free    │  slot 2                        │
//! │                                                                         │
//! │  FIXED BLOCK (hours = 12 or 24)                                         │
//! │    check-in ──┬── block ──┬── grace ──┬── block 2 ──┬── block 3 ...     │
//! │               │  block 1  │   free    │  full price │                   │
//! │    Grace only stretches the FIRST block; later blocks round up whole.   │
//! │                                                                         │
//! │  FIXED CLOCK-TIME (fixed_time = "12:00")                                │
//! │    check-in day0 ── ... ── day1 12:00 ──┬── grace ──┬── +1 day each     │
//! │                       scheduled cutoff  │   free    │  started 24h      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is pure: `now` is injected by the caller, so every
//! boundary in the tables above can be pinned down in a test.

use chrono::{DateTime, Days, Duration, Utc};

use crate::money::Money;
use crate::types::{CheckoutPolicy, PolicyMode, Room, Stay};

/// Minutes in one 24h billing day, used by the fixed clock-time mode.
const MINUTES_PER_DAY: i64 = 24 * 60;

/// Resolves the room charge for a stay under a checkout policy.
///
/// `checkoutTime` is the stay's recorded `check_out_time` when set (completed
/// stays keep billing stable forever), otherwise the injected `now` (open
/// stays accrue as time passes).
///
/// A missing or malformed policy bills exactly the base rate — the engine
/// never refuses to price a stay over a bad policy row.
pub fn resolve_room_charge(
    stay: &Stay,
    room: &Room,
    policy: Option<&CheckoutPolicy>,
    now: DateTime<Utc>,
) -> Money {
    let checkout = stay.check_out_time.unwrap_or(now);
    let stay_minutes = (checkout - stay.check_in_time).num_minutes();
    let base_rate = stay.rate_applied();
    let grace = stay.grace_minutes.max(0);

    match policy.map(CheckoutPolicy::mode) {
        Some(PolicyMode::Hourly) => hourly_charge(stay, room, stay_minutes, grace),
        Some(PolicyMode::FixedBlock { block_minutes }) => {
            fixed_block_charge(base_rate, block_minutes, stay_minutes, grace)
        }
        Some(PolicyMode::FixedTime { cutoff }) => {
            let expected = scheduled_cutoff(stay.check_in_time, cutoff);
            fixed_time_charge(base_rate, expected, checkout, grace)
        }
        Some(PolicyMode::Unrecognized) | None => base_rate,
    }
}

/// The scheduled departure a stay would get at check-in, used to stamp
/// `Stay.expected_check_out_time`.
///
/// Hourly stays have no scheduled departure; block stays depart one block
/// after arrival; fixed clock-time stays depart at the cutoff on the day
/// after check-in.
pub fn expected_checkout(
    check_in: DateTime<Utc>,
    policy: &CheckoutPolicy,
) -> Option<DateTime<Utc>> {
    match policy.mode() {
        PolicyMode::Hourly | PolicyMode::Unrecognized => None,
        PolicyMode::FixedBlock { block_minutes } => {
            Some(check_in + Duration::minutes(block_minutes))
        }
        PolicyMode::FixedTime { cutoff } => Some(scheduled_cutoff(check_in, cutoff)),
    }
}

/// Hourly mode: one slot per started hour, with the grace window absorbing a
/// short spill past the last paid slot.
///
/// Bills at the room's hourly rate; stays snapshotted before the room had an
/// hourly rate fall back to the stay's own frozen rate.
fn hourly_charge(stay: &Stay, room: &Room, stay_minutes: i64, grace: i64) -> Money {
    let rate = if room.hourly_rate_cents > 0 {
        room.hourly_rate()
    } else {
        stay.rate_applied()
    };

    // A partial hour inside the paid slots plus grace is free; one minute
    // past the grace window starts a whole new hour, never a fraction.
    let mut slots = (stay_minutes / 60).max(1);
    let allowed_minutes = slots * 60 + grace;
    if stay_minutes > allowed_minutes {
        slots += 1;
    }

    rate * slots
}

/// Fixed-duration mode (12h/24h blocks).
///
/// Grace extends only the first block; every later block is charged in full,
/// rounded up.
fn fixed_block_charge(base_rate: Money, block_minutes: i64, stay_minutes: i64, grace: i64) -> Money {
    // Same-instant (or clock-skewed) checkout still bills one block.
    if stay_minutes <= 0 {
        return base_rate;
    }

    let first_block_limit = block_minutes + grace;
    if stay_minutes <= first_block_limit {
        return base_rate;
    }

    let remaining = stay_minutes - first_block_limit;
    let extra_blocks = (remaining + block_minutes - 1) / block_minutes;
    base_rate * (1 + extra_blocks)
}

/// Fixed clock-time mode: leaving at/before the scheduled cutoff (or within
/// grace of it) is one block; past that, one extra day per started 24h.
fn fixed_time_charge(
    base_rate: Money,
    expected: DateTime<Utc>,
    checkout: DateTime<Utc>,
    grace: i64,
) -> Money {
    let over_minutes = (checkout - expected).num_minutes();
    if over_minutes <= 0 || over_minutes <= grace {
        return base_rate;
    }

    let extra_days = (over_minutes - grace + MINUTES_PER_DAY - 1) / MINUTES_PER_DAY;
    base_rate * (1 + extra_days)
}

/// The scheduled cutoff for a fixed clock-time policy: the cutoff time on the
/// calendar day AFTER check-in.
///
/// A 09:00 arrival against a 12:00 policy holds the room through next-day
/// noon as a single block; same-day noon would bill a one-night guest two
/// blocks. Late arrivals (after the cutoff time) land on the same instant
/// either way.
fn scheduled_cutoff(check_in: DateTime<Utc>, cutoff: chrono::NaiveTime) -> DateTime<Utc> {
    check_in
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or(check_in.date_naive())
        .and_time(cutoff)
        .and_utc()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RoomStatus, StayStatus};
    use chrono::TimeZone;

    fn room(day_rate: i64, hourly_rate: i64) -> Room {
        Room {
            id: "room-1".into(),
            number: "101".into(),
            day_rate_cents: day_rate,
            hourly_rate_cents: hourly_rate,
            status: RoomStatus::Occupied,
            created_at: Utc::now(),
        }
    }

    fn stay(check_in: DateTime<Utc>, rate: i64, grace: i64) -> Stay {
        Stay {
            id: "stay-1".into(),
            guest_id: "guest-1".into(),
            room_id: "room-1".into(),
            check_in_time: check_in,
            expected_check_out_time: None,
            check_out_time: None,
            checkout_policy_id: "policy-1".into(),
            rate_applied_cents: rate,
            grace_minutes: grace,
            status: StayStatus::Active,
            created_at: check_in,
        }
    }

    fn hourly_policy() -> CheckoutPolicy {
        CheckoutPolicy {
            id: "policy-1".into(),
            label: "Hourly".into(),
            hours: Some(1),
            fixed_time: None,
            is_default: false,
        }
    }

    fn block_policy(hours: i64) -> CheckoutPolicy {
        CheckoutPolicy {
            id: "policy-1".into(),
            label: format!("{hours} Hours"),
            hours: Some(hours),
            fixed_time: None,
            is_default: true,
        }
    }

    fn noon_policy() -> CheckoutPolicy {
        CheckoutPolicy {
            id: "policy-1".into(),
            label: "12 Noon".into(),
            hours: None,
            fixed_time: Some("12:00".into()),
            is_default: false,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    // ------------------------------------------------------------------
    // Hourly mode
    // ------------------------------------------------------------------

    #[test]
    fn hourly_exact_hour_is_one_slot() {
        let check_in = at(2024, 6, 1, 10, 0);
        let s = stay(check_in, 10_000, 0);
        let charge = resolve_room_charge(&s, &room(0, 10_000), Some(&hourly_policy()), at(2024, 6, 1, 11, 0));
        assert_eq!(charge.cents(), 10_000);
    }

    #[test]
    fn hourly_one_minute_over_starts_new_slot() {
        let check_in = at(2024, 6, 1, 10, 0);
        let s = stay(check_in, 10_000, 0);
        let charge = resolve_room_charge(&s, &room(0, 10_000), Some(&hourly_policy()), at(2024, 6, 1, 11, 1));
        assert_eq!(charge.cents(), 20_000);
    }

    #[test]
    fn hourly_grace_absorbs_spill() {
        // 65 minutes with 10 grace minutes stays a single slot.
        let check_in = at(2024, 6, 1, 10, 0);
        let s = stay(check_in, 10_000, 10);
        let charge = resolve_room_charge(&s, &room(0, 10_000), Some(&hourly_policy()), at(2024, 6, 1, 11, 5));
        assert_eq!(charge.cents(), 10_000);
    }

    #[test]
    fn hourly_sub_hour_stay_bills_one_slot() {
        let check_in = at(2024, 6, 1, 10, 0);
        let s = stay(check_in, 10_000, 0);
        let charge = resolve_room_charge(&s, &room(0, 10_000), Some(&hourly_policy()), at(2024, 6, 1, 10, 20));
        assert_eq!(charge.cents(), 10_000);
    }

    #[test]
    fn hourly_uses_room_hourly_rate() {
        let check_in = at(2024, 6, 1, 10, 0);
        // Stay snapshotted a day rate; the hourly policy bills the room's
        // hourly rate instead.
        let s = stay(check_in, 200_000, 0);
        let charge = resolve_room_charge(&s, &room(200_000, 15_000), Some(&hourly_policy()), at(2024, 6, 1, 12, 30));
        assert_eq!(charge.cents(), 45_000); // 3 slots at 150.00
    }

    #[test]
    fn hourly_falls_back_to_stay_rate_without_room_rate() {
        let check_in = at(2024, 6, 1, 10, 0);
        let s = stay(check_in, 12_000, 0);
        let charge = resolve_room_charge(&s, &room(200_000, 0), Some(&hourly_policy()), at(2024, 6, 1, 10, 30));
        assert_eq!(charge.cents(), 12_000);
    }

    // ------------------------------------------------------------------
    // Fixed-duration blocks
    // ------------------------------------------------------------------

    #[test]
    fn block_24h_within_grace_is_one_block() {
        let check_in = at(2024, 6, 1, 14, 0);
        let s = stay(check_in, 200_000, 30);
        let charge = resolve_room_charge(&s, &room(200_000, 0), Some(&block_policy(24)), at(2024, 6, 2, 14, 0));
        assert_eq!(charge.cents(), 200_000);
    }

    #[test]
    fn block_24h_past_grace_is_two_blocks() {
        let check_in = at(2024, 6, 1, 14, 0);
        let s = stay(check_in, 200_000, 30);
        let charge = resolve_room_charge(&s, &room(200_000, 0), Some(&block_policy(24)), at(2024, 6, 2, 14, 31));
        assert_eq!(charge.cents(), 400_000);
    }

    #[test]
    fn block_grace_only_stretches_first_block() {
        // 2 blocks + grace + 1 minute: the second block got no grace of its
        // own, so a third block starts.
        let check_in = at(2024, 6, 1, 14, 0);
        let s = stay(check_in, 200_000, 30);
        let charge = resolve_room_charge(
            &s,
            &room(200_000, 0),
            Some(&block_policy(24)),
            at(2024, 6, 3, 14, 31),
        );
        assert_eq!(charge.cents(), 600_000);
    }

    #[test]
    fn block_same_instant_checkout_bills_one_block() {
        let check_in = at(2024, 6, 1, 14, 0);
        let s = stay(check_in, 200_000, 0);
        let charge = resolve_room_charge(&s, &room(200_000, 0), Some(&block_policy(24)), check_in);
        assert_eq!(charge.cents(), 200_000);
    }

    #[test]
    fn block_12h_rounds_up_whole_blocks() {
        let check_in = at(2024, 6, 1, 8, 0);
        let s = stay(check_in, 80_000, 0);
        // 13 hours = first 12h block + 1h into the second.
        let charge = resolve_room_charge(&s, &room(80_000, 0), Some(&block_policy(12)), at(2024, 6, 1, 21, 0));
        assert_eq!(charge.cents(), 160_000);
    }

    // ------------------------------------------------------------------
    // Fixed clock-time cutoff
    // ------------------------------------------------------------------

    #[test]
    fn cutoff_within_grace_is_one_block() {
        // Check-in day0 09:00, noon policy, 60 min grace. Leaving day1 13:00
        // is one hour past the scheduled day1 noon — inside grace.
        let check_in = at(2024, 6, 1, 9, 0);
        let s = stay(check_in, 200_000, 60);
        let charge = resolve_room_charge(&s, &room(200_000, 0), Some(&noon_policy()), at(2024, 6, 2, 13, 0));
        assert_eq!(charge.cents(), 200_000);
    }

    #[test]
    fn cutoff_one_minute_past_grace_adds_a_day() {
        let check_in = at(2024, 6, 1, 9, 0);
        let s = stay(check_in, 200_000, 60);
        let charge = resolve_room_charge(&s, &room(200_000, 0), Some(&noon_policy()), at(2024, 6, 2, 13, 1));
        assert_eq!(charge.cents(), 400_000);
    }

    #[test]
    fn cutoff_early_departure_is_one_block() {
        // Leaving the same evening, long before the scheduled cutoff.
        let check_in = at(2024, 6, 1, 9, 0);
        let s = stay(check_in, 200_000, 0);
        let charge = resolve_room_charge(&s, &room(200_000, 0), Some(&noon_policy()), at(2024, 6, 1, 19, 0));
        assert_eq!(charge.cents(), 200_000);
    }

    #[test]
    fn cutoff_late_arrival_still_gets_next_noon() {
        // Check-in day0 13:00 (after the cutoff time). Scheduled departure is
        // day1 12:00; each further started 24h adds a day.
        let check_in = at(2024, 6, 1, 13, 0);
        let s = stay(check_in, 200_000, 0);
        let one = resolve_room_charge(&s, &room(200_000, 0), Some(&noon_policy()), at(2024, 6, 2, 11, 59));
        assert_eq!(one.cents(), 200_000);
        let two = resolve_room_charge(&s, &room(200_000, 0), Some(&noon_policy()), at(2024, 6, 2, 12, 1));
        assert_eq!(two.cents(), 400_000);
        let three = resolve_room_charge(&s, &room(200_000, 0), Some(&noon_policy()), at(2024, 6, 3, 12, 1));
        assert_eq!(three.cents(), 600_000);
    }

    // ------------------------------------------------------------------
    // Fallbacks and helpers
    // ------------------------------------------------------------------

    #[test]
    fn missing_policy_bills_base_rate() {
        let check_in = at(2024, 6, 1, 9, 0);
        let s = stay(check_in, 200_000, 0);
        let charge = resolve_room_charge(&s, &room(200_000, 0), None, at(2024, 6, 5, 9, 0));
        assert_eq!(charge.cents(), 200_000);
    }

    #[test]
    fn malformed_policy_bills_base_rate() {
        let check_in = at(2024, 6, 1, 9, 0);
        let s = stay(check_in, 200_000, 0);
        let bad = CheckoutPolicy {
            id: "policy-1".into(),
            label: "Broken".into(),
            hours: None,
            fixed_time: Some("not-a-time".into()),
            is_default: false,
        };
        let charge = resolve_room_charge(&s, &room(200_000, 0), Some(&bad), at(2024, 6, 5, 9, 0));
        assert_eq!(charge.cents(), 200_000);
    }

    #[test]
    fn completed_stay_ignores_now() {
        // Once check_out_time is recorded, the charge never moves again.
        let check_in = at(2024, 6, 1, 14, 0);
        let mut s = stay(check_in, 200_000, 0);
        s.check_out_time = Some(at(2024, 6, 2, 13, 0));
        s.status = StayStatus::Completed;
        let much_later = at(2024, 8, 1, 0, 0);
        let charge = resolve_room_charge(&s, &room(200_000, 0), Some(&block_policy(24)), much_later);
        assert_eq!(charge.cents(), 200_000);
    }

    #[test]
    fn expected_checkout_per_mode() {
        let check_in = at(2024, 6, 1, 9, 0);

        assert_eq!(expected_checkout(check_in, &hourly_policy()), None);
        assert_eq!(
            expected_checkout(check_in, &block_policy(24)),
            Some(at(2024, 6, 2, 9, 0))
        );
        assert_eq!(
            expected_checkout(check_in, &noon_policy()),
            Some(at(2024, 6, 2, 12, 0))
        );
    }
}
