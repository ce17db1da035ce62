//! Usage limiters.
//!
//! Two independent bounds, both computed from the snapshot:
//!
//! - the rolling-window distinct-IP limiter, which bounds how many
//!   different IPs may use a license within the team's window, and
//! - the concurrent seat limiter, which bounds how many devices may hold
//!   an active heartbeat at once.
//!
//! Both are "returning caller always passes" limiters: an IP already in
//! the window or a device already holding a seat is never rejected by its
//! own limit.

use chrono::NaiveDateTime;

use crate::engine::outcome::Outcome;
use crate::model::DeviceRecord;

/// Check the distinct-IP limit.
///
/// `recent_ips` is the distinct set of IPs seen in request logs for this
/// license within the window. A returning IP always passes; a new IP is
/// rejected once the distinct count has reached the limit.
pub fn check_ip_limit(
    ip_limit: Option<i64>,
    recent_ips: &[String],
    ip_address: Option<&str>,
) -> Result<(), Outcome> {
    let Some(limit) = ip_limit else {
        return Ok(());
    };

    // Without a caller IP there is nothing to count against the limit.
    let Some(ip) = ip_address else {
        return Ok(());
    };

    if recent_ips.iter().any(|seen| seen == ip) {
        return Ok(());
    }

    if recent_ips.len() as i64 >= limit {
        return Err(Outcome::IpLimitReached);
    }

    Ok(())
}

/// Check the concurrent seat limit.
///
/// Only active when a device identifier was supplied and the license has a
/// seat bound. A device is "active" while its heartbeat is within the
/// team's device timeout; activity is computed on read, never swept.
pub fn check_seat_limit(
    seats: Option<i64>,
    devices: &[DeviceRecord],
    timeout_minutes: i64,
    now: NaiveDateTime,
    device_identifier: Option<&str>,
) -> Result<(), Outcome> {
    let (Some(seats), Some(identifier)) = (seats, device_identifier) else {
        return Ok(());
    };

    let active: Vec<&DeviceRecord> = devices
        .iter()
        .filter(|device| device.is_active(now, timeout_minutes))
        .collect();

    // A device already holding a seat may always re-verify.
    if active
        .iter()
        .any(|device| device.device_identifier == identifier)
    {
        return Ok(());
    }

    if active.len() as i64 >= seats {
        return Err(Outcome::MaximumConcurrentSeats);
    }

    Ok(())
}
