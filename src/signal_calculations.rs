//! Radio signal and timing calculations for the simulated 802.11 link.

use crate::scene::Point;

/// Speed of light in m/s, for constant-speed propagation delay.
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// PHY preamble + PLCP header duration in seconds (ERP-OFDM).
pub(crate) const PHY_PREAMBLE_TIME: f64 = 20e-6;

/// MAC framing overhead added to every data frame: 24-byte header plus
/// 4-byte FCS.
pub(crate) const MAC_OVERHEAD_BYTES: usize = 28;

/// Bit rate in bit/s for a named constant-rate PHY mode, or `None` for an
/// unknown mode name.
pub(crate) fn bit_rate_for_mode(mode: &str) -> Option<f64> {
    let mbps = match mode {
        "DsssRate1Mbps" => 1.0,
        "DsssRate2Mbps" => 2.0,
        "DsssRate5_5Mbps" => 5.5,
        "DsssRate11Mbps" => 11.0,
        "ErpOfdmRate6Mbps" => 6.0,
        "ErpOfdmRate9Mbps" => 9.0,
        "ErpOfdmRate12Mbps" => 12.0,
        "ErpOfdmRate18Mbps" => 18.0,
        "ErpOfdmRate24Mbps" => 24.0,
        "ErpOfdmRate36Mbps" => 36.0,
        "ErpOfdmRate48Mbps" => 48.0,
        "ErpOfdmRate54Mbps" => 54.0,
        _ => return None,
    };
    Some(mbps * 1_000_000.0)
}

/// Frame airtime in seconds: preamble plus payload and MAC overhead clocked
/// out at the configured bit rate.
pub(crate) fn frame_airtime(payload_bytes: usize, bit_rate_bps: f64) -> f64 {
    let bits = ((payload_bytes + MAC_OVERHEAD_BYTES) * 8) as f64;
    PHY_PREAMBLE_TIME + bits / bit_rate_bps
}

pub(crate) fn distance(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

pub(crate) fn propagation_delay(distance_m: f64) -> f64 {
    distance_m / SPEED_OF_LIGHT
}

/// Log-distance path loss in dB.
///
/// Model: PL(d) = PL(d0) + 10 * n * log10(d / d0), clamped to PL(d0) inside
/// the reference distance so the model never reports a gain at short range.
pub(crate) fn log_distance_path_loss(
    distance_m: f64,
    reference_distance: f64,
    path_loss_exponent: f64,
    path_loss_at_reference_distance: f64,
) -> f64 {
    if distance_m <= reference_distance {
        return path_loss_at_reference_distance;
    }
    path_loss_at_reference_distance
        + 10.0 * path_loss_exponent * (distance_m / reference_distance).log10()
}

/// Bearing from `from` to `to` in degrees, measured counter-clockwise from
/// the +x axis.
pub(crate) fn bearing_degrees(from: &Point, to: &Point) -> f64 {
    (to.y - from.y).atan2(to.x - from.x).to_degrees()
}

/// Smallest signed angular difference between a bearing and an antenna
/// orientation, normalized into (-180, 180].
pub(crate) fn angular_offset_degrees(bearing: f64, orientation: f64) -> f64 {
    let mut delta = (bearing - orientation) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    }
    if delta <= -180.0 {
        delta += 360.0;
    }
    delta
}

/// Cosine antenna gain in dB at a given angular offset from the boresight.
///
/// Power falls off as cos^2 of the offset normalized to the half-beamwidth:
/// 0 dB on the boresight, falling smoothly, and `None` (no reception at all)
/// at or beyond the edge of the configured beamwidth.
pub(crate) fn cosine_antenna_gain_db(offset_degrees: f64, beamwidth_degrees: f64) -> Option<f64> {
    let half_beamwidth = beamwidth_degrees / 2.0;
    if offset_degrees.abs() >= half_beamwidth {
        return None;
    }
    let amplitude = (std::f64::consts::FRAC_PI_2 * offset_degrees / half_beamwidth).cos();
    if amplitude <= 0.0 {
        return None;
    }
    Some(20.0 * amplitude.log10())
}
