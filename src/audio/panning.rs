//! Pure spatial panning math.
//!
//! Maps listener/source headings to a relative angle and a relative
//! angle to a constant-power stereo gain pair. No state.

use std::fmt::Write;

/// Reference window for signal-strength normalization, dBm-like scale.
const STRENGTH_FLOOR_DBM: f32 = -100.0;
const STRENGTH_CEIL_DBM: f32 = -60.0;

/// Stereo gain pair, both channels in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoPan {
    pub left: f32,
    pub right: f32,
}

/// Signed shortest angular difference `source_heading −
/// listener_heading`, in (−180, 180] degrees.
///
/// Computed through the two-argument arctangent of the difference's
/// sine and cosine so the 0°/360° wrap needs no special casing: the
/// result is continuous under small perturbations of either input,
/// and shifting both headings by a common offset leaves it unchanged.
/// Exactly opposing headings come out as +180 when the raw wrapped
/// difference is positive and −180 when it is negative; the fold in
/// [`stereo_pan`] treats both identically.
pub fn relative_angle(listener_heading: f32, source_heading: f32) -> f32 {
    let delta = (source_heading - listener_heading).to_radians();
    delta.sin().atan2(delta.cos()).to_degrees()
}

/// Constant-power stereo gains for a source at `relative_angle`
/// degrees, with sources behind the listener scaled by
/// `behind_attenuation` in [0, 1].
pub fn stereo_pan(relative_angle: f32, behind_attenuation: f32) -> StereoPan {
    // Fold into the front hemisphere: a source at bearing θ mirrors
    // the source at 180° − θ.
    let mut folded = relative_angle;
    while folded > 90.0 {
        folded = 180.0 - folded;
    }
    while folded < -90.0 {
        folded = -180.0 - folded;
    }

    let pan_position = folded.abs() / 90.0;

    // Square-root law keeps left² + right² = 1 across the sweep, so
    // there is no loudness dip at center.
    let mut right = ((pan_position + 1.0) / 2.0).sqrt();
    let mut left = ((1.0 - pan_position) / 2.0).sqrt();

    if folded < 0.0 {
        std::mem::swap(&mut left, &mut right);
    }

    // The attenuation test uses the un-folded angle: a source dead
    // behind folds to the front but is still behind the listener.
    let attenuation = if relative_angle.abs() > 90.0 {
        behind_attenuation
    } else {
        1.0
    };

    StereoPan {
        left: left * attenuation,
        right: right * attenuation,
    }
}

/// Normalized volume in [0, 1] for a received signal strength.
///
/// Linear over −100..−60 dBm with clamping outside the window, then
/// raised to `exponent`; exponents above 1 compress weak signals
/// toward silence.
pub fn signal_strength_to_volume(strength_dbm: i32, exponent: f32) -> f32 {
    let normalized = ((strength_dbm as f32 - STRENGTH_FLOOR_DBM)
        / (STRENGTH_CEIL_DBM - STRENGTH_FLOOR_DBM))
        .clamp(0.0, 1.0);
    normalized.powf(exponent)
}

/// Human-readable pan reference table for the given angles, one row
/// per angle. Used by the demo binary's `pan-table` mode.
pub fn pan_table(angles: &[i32]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Angle    Left   Right   L²+R²");
    for &angle in angles {
        let pan = stereo_pan(angle as f32, 1.0);
        let power = pan.left * pan.left + pan.right * pan.right;
        let _ = writeln!(
            out,
            "{:>5}° {:6.3} {:6.3} {:7.3}",
            angle, pan.left, pan.right, power
        );
    }
    out
}
