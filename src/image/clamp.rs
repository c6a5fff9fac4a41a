//! Bounding-box clamp.
//!
//! The width is clamped first; the height is then checked against the
//! already-scaled value and clamped second. Intermediate values stay
//! fractional and are truncated toward zero only once at the end, the same
//! way a drawing surface truncates a fractional size. Neither side drops
//! below one pixel.

/// Returns the target `(width, height)` for an image of `width` x `height`
/// that has to fit inside `max_width` x `max_height`.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let mut w = f64::from(width);
    let mut h = f64::from(height);
    let max_w = f64::from(max_width);
    let max_h = f64::from(max_height);

    if w > max_w {
        h = h * max_w / w;
        w = max_w;
    }

    if h > max_h {
        w = w * max_h / h;
        h = max_h;
    }

    (truncate(w), truncate(h))
}

fn truncate(value: f64) -> u32 {
    (value.trunc() as u32).max(1)
}
