//! Small numeric and formatting helpers.

use std::time::Duration;

/// Euclidean norm of a vector.
pub(crate) fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Dot product of two equally long vectors.
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Formats a duration as days, hours, minutes and seconds.
pub(crate) fn format_dhms(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let days = (total / 86_400.0).floor() as u64;
    let hours = ((total % 86_400.0) / 3_600.0).floor() as u64;
    let minutes = ((total % 3_600.0) / 60.0).floor() as u64;
    let seconds = total % 60.0;
    if days > 0 {
        format!("{days}d{hours:02}h{minutes:02}m{seconds:02.0}s")
    } else if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02.0}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02.0}s")
    } else {
        format!("{seconds:.1}s")
    }
}
