/// Centralized environment-variable parsing helpers.
///
/// All diagnostic-override env-var reads go through these helpers so the
/// truthy/falsey parsing logic lives in exactly one place.

/// Returns `true` when the environment variable is set to a truthy value
/// (`1`, `true`, `yes`, or `on`, case-insensitive, trimmed).
#[inline]
pub(crate) fn env_var_truthy(var_name: &str) -> bool {
    std::env::var(var_name)
        .map(|raw| {
            let normalized = raw.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
        })
        .unwrap_or(false)
}

/// Parses the environment variable as a `u32`, returning `Some` only when
/// the value is a valid positive (> 0) integer.
#[inline]
pub(crate) fn env_var_positive_u32(var_name: &str) -> Option<u32> {
    std::env::var(var_name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
}

/// Parses the environment variable as an `f32`, returning `Some` only when
/// the value is finite and positive.
#[inline]
pub(crate) fn env_var_positive_f32(var_name: &str) -> Option<f32> {
    std::env::var(var_name)
        .ok()
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
}
