//! Utility functions for the teapot-bt crate.

/// Convert Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use teapot_bt::celsius_to_fahrenheit;
///
/// let fahrenheit = celsius_to_fahrenheit(100.0);
/// assert!((fahrenheit - 212.0).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius.
#[inline]
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Fahrenheit suffix shown next to a Celsius value, e.g. `" / 176.0°F"`.
pub fn fahrenheit_label(celsius: f64) -> String {
    format!(" / {:.1}°F", celsius_to_fahrenheit(celsius))
}

/// Format a number of seconds as `mm:ss`.
///
/// # Example
///
/// ```
/// use teapot_bt::format_countdown;
///
/// assert_eq!(format_countdown(181), "03:01");
/// assert_eq!(format_countdown(0), "00:00");
/// ```
pub fn format_countdown(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Format a whole number of minutes as `mm:ss`.
pub fn minutes_to_time_string(minutes: u32) -> String {
    format_countdown(minutes.saturating_mul(60))
}

/// Parse `mm:ss` into whole minutes, discarding leftover seconds.
///
/// Unparseable fields count as zero; a string without exactly one `:` is zero.
pub fn time_string_to_minutes(time: &str) -> u32 {
    let parts: Vec<&str> = time.split(':').collect();
    match parts.as_slice() {
        [minutes, seconds] => {
            let minutes: u32 = minutes.trim().parse().unwrap_or(0);
            let seconds: u32 = seconds.trim().parse().unwrap_or(0);
            minutes + seconds / 60
        }
        _ => 0,
    }
}
