//! Unit conversion and display of optional readings.

/// Placeholder shown for an absent value.
pub const MISSING: &str = "—";

/// Convert Celsius to Fahrenheit.
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Render an optional reading with one decimal, or [`MISSING`].
pub fn display(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) if unit.is_empty() => format!("{:.1}", v),
        Some(v) => format!("{:.1} {}", v, unit),
        None => MISSING.to_string(),
    }
}

/// Render an optional Celsius reading in Fahrenheit.
pub fn display_fahrenheit(celsius: Option<f64>) -> String {
    display(celsius.map(celsius_to_fahrenheit), "°F")
}

/// Render an optional whole-number reading such as a heart rate.
pub fn display_whole(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.0} {}", v, unit),
        None => MISSING.to_string(),
    }
}
