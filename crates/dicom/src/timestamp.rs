//! DICOM `DA`/`TM` values to timestamps and display labels.

use time::{Date, Month, PrimitiveDateTime, Time};

/// Combine a `DA` (`YYYYMMDD`) and `TM` (`HHMMSS[.FFFFFF]`) value.
///
/// Returns `None` unless both are present and well-formed. Fractional
/// seconds are dropped.
///
/// ```
/// use hoist_dicom::timestamp::{format_label, parse};
/// let ts = parse(Some("20180412"), Some("093015.123")).unwrap();
/// assert_eq!(format_label(ts), "2018-04-12 09:30:15");
/// assert!(parse(Some("20180412"), None).is_none());
/// ```
pub fn parse(date: Option<&str>, time: Option<&str>) -> Option<PrimitiveDateTime> {
    let date = date?.trim();
    let time = time?.trim();
    if !date.is_ascii() || !time.is_ascii() || date.len() != 8 || time.len() < 6 {
        return None;
    }
    let year: i32 = digits(&date[0..4])?;
    let month = Month::try_from(digits::<u8>(&date[4..6])?).ok()?;
    let day: u8 = digits(&date[6..8])?;
    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(digits(&time[0..2])?, digits(&time[2..4])?, digits(&time[4..6])?).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

/// `YYYY-MM-DD HH:MM:SS`, the form used for generated labels.
pub fn format_label(ts: PrimitiveDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}

fn digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    match s.bytes().all(|b| b.is_ascii_digit()) {
        true => s.parse().ok(),
        false => None,
    }
}
