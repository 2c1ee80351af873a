use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::{BookingError, DateInput, PatientType, Shift, SlotQuery};

const API_DATE_FORMAT: &str = "%Y-%m-%d";

/// Normalises a client date to the backend's `YYYY-MM-DD`.
///
/// Accepts `DD/MM/YYYY`, `YYYY-MM-DD`, RFC 3339 timestamps and native chrono values.
pub fn format_date_for_api(input: impl Into<DateInput>) -> Result<String, BookingError> {
    parse_api_date(input).map(|date| date.format(API_DATE_FORMAT).to_string())
}

pub fn parse_api_date(input: impl Into<DateInput>) -> Result<NaiveDate, BookingError> {
    match input.into() {
        DateInput::Date(date) => Ok(date),
        DateInput::DateTime(date_time) => Ok(date_time.date()),
        DateInput::Text(text) => parse_date_text(text.trim()),
    }
}

fn parse_date_text(text: &str) -> Result<NaiveDate, BookingError> {
    if text.contains('/') {
        let segments: Vec<&str> = text.split('/').map(str::trim).collect();
        if let [day, month, year] = segments.as_slice() {
            let parsed = (year.parse::<i32>(), month.parse::<u32>(), day.parse::<u32>());
            if let (Ok(year), Ok(month), Ok(day)) = parsed {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    return Ok(date);
                }
            }
        }
        return Err(invalid_date(text));
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, API_DATE_FORMAT) {
        return Ok(date);
    }

    DateTime::parse_from_rfc3339(text)
        .map(|date_time| date_time.date_naive())
        .map_err(|_| invalid_date(text))
}

fn invalid_date(text: &str) -> BookingError {
    BookingError::Validation(format!(
        "invalid date '{}', expected DD/MM/YYYY or YYYY-MM-DD",
        text
    ))
}

/// `M` before 14:00, `T` from then on. Missing or unreadable times count as morning.
pub fn shift_from_time(time: Option<&str>) -> Shift {
    time.and_then(|value| value.trim().split(':').next())
        .and_then(|hour| hour.trim().parse::<u32>().ok())
        .map(Shift::from_hour)
        .unwrap_or(Shift::Morning)
}

pub fn map_patient_type(input: Option<&str>) -> PatientType {
    match input.map(|value| value.trim().to_uppercase()).as_deref() {
        Some("SIS") => PatientType::Sis,
        Some("SOAT") => PatientType::Soat,
        _ => PatientType::Pagante,
    }
}

/// Combines a date and an `HH:MM` time into the slot instant.
pub fn parse_slot_date_time(date: &str, time: &str) -> Result<NaiveDateTime, BookingError> {
    let date = parse_api_date(date)?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .map_err(|_| BookingError::Validation(format!("invalid time '{}', expected HH:MM", time)))?;
    Ok(date.and_time(time))
}

/// Builds a slot window from optional client dates. A missing `from` means `today`; a missing
/// `to` means `default_days` after `from`.
pub fn slot_query_from_params(
    specialty_id: &str,
    from: Option<&str>,
    to: Option<&str>,
    today: NaiveDate,
    default_days: i64,
) -> Result<SlotQuery, BookingError> {
    let from = match from.filter(|value| !value.trim().is_empty()) {
        Some(value) => parse_api_date(value)?,
        None => today,
    };
    match to.filter(|value| !value.trim().is_empty()) {
        Some(value) => SlotQuery::new(specialty_id, from, parse_api_date(value)?),
        None => SlotQuery::starting_at(specialty_id, from, default_days),
    }
}
