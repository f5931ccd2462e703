use time::{macros::format_description, OffsetDateTime, UtcOffset};

use super::{GlucoseError, Reading};

pub const CSV_HEADER: [&str; 7] = ["Date", "Time", "Value", "Type", "Notes", "Meal", "Medication"];

/// Download name for an export produced at `now`.
pub fn export_filename(now: OffsetDateTime) -> Result<String, GlucoseError> {
    let day = now.format(format_description!("[year]-[month]-[day]"))?;
    Ok(format!("glucotracker-export-{day}.csv"))
}

/// Render readings, in the order given, as `Date,Time,Value,Type,Notes,Meal,Medication`.
///
/// Date and time are split into local columns for `offset`, absent optional
/// fields become empty strings and rows are separated by `\n` without a
/// trailing newline.
pub fn export_csv(readings: &[Reading], offset: UtcOffset) -> Result<String, GlucoseError> {
    let date_format = format_description!("[year]-[month]-[day]");
    let time_format = format_description!("[hour]:[minute]");

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for r in readings {
        let local = r.timestamp.to_offset(offset);
        writer.write_record([
            local.format(date_format)?,
            local.format(time_format)?,
            r.value.to_string(),
            r.kind.to_string(),
            r.notes.clone().unwrap_or_default(),
            r.meal.clone().unwrap_or_default(),
            r.medication.clone().unwrap_or_default(),
        ])?;
    }

    let mut bytes = writer
        .into_inner()
        .map_err(|e| GlucoseError::Export(e.to_string()))?;
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    String::from_utf8(bytes).map_err(|e| GlucoseError::Export(e.to_string()))
}
