//! CSV export of report incidents. Uses the `csv` crate for quoting and escaping.

use crate::domain::Incident;
use crate::domain::incident::humanize;

const HEADER: [&str; 12] = [
    "Incident Number",
    "Date",
    "Type",
    "Status",
    "Address",
    "City",
    "County",
    "State",
    "Adults",
    "Children",
    "Families",
    "Cases",
];

/// One row per incident, with a header row.
pub fn incidents_to_csv(incidents: &[Incident]) -> Result<String, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());
    wtr.write_record(HEADER)?;

    for incident in incidents {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        wtr.write_record([
            incident.incident_number.clone(),
            incident.date.to_string(),
            incident.incident_type.as_deref().map(humanize).unwrap_or_default(),
            incident.status.to_string(),
            // Addresses are typed in by hand; keep each record on one line.
            text(&incident.address).replace(['\n', '\r'], " "),
            text(&incident.city),
            text(&incident.county),
            text(&incident.state),
            incident.num_adults.to_string(),
            incident.num_children.to_string(),
            incident.num_families.to_string(),
            incident.num_cases.to_string(),
        ])?;
    }

    wtr.flush()?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| csv::Error::from(std::io::Error::other(e.to_string())))?;
    String::from_utf8(bytes).map_err(|e| {
        csv::Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e.to_string(),
        ))
    })
}
