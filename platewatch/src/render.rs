//! Text rendering for monitor output. Pure string builders, so the promised
//! shapes (time-of-day for same-day appointments, distinct nothing-found
//! output) stay testable without a terminal.

use plate_search::SearchOutcome;
use platewatch_core::timefmt;
use platewatch_core::types::{
    AiStats, Detection, PlateImage, PlateProcessReport, StreamState, StreamStatus,
};

pub fn status_line(status: &StreamStatus) -> String {
    format!(
        "stream: {}  task: {}  ({})",
        if status.is_streaming { "active" } else { "inactive" },
        if status.is_task_running { "running" } else { "stopped" },
        match status.status {
            StreamState::Active => "active",
            StreamState::Inactive => "inactive",
        }
    )
}

pub fn detection_line(d: &Detection) -> String {
    format!(
        "{}  {:.1}%  {}  {}",
        d.license_plate,
        d.confidence_score * 100.0,
        timefmt::display_datetime(&d.created_at),
        if d.is_automatic { "automatic" } else { "manual" }
    )
}

pub fn image_line(i: &PlateImage) -> String {
    format!(
        "{}  {}  {}  {:.1} KB",
        i.filename,
        i.license_plate,
        timefmt::display_datetime(&i.timestamp),
        i.size_bytes as f64 / 1024.0
    )
}

pub fn search_report(outcome: &SearchOutcome) -> String {
    match outcome {
        SearchOutcome::NothingFound { license_plate } => {
            format!("no information found for plate {license_plate}")
        }
        SearchOutcome::Found(result) => {
            let mut out = vec![format!("plate: {}", result.license_plate)];
            if let Some(v) = &result.vehicle {
                let year = v.year.map(|y| format!(" ({y})")).unwrap_or_default();
                out.push(format!("vehicle: {} {}{}", v.brand, v.model, year));
            }
            if let Some(c) = &result.customer {
                let mut line = format!("owner: {}", c.full_name);
                if let Some(phone) = &c.phone {
                    line.push_str(&format!("  {phone}"));
                }
                out.push(line);
            }
            if !result.appointments.is_empty() {
                out.push("appointments today:".to_string());
                for apt in &result.appointments {
                    out.push(format!(
                        "  {}  {}",
                        timefmt::display_time(&apt.appointment_date),
                        apt.service_display().unwrap_or("unspecified service")
                    ));
                }
            }
            out.join("\n")
        }
    }
}

pub fn process_report(report: &PlateProcessReport) -> String {
    let mut out = Vec::new();
    if let Some(message) = &report.message {
        out.push(message.clone());
    }
    if let Some(v) = &report.vehicle {
        let year = v.year.map(|y| format!(" ({y})")).unwrap_or_default();
        out.push(format!("vehicle: {} {}{}", v.brand, v.model, year));
    }
    if let Some(c) = &report.customer {
        out.push(format!("owner: {}", c.full_name));
    }
    for apt in &report.appointments {
        out.push(format!(
            "  {}  {}",
            timefmt::display_time(&apt.appointment_date),
            apt.service_display().unwrap_or("unspecified service")
        ));
    }
    if out.is_empty() {
        out.push(format!("no records for plate {}", report.license_plate));
    }
    out.join("\n")
}

pub fn stats_block(s: &AiStats) -> String {
    [
        format!("detections total: {}", s.total_detections),
        format!("detections today: {}", s.today_detections),
        format!("vehicles known: {}", s.total_vehicles),
        format!("appointments today: {}", s.today_appointments),
        format!("detections with appointments: {}", s.detections_with_appointments),
        format!("accuracy rate: {:.1}%", s.accuracy_rate),
    ]
    .join("\n")
}
