//! Text rendering of the grid and of change notifications.

use pixgrid_sync::{GridEvent, GridState, Participant};

const ON: char = '#';
const OFF: char = '.';

/// The grid as rows of `#`/`.`, one line per row.
///
/// Grids whose cell count is not a perfect square print as a single row.
pub fn render_grid(grid: &GridState) -> String {
    let width = grid.dimension().filter(|&n| n > 0).unwrap_or(grid.cell_count().max(1));
    grid.cells()
        .chunks(width)
        .map(|row| row.iter().map(|&on| if on { ON } else { OFF }).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-line summary of the participants, sorted by id.
pub fn render_participants(participants: &[Participant]) -> String {
    if participants.is_empty() {
        return "no other viewers".to_string();
    }
    let mut sorted: Vec<&Participant> = participants.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted
        .iter()
        .map(|p| format!("{}@({}, {})", p.id, p.x, p.y))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn describe(event: &GridEvent) -> String {
    match event {
        GridEvent::Connected => "connected".to_string(),
        GridEvent::Disconnected => "disconnected, reconnecting".to_string(),
        GridEvent::IdentityAssigned(id) => format!("identity {id}"),
        GridEvent::SnapshotApplied { cells_on } => format!("snapshot: {cells_on} cells on"),
        GridEvent::CellChanged { cell, on } => {
            format!("cell {cell} {}", if *on { "on" } else { "off" })
        }
        GridEvent::ParticipantJoined(id) => format!("{id} joined"),
        GridEvent::ParticipantMoved(p) => format!("{} at ({}, {})", p.id, p.x, p.y),
        GridEvent::ParticipantLeft(id) => format!("{id} left"),
        GridEvent::ViewerCount(n) => format!("{n} viewers"),
    }
}
