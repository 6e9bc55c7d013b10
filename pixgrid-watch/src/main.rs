//! pixgrid-watch: headless viewer for a shared pixel grid.
//!
//! Connects with `GRID_*` environment settings (or a URL as the first
//! argument), logs every change notification and reprints the grid after
//! each snapshot. Remaining arguments are cell indices to toggle once the
//! first snapshot has arrived.
//!
//! ```text
//! RUST_LOG=debug pixgrid-watch ws://localhost:6060/api/ws 12 13 14
//! ```

mod render;

use log::{info, warn};
use pixgrid_sync::{GridEvent, GridSession, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let mut config = SessionConfig::from_env();
    if let Some(url) = args.next() {
        config.url = url;
    }
    let mut pending_toggles = args
        .map(|arg| arg.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut session = GridSession::new(config);
    let mut events = session
        .take_event_rx()
        .ok_or("event receiver already taken")?;
    session.start();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                info!("{}", render::describe(&event));

                match event {
                    GridEvent::SnapshotApplied { .. } => {
                        let grid = session.grid().await;
                        println!("{}\n", render::render_grid(&grid));
                        for cell in pending_toggles.drain(..) {
                            if !session.toggle_cell(cell) {
                                warn!("Toggle for cell {cell} rejected");
                            }
                        }
                    }
                    GridEvent::ParticipantJoined(_) | GridEvent::ParticipantLeft(_) => {
                        let participants = session.participants().await;
                        info!("viewers: {}", render::render_participants(&participants));
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.stop().await;
    let stats = session.transport_stats();
    info!(
        "Sent {} frames, received {}, dropped {}, reconnects {}",
        stats.frames_sent, stats.frames_received, stats.sends_dropped, stats.reconnects_scheduled
    );
    Ok(())
}
