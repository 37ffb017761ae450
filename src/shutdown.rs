//! Signal handling and the GOAWAY-then-close graceful shutdown sequence
//! (spec §6): broadcast `GOAWAY` to every live peer, allow a short grace
//! period, then close every socket with code 1001.

use crate::state::AppState;
use signal_core::{Message, MessageKind};
use std::time::Duration;

const GOAWAY_GRACE: Duration = Duration::from_millis(100);

/// Resolves once SIGINT (or, on unix, SIGTERM) is received.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Broadcasts `GOAWAY` to every connected peer, waits a short grace period
/// for it to flush, then force-closes every remaining socket and tears
/// down the admin control plane. Idempotent with respect to the realm:
/// peers that disconnect mid-sequence are simply absent from the second pass.
pub async fn graceful_shutdown(state: &AppState) {
    log::info!("shutdown signal received, broadcasting GOAWAY");

    let goaway = Message::new(MessageKind::Goaway);
    let text = goaway.to_json();
    for peer in state.core.realm.all_peers().await {
        let _ = peer.send(text.clone());
    }

    tokio::time::sleep(GOAWAY_GRACE).await;

    for peer in state.core.realm.all_peers().await {
        if let Some(socket) = peer.detach() {
            socket.close(1001, "server shutting down");
        }
    }

    state.admin.destroy();
    state.core.shutdown();
    log::info!("shutdown complete");
}
