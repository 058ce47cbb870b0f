use crate::SharedController;
use crate::session::RotctldSession;
use log::{error, info};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;

/// Pause after a failed accept, so a persistent error such as running out of
/// file descriptors does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// rotctld listener in front of a single dish.
///
/// Clients are served one at a time, as Gpredict is the only tracker driving
/// the rotor; further connections wait in the backlog until the current
/// session ends.
pub struct Bridge {
    listener: TcpListener,
    controller: SharedController,
}

impl Bridge {
    pub async fn bind(addr: impl ToSocketAddrs, controller: SharedController) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening for rotor commands on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            controller,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and serves connections until `shutdown` fires, then parks the
    /// dish with a stop command.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let accepted = tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    error!("Failed to accept connection: {e}");
                    if back_off(&mut shutdown).await {
                        continue;
                    }
                    break;
                }
            };
            info!("Connection from {peer}");

            let (reader, writer) = stream.into_split();
            let mut session =
                RotctldSession::new(reader, writer, self.controller.clone(), peer.to_string());

            if let Err(e) = session.run(shutdown.clone()).await {
                error!("Connection error: {e}");
            }
        }

        info!("Shutting down, stopping antenna");
        let controller = self.controller.clone();
        match tokio::task::spawn_blocking(move || controller.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to stop antenna: {e}"),
            Err(e) => error!("Stop task failed: {e}"),
        }
    }
}

/// Waits `ACCEPT_BACKOFF`. Returns false if `shutdown` fired meanwhile.
async fn back_off(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown.changed() => false,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}
