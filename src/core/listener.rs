// src/core/listener.rs

use crate::{
    CancellationToken,
    core::service::{Service, ServiceError},
};
use std::sync::Arc;
use tokio::net::TcpListener;

impl Service {
    /// Binds this service's endpoint and serves connections until `cancellation_token` fires.
    ///
    /// A bind failure is returned immediately and only affects this service. Once
    /// listening, nothing short of cancellation ends the loop, and cancellation is a
    /// clean `Ok(())`.
    ///
    /// # Errors
    /// Returns `ServiceError::Bind` if the endpoint cannot be bound.
    pub async fn serve(self: Arc<Self>, cancellation_token: CancellationToken) -> Result<(), ServiceError> {
        let endpoint = self.endpoint();
        let listener = match TcpListener::bind(endpoint.as_str()).await {
            Ok(listener) => listener,
            Err(source) => {
                self.log.error("failed to listen", &[("error", &source)]);
                return Err(ServiceError::Bind {
                    addr: endpoint,
                    source,
                });
            }
        };
        self.accept_loop(listener, cancellation_token).await;
        Ok(())
    }

    /// Accepts connections on an already bound listener until `cancellation_token` fires.
    ///
    /// Every connection gets its own task; there is no cap on how many run at once.
    /// Accept errors are logged and the loop carries on. The listener is dropped,
    /// and the socket released, when this returns.
    pub async fn accept_loop(self: Arc<Self>, listener: TcpListener, cancellation_token: CancellationToken) {
        self.log.info("state changed", &[("state", &"listening")]);

        loop {
            tokio::select! {
                // Shutdown wins over anything accept has to say.
                biased;
                () = cancellation_token.cancelled() => {
                    self.log.info("state changed", &[("state", &"shutdown")]);
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.log.info("accepted connection", &[("source", &peer)]);
                        let service = Arc::clone(&self);
                        let token = cancellation_token.clone();
                        tokio::spawn(async move {
                            service.handle_connection(stream, &token).await;
                            service.log.debug("connection closed", &[("source", &peer)]);
                        });
                    }
                    Err(e) => {
                        self.log.warn("failed to accept", &[("error", &e)]);
                    }
                },
            }
        }
    }
}
