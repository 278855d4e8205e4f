//! Port checks for process pre-flight.

use std::net::TcpListener;

use tracing::debug;

/// Check if a port is free by binding to it and releasing it immediately.
pub fn is_port_available(host: &str, port: u16) -> bool {
    match TcpListener::bind((host, port)) {
        Ok(listener) => listener.local_addr().is_ok(),
        Err(e) => {
            debug!(%host, port = %port, error = %e, "Port bind probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_port_is_reported_busy() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!is_port_available("127.0.0.1", port));

        drop(listener);
        assert!(is_port_available("127.0.0.1", port));
    }
}
