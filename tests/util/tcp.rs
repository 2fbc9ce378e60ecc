//! TCP helpers. Everything binds to `127.0.0.1:0` so that tests running in
//! parallel never fight over ports.

use std::{net::SocketAddr, time::Duration};

use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// Unconnected socket bound to a port picked by the OS.
pub fn local_socket() -> (TcpSocket, SocketAddr) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
    let addr = socket.local_addr().unwrap();

    (socket, addr)
}

/// Listener bound to a port picked by the OS.
pub fn local_listener() -> (TcpListener, SocketAddr) {
    let (socket, addr) = local_socket();

    (socket.listen(128).unwrap(), addr)
}

/// Address where nobody is listening. Connecting to it is refused.
pub fn closed_port() -> SocketAddr {
    local_listener().1
}

/// Waits until something accepts TCP connections on `addr`. Servers spawned
/// by tests start listening before their task is polled, so this mostly gives
/// the runtime a chance to run them.
pub async fn wait_until_listening(addr: SocketAddr) {
    let connect = async {
        while TcpStream::connect(addr).await.is_err() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    if tokio::time::timeout(Duration::from_secs(2), connect).await.is_err() {
        panic!("nothing is listening on {addr}");
    }
}

/// [`wait_until_listening`] for every address in `addrs`.
pub async fn wait_for_all(addrs: &[SocketAddr]) {
    for addr in addrs {
        wait_until_listening(*addr).await;
    }
}
