//! Interface to the packet transport.
//!
//! The handshake does not frame, encrypt or authenticate packets itself; it sends and receives
//! whole message payloads through a [`Transport`].
use std::sync::mpsc;
use crate::codec::WireBuf;
use crate::codes::msg;
use crate::error::{DisconnectError, Error, Result};

/// Packet transport used by the key exchange and authentication.
///
/// Payloads passed to and from the transport do not include the message number, which is passed
/// separately.
pub trait Transport {
    /// Sends one message.
    fn send(&mut self, msg_id: u8, payload: WireBuf) -> Result<()>;

    /// Receives the next message, blocking until it arrives.
    ///
    /// Returns [`Error::PeerClosed`] if the connection was closed.
    fn recv(&mut self) -> Result<(u8, WireBuf)>;

    /// Receives the next message and checks that it has the expected number.
    ///
    /// `SSH_MSG_IGNORE` and `SSH_MSG_DEBUG` are skipped, `SSH_MSG_DISCONNECT` is turned into
    /// [`Error::PeerDisconnected`] and any other message fails with
    /// [`Error::UnexpectedPacket`].
    fn recv_expecting(&mut self, msg_id: u8) -> Result<WireBuf> {
        loop {
            let (recvd_id, mut payload) = self.recv()?;
            if recvd_id == msg_id {
                return Ok(payload)
            }

            match recvd_id {
                msg::IGNORE => log::trace!("skipping SSH_MSG_IGNORE"),
                msg::DEBUG => {
                    let _always_display = payload.get_bool()?;
                    let message = payload.get_cstring()?;
                    log::debug!("received SSH_MSG_DEBUG: {:?}", message);
                },
                msg::DISCONNECT => {
                    let reason_code = payload.get_u32()?;
                    let description = payload.get_cstring()?;
                    let description_lang = payload.get_cstring()?;
                    let err = DisconnectError { reason_code, description, description_lang };
                    log::info!("received SSH_MSG_DISCONNECT: {}", err);
                    return Err(Error::PeerDisconnected(err))
                },
                _ => {
                    log::debug!("expected message {}, received {}", msg_id, recvd_id);
                    return Err(Error::UnexpectedPacket(recvd_id))
                },
            }
        }
    }

    /// Sends `SSH_MSG_DISCONNECT` (RFC 4253, section 11.1).
    fn send_disconnect(&mut self, reason_code: u32, description: &str) -> Result<()> {
        let mut payload = WireBuf::new();
        payload.put_u32(reason_code)?;
        payload.put_str(description)?;
        payload.put_str("")?;
        self.send(msg::DISCONNECT, payload)
    }
}

/// Sends `SSH_MSG_DISCONNECT` for a fatal error, unless the peer has already gone away.
///
/// Errors from the transport are ignored, the original error is more important.
pub(crate) fn disconnect_on_error(transport: &mut dyn Transport, err: &Error) {
    if matches!(err, Error::PeerClosed | Error::PeerDisconnected(_)) {
        return
    }
    log::info!("aborting connection: {}", err);
    let description = err.to_string();
    if let Err(send_err) = transport.send_disconnect(err.disconnect_reason(), &description) {
        log::debug!("could not send SSH_MSG_DISCONNECT: {}", send_err);
    }
}

/// In-memory transport that connects two peers in the same process.
///
/// Create a connected pair with [`memory_pair()`]. This is useful for tests and for running both
/// sides of a handshake on two threads.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: mpsc::Sender<(u8, Vec<u8>)>,
    rx: mpsc::Receiver<(u8, Vec<u8>)>,
}

/// Creates two connected [`MemoryTransport`]s.
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    let (tx_a, rx_b) = mpsc::channel();
    let (tx_b, rx_a) = mpsc::channel();
    (MemoryTransport { tx: tx_a, rx: rx_a }, MemoryTransport { tx: tx_b, rx: rx_b })
}

impl Transport for MemoryTransport {
    fn send(&mut self, msg_id: u8, payload: WireBuf) -> Result<()> {
        self.tx.send((msg_id, payload.as_slice().to_vec())).map_err(|_| Error::PeerClosed)
    }

    fn recv(&mut self) -> Result<(u8, WireBuf)> {
        let (msg_id, payload) = self.rx.recv().map_err(|_| Error::PeerClosed)?;
        Ok((msg_id, WireBuf::from_bytes(&payload)))
    }
}
